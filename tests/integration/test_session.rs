//! End-to-end session tests against the fixture bank.
//!
//! These drive a whole practice session through the controller and the
//! async service, then build the report the CLI would write.

use std::path::PathBuf;
use std::sync::Arc;

use quotient_engine::{
    Config, EnrichmentSource, EventBroadcaster, Feedback, Grade, HintStage, Level, LlmProvider,
    NextProblem, PresentOutcome, ProblemBank, SessionController, SessionPolicy, SessionService,
    SubmitOutcome, Tutor,
};
use quotient_report::{
    json::JsonGenerator, Attempt, MarkdownGenerator, ReportGenerator, ReportInput,
};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn load_fixtures() -> (Config, Arc<ProblemBank>) {
    let config =
        Config::load_from_file(&fixture_dir().join("quotient.json")).expect("fixture config");
    let bank = ProblemBank::load(fixture_dir().join(&config.problem_bank)).expect("fixture bank");
    (config, Arc::new(bank))
}

fn fixture_service() -> (SessionService, Arc<ProblemBank>) {
    let (config, bank) = load_fixtures();
    let controller = SessionController::new(Arc::clone(&bank), SessionPolicy::from_config(&config));
    let service = SessionService::new(controller, Tutor::offline(), EventBroadcaster::default());
    (service, bank)
}

fn answer_for(bank: &ProblemBank, id: &str) -> String {
    bank.get(id)
        .and_then(|p| p.canonical_answer())
        .expect("fixture problem has an answer")
        .to_string()
}

#[test]
fn test_fixture_config_loads() {
    let (config, _) = load_fixtures();

    assert_eq!(config.session_limit, 6);
    assert_eq!(config.recency_window, 3);
    assert_eq!(config.fast_answer_threshold_ms, 20_000);
    assert_eq!(config.llm.provider, LlmProvider::Offline);
    assert_eq!(config.enrichment.hint_timeout_ms, 200);
}

#[test]
fn test_fixture_bank_loads() {
    let (_, bank) = load_fixtures();

    assert_eq!(bank.len(), 18);
    for level in Level::ALL {
        assert_eq!(bank.count_by_level(level), 6, "{level:?}");
    }
    assert!(bank.problems().iter().all(|p| p.canonical_answer().is_some()));
}

/// Correct answers climb from medium to hard and stay there.
#[test]
fn test_controller_all_correct_session() {
    let (config, bank) = load_fixtures();
    let mut controller =
        SessionController::new(Arc::clone(&bank), SessionPolicy::from_config(&config));
    let mut levels = Vec::new();

    for _ in 0..config.session_limit {
        let view = match controller.present_next() {
            PresentOutcome::Presented(view) => view,
            other => panic!("expected a problem, got {other:?}"),
        };
        assert_eq!(view.level, controller.level());
        levels.push(view.level);

        let answer = answer_for(&bank, &view.id);
        let graded = match controller.submit_answer(&answer) {
            SubmitOutcome::Graded(graded) => graded,
            SubmitOutcome::Rejected(rejection) => panic!("rejected: {rejection}"),
        };
        assert!(graded.item.correct);
        controller
            .record_feedback(Feedback::canned(view.id.clone(), true))
            .expect("feedback accepted");
    }

    assert_eq!(
        levels,
        vec![
            Level::Medium,
            Level::Medium,
            Level::Hard,
            Level::Hard,
            Level::Hard,
            Level::Hard,
        ]
    );
    assert!(controller.is_complete());
    assert_eq!(controller.present_next(), PresentOutcome::SessionComplete);

    let metrics = controller.metrics();
    assert_eq!(metrics.attempts, 6);
    assert_eq!(metrics.accuracy, 100);
    assert_eq!(metrics.grade, Grade::Excellent);
    assert_eq!(metrics.streak, 6);
}

/// Recently served problems are not repeated within the window.
#[test]
fn test_controller_respects_recency_window() {
    let (config, bank) = load_fixtures();
    let mut controller =
        SessionController::new(Arc::clone(&bank), SessionPolicy::from_config(&config));
    let mut served: Vec<String> = Vec::new();

    for _ in 0..config.session_limit {
        let PresentOutcome::Presented(view) = controller.present_next() else {
            panic!("expected a problem");
        };
        let recent: Vec<&String> = served.iter().rev().take(config.recency_window).collect();
        assert!(!recent.contains(&&view.id), "{} repeated too soon", view.id);
        served.push(view.id.clone());

        // Alternate right and wrong so the level wanders.
        let answer = if served.len() % 2 == 0 {
            answer_for(&bank, &view.id)
        } else {
            "not an answer".to_string()
        };
        let SubmitOutcome::Graded(graded) = controller.submit_answer(&answer) else {
            panic!("expected grading");
        };
        controller
            .record_feedback(Feedback::canned(view.id, graded.item.correct))
            .expect("feedback accepted");
    }
}

/// Wrong answers drop to easy; the report reflects the struggle.
#[tokio::test]
async fn test_service_struggling_session_and_report() {
    let (service, bank) = fixture_service();
    let started_at = chrono::Utc::now();

    loop {
        match service.next_problem().await.expect("next problem") {
            NextProblem::Presented { .. } => {}
            NextProblem::SessionComplete => break,
            NextProblem::Exhausted { level } => panic!("bank exhausted at {level:?}"),
        }
        let result = service.submit("999/1000").await.expect("answer graded");
        assert!(!result.correct);
        assert_eq!(result.feedback_source, EnrichmentSource::Fallback);
        assert!(!result.feedback.is_empty());
    }

    let snapshot = service.snapshot().await;
    assert!(snapshot.complete);
    assert_eq!(snapshot.answered, 6);
    assert_eq!(snapshot.level, Level::Easy);

    let history = service.history().await;
    assert_eq!(history[0].level_at_time, Level::Medium);
    assert_eq!(history[1].level_at_time, Level::Medium);
    assert!(history[2..].iter().all(|h| h.level_at_time == Level::Easy));

    let plan = service.plan().await;
    assert_eq!(plan.source, EnrichmentSource::Fallback);
    assert_eq!(plan.value.steps.len(), 5);

    let report = ReportGenerator::new(ReportInput {
        session_id: snapshot.session_id.clone(),
        final_level: snapshot.level,
        attempts: Attempt::from_history(&history, &bank),
        started_at: Some(started_at),
        finished_at: chrono::Utc::now(),
        study_plan: Some(plan),
    })
    .generate();

    assert_eq!(report.summary.attempts, 6);
    assert_eq!(report.summary.correct, 0);
    assert_eq!(report.summary.accuracy, 0);
    assert_eq!(report.summary.grade, Grade::Poor);
    assert_eq!(report.timeline.len(), 6);
    assert!(!report.weak_areas.is_empty());
    assert!(report.weak_areas[0].contains("% of errors"));
    assert!(report
        .insights
        .improvements
        .contains(&"Focus on accuracy over speed".to_string()));

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains(&format!("# Quotient Session Report: {}", snapshot.session_id)));
    assert!(markdown.contains("## Study Plan"));

    let json = JsonGenerator::new(&report).generate().expect("json");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value["summary"]["attempts"], 6);
}

/// The hint ladder goes static, generated, then maxed out.
#[tokio::test]
async fn test_service_hint_ladder() {
    let (service, bank) = fixture_service();

    let NextProblem::Presented { problem } = service.next_problem().await.expect("next") else {
        panic!("expected a problem");
    };

    let first = service.hint().await.expect("static hint");
    assert_eq!(first.stage, HintStage::Static);
    assert_eq!(first.hints.len(), 1);
    assert!(first.source.is_none());

    let second = service.hint().await.expect("generated hint");
    assert_eq!(second.stage, HintStage::Dynamic);
    assert_eq!(second.hints.len(), 2);
    assert_eq!(second.source, Some(EnrichmentSource::Fallback));

    let third = service.hint().await.expect("maxed");
    assert!(third.maxed);
    assert_eq!(third.hints, second.hints);

    let result = service
        .submit(&answer_for(&bank, &problem.id))
        .await
        .expect("graded");
    assert!(result.correct);

    let history = service.history().await;
    assert!(history[0].used_hint);
}

/// Reset starts a fresh session with a new id.
#[tokio::test]
async fn test_service_reset_mid_session() {
    let (service, bank) = fixture_service();
    let before = service.snapshot().await;

    let NextProblem::Presented { problem } = service.next_problem().await.expect("next") else {
        panic!("expected a problem");
    };
    service
        .submit(&answer_for(&bank, &problem.id))
        .await
        .expect("graded");

    let after = service.reset().await;
    assert_ne!(after.session_id, before.session_id);
    assert_eq!(after.answered, 0);
    assert_eq!(after.level, Level::Medium);
    assert!(service.history().await.is_empty());
}
