//! Quotient CLI
//!
//! Serves the practice API or runs an interactive practice session in the
//! terminal.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use quotient_engine::{
    create_router, Config, EventBroadcaster, LlmClient, NextProblem, OfflineModel, ProblemBank,
    ProblemView, Rejection, SessionController, SessionPolicy, SessionService, Tutor,
};
use quotient_report::{json::JsonGenerator, Attempt, MarkdownGenerator, ReportGenerator, ReportInput};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Quotient - adaptive fraction practice
///
/// Presents fraction problems one at a time, adapting the difficulty to how
/// the learner is doing, with hints, feedback and a study plan at the end.
#[derive(Parser, Debug)]
#[command(name = "quotient")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: quotient.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API and WebSocket event stream
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Problem bank file
        #[arg(short, long, value_name = "FILE")]
        bank: Option<String>,
    },
    /// Practice interactively in the terminal
    Practice {
        /// Problem bank file
        #[arg(short, long, value_name = "FILE")]
        bank: Option<String>,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Quotient starting");
    tracing::debug!(config = ?args.config, "Config file");

    let result = match args.command {
        Command::Serve { port, bank } => run_serve(args.config.as_deref(), port, bank).await,
        Command::Practice { bank, output_dir } => {
            run_practice(args.config.as_deref(), bank, output_dir).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

// ============================================================================
// Serve
// ============================================================================

async fn run_serve(config_path: Option<&str>, port: u16, bank: Option<String>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(bank) = bank {
        config.problem_bank = bank;
    }
    config.validate()?;
    print_config(&config);

    let service = build_service(&config)?;
    let router = create_router(service);

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("WebSocket events on ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}

// ============================================================================
// Practice
// ============================================================================

async fn run_practice(
    config_path: Option<&str>,
    bank: Option<String>,
    output_dir: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(bank) = bank {
        config.problem_bank = bank;
    }
    if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
    }
    config.validate()?;
    print_config(&config);

    let service = build_service(&config)?;
    let started_at = Utc::now();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!();
    println!("Type your answer, 'hint' for a hint, or 'quit' to stop.");

    'session: loop {
        let problem = match service.next_problem().await {
            Ok(NextProblem::Presented { problem }) => problem,
            Ok(NextProblem::Exhausted { level }) => {
                println!();
                println!("You've seen every {level} problem recently. Ending the session.");
                break;
            }
            Ok(NextProblem::SessionComplete) => break,
            Err(rejection) => {
                tracing::warn!(%rejection, "Could not present a problem");
                break;
            }
        };

        let number = service.snapshot().await.answered + 1;
        print_problem(number, &problem);

        loop {
            let Some(line) = prompt(&mut input).await? else {
                break 'session;
            };
            match line.trim().to_lowercase().as_str() {
                "quit" | "exit" => break 'session,
                "hint" => match service.hint().await {
                    Ok(result) if result.maxed => println!("  No more hints for this problem."),
                    Ok(result) => {
                        if let Some(text) = result.hints.last() {
                            println!("  Hint: {text}");
                        }
                    }
                    Err(rejection) => println!("  {rejection}"),
                },
                _ => match service.submit(&resolve_choice(&problem, &line)).await {
                    Ok(result) => {
                        let verdict = if result.correct { "Correct!" } else { "Incorrect." };
                        println!("  {verdict} {}", result.feedback);
                        if result.level_changed {
                            println!("  Difficulty is now {}.", result.level);
                        }
                        break;
                    }
                    Err(Rejection::EmptyAnswer) => println!("  Please enter an answer."),
                    Err(rejection) => {
                        tracing::warn!(%rejection, "Answer rejected");
                        break 'session;
                    }
                },
            }
        }
    }

    finish_practice(&service, &config, started_at).await
}

async fn finish_practice(
    service: &SessionService,
    config: &Config,
    started_at: chrono::DateTime<Utc>,
) -> anyhow::Result<()> {
    let metrics = service.metrics().await;
    println!();
    println!("=== Session Summary ===");
    println!("Problems: {}", metrics.attempts);
    println!("Accuracy: {}% (grade: {})", metrics.accuracy, metrics.grade);
    println!("Average time: {:.1}s", metrics.precise.avg_time_ms / 1000.0);
    println!("Speed score: {}/100", metrics.speed_score);
    println!("Streak: {}", metrics.streak);

    println!();
    println!("Preparing your study plan...");
    let plan = service.plan().await;

    let snapshot = service.snapshot().await;
    let history = service.history().await;
    let bank = service.bank().await;
    let input = ReportInput {
        session_id: snapshot.session_id,
        final_level: snapshot.level,
        attempts: Attempt::from_history(&history, &bank),
        started_at: Some(started_at),
        finished_at: Utc::now(),
        study_plan: Some(plan),
    };
    let report = ReportGenerator::new(input).generate();

    generate_reports(&report, Path::new(&config.output_dir))
}

/// Prompts and reads one line. `None` on end of input.
async fn prompt(input: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Option<String>> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}

/// Maps a choice number to its text for multiple-choice problems.
fn resolve_choice(problem: &ProblemView, line: &str) -> String {
    let trimmed = line.trim();
    problem
        .choices
        .as_ref()
        .and_then(|choices| {
            trimmed
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| choices.get(i))
        })
        .map_or_else(|| trimmed.to_string(), Clone::clone)
}

// ============================================================================
// Setup helpers
// ============================================================================

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the bank and wires the controller, tutor and broadcaster together.
fn build_service(config: &Config) -> anyhow::Result<SessionService> {
    tracing::info!(bank = %config.problem_bank, "Loading problem bank");
    let bank = ProblemBank::load(&config.problem_bank).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Problem bank loaded: {} problems", bank.len());

    let controller = SessionController::new(Arc::new(bank), SessionPolicy::from_config(config));
    Ok(SessionService::new(
        controller,
        build_tutor(config),
        EventBroadcaster::default(),
    ))
}

/// Uses the configured model, or the offline model when no key is available.
fn build_tutor(config: &Config) -> Tutor {
    match LlmClient::from_env(&config.llm) {
        Ok(client) => Tutor::new(Arc::new(client), config.enrichment),
        Err(e) => {
            tracing::warn!(error = %e, "Language model unavailable, using offline fallbacks");
            Tutor::new(Arc::new(OfflineModel), config.enrichment)
        }
    }
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Problem bank: {}", config.problem_bank);
    println!("  Session limit: {}", config.session_limit);
    println!("  Recency window: {}", config.recency_window);
    println!("  Output directory: {}", config.output_dir);
    println!("  LLM provider: {}", config.llm.provider);
}

fn print_problem(number: usize, problem: &ProblemView) {
    println!();
    println!("Problem {number} [{}]", problem.level);
    println!("  {}", problem.stem);
    if let Some(choices) = &problem.choices {
        for (index, choice) in choices.iter().enumerate() {
            println!("    {}. {choice}", index + 1);
        }
    }
}

/// Writes the Markdown and JSON reports into `output_dir`.
fn generate_reports(report: &quotient_report::Report, output_dir: &Path) -> anyhow::Result<()> {
    println!();
    println!("Generating reports...");

    std::fs::create_dir_all(output_dir)?;

    let markdown = MarkdownGenerator::new(report).generate();
    let md_path: PathBuf = output_dir.join("quotient-report.md");
    std::fs::write(&md_path, markdown)?;
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join("quotient-report.json");
    JsonGenerator::new(report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());

    println!();
    println!("Weak areas:");
    for area in &report.weak_areas {
        println!("  - {area}");
    }

    Ok(())
}
