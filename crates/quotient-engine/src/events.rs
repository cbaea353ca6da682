//! WebSocket event types and broadcasting for live session observation.
//!
//! Events are broadcast to every connected client as the session moves.
//! All events serialize as `{"event": <name>, "payload": {...}}`.
//!
//! # Event Types
//!
//! - `connected` - sent to a new client with the current snapshot
//! - `problem_presented` - a problem became active
//! - `answer_graded` - an answer was graded and feedback produced
//! - `level_changed` - the difficulty moved
//! - `hint_revealed` - a hint was shown
//! - `session_complete` - the session limit was reached
//! - `session_reset` - a new session started
//!
//! # Example
//!
//! ```no_run
//! use quotient_engine::events::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::session_reset("abc"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::enrichment::EnrichmentSource;
use crate::metrics::Metrics;
use crate::problem::{Level, ProblemView};
use crate::service::SessionService;
use crate::session::{HintStage, SessionSnapshot};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as the client finds it.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `problem_presented` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemPresentedPayload {
    /// The new active problem.
    pub problem: ProblemView,
    /// 1-based position in the session.
    pub number: usize,
}

/// Payload for the `answer_graded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerGradedPayload {
    /// Problem answered.
    pub problem_id: String,
    /// Grading result.
    pub correct: bool,
    /// Time taken.
    pub time_ms: u64,
    /// Feedback text.
    pub feedback: String,
    /// Where the feedback came from.
    pub source: EnrichmentSource,
    /// Answers recorded so far.
    pub answered: usize,
}

/// Payload for the `level_changed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChangedPayload {
    /// Previous level.
    pub from: Level,
    /// New level.
    pub to: Level,
}

/// Payload for the `hint_revealed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRevealedPayload {
    /// Problem the hint is for.
    pub problem_id: String,
    /// Ladder stage reached.
    pub stage: HintStage,
    /// Hint text.
    pub text: String,
    /// Source of a generated hint; absent for static hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EnrichmentSource>,
}

/// Payload for the `session_complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompletePayload {
    /// Finished session.
    pub session_id: String,
    /// Final metrics.
    pub metrics: Metrics,
}

/// Payload for the `session_reset` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResetPayload {
    /// The new session.
    pub session_id: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Session events pushed to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// A problem became active.
    ProblemPresented(ProblemPresentedPayload),
    /// An answer was graded.
    AnswerGraded(AnswerGradedPayload),
    /// The difficulty moved.
    LevelChanged(LevelChangedPayload),
    /// A hint was shown.
    HintRevealed(HintRevealedPayload),
    /// The session limit was reached.
    SessionComplete(SessionCompletePayload),
    /// A new session started.
    SessionReset(SessionResetPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(snapshot: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { snapshot })
    }

    /// Creates a `ProblemPresented` event.
    #[must_use]
    pub const fn problem_presented(problem: ProblemView, number: usize) -> Self {
        Self::ProblemPresented(ProblemPresentedPayload { problem, number })
    }

    /// Creates a `LevelChanged` event.
    #[must_use]
    pub const fn level_changed(from: Level, to: Level) -> Self {
        Self::LevelChanged(LevelChangedPayload { from, to })
    }

    /// Creates a `SessionComplete` event.
    #[must_use]
    pub fn session_complete(session_id: impl Into<String>, metrics: Metrics) -> Self {
        Self::SessionComplete(SessionCompletePayload {
            session_id: session_id.into(),
            metrics,
        })
    }

    /// Creates a `SessionReset` event.
    #[must_use]
    pub fn session_reset(session_id: impl Into<String>) -> Self {
        Self::SessionReset(SessionResetPayload {
            session_id: session_id.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::ProblemPresented(_) => "problem_presented",
            Self::AnswerGraded(_) => "answer_graded",
            Self::LevelChanged(_) => "level_changed",
            Self::HintRevealed(_) => "hint_revealed",
            Self::SessionComplete(_) => "session_complete",
            Self::SessionReset(_) => "session_reset",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all connected WebSocket clients.
///
/// Events are not kept for clients that connect later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event. Returns how many subscribers will receive it.
    pub fn send(&self, event: SessionEvent) -> usize {
        // send() only fails when nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(service): State<SessionService>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

/// Handles a single WebSocket connection.
///
/// Sends `connected` with the current snapshot, then forwards every
/// broadcast event. Pings every 30 seconds and closes after 3 missed pongs.
async fn handle_socket(socket: WebSocket, service: SessionService) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing falls between them.
    let mut event_receiver = service.broadcaster().subscribe();
    let connected = SessionEvent::connected(service.snapshot().await);
    let connected_json = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }
    info!("WebSocket client connected, sent snapshot");

    let mut heartbeat_interval = interval(HEARTBEAT);
    heartbeat_interval.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring client message");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
