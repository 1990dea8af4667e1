use crate::protocol::{ChatTurn, SourceRef, StateSnapshot};

pub const ERR_RUN_START: &str = "The agent could not be started.";
pub const ERR_RUN_STREAM: &str = "An error occurred while the agent was running.";
pub const ERR_REPORT_FETCH: &str = "The report could not be downloaded.";

/// Everything one agent run folds down to. Owned by the UI loop, mutated only
/// through [`apply`], reset through [`SessionState::start`].
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub messages: Vec<ChatTurn>,
    pub citations: Vec<SourceRef>,
    pub report: String,
    pub job_id: Option<String>,
    pub is_running: bool,
    pub error: Option<String>,
}

impl SessionState {
    /// Baseline for a fresh run: everything from the previous run is
    /// discarded before the stream opens.
    pub fn start() -> Self {
        Self {
            is_running: true,
            ..Self::default()
        }
    }

    /// Text for the status line. A sticky error outranks the lifecycle flag.
    pub fn status_line(&self) -> &str {
        if let Some(error) = &self.error {
            error
        } else if self.is_running {
            "Generating report..."
        } else {
            "Enter one or more tickers to begin."
        }
    }
}

/// Closed set of things the transport can tell the session. The stream layer
/// classifies raw SSE frames into these; the reducer below is the only place
/// session state changes.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The server refused to open the stream (non-success status).
    Rejected,
    /// An `event: job` frame carried a correlation id.
    JobAssigned(String),
    /// An unnamed frame carried a partial state replacement.
    Snapshot(StateSnapshot),
    /// An `event: done` frame ended the run.
    Completed,
    /// The connection failed mid-stream, or ended before `done`.
    TransportError,
}

/// Folds one event into the session. Snapshot fields replace wholesale when
/// present; fields an event omits are left alone. The job id is set by the
/// first `job` event and never overwritten within a run.
pub fn apply(state: &mut SessionState, event: SessionEvent) {
    match event {
        SessionEvent::Rejected => {
            state.error = Some(ERR_RUN_START.to_string());
            state.is_running = false;
        }
        SessionEvent::JobAssigned(job_id) => {
            if state.job_id.is_none() {
                state.job_id = Some(job_id);
            }
        }
        SessionEvent::Snapshot(snapshot) => {
            if let Some(messages) = snapshot.messages {
                state.messages = messages;
            }
            if let Some(citations) = snapshot.citations {
                state.citations = citations;
            }
            // An empty markdown draft means "nothing yet", not "clear it".
            if let Some(markdown) = snapshot.markdown {
                if !markdown.is_empty() {
                    state.report = markdown;
                }
            }
        }
        SessionEvent::Completed => {
            state.is_running = false;
        }
        SessionEvent::TransportError => {
            state.error = Some(ERR_RUN_STREAM.to_string());
            state.is_running = false;
        }
    }
}
