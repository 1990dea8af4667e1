use crate::protocol::{JobEvent, QueryPayload, StateSnapshot};
use crate::session::SessionEvent;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("report request returned status {0}")]
    Status(StatusCode),
}

#[derive(Clone)]
pub struct AgentClient {
    base_url: String,
    http: HttpClient,
}

impl AgentClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            http: HttpClient::new(),
        }
    }

    /// Opens one agent run and feeds classified events to `emit` until the
    /// stream ends. Every failure mode is reported through `emit` as a
    /// [`SessionEvent`]; nothing propagates to the caller.
    pub async fn run<F, Fut>(&self, payload: &QueryPayload, mut emit: F)
    where
        F: FnMut(SessionEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        let response = match self
            .http
            .post(format!("{}/api/agent/run", self.base_url))
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, "agent run connection failed");
                emit(SessionEvent::TransportError).await;
                return;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "agent run rejected");
            emit(SessionEvent::Rejected).await;
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::warn!(%err, "agent stream failed mid-run");
                    emit(SessionEvent::TransportError).await;
                    return;
                }
            };
            let chunk = String::from_utf8_lossy(&chunk);
            if chunk.contains('\r') {
                buffer.push_str(&chunk.replace("\r\n", "\n"));
            } else {
                buffer.push_str(&chunk);
            }

            while let Some(idx) = buffer.find("\n\n") {
                let raw_frame = buffer[..idx].to_string();
                buffer = buffer[idx + 2..].to_string();

                match classify_frame(&raw_frame) {
                    Some(SessionEvent::Completed) => {
                        // Terminal for the run; dropping the stream closes
                        // the connection.
                        emit(SessionEvent::Completed).await;
                        return;
                    }
                    Some(event) => emit(event).await,
                    None => {}
                }
            }
        }

        // The server always ends a run with `done`; a bare EOF is a dropped
        // connection.
        tracing::warn!("agent stream ended before done event");
        emit(SessionEvent::TransportError).await;
    }

    /// One-shot fetch of the persisted report, out-of-band from the stream.
    pub async fn fetch_report(&self, job_id: &str, format: &str) -> Result<String, ReportError> {
        let response = self
            .http
            .get(format!("{}/api/report/{}", self.base_url, job_id))
            .query(&[("format", format)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ReportError::Status(response.status()));
        }

        Ok(response.text().await?)
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

#[derive(Debug, Default)]
struct SseFrame {
    event: Option<String>,
    data: Option<String>,
}

fn parse_frame(raw: &str) -> SseFrame {
    let mut event = None;
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            // Comment line, typically a keep-alive.
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start().to_string());
        }
    }

    let data = if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    };

    SseFrame { event, data }
}

/// Maps one raw SSE frame to a session event. Malformed payloads are logged
/// and dropped; only the transport layer can end a run.
fn classify_frame(raw: &str) -> Option<SessionEvent> {
    let frame = parse_frame(raw);
    match frame.event.as_deref() {
        Some("done") => Some(SessionEvent::Completed),
        Some("job") => {
            let data = frame.data?;
            match serde_json::from_str::<JobEvent>(&data) {
                Ok(JobEvent {
                    job_id: Some(job_id),
                }) if !job_id.is_empty() => Some(SessionEvent::JobAssigned(job_id)),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(%err, "discarding malformed job event");
                    None
                }
            }
        }
        Some(other) => {
            tracing::debug!(event = other, "ignoring unrecognized event type");
            None
        }
        None => {
            let data = frame.data?;
            match serde_json::from_str::<StateSnapshot>(&data) {
                Ok(snapshot) => Some(SessionEvent::Snapshot(snapshot)),
                Err(err) => {
                    tracing::warn!(%err, "discarding malformed state event");
                    None
                }
            }
        }
    }
}
