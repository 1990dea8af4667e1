use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::client::{AgentClient, ReportError};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] ReportError),
    #[error("failed to write report file: {0}")]
    Write(#[from] io::Error),
}

pub fn report_filename(job_id: &str) -> String {
    format!("report-{}.md", job_id)
}

/// Fetches the persisted markdown report for a finished run and writes it
/// under `dir`. A run that never produced a job id has nothing to fetch;
/// that case returns `Ok(None)` without issuing any request.
pub async fn download(
    client: &AgentClient,
    job_id: Option<&str>,
    dir: &Path,
) -> Result<Option<PathBuf>, DownloadError> {
    let Some(job_id) = job_id else {
        return Ok(None);
    };

    let text = client.fetch_report(job_id, "markdown").await?;
    let path = dir.join(report_filename(job_id));
    tokio::fs::write(&path, text).await?;
    tracing::info!(path = %path.display(), "report saved");
    Ok(Some(path))
}
