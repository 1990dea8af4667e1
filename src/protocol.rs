use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPayload {
    pub query: String,
    pub companies: Vec<CompanySpec>,
    pub retrieval: RetrievalSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cik: Option<String>,
}

impl CompanySpec {
    pub fn from_ticker(ticker: impl Into<String>) -> Self {
        Self {
            ticker: Some(ticker.into()),
            cik: None,
        }
    }

    pub fn from_cik(cik: impl Into<String>) -> Self {
        Self {
            ticker: None,
            cik: Some(cik.into()),
        }
    }

    pub fn label(&self) -> &str {
        self.ticker
            .as_deref()
            .or(self.cik.as_deref())
            .unwrap_or("?")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSpec {
    pub forms: Vec<String>,
    pub years: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// A source reference surfaced by the agent while it works, e.g. a SEC
/// filing section or a market-data lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

/// Partial state carried by an unnamed SSE event. The server streams its
/// whole agent state; only the keys the client renders are modeled here and
/// everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateSnapshot {
    pub messages: Option<Vec<ChatTurn>>,
    pub citations: Option<Vec<SourceRef>>,
    pub markdown: Option<String>,
}

/// Payload of an `event: job` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEvent {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_payload_serializes_to_wire_shape() {
        let payload = QueryPayload {
            query: "compare revenue growth".to_string(),
            companies: vec![
                CompanySpec::from_ticker("AAPL"),
                CompanySpec::from_cik("0000320193"),
            ],
            retrieval: RetrievalSpec {
                forms: vec!["10-K".to_string(), "10-Q".to_string()],
                years: vec![2023, 2024],
            },
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "query": "compare revenue growth",
                "companies": [
                    {"ticker": "AAPL"},
                    {"cik": "0000320193"},
                ],
                "retrieval": {
                    "forms": ["10-K", "10-Q"],
                    "years": [2023, 2024],
                },
            })
        );
    }

    #[test]
    fn state_snapshot_ignores_unknown_keys() {
        let raw = json!({
            "job_id": "j-1",
            "extracts": [],
            "market": {},
            "messages": [{"role": "status", "content": "searching"}],
            "markdown": "# Draft",
        });

        let snapshot: StateSnapshot = serde_json::from_value(raw).unwrap();
        let messages = snapshot.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "status");
        assert_eq!(snapshot.markdown.as_deref(), Some("# Draft"));
        assert!(snapshot.citations.is_none());
    }

    #[test]
    fn job_event_reads_camel_case_id() {
        let event: JobEvent = serde_json::from_str(r#"{"jobId": "abc123"}"#).unwrap();
        assert_eq!(event.job_id.as_deref(), Some("abc123"));

        let empty: JobEvent = serde_json::from_str("{}").unwrap();
        assert!(empty.job_id.is_none());
    }

    #[test]
    fn source_ref_meta_defaults_to_empty() {
        let source: SourceRef = serde_json::from_value(json!({
            "kind": "sec",
            "title": "AAPL 10-K",
            "url": "https://www.sec.gov/x",
        }))
        .unwrap();
        assert!(source.meta.is_empty());
    }
}
