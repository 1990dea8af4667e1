use crate::protocol::{CompanySpec, QueryPayload, RetrievalSpec};
use thiserror::Error;

pub const DEFAULT_FORMS: [&str; 3] = ["10-K", "10-Q", "20-F"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("at least one ticker or CIK is required")]
    NoCompanies,
    #[error("at least one SEC form type is required")]
    NoForms,
    #[error("at least one fiscal year is required")]
    NoYears,
}

/// Validated retrieval filters for a session. Built once at startup; every
/// run reuses them, so the session controller never has to re-validate.
#[derive(Debug, Clone)]
pub struct Filters {
    companies: Vec<CompanySpec>,
    forms: Vec<String>,
    years: Vec<u16>,
}

impl Filters {
    /// Normalizes raw user input the same way the server does: tickers and
    /// forms are trimmed and upper-cased, blank entries dropped.
    pub fn build(
        tickers: &[String],
        ciks: &[String],
        forms: &[String],
        years: &[u16],
    ) -> Result<Self, QueryError> {
        let mut companies: Vec<CompanySpec> = tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .map(CompanySpec::from_ticker)
            .collect();
        companies.extend(
            ciks.iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .map(CompanySpec::from_cik),
        );

        let forms: Vec<String> = forms
            .iter()
            .map(|f| f.trim().to_uppercase())
            .filter(|f| !f.is_empty())
            .collect();

        if companies.is_empty() {
            return Err(QueryError::NoCompanies);
        }
        if forms.is_empty() {
            return Err(QueryError::NoForms);
        }
        if years.is_empty() {
            return Err(QueryError::NoYears);
        }

        Ok(Self {
            companies,
            forms,
            years: years.to_vec(),
        })
    }

    pub fn payload(&self, query: impl Into<String>) -> QueryPayload {
        QueryPayload {
            query: query.into(),
            companies: self.companies.clone(),
            retrieval: RetrievalSpec {
                forms: self.forms.clone(),
                years: self.years.clone(),
            },
        }
    }

    /// One-line rendering for the filter bar.
    pub fn summary(&self) -> String {
        let companies: Vec<&str> = self.companies.iter().map(|c| c.label()).collect();
        let years: Vec<String> = self.years.iter().map(|y| y.to_string()).collect();
        format!(
            "{}  ·  {}  ·  {}",
            companies.join(", "),
            self.forms.join(", "),
            years.join(", ")
        )
    }
}
