use async_trait::async_trait;
use tracing::debug;

use crate::error::LookupError;
use crate::models::{LookupOutcome, Notice, StudentRecord, StudentStatus};

/// The normalized forms of one search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerms {
    /// Trimmed input, compared for exact equality with the student ID.
    pub id: String,
    /// Trimmed and lowercased input, compared with the lowercased stored email.
    pub email: String,
}

impl SearchTerms {
    /// Returns `None` when the input is blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            id: trimmed.to_string(),
            email: trimmed.to_lowercase(),
        })
    }

    pub fn matches(&self, record: &StudentRecord) -> bool {
        record.id == self.id || record.email.to_lowercase() == self.email
    }
}

/// A read-only table of grade records.
#[async_trait]
pub trait GradeSource: Send + Sync {
    /// Rows whose ID equals `terms.id` or whose email equals `terms.email`
    /// case-insensitively, in the order the source returns them.
    async fn find(&self, terms: &SearchTerms) -> Result<Vec<StudentRecord>, LookupError>;
}

pub async fn lookup(
    source: &dyn GradeSource,
    search_term: &str,
) -> Result<LookupOutcome, LookupError> {
    let Some(terms) = SearchTerms::parse(search_term) else {
        return Ok(LookupOutcome::EmptyInput);
    };

    let fetched = source.find(&terms).await?;
    let fetched_count = fetched.len();
    let rows: Vec<StudentRecord> = fetched
        .into_iter()
        .filter(|record| terms.matches(record))
        .collect();
    debug!(fetched = fetched_count, matched = rows.len(), "lookup finished");

    if rows.is_empty() {
        Ok(LookupOutcome::NoMatch)
    } else {
        Ok(LookupOutcome::Found(rows))
    }
}

pub const MISSING_RATE: &str = "-";

pub fn format_completion_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.1}%", rate * 100.0),
        None => MISSING_RATE.to_string(),
    }
}

pub fn notice_for(rows: &[StudentRecord]) -> Option<Notice> {
    let first = rows.first()?;
    match first.status {
        StudentStatus::Promotes => Some(Notice::Promoted {
            name: first.name.clone(),
        }),
        StudentStatus::FinalExam => Some(Notice::FinalExam {
            name: first.name.clone(),
        }),
        StudentStatus::Other(_) => None,
    }
}
