use serde::{Deserialize, Serialize};

pub const PROMOTES_LABEL: &str = "Promociona";
pub const FINAL_EXAM_LABEL: &str = "Final";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub name: String,
    pub id: String,
    pub email: String,
    /// Fraction of course activities done; `None` when the table has no value.
    pub completion_rate: Option<f64>,
    pub grade: String,
    pub status: StudentStatus,
}

/// Condition of a student at the end of the course. Only two labels carry
/// messaging; everything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StudentStatus {
    Promotes,
    FinalExam,
    Other(String),
}

impl StudentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StudentStatus::Promotes => PROMOTES_LABEL,
            StudentStatus::FinalExam => FINAL_EXAM_LABEL,
            StudentStatus::Other(label) => label,
        }
    }
}

impl From<String> for StudentStatus {
    fn from(label: String) -> Self {
        match label.as_str() {
            PROMOTES_LABEL => StudentStatus::Promotes,
            FINAL_EXAM_LABEL => StudentStatus::FinalExam,
            _ => StudentStatus::Other(label),
        }
    }
}

impl From<StudentStatus> for String {
    fn from(status: StudentStatus) -> Self {
        match status {
            StudentStatus::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// Nothing to search for; no query was issued.
    EmptyInput,
    NoMatch,
    Found(Vec<StudentRecord>),
}

/// Message shown after the table, driven by the first matched row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Promoted { name: String },
    FinalExam { name: String },
}
