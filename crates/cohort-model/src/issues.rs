use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

/// Kind of data problem a stage ran into without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// A persisted source table could not be found.
    SourceMissing,
    /// An identifier could not be translated to the other namespace.
    IdentifierAmbiguity,
    /// Two records claimed the same key with different content.
    DuplicateKey,
    /// Visit dates go backwards as the timepoint increases.
    NonMonotonicDates,
    /// Subjects without enough usable rows for a longitudinal value.
    InsufficientData,
    /// Rows that found no partner in a join.
    UnmatchedRows,
    /// An external imaging tool failed for one subject.
    ToolkitFailure,
    /// A raw header matched its canonical name only weakly.
    LowSimilarity,
    /// A column header or cell could not be interpreted.
    Unparseable,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::SourceMissing => "source_missing",
            IssueCode::IdentifierAmbiguity => "identifier_ambiguity",
            IssueCode::DuplicateKey => "duplicate_key",
            IssueCode::NonMonotonicDates => "non_monotonic_dates",
            IssueCode::InsufficientData => "insufficient_data",
            IssueCode::UnmatchedRows => "unmatched_rows",
            IssueCode::ToolkitFailure => "toolkit_failure",
            IssueCode::LowSimilarity => "low_similarity",
            IssueCode::Unparseable => "unparseable",
        }
    }
}

/// A data-integrity finding attached to one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIssue {
    pub code: IssueCode,
    pub severity: IssueSeverity,
    /// Table (file prefix) the issue was found in.
    pub table: String,
    pub message: String,
    /// Number of rows or subjects affected.
    pub count: Option<u64>,
}

/// Issues accumulated over one or more stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueLog {
    pub issues: Vec<DataIssue>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: DataIssue) {
        self.issues.push(issue);
    }

    pub fn warn(
        &mut self,
        code: IssueCode,
        table: impl Into<String>,
        message: impl Into<String>,
        count: Option<u64>,
    ) {
        self.push(DataIssue {
            code,
            severity: IssueSeverity::Warning,
            table: table.into(),
            message: message.into(),
            count,
        });
    }

    pub fn info(
        &mut self,
        code: IssueCode,
        table: impl Into<String>,
        message: impl Into<String>,
        count: Option<u64>,
    ) {
        self.push(DataIssue {
            code,
            severity: IssueSeverity::Info,
            table: table.into(),
            message: message.into(),
            count,
        });
    }

    pub fn error(&mut self, code: IssueCode, table: impl Into<String>, message: impl Into<String>) {
        self.push(DataIssue {
            code,
            severity: IssueSeverity::Error,
            table: table.into(),
            message: message.into(),
            count: None,
        });
    }

    pub fn extend(&mut self, other: IssueLog) {
        self.issues.extend(other.issues);
    }

    pub fn error_count(&self) -> usize {
        self.count_severity(IssueSeverity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count_severity(IssueSeverity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn with_code(&self, code: IssueCode) -> impl Iterator<Item = &DataIssue> {
        self.issues.iter().filter(move |issue| issue.code == code)
    }

    fn count_severity(&self, severity: IssueSeverity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_severity() {
        let mut log = IssueLog::new();
        log.warn(IssueCode::DuplicateKey, "codetranslator", "codea B1 twice", Some(1));
        log.info(IssueCode::InsufficientData, "pibparams", "1 subject", Some(1));
        log.error(IssueCode::SourceMissing, "cogdata", "no file");
        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.error_count(), 1);
        assert!(log.has_errors());
        assert_eq!(log.with_code(IssueCode::DuplicateKey).count(), 1);
    }

    #[test]
    fn issue_serializes_with_snake_case_code() {
        let issue = DataIssue {
            code: IssueCode::IdentifierAmbiguity,
            severity: IssueSeverity::Warning,
            table: "pibparams".to_string(),
            message: "2 rows".to_string(),
            count: Some(2),
        };
        let json = serde_json::to_string(&issue).expect("serialize issue");
        assert!(json.contains("\"identifier_ambiguity\""));
        assert!(json.contains("\"warning\""));
    }
}
