use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    /// Points deducted from the score per issue of this severity.
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Error => 10.0,
            Severity::Warning => 2.0,
            Severity::Info => 0.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation finding. Built once through the `with_*` chain, then never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationIssue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            location: None,
            suggestion: None,
            field: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {location})")?;
        }
        Ok(())
    }
}

/// `clamp(100 - 10*errors - 2*warnings, 0, 100)`; info issues are free.
pub fn score_for(issues: &[ValidationIssue]) -> f64 {
    let penalty: f64 = issues.iter().map(|i| i.severity.penalty()).sum();
    (100.0 - penalty).clamp(0.0, 100.0)
}

/// Aggregated outcome of one validation pass.
///
/// `valid` and `score` are derived from `issues` and recomputed from scratch whenever an issue
/// is added, so `valid == (no Error issues)` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    valid: bool,
    issues: Vec<ValidationIssue>,
    score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
            score: 100.0,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// An always-invalid result carrying a single error.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.add_issue(ValidationIssue::error(message));
        result
    }

    pub fn add_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
        self.recompute();
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        self.issues.extend(issues);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.valid = self.error_count() == 0;
        self.score = score_for(&self.issues);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
    }

    /// Same verdict and issue set, ignoring timestamp and metadata.
    pub fn same_outcome(&self, other: &ValidationResult) -> bool {
        self.valid == other.valid && self.score == other.score && self.issues == other.issues
    }
}
