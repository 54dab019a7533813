use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use super::issue::ValidationResult;
use crate::pipeline::PipelineStep;

/// One entry of the engine's validation history. `step` is `None` for cross-step validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub step: Option<PipelineStep>,
    pub result: ValidationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Html,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "html" => Ok(ReportFormat::Html),
            other => Err(format!("Unsupported format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_errors: usize,
    pub total_warnings: usize,
    pub total_info: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Utc>,
    pub total_validations: usize,
    pub summary: ReportSummary,
    /// Latest result per step.
    pub step_results: BTreeMap<PipelineStep, ValidationResult>,
    pub cross_validation_results: Option<ValidationResult>,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    pub fn from_history(history: &[ValidationRecord]) -> Self {
        let mut summary = ReportSummary::default();
        let mut step_results = BTreeMap::new();
        let mut cross_validation_results = None;
        let mut total_score = 0.0;

        for record in history {
            summary.total_errors += record.result.error_count();
            summary.total_warnings += record.result.warning_count();
            summary.total_info += record.result.info_count();
            total_score += record.result.score();
            match record.step {
                Some(step) => {
                    step_results.insert(step, record.result.clone());
                }
                None => cross_validation_results = Some(record.result.clone()),
            }
        }
        if !history.is_empty() {
            summary.average_score = total_score / history.len() as f64;
        }

        let mut report = Self {
            timestamp: Utc::now(),
            total_validations: history.len(),
            summary,
            step_results,
            cross_validation_results,
            recommendations: Vec::new(),
        };
        report.recommendations = report.recommend();
        report
    }

    fn recommend(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.summary.total_errors > 0 {
            out.push(format!(
                "Fix {} critical errors before proceeding",
                self.summary.total_errors
            ));
        }
        if self.total_validations > 0 && self.summary.average_score < 80.0 {
            out.push("Improve validation score by addressing warnings and errors".to_string());
        }
        for (step, result) in &self.step_results {
            if !result.is_valid() {
                out.push(format!("Review and fix issues in {step} step"));
            }
        }
        if self
            .cross_validation_results
            .as_ref()
            .is_some_and(|r| !r.is_valid())
        {
            out.push("Ensure consistency across all pipeline steps".to_string());
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut rows = String::new();
        for (step, result) in &self.step_results {
            let _ = write!(
                rows,
                "      <tr><td>{step}</td><td>{}</td><td>{:.1}</td><td class=\"error\">{}</td><td class=\"warning\">{}</td></tr>\n",
                if result.is_valid() { "&#10003;" } else { "&#10007;" },
                result.score(),
                result.error_count(),
                result.warning_count(),
            );
        }
        let recommendations: String = self
            .recommendations
            .iter()
            .map(|rec| format!("    <div class=\"recommendation\">{}</div>\n", escape_html(rec)))
            .collect();
        let timestamp = self.timestamp.to_rfc3339();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <title>Validation Report - {timestamp}</title>
  <style>
    body {{ font-family: Arial, sans-serif; margin: 20px; }}
    .summary {{ background: #f0f0f0; padding: 15px; border-radius: 5px; }}
    .error {{ color: #d32f2f; }}
    .warning {{ color: #f57c00; }}
    .info {{ color: #0288d1; }}
    .score {{ font-size: 24px; font-weight: bold; }}
    table {{ border-collapse: collapse; width: 100%; margin-top: 20px; }}
    th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
    .recommendation {{ background: #fff3cd; padding: 10px; margin: 5px 0; border-radius: 3px; }}
  </style>
</head>
<body>
  <h1>Validation Report</h1>
  <p>Generated: {timestamp}</p>
  <div class="summary">
    <h2>Summary</h2>
    <p class="score">Average Score: {score:.1}/100</p>
    <p class="error">Errors: {errors}</p>
    <p class="warning">Warnings: {warnings}</p>
    <p class="info">Info: {info}</p>
  </div>
  <h2>Recommendations</h2>
{recommendations}  <h2>Step Results</h2>
  <table>
    <tr><th>Step</th><th>Valid</th><th>Score</th><th>Errors</th><th>Warnings</th></tr>
{rows}  </table>
</body>
</html>
"#,
            score = self.summary.average_score,
            errors = self.summary.total_errors,
            warnings = self.summary.total_warnings,
            info = self.summary.total_info,
        )
    }

    pub fn export(&self, path: &Path, format: ReportFormat) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = match format {
            ReportFormat::Json => serde_json::to_string_pretty(self)?,
            ReportFormat::Html => self.to_html(),
        };
        fs::write(path, content)?;
        log::info!("Validation report exported to {}", path.display());
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationIssue;
    use tempfile::TempDir;

    fn record(step: Option<PipelineStep>, errors: usize, warnings: usize) -> ValidationRecord {
        let mut result = ValidationResult::new();
        for _ in 0..errors {
            result.add_issue(ValidationIssue::error("e"));
        }
        for _ in 0..warnings {
            result.add_issue(ValidationIssue::warning("w"));
        }
        ValidationRecord { step, result }
    }

    #[test]
    fn empty_history_has_no_recommendations() {
        let report = ValidationReport::from_history(&[]);
        assert_eq!(report.total_validations, 0);
        assert_eq!(report.summary.average_score, 0.0);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn summary_and_recommendations() {
        let history = vec![
            record(Some(PipelineStep::SectionSummary), 0, 1),
            record(Some(PipelineStep::RegisterMapping), 3, 0),
            record(None, 1, 0),
        ];
        let report = ValidationReport::from_history(&history);
        assert_eq!(report.summary.total_errors, 4);
        assert_eq!(report.summary.total_warnings, 1);
        assert!((report.summary.average_score - (98.0 + 70.0 + 90.0) / 3.0).abs() < 1e-9);
        assert_eq!(
            report.recommendations,
            vec![
                "Fix 4 critical errors before proceeding".to_string(),
                "Review and fix issues in register_mapping step".to_string(),
                "Ensure consistency across all pipeline steps".to_string(),
            ]
        );
    }

    #[test]
    fn later_results_replace_earlier_ones_per_step() {
        let history = vec![
            record(Some(PipelineStep::SectionSummary), 2, 0),
            record(Some(PipelineStep::SectionSummary), 0, 0),
        ];
        let report = ValidationReport::from_history(&history);
        assert!(report.step_results[&PipelineStep::SectionSummary].is_valid());
        assert_eq!(report.total_validations, 2);
    }

    #[test]
    fn export_writes_json_and_html() {
        let tmp = TempDir::new().unwrap();
        let report =
            ValidationReport::from_history(&[record(Some(PipelineStep::CodeGeneration), 1, 0)]);

        let json_path = tmp.path().join("reports/report.json");
        report.export(&json_path, ReportFormat::Json).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["summary"]["total_errors"], 1);
        assert!(parsed["step_results"]["code_generation"].is_object());

        let html_path = tmp.path().join("report.html");
        report.export(&html_path, ReportFormat::Html).unwrap();
        let html = std::fs::read_to_string(&html_path).unwrap();
        assert!(html.contains("<td>code_generation</td>"));
        assert!(html.contains("Average Score: 90.0/100"));
    }

    #[test]
    fn report_format_parses_case_insensitively() {
        assert_eq!("HTML".parse::<ReportFormat>(), Ok(ReportFormat::Html));
        assert!("pdf".parse::<ReportFormat>().is_err());
    }
}
