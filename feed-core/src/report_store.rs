use crate::paths;
use crate::runtime;
use crate::types::ValidationReport;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

pub fn store_report(base: &Path, report: &ValidationReport) -> anyhow::Result<PathBuf> {
  let dir = paths::reports_dir(base);
  let file_path = dir.join(format!("{}.toml", report.report_id));

  if runtime::is_dry_run() {
    tracing::warn!(
      report_id = %report.report_id,
      errors = report.error_count(),
      warnings = report.warning_count(),
      "DRY-RUN: would store validation report"
    );
    return Ok(file_path);
  }

  fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

  let raw = toml::to_string_pretty(report)?;
  crate::datasets::store::atomic_write(&file_path, raw.as_bytes())?;
  Ok(file_path)
}

#[derive(Debug, Clone)]
pub struct ReportSummary {
  pub report_id: String,
  pub created_at_unix_ms: u64,
  pub errors: usize,
  pub warnings: usize,
  pub passed: bool,
}

pub fn list_recent(base: &Path, limit: usize) -> anyhow::Result<Vec<ReportSummary>> {
  let dir = paths::reports_dir(base);
  if !dir.exists() {
    return Ok(Vec::new());
  }

  let mut entries: Vec<_> = fs::read_dir(&dir)?
    .flatten()
    .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("toml"))
    .collect();

  entries.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
  entries.reverse();

  let mut out = Vec::new();
  for e in entries.into_iter().take(limit) {
    let raw = match fs::read_to_string(e.path()) {
      Ok(r) => r,
      Err(_) => continue,
    };
    let report: ValidationReport = match toml::from_str(&raw) {
      Ok(r) => r,
      Err(_) => continue,
    };
    out.push(ReportSummary {
      report_id: report.report_id.clone(),
      created_at_unix_ms: report.created_at_unix_ms,
      errors: report.error_count(),
      warnings: report.warning_count(),
      passed: report.passed(),
    });
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Issue, Severity, ValidationStats};

  #[test]
  fn store_and_list_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();

    let report = ValidationReport::new(
      vec!["links.json".to_string()],
      ValidationStats::default(),
      vec![Issue {
        check_id: "V001".to_string(),
        severity: Severity::Error,
        message: "invalid URL: x".to_string(),
        location: "links.json[0]".to_string(),
      }],
    );

    store_report(base, &report).unwrap();
    let listed = list_recent(base, 10).unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].report_id, report.report_id);
    assert_eq!(listed[0].errors, 1);
    assert!(!listed[0].passed);
  }

  #[test]
  fn list_is_empty_without_reports_dir() {
    let dir = tempfile::tempdir().unwrap();
    assert!(list_recent(dir.path(), 5).unwrap().is_empty());
  }
}
