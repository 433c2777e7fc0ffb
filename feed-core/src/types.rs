use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Warning,
  Error,
}

pub type CheckId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
  pub check_id: CheckId,
  pub severity: Severity,
  pub message: String,
  /// Where the issue was found, e.g. `links.json[12]`.
  pub location: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationStats {
  pub total_records: u64,
  pub validated_records: u64,
  pub failed_records: u64,
  pub suspicious_records: u64,
}

impl ValidationStats {
  pub fn merge(&mut self, other: &ValidationStats) {
    self.total_records += other.total_records;
    self.validated_records += other.validated_records;
    self.failed_records += other.failed_records;
    self.suspicious_records += other.suspicious_records;
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
  pub report_id: String,
  pub created_at_unix_ms: u64,
  pub datasets_checked: Vec<String>,
  pub stats: ValidationStats,
  pub issues: Vec<Issue>,
}

impl ValidationReport {
  pub fn new(datasets_checked: Vec<String>, stats: ValidationStats, issues: Vec<Issue>) -> Self {
    Self {
      report_id: uuid::Uuid::new_v4().to_string(),
      created_at_unix_ms: now_unix_ms(),
      datasets_checked,
      stats,
      issues,
    }
  }

  pub fn error_count(&self) -> usize {
    self
      .issues
      .iter()
      .filter(|i| i.severity == Severity::Error)
      .count()
  }

  pub fn warning_count(&self) -> usize {
    self
      .issues
      .iter()
      .filter(|i| i.severity == Severity::Warning)
      .count()
  }

  pub fn passed(&self) -> bool {
    self.error_count() == 0
  }

  /// Strict mode treats warnings as failures as well.
  pub fn passed_strict(&self) -> bool {
    self.issues.is_empty()
  }
}

pub fn now_unix_ms() -> u64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

pub fn now_unix_s() -> u64 {
  now_unix_ms() / 1000
}
