use crate::config::Config;
use crate::datasets::schema::{Dataset, DatasetKind};
use crate::datasets::store;
use crate::paths;
use crate::types::{now_unix_s, Issue, Severity, ValidationReport, ValidationStats};
use crate::validator::checks::{self, CheckMeta};
use std::collections::HashSet;
use std::path::Path;

pub struct DatasetOutcome {
  pub issues: Vec<Issue>,
  pub stats: ValidationStats,
}

pub struct Engine;

impl Engine {
  pub fn new() -> Self {
    Self
  }

  /// Validate every dataset plus version.json and apply the removal
  /// gate against the last publish snapshot.
  pub fn validate_all(&self, cfg: &Config, base: &Path) -> anyhow::Result<ValidationReport> {
    let mut issues = Vec::new();
    let mut stats = ValidationStats::default();
    let mut checked = Vec::new();

    for kind in DatasetKind::ALL {
      let file = kind.file_name();
      match store::try_load_dataset(base, kind) {
        Ok(Some(dataset)) => {
          checked.push(file.to_string());
          let outcome = self.validate_dataset(cfg, &dataset);
          stats.merge(&outcome.stats);
          issues.extend(outcome.issues);

          if !cfg.validation.allow_removals {
            issues.extend(removal_issues(base, &dataset)?);
          }
        }
        Ok(None) => {
          issues.push(make_issue(
            checks::V013,
            file.to_string(),
            format!("{file} not found"),
          ));
        }
        Err(e) => {
          let mut issue = make_issue(checks::V013, file.to_string(), format!("{e:#}"));
          issue.severity = Severity::Error;
          issues.push(issue);
        }
      }
    }

    issues.extend(version_issues(base));

    Ok(ValidationReport::new(checked, stats, issues))
  }

  pub fn validate_dataset(&self, cfg: &Config, dataset: &Dataset) -> DatasetOutcome {
    let mut issues = Vec::new();
    let mut stats = ValidationStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let file = dataset.kind.file_name();
    let now = now_unix_s();

    if dataset.len() as u64 > cfg.validation.max_records_per_dataset {
      let mut issue = make_issue(
        checks::V009,
        file.to_string(),
        format!(
          "dataset has {} records; configured maximum is {}",
          dataset.len(),
          cfg.validation.max_records_per_dataset
        ),
      );
      issue.severity = Severity::Error;
      issues.push(issue);
    }

    for (i, record) in dataset.records.iter().enumerate() {
      stats.total_records += 1;
      let location = format!("{file}[{i}]");
      let mut rec_issues = Vec::new();

      let value = record.value().trim();
      check_value(dataset.kind, value, &location, &mut rec_issues);

      let dedupe_key = dedupe_key(value);
      if !value.is_empty() && !seen.insert(dedupe_key) {
        rec_issues.push(make_issue(
          checks::V002,
          location.clone(),
          format!("duplicate value: {value}"),
        ));
      }

      if let Some(m) = record.match_mode() {
        if m > 2 {
          rec_issues.push(make_issue(
            checks::V009,
            location.clone(),
            format!("unusual match value: {m}"),
          ));
        }
      }

      if let Some(ts) = record.updated_at() {
        if ts > now {
          rec_issues.push(make_issue(
            checks::V012,
            location.clone(),
            format!("updated_at {ts} is in the future"),
          ));
        }
      }

      let failed = rec_issues.iter().any(|i| i.severity == Severity::Error);
      let suspicious = rec_issues.iter().any(|i| i.severity == Severity::Warning);
      if failed {
        stats.failed_records += 1;
      } else {
        stats.validated_records += 1;
      }
      if suspicious {
        stats.suspicious_records += 1;
      }

      issues.extend(rec_issues);
    }

    DatasetOutcome { issues, stats }
  }
}

fn check_value(kind: DatasetKind, value: &str, location: &str, out: &mut Vec<Issue>) {
  if value.is_empty() {
    out.push(make_issue(
      checks::V003,
      location.to_string(),
      "value is empty".to_string(),
    ));
    return;
  }

  // Hashed entries are accepted in any dataset; the apps consume
  // pre-hashed values for the sensitive categories.
  if looks_like_hash(value) {
    if !checks::is_valid_hash(value) {
      out.push(make_issue(
        checks::V004,
        location.to_string(),
        format!("hash must be 64 hex chars, got {} chars", value.trim_start_matches('-').len()),
      ));
    }
    return;
  }

  match kind {
    DatasetKind::PhishingLinks => {
      if !checks::is_valid_url(value) {
        out.push(make_issue(
          checks::V001,
          location.to_string(),
          format!("invalid URL: {value}"),
        ));
      } else if checks::is_suspicious_url(value) {
        out.push(make_issue(
          checks::V005,
          location.to_string(),
          format!("suspicious URL pattern: {value}"),
        ));
      }
    }
    DatasetKind::SmsSenders => {
      if !checks::is_valid_sms_sender(value) {
        out.push(make_issue(
          checks::V007,
          location.to_string(),
          format!("invalid SMS sender: {value}"),
        ));
      }
    }
    DatasetKind::SmsPatterns | DatasetKind::SuspiciousWords => {
      if checks::contains_script_content(value) {
        out.push(make_issue(
          checks::V006,
          location.to_string(),
          format!("script-injection content: {}", truncate(value, 50)),
        ));
      }
    }
    DatasetKind::SuspiciousApps => {
      if !checks::is_valid_package_id(value) {
        out.push(make_issue(
          checks::V008,
          location.to_string(),
          format!("invalid package identifier: {value}"),
        ));
      }
    }
  }
}

// Long hex-only values were meant to be hashes; anything hex of 32+
// chars is judged against the hash rules instead of the per-kind ones.
fn looks_like_hash(value: &str) -> bool {
  let clean = value.trim_start_matches('-');
  clean.len() >= 32 && clean.chars().all(|c| c.is_ascii_hexdigit())
}

fn dedupe_key(value: &str) -> String {
  if looks_like_hash(value) {
    value.trim_start_matches('-').to_ascii_lowercase()
  } else {
    value.to_string()
  }
}

fn removal_issues(base: &Path, dataset: &Dataset) -> anyhow::Result<Vec<Issue>> {
  let Some(snapshot) = store::load_snapshot(base, dataset.kind)? else {
    return Ok(Vec::new());
  };

  let current: HashSet<&str> = dataset.values().map(str::trim).collect();
  let file = dataset.kind.file_name();

  let mut out = Vec::new();
  for published in &snapshot {
    if !current.contains(published.trim()) {
      out.push(make_issue(
        checks::V011,
        file.to_string(),
        format!("published value removed without review: {published}"),
      ));
    }
  }
  Ok(out)
}

fn version_issues(base: &Path) -> Vec<Issue> {
  let path = paths::version_path(base);
  let location = "version.json".to_string();

  if !path.exists() {
    return vec![make_issue(
      checks::V013,
      location,
      "version.json not found".to_string(),
    )];
  }

  let info = match store::load_version(base) {
    Ok(v) => v,
    Err(e) => {
      let mut issue = make_issue(checks::V010, location, format!("{e:#}"));
      issue.severity = Severity::Error;
      return vec![issue];
    }
  };

  let mut out = Vec::new();
  if !checks::is_valid_semver(&info.version) {
    out.push(make_issue(
      checks::V010,
      location.clone(),
      format!("invalid version format: {}", info.version),
    ));
  }
  if info.last_updated.trim().is_empty() {
    out.push(make_issue(
      checks::V010,
      location,
      "last_updated is empty".to_string(),
    ));
  }
  out
}

fn make_issue(meta: CheckMeta, location: String, message: String) -> Issue {
  Issue {
    check_id: meta.id.to_string(),
    severity: meta.default_severity,
    message,
    location,
  }
}

fn truncate(s: &str, max_chars: usize) -> String {
  if s.chars().count() <= max_chars {
    return s.to_string();
  }
  let prefix: String = s.chars().take(max_chars).collect();
  format!("{prefix}...")
}
