use feed_core::datasets::schema::{Dataset, DatasetKind, RecordEntry, ThreatRecord};
use feed_core::datasets::store;
use feed_core::types::{Issue, Severity, ValidationReport, ValidationStats};
use feed_core::validator::checks;
use feed_core::{paths, report_store};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeMode {
  Check,
  Write,
}

impl OptimizeMode {
  pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
    if args.iter().any(|a| a == "--check") {
      return Ok(Self::Check);
    }
    if args.iter().any(|a| a == "--write") {
      return Ok(Self::Write);
    }
    Err(anyhow::anyhow!("expected `--check` or `--write`"))
  }
}

#[derive(Debug, Clone)]
struct OptimizeConfig {
  excludes: Vec<String>,
  store_report: bool,
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
  pub kind: DatasetKind,
  pub records_before: usize,
  pub records_after: usize,
  pub duplicates_removed: usize,
  pub malformed_hashes_dropped: usize,
  pub bytes_before: u64,
  pub bytes_after: u64,
  pub gzip_bytes_after: u64,
  pub sha256_after: String,
  /// True when the normalized records differ from what is on disk in
  /// any way, including count-preserving changes such as hash
  /// lowercasing or value trimming.
  pub changed: bool,
}

pub fn run(mode: OptimizeMode) -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();
  let cfg = parse_optimize_config(&args);

  tracing_subscriber::fmt()
    .with_ansi(false)
    .with_target(false)
    .init();

  let base = paths::base_dir()?;
  println!("PhishGuard optimizer starting: mode={mode:?}");

  let mut outcomes: Vec<FileOutcome> = Vec::new();
  let mut issues: Vec<Issue> = Vec::new();

  for kind in discover_datasets(&base, &cfg.excludes) {
    let dataset = store::load_dataset(&base, kind)?;
    let (outcome, file_issues) = optimize_dataset(&base, &dataset)?;

    if mode == OptimizeMode::Write && outcome.changed {
      let optimized = optimized_records(&dataset);
      let out = Dataset {
        kind,
        records: optimized,
      };
      store::save_dataset(&base, &out)?;
      tracing::info!(file = kind.file_name(), "dataset rewritten");
    }

    issues.extend(file_issues);
    outcomes.push(outcome);
  }

  if outcomes.is_empty() {
    println!("No dataset files found under {}", paths::data_dir(&base).display());
    return Ok(());
  }

  let mut changed = 0usize;
  for o in &outcomes {
    let ratio = if o.bytes_after > 0 {
      o.gzip_bytes_after as f64 / o.bytes_after as f64
    } else {
      0.0
    };
    println!(
      "{}: {} -> {} record(s), {} duplicate(s), {} malformed hash(es), {} -> {} bytes (gzip ratio {:.2}), sha256={}",
      o.kind.file_name(),
      o.records_before,
      o.records_after,
      o.duplicates_removed,
      o.malformed_hashes_dropped,
      o.bytes_before,
      o.bytes_after,
      ratio,
      o.sha256_after
    );
    if o.changed {
      changed += 1;
    }
  }

  match mode {
    OptimizeMode::Check => {
      if changed == 0 {
        println!("All dataset files are already optimized.");
      } else {
        println!("{changed} file(s) would change; run with --write to apply.");
      }
    }
    OptimizeMode::Write => {
      println!("{changed} file(s) rewritten.");
    }
  }

  if cfg.store_report {
    let stats = aggregate_stats(&outcomes);
    let checked = outcomes
      .iter()
      .map(|o| o.kind.file_name().to_string())
      .collect();
    let report = ValidationReport::new(checked, stats, issues);
    let path = report_store::store_report(&base, &report)?;
    println!("Report stored: {}", path.display());
  }

  Ok(())
}

fn parse_optimize_config(args: &[String]) -> OptimizeConfig {
  let mut excludes = Vec::new();
  let mut store_report = false;
  let mut i = 0;
  while i < args.len() {
    match args[i].as_str() {
      "--exclude" => {
        if let Some(v) = args.get(i + 1) {
          excludes.push(v.clone());
          i += 2;
          continue;
        }
      }
      "--report" => {
        store_report = true;
      }
      _ => {}
    }
    i += 1;
  }
  OptimizeConfig {
    excludes,
    store_report,
  }
}

/// Dataset files present under data/, in the fixed category order.
fn discover_datasets(base: &Path, excludes: &[String]) -> Vec<DatasetKind> {
  let data_dir = paths::data_dir(base);
  let mut present: HashSet<DatasetKind> = HashSet::new();

  for entry in WalkDir::new(&data_dir)
    .max_depth(1)
    .follow_links(false)
    .into_iter()
    .flatten()
  {
    if !entry.file_type().is_file() {
      continue;
    }
    let Some(name) = entry.path().file_name().and_then(|s| s.to_str()) else {
      continue;
    };
    if excludes.iter().any(|ex| ex == name) {
      continue;
    }
    if let Some(kind) = DatasetKind::from_file_name(name) {
      present.insert(kind);
    }
  }

  DatasetKind::ALL
    .into_iter()
    .filter(|k| present.contains(k))
    .collect()
}

fn optimize_dataset(base: &Path, dataset: &Dataset) -> anyhow::Result<(FileOutcome, Vec<Issue>)> {
  let path = paths::dataset_path(base, dataset.kind);
  let bytes_before = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

  let mut issues = Vec::new();
  let mut seen: HashSet<String> = HashSet::new();
  let mut duplicates = 0usize;
  let mut malformed = 0usize;

  for (idx, record) in dataset.records.iter().enumerate() {
    let value = record.value().trim();
    if is_malformed_hash(value) {
      malformed += 1;
      issues.push(Issue {
        check_id: checks::V004.id.to_string(),
        severity: Severity::Warning,
        message: format!("dropped malformed hashed entry ({} chars)", value.trim_start_matches('-').len()),
        location: format!("{}[{idx}]", dataset.kind.file_name()),
      });
      continue;
    }
    if !seen.insert(dedupe_key(value)) {
      duplicates += 1;
    }
  }

  let optimized = optimized_records(dataset);
  let raw = serde_json::to_string_pretty(&optimized)?;
  let bytes_after = raw.len() as u64;
  let gzip_bytes_after = gzip_len(raw.as_bytes())? as u64;
  let sha256_after = sha256_hex(raw.as_bytes());

  // Byte-level comparison so count-preserving normalization (hash
  // lowercasing, trimming) still registers as a change.
  let changed = serde_json::to_string(&optimized)? != serde_json::to_string(&dataset.records)?;

  let outcome = FileOutcome {
    kind: dataset.kind,
    records_before: dataset.len(),
    records_after: optimized.len(),
    duplicates_removed: duplicates,
    malformed_hashes_dropped: malformed,
    bytes_before,
    bytes_after,
    gzip_bytes_after,
    sha256_after,
    changed,
  };

  Ok((outcome, issues))
}

/// Normalized copy of the dataset: values trimmed, hashes lowercased,
/// malformed hashes dropped, duplicates collapsed to their first
/// occurrence. Order is otherwise preserved.
fn optimized_records(dataset: &Dataset) -> Vec<RecordEntry> {
  let mut seen: HashSet<String> = HashSet::new();
  let mut out = Vec::with_capacity(dataset.len());

  for record in &dataset.records {
    let value = normalize_value(record.value());
    if is_malformed_hash(&value) {
      continue;
    }
    if !seen.insert(dedupe_key(&value)) {
      continue;
    }
    out.push(with_value(record, value));
  }

  out
}

fn normalize_value(value: &str) -> String {
  let v = value.trim();
  if checks::is_valid_hash(v) {
    return v.to_ascii_lowercase();
  }
  v.to_string()
}

// Hex of 32+ chars (after stripping a legacy leading dash) is judged
// as an intended digest; everything shorter may be legitimate text.
fn looks_like_hash(value: &str) -> bool {
  let clean = value.trim_start_matches('-');
  clean.len() >= 32 && clean.chars().all(|c| c.is_ascii_hexdigit())
}

/// Hex-looking values that are not a valid 64-char digest.
fn is_malformed_hash(value: &str) -> bool {
  looks_like_hash(value) && value.trim_start_matches('-').len() != 64
}

/// Case and the legacy dash prefix are only insignificant for
/// hash-shaped values; URLs, keywords and sender ids compare verbatim.
fn dedupe_key(value: &str) -> String {
  if looks_like_hash(value) {
    value.trim_start_matches('-').to_ascii_lowercase()
  } else {
    value.to_string()
  }
}

fn with_value(record: &RecordEntry, value: String) -> RecordEntry {
  match record {
    RecordEntry::Plain(_) => RecordEntry::Plain(value),
    RecordEntry::Full(r) => RecordEntry::Full(ThreatRecord {
      value,
      source: r.source.clone(),
      updated_at: r.updated_at,
      match_mode: r.match_mode,
      level: r.level,
    }),
  }
}

fn aggregate_stats(outcomes: &[FileOutcome]) -> ValidationStats {
  let mut stats = ValidationStats::default();
  for o in outcomes {
    stats.total_records += o.records_before as u64;
    stats.validated_records += o.records_after as u64;
    stats.failed_records += o.malformed_hashes_dropped as u64;
    stats.suspicious_records += o.duplicates_removed as u64;
  }
  stats
}

fn gzip_len(bytes: &[u8]) -> anyhow::Result<usize> {
  let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
  encoder.write_all(bytes)?;
  Ok(encoder.finish()?.len())
}

fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use feed_core::datasets::store::parse_dataset;
  use std::fs;

  #[test]
  fn optimized_records_dedupe_and_normalize() {
    let hash_upper = "AB".repeat(32);
    let raw = format!(
      r#"["https://evil.example/x", "https://evil.example/x", "{hash_upper}", "{}"]"#,
      hash_upper.to_ascii_lowercase()
    );
    let dataset = parse_dataset(DatasetKind::PhishingLinks, &raw).unwrap();

    let out = optimized_records(&dataset);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].value(), "https://evil.example/x");
    assert_eq!(out[1].value(), hash_upper.to_ascii_lowercase());
  }

  #[test]
  fn optimized_records_drop_malformed_hashes_only() {
    let short_hash = "ab".repeat(20);
    let raw = format!(r#"["{short_hash}", "deadbeef", "lottery prize"]"#);
    let dataset = parse_dataset(DatasetKind::SuspiciousWords, &raw).unwrap();

    let out = optimized_records(&dataset);
    let values: Vec<&str> = out.iter().map(|r| r.value()).collect();
    assert_eq!(values, vec!["deadbeef", "lottery prize"]);
  }

  #[test]
  fn optimized_records_keep_metadata_of_first_occurrence() {
    let raw = r#"[{"value": "prize", "level": 3}, {"value": "prize", "level": 1}]"#;
    let dataset = parse_dataset(DatasetKind::SuspiciousWords, raw).unwrap();

    let out = optimized_records(&dataset);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].level(), Some(3));
  }

  #[test]
  fn normalization_only_change_is_flagged_for_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    let data = paths::data_dir(base);
    fs::create_dir_all(&data).unwrap();
    let upper = "AB".repeat(32);
    fs::write(data.join("links.json"), format!(r#"["{upper}"]"#)).unwrap();

    let dataset = store::load_dataset(base, DatasetKind::PhishingLinks).unwrap();
    let (outcome, _) = optimize_dataset(base, &dataset).unwrap();

    // Same record count, no duplicates: only the hash case changes.
    assert_eq!(outcome.records_before, outcome.records_after);
    assert_eq!(outcome.duplicates_removed, 0);
    assert!(outcome.changed);
  }

  #[test]
  fn trimming_whitespace_is_flagged_for_rewrite() {
    let dataset =
      parse_dataset(DatasetKind::SuspiciousWords, r#"[" prize "]"#).unwrap();
    let out = optimized_records(&dataset);
    assert_eq!(out[0].value(), "prize");

    let dir = tempfile::tempdir().unwrap();
    let (outcome, _) = optimize_dataset(dir.path(), &dataset).unwrap();
    assert!(outcome.changed);
  }

  #[test]
  fn already_optimized_dataset_is_not_flagged() {
    let dataset =
      parse_dataset(DatasetKind::SuspiciousWords, r#"["prize", "lottery"]"#).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let (outcome, _) = optimize_dataset(dir.path(), &dataset).unwrap();
    assert!(!outcome.changed);
  }

  #[test]
  fn case_distinct_non_hash_values_stay_distinct() {
    let raw = r#"["https://evil.example/ABC", "https://evil.example/abc", "-word", "word"]"#;
    let dataset = parse_dataset(DatasetKind::PhishingLinks, raw).unwrap();

    let out = optimized_records(&dataset);
    let values: Vec<&str> = out.iter().map(|r| r.value()).collect();
    assert_eq!(
      values,
      vec!["https://evil.example/ABC", "https://evil.example/abc", "-word", "word"]
    );

    let dir = tempfile::tempdir().unwrap();
    let (outcome, _) = optimize_dataset(dir.path(), &dataset).unwrap();
    assert_eq!(outcome.duplicates_removed, 0);
  }

  #[test]
  fn discover_skips_excluded_and_unknown_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    let data = paths::data_dir(base);
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("links.json"), "[]").unwrap();
    fs::write(data.join("words.json"), "[]").unwrap();
    fs::write(data.join("notes.txt"), "x").unwrap();

    let kinds = discover_datasets(base, &["words.json".to_string()]);
    assert_eq!(kinds, vec![DatasetKind::PhishingLinks]);
  }

  #[test]
  fn outcome_reports_duplicates_without_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    let data = paths::data_dir(base);
    fs::create_dir_all(&data).unwrap();
    let raw = r#"["a", "a", "b"]"#;
    fs::write(data.join("words.json"), raw).unwrap();

    let dataset = store::load_dataset(base, DatasetKind::SuspiciousWords).unwrap();
    let (outcome, issues) = optimize_dataset(base, &dataset).unwrap();

    assert_eq!(outcome.records_before, 3);
    assert_eq!(outcome.records_after, 2);
    assert_eq!(outcome.duplicates_removed, 1);
    assert!(issues.is_empty());
    assert!(outcome.changed);
    assert_eq!(
      fs::read_to_string(data.join("words.json")).unwrap(),
      raw
    );
  }
}
