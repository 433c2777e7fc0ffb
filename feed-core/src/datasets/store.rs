use crate::datasets::schema::{Dataset, DatasetKind, RecordEntry, VersionInfo};
use crate::paths;
use crate::runtime;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

pub fn parse_dataset(kind: DatasetKind, raw: &str) -> anyhow::Result<Dataset> {
  let records: Vec<RecordEntry> =
    serde_json::from_str(raw).with_context(|| format!("parse {}", kind.file_name()))?;
  Ok(Dataset { kind, records })
}

pub fn load_dataset(base: &Path, kind: DatasetKind) -> anyhow::Result<Dataset> {
  let path = paths::dataset_path(base, kind);
  let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
  parse_dataset(kind, &raw)
}

/// Missing files are not an error here; the validator reports them as
/// warnings and the publisher treats them as empty.
pub fn try_load_dataset(base: &Path, kind: DatasetKind) -> anyhow::Result<Option<Dataset>> {
  let path = paths::dataset_path(base, kind);
  if !path.exists() {
    return Ok(None);
  }
  load_dataset(base, kind).map(Some)
}

pub fn save_dataset(base: &Path, dataset: &Dataset) -> anyhow::Result<PathBuf> {
  let path = paths::dataset_path(base, dataset.kind);

  if runtime::is_dry_run() {
    tracing::warn!(
      file = dataset.kind.file_name(),
      records = dataset.len(),
      "DRY-RUN: would rewrite dataset file"
    );
    return Ok(path);
  }

  let raw = serde_json::to_string_pretty(&dataset.records)?;
  atomic_write(&path, raw.as_bytes())?;
  Ok(path)
}

pub fn load_version(base: &Path) -> anyhow::Result<VersionInfo> {
  let path = paths::version_path(base);
  let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
  serde_json::from_str(&raw).context("parse version.json")
}

/// Snapshot of published values, used to gate removals: anything that
/// was published but is gone from the working dataset needs review.
pub fn load_snapshot(base: &Path, kind: DatasetKind) -> anyhow::Result<Option<Vec<String>>> {
  let path = paths::snapshot_path(base, kind);
  if !path.exists() {
    return Ok(None);
  }
  let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
  let values: Vec<String> =
    serde_json::from_str(&raw).with_context(|| format!("parse snapshot {}", path.display()))?;
  Ok(Some(values))
}

pub fn save_snapshot(base: &Path, kind: DatasetKind, values: &[String]) -> anyhow::Result<()> {
  if runtime::is_dry_run() {
    tracing::warn!(
      file = kind.file_name(),
      values = values.len(),
      "DRY-RUN: would write publish snapshot"
    );
    return Ok(());
  }

  let path = paths::snapshot_path(base, kind);
  let raw = serde_json::to_string(values)?;
  atomic_write(&path, raw.as_bytes())
}

pub fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));
  fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
  fs::rename(&tmp, path)
    .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dataset_save_load_round_trip_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();

    let dataset = parse_dataset(
      DatasetKind::SuspiciousWords,
      r#"["zzz", "aaa", {"value": "mmm", "source": "triage"}]"#,
    )
    .unwrap();

    save_dataset(base, &dataset).unwrap();
    let loaded = load_dataset(base, DatasetKind::SuspiciousWords).unwrap();

    let values: Vec<&str> = loaded.values().collect();
    assert_eq!(values, vec!["zzz", "aaa", "mmm"]);
    assert_eq!(loaded.records[2].source(), Some("triage"));
  }

  #[test]
  fn missing_dataset_is_none_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = try_load_dataset(dir.path(), DatasetKind::PhishingLinks).unwrap();
    assert!(loaded.is_none());
  }

  #[test]
  fn malformed_dataset_is_an_error() {
    let err = parse_dataset(DatasetKind::PhishingLinks, "{not json").unwrap_err();
    assert!(err.to_string().contains("links.json"));
  }

  #[test]
  fn snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();

    assert!(load_snapshot(base, DatasetKind::SmsSenders).unwrap().is_none());

    let values = vec!["+989120000000".to_string(), "BANKALERT".to_string()];
    save_snapshot(base, DatasetKind::SmsSenders, &values).unwrap();

    let loaded = load_snapshot(base, DatasetKind::SmsSenders).unwrap().unwrap();
    assert_eq!(loaded, values);
  }
}
