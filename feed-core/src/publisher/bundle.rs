use crate::datasets::schema::{Dataset, DatasetKind};
use crate::types::now_unix_s;
use crate::validator::checks;
use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// The signed artifact mirrors fetch. Entry values are SHA-256 hashed so
/// the distributed file never carries raw URLs or sender ids; consuming
/// apps hash their candidate and look it up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedBundle {
  pub version: u32,
  pub bundle_id: String,
  pub created_at: u64,
  pub data_version: u64,
  pub datasets: Vec<BundleDataset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDataset {
  pub category: u32,
  pub file: String,
  pub entries: Vec<BundleEntry>,
}

/// Short field names keep the compressed artifact small: `h` hash,
/// `m` match mode, `l` level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
  pub h: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub m: Option<u32>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub l: Option<u32>,
}

impl FeedBundle {
  pub fn build(datasets: &[Dataset], data_version: u64) -> Self {
    let mut out_datasets = Vec::with_capacity(datasets.len());

    for dataset in datasets {
      out_datasets.push(build_dataset(dataset));
    }

    Self {
      version: BUNDLE_FORMAT_VERSION,
      bundle_id: uuid::Uuid::new_v4().to_string(),
      created_at: now_unix_s(),
      data_version,
      datasets: out_datasets,
    }
  }

  pub fn to_compact_json(&self) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(self).context("serialize bundle JSON")
  }

  pub fn total_entries(&self) -> usize {
    self.datasets.iter().map(|d| d.entries.len()).sum()
  }

  pub fn dataset(&self, kind: DatasetKind) -> Option<&BundleDataset> {
    self
      .datasets
      .iter()
      .find(|d| d.category == kind.category_id())
  }
}

fn build_dataset(dataset: &Dataset) -> BundleDataset {
  let mut seen: HashSet<String> = HashSet::new();
  let mut entries = Vec::with_capacity(dataset.len());

  for record in &dataset.records {
    let hashed = hash_value(record.value());
    if !seen.insert(hashed.clone()) {
      continue;
    }
    entries.push(BundleEntry {
      h: hashed,
      m: record.match_mode(),
      l: record.level(),
    });
  }

  BundleDataset {
    category: dataset.kind.category_id(),
    file: dataset.kind.file_name().to_string(),
    entries,
  }
}

/// Values that already look like a SHA-256 digest pass through (legacy
/// dash prefix stripped, lowercased); everything else is hashed.
pub fn hash_value(value: &str) -> String {
  if checks::is_valid_hash(value) {
    return value.trim_start_matches('-').to_ascii_lowercase();
  }
  sha256_hex(value.as_bytes())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  let digest = hasher.finalize();
  digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn gzip_bytes(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
  let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
  encoder.write_all(bytes).context("gzip bundle")?;
  encoder.finish().context("finish gzip stream")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::datasets::store::parse_dataset;

  #[test]
  fn build_hashes_values_and_keeps_metadata() {
    let dataset = parse_dataset(
      DatasetKind::PhishingLinks,
      r#"["https://evil.example/login", {"value": "https://bad.example", "match": 1, "level": 2}]"#,
    )
    .unwrap();

    let bundle = FeedBundle::build(&[dataset], 7);

    assert_eq!(bundle.version, BUNDLE_FORMAT_VERSION);
    assert_eq!(bundle.data_version, 7);
    let ds = bundle.dataset(DatasetKind::PhishingLinks).unwrap();
    assert_eq!(ds.file, "links.json");
    assert_eq!(ds.entries.len(), 2);
    assert_eq!(ds.entries[0].h, sha256_hex(b"https://evil.example/login"));
    assert_eq!(ds.entries[1].m, Some(1));
    assert_eq!(ds.entries[1].l, Some(2));
  }

  #[test]
  fn build_dedupes_on_hashed_value_keeping_first() {
    let dataset = parse_dataset(
      DatasetKind::SuspiciousWords,
      r#"[{"value": "prize", "level": 3}, "prize", "urgent"]"#,
    )
    .unwrap();

    let bundle = FeedBundle::build(&[dataset], 1);
    let ds = bundle.dataset(DatasetKind::SuspiciousWords).unwrap();

    assert_eq!(ds.entries.len(), 2);
    assert_eq!(ds.entries[0].h, sha256_hex(b"prize"));
    assert_eq!(ds.entries[0].l, Some(3));
  }

  #[test]
  fn hash_passthrough_normalizes_legacy_entries() {
    let h = "AB".repeat(32);
    assert_eq!(hash_value(&h), h.to_ascii_lowercase());
    assert_eq!(hash_value(&format!("-{h}")), h.to_ascii_lowercase());
    assert_ne!(hash_value("not a hash"), "not a hash");
  }

  #[test]
  fn compact_json_omits_absent_metadata() {
    let dataset = parse_dataset(DatasetKind::SuspiciousWords, r#"["prize"]"#).unwrap();
    let bundle = FeedBundle::build(&[dataset], 1);
    let json = String::from_utf8(bundle.to_compact_json().unwrap()).unwrap();

    assert!(!json.contains("\"m\""));
    assert!(!json.contains("\"l\""));
    assert!(!json.contains('\n'));
  }

  #[test]
  fn gzip_output_carries_magic_bytes() {
    let gz = gzip_bytes(b"payload payload payload").unwrap();
    assert_eq!(&gz[..2], &[0x1f, 0x8b]);
  }
}
