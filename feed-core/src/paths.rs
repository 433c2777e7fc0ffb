use crate::datasets::schema::DatasetKind;
use std::path::{Path, PathBuf};

pub fn base_dir() -> anyhow::Result<PathBuf> {
  if let Ok(home) = std::env::var("PHISHGUARD_DATA_HOME") {
    if !home.trim().is_empty() {
      return Ok(PathBuf::from(home));
    }
  }
  Ok(std::env::current_dir()?)
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("feed.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

pub fn data_dir(base: &Path) -> PathBuf {
  base.join("data")
}

pub fn dataset_path(base: &Path, kind: DatasetKind) -> PathBuf {
  data_dir(base).join(kind.file_name())
}

pub fn version_path(base: &Path) -> PathBuf {
  data_dir(base).join("version.json")
}

pub fn reports_dir(base: &Path) -> PathBuf {
  base.join("reports")
}

pub fn state_dir(base: &Path) -> PathBuf {
  base.join("state")
}

pub fn snapshot_path(base: &Path, kind: DatasetKind) -> PathBuf {
  state_dir(base).join(format!("snapshot-{}", kind.file_name()))
}

pub fn publish_meta_path(base: &Path) -> PathBuf {
  state_dir(base).join("publish-meta.json")
}

pub fn dist_dir(base: &Path) -> PathBuf {
  base.join("dist")
}

pub fn bundle_path(base: &Path) -> PathBuf {
  dist_dir(base).join("bundle.json")
}

pub fn bundle_sig_path(base: &Path) -> PathBuf {
  dist_dir(base).join("bundle.sig")
}

pub fn bundle_gz_path(base: &Path) -> PathBuf {
  dist_dir(base).join("bundle.json.gz")
}

pub fn checksums_path(base: &Path) -> PathBuf {
  dist_dir(base).join("checksums.txt")
}

pub fn mirror_dir(base: &Path) -> PathBuf {
  base.join("mirror")
}

pub fn mirror_bundle_path(base: &Path) -> PathBuf {
  mirror_dir(base).join("bundle.json")
}

pub fn mirror_sig_path(base: &Path) -> PathBuf {
  mirror_dir(base).join("bundle.sig")
}

pub fn mirror_meta_path(base: &Path) -> PathBuf {
  mirror_dir(base).join("meta.json")
}
