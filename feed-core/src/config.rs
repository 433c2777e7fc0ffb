use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
  pub watch_interval_seconds: u64,
  pub logging: LoggingConfig,
  pub validation: ValidationConfig,
  pub publish: PublishConfig,
  pub mirror: MirrorConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      watch_interval_seconds: default_watch_interval_seconds(),
      logging: LoggingConfig::default(),
      validation: ValidationConfig::default(),
      publish: PublishConfig::default(),
      mirror: MirrorConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
  #[serde(default = "default_max_records_per_dataset")]
  pub max_records_per_dataset: u64,

  #[serde(default)]
  pub allow_removals: bool,

  #[serde(default)]
  pub fail_on_warnings: bool,
}

impl Default for ValidationConfig {
  fn default() -> Self {
    Self {
      max_records_per_dataset: default_max_records_per_dataset(),
      allow_removals: false,
      fail_on_warnings: false,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
  #[serde(default)]
  pub auto_publish: bool,

  #[serde(default = "default_true")]
  pub compress: bool,

  #[serde(default)]
  pub signing_key_path: Option<String>,
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      auto_publish: false,
      compress: true,
      signing_key_path: None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
  #[serde(default)]
  pub auto_sync: bool,

  #[serde(default = "default_sync_interval_minutes")]
  pub sync_interval_minutes: u64,

  #[serde(default = "default_mirror_endpoints")]
  pub endpoints: Vec<String>,

  #[serde(default = "default_mirror_allowlist_domains")]
  pub allowlist_domains: Vec<String>,

  #[serde(default = "default_mirror_timeout_seconds")]
  pub timeout_seconds: u64,
}

impl Default for MirrorConfig {
  fn default() -> Self {
    Self {
      auto_sync: false,
      sync_interval_minutes: default_sync_interval_minutes(),
      endpoints: default_mirror_endpoints(),
      allowlist_domains: default_mirror_allowlist_domains(),
      timeout_seconds: default_mirror_timeout_seconds(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_watch_interval_seconds() -> u64 {
  30
}

fn default_max_records_per_dataset() -> u64 {
  100_000
}

fn default_sync_interval_minutes() -> u64 {
  60
}

fn default_mirror_endpoints() -> Vec<String> {
  vec!["https://data.phishguard.app/feed/".to_string()]
}

fn default_mirror_allowlist_domains() -> Vec<String> {
  vec!["data.phishguard.app".to_string()]
}

fn default_mirror_timeout_seconds() -> u64 {
  10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub watch_interval_seconds: Option<u64>,

  #[serde(default)]
  pub logging: Option<LoggingConfig>,

  #[serde(default)]
  pub validation: Option<ValidationConfig>,

  #[serde(default)]
  pub publish: Option<PublishConfig>,

  #[serde(default)]
  pub mirror: Option<MirrorConfig>,

  // Back-compat: old configs had a top-level `strict = true|false`.
  #[serde(default)]
  pub strict: Option<bool>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();

    if let Some(w) = self.watch_interval_seconds {
      cfg.watch_interval_seconds = w;
    }
    if let Some(l) = self.logging {
      cfg.logging = l;
    }
    let validation_opt = self.validation;
    if let Some(v) = validation_opt.clone() {
      cfg.validation = v;
    }
    if validation_opt.is_none() {
      if let Some(strict) = self.strict {
        cfg.validation.fail_on_warnings = strict;
      }
    }
    if let Some(p) = self.publish {
      cfg.publish = p;
    }
    if let Some(m) = self.mirror {
      cfg.mirror = m;
    }

    if let Some(reason) = validate_mirror_config(&cfg.mirror) {
      cfg.mirror.auto_sync = false;
      tracing::warn!(
        reason = %reason,
        "mirror config invalid; auto sync disabled"
      );
    }

    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.watch_interval_seconds.is_none()
      || self.logging.is_none()
      || self.validation.is_none()
      || self.publish.is_none()
      || self.mirror.is_none()
  }
}

pub fn load_or_create_default(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, true)
}

pub fn load_or_default_readonly(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, false)
}

fn load_impl(path: &Path, allow_writes: bool) -> anyhow::Result<Config> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
  if allow_writes {
    fs::create_dir_all(parent)?;
  }

  if !path.exists() {
    let cfg = Config::default();
    if allow_writes {
      write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    } else {
      eprintln!(
        "phishguard-data: config missing at {}; using defaults in read-only mode (--dry-run).",
        path.display()
      );
    }
    return Ok(cfg);
  }

  let raw = fs::read_to_string(path)?;
  match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      let cfg = file.clone().normalize();
      if allow_writes && file.needs_upgrade() {
        let ts = std::time::SystemTime::now()
          .duration_since(std::time::UNIX_EPOCH)
          .unwrap_or_default()
          .as_secs();
        let backup = parent.join(format!("feed.toml.bak-{ts}"));
        let _ = fs::copy(path, &backup);
        let _ = write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?);
        eprintln!(
          "phishguard-data: upgraded config defaults written to {} (backup: {})",
          path.display(),
          backup.display()
        );
      }
      Ok(cfg)
    }
    Err(e) => {
      let cfg = Config::default();
      if allow_writes {
        let ts = std::time::SystemTime::now()
          .duration_since(std::time::UNIX_EPOCH)
          .unwrap_or_default()
          .as_secs();
        let backup = parent.join(format!("feed.toml.bad-{ts}"));
        let _ = fs::rename(path, &backup);
        write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
        eprintln!(
          "phishguard-data: invalid config at {} (backed up to {}): {e}",
          path.display(),
          backup.display()
        );
      } else {
        eprintln!(
          "phishguard-data: invalid config at {}; using defaults in read-only mode (--dry-run): {e}",
          path.display()
        );
      }
      Ok(cfg)
    }
  }
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    watch_interval_seconds: Some(cfg.watch_interval_seconds),
    logging: Some(cfg.logging.clone()),
    validation: Some(cfg.validation.clone()),
    publish: Some(cfg.publish.clone()),
    mirror: Some(cfg.mirror.clone()),
    strict: None,
  }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

fn validate_mirror_config(cfg: &MirrorConfig) -> Option<String> {
  if cfg.sync_interval_minutes == 0 {
    return Some("sync_interval_minutes must be > 0".to_string());
  }
  if cfg.timeout_seconds == 0 {
    return Some("timeout_seconds must be > 0".to_string());
  }
  if cfg.endpoints.is_empty() {
    return Some("endpoints must not be empty".to_string());
  }
  if cfg.allowlist_domains.is_empty() {
    return Some("allowlist_domains must not be empty".to_string());
  }

  for endpoint in &cfg.endpoints {
    let Ok(url) = reqwest::Url::parse(endpoint) else {
      return Some(format!("invalid endpoint URL: {endpoint}"));
    };
    if url.scheme() != "https" {
      return Some(format!("endpoint must use HTTPS: {endpoint}"));
    }
    let Some(host) = url.host_str() else {
      return Some(format!("endpoint has no host: {endpoint}"));
    };
    if !cfg.allowlist_domains.iter().any(|d| d == host) {
      return Some(format!("endpoint host not allowlisted: {host}"));
    }
  }

  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn legacy_strict_flag_maps_to_fail_on_warnings() {
    let file: ConfigFile = toml::from_str("strict = true").unwrap();
    let cfg = file.normalize();
    assert!(cfg.validation.fail_on_warnings);
  }

  #[test]
  fn explicit_validation_section_wins_over_legacy_flag() {
    let raw = "strict = true\n[validation]\nfail_on_warnings = false\n";
    let file: ConfigFile = toml::from_str(raw).unwrap();
    let cfg = file.normalize();
    assert!(!cfg.validation.fail_on_warnings);
  }

  #[test]
  fn invalid_mirror_endpoint_disables_auto_sync() {
    let raw = r#"
[mirror]
auto_sync = true
endpoints = ["http://insecure.example/feed/"]
allowlist_domains = ["insecure.example"]
"#;
    let file: ConfigFile = toml::from_str(raw).unwrap();
    let cfg = file.normalize();
    assert!(!cfg.mirror.auto_sync);
  }
}
