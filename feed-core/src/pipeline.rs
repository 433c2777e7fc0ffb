use crate::config::Config;
use crate::datasets::schema::DatasetKind;
use crate::paths;
use crate::publisher;
use crate::report_store;
use crate::validator::Engine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

/// Watch mode: re-validate whenever a dataset file changes, keep the
/// mirror scheduler ticking, and optionally publish on green runs.
pub struct Pipeline {
  cfg: Config,
}

impl Pipeline {
  pub fn new(cfg: Config) -> Self {
    Self { cfg }
  }

  pub fn run(&self, stop_rx: mpsc::Receiver<()>, tick: Duration) -> anyhow::Result<()> {
    let base = paths::base_dir()?;
    let cfg = self.cfg.clone();

    if cfg.publish.auto_publish && cfg.publish.signing_key_path.is_none() {
      tracing::warn!(
        "auto_publish requested but publish.signing_key_path is not set; publishing is skipped"
      );
    }

    tracing::info!(
      watch_interval_seconds = cfg.watch_interval_seconds,
      auto_publish = cfg.publish.auto_publish,
      auto_sync = cfg.mirror.auto_sync,
      "pipeline main loop started"
    );

    let mut scheduler = publisher::MirrorScheduler::new(&cfg);
    let mut mtimes = scan_mtimes(&base);
    let mut next_check = SystemTime::now();

    // Validate once on startup so a fresh checkout gets a report
    // without waiting for an edit.
    self.run_cycle(&cfg, &base)?;

    loop {
      if stop_rx.recv_timeout(tick).is_ok() {
        break;
      }

      scheduler.tick(&cfg, &base);

      let now = SystemTime::now();
      if now < next_check {
        continue;
      }
      next_check = now + Duration::from_secs(cfg.watch_interval_seconds.max(1));

      let current = scan_mtimes(&base);
      if current == mtimes {
        continue;
      }
      mtimes = current;

      tracing::info!("dataset change detected");
      self.run_cycle(&cfg, &base)?;
    }

    tracing::info!("pipeline main loop exiting");
    Ok(())
  }

  fn run_cycle(&self, cfg: &Config, base: &Path) -> anyhow::Result<()> {
    let engine = Engine::new();
    let report = engine.validate_all(cfg, base)?;
    let passed = if cfg.validation.fail_on_warnings {
      report.passed_strict()
    } else {
      report.passed()
    };

    tracing::info!(
      report_id = %report.report_id,
      errors = report.error_count(),
      warnings = report.warning_count(),
      passed,
      "validation cycle finished"
    );
    report_store::store_report(base, &report)?;

    if !passed {
      return Ok(());
    }

    if cfg.publish.auto_publish && cfg.publish.signing_key_path.is_some() {
      match publisher::publish(cfg, base, false) {
        Ok(out) => {
          tracing::info!(data_version = out.data_version, "auto-publish succeeded");
        }
        Err(e) => {
          tracing::warn!(reason = %e, "auto-publish failed");
        }
      }
    }

    Ok(())
  }
}

/// Modification times for everything the validator reads. Compared
/// wholesale between checks; any difference triggers a cycle.
fn scan_mtimes(base: &Path) -> HashMap<PathBuf, SystemTime> {
  let mut out = HashMap::new();

  for kind in DatasetKind::ALL {
    record_mtime(&mut out, paths::dataset_path(base, kind));
  }
  record_mtime(&mut out, paths::version_path(base));

  out
}

fn record_mtime(out: &mut HashMap<PathBuf, SystemTime>, path: PathBuf) {
  if let Ok(meta) = std::fs::metadata(&path) {
    if let Ok(modified) = meta.modified() {
      out.insert(path, modified);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  #[test]
  fn mtime_scan_tracks_dataset_files_only() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    let data = paths::data_dir(base);
    fs::create_dir_all(&data).unwrap();

    fs::write(data.join("links.json"), "[]").unwrap();
    fs::write(data.join("unrelated.txt"), "x").unwrap();

    let scanned = scan_mtimes(base);
    assert_eq!(scanned.len(), 1);
    assert!(scanned.contains_key(&data.join("links.json")));
  }

  #[test]
  fn mtime_scan_differs_after_file_removal() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();
    let data = paths::data_dir(base);
    fs::create_dir_all(&data).unwrap();
    let file = data.join("words.json");

    fs::write(&file, r#"["a"]"#).unwrap();
    let before = scan_mtimes(base);

    fs::remove_file(&file).unwrap();
    assert_ne!(before, scan_mtimes(base));
  }
}
