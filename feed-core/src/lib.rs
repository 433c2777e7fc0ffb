pub mod config;
pub mod console;
pub mod datasets;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod publisher;
pub mod report_store;
pub mod runtime;
pub mod types;
pub mod validator;

use std::sync::mpsc;
use std::time::Duration;

pub fn run(args: &[String]) -> anyhow::Result<()> {
  let dry_run = args.iter().any(|a| a == "--dry-run");
  runtime::set_dry_run(dry_run);

  let base = paths::base_dir()?;
  let config_path = paths::config_path(&base);
  let cfg = if dry_run {
    config::load_or_default_readonly(&config_path)?
  } else {
    config::load_or_create_default(&config_path)?
  };

  logging::init_file_and_stderr(
    &paths::logs_dir(&base),
    &cfg.logging.level,
    cfg.logging.retention_days,
  )?;

  match console::run_console_command(&cfg, args)? {
    console::ConsoleAction::ExitOk => return Ok(()),
    console::ConsoleAction::RunWatch => {}
  }

  tracing::info!("starting PhishGuard data pipeline (watch mode)");
  let (stop_tx, stop_rx) = mpsc::channel::<()>();

  let ctrlc_tx = stop_tx.clone();
  ctrlc::set_handler(move || {
    let _ = ctrlc_tx.send(());
  })?;

  pipeline::Pipeline::new(cfg).run(stop_rx, Duration::from_millis(500))?;
  tracing::info!("pipeline stopped");
  Ok(())
}
