use crate::config::Config;
use crate::datasets::schema::DatasetKind;
use crate::datasets::store;
use crate::paths;
use crate::publisher;
use crate::report_store;
use crate::runtime;
use crate::types::Severity;
use crate::validator::Engine;

pub enum ConsoleAction {
  RunWatch,
  ExitOk,
}

pub fn run_console_command(cfg: &Config, args: &[String]) -> anyhow::Result<ConsoleAction> {
  let args = strip_global_flags(args);

  if args.iter().any(|a| a == "--help" || a == "-h") {
    print_help();
    return Ok(ConsoleAction::ExitOk);
  }

  if let Some(i) = args.iter().position(|a| a == "--validate") {
    return run_validate(cfg, &args[i + 1..]);
  }

  if let Some(i) = args.iter().position(|a| a == "--datasets") {
    return run_datasets(&args[i + 1..]);
  }

  if let Some(i) = args.iter().position(|a| a == "--publish") {
    return run_publish(cfg, &args[i + 1..]);
  }

  if let Some(i) = args.iter().position(|a| a == "--bundle") {
    return run_bundle(&args[i + 1..]);
  }

  if let Some(i) = args.iter().position(|a| a == "--mirror") {
    return run_mirror(cfg, &args[i + 1..]);
  }

  if let Some(i) = args.iter().position(|a| a == "--reports") {
    return run_reports(&args[i + 1..]);
  }

  Ok(ConsoleAction::RunWatch)
}

fn run_validate(cfg: &Config, tail: &[String]) -> anyhow::Result<ConsoleAction> {
  let base = paths::base_dir()?;

  let mut cfg = cfg.clone();
  if tail.iter().any(|a| a == "--strict") {
    cfg.validation.fail_on_warnings = true;
  }
  if tail.iter().any(|a| a == "--allow-removals") {
    cfg.validation.allow_removals = true;
  }

  let engine = Engine::new();
  let report = engine.validate_all(&cfg, &base)?;

  println!(
    "Checked {} dataset file(s): {} records, {} validated, {} failed, {} suspicious",
    report.datasets_checked.len(),
    report.stats.total_records,
    report.stats.validated_records,
    report.stats.failed_records,
    report.stats.suspicious_records
  );

  for issue in &report.issues {
    let tag = match issue.severity {
      Severity::Error => "ERROR",
      Severity::Warning => "warn ",
    };
    println!("  [{tag}] {} {} - {}", issue.check_id, issue.location, issue.message);
  }

  if tail.iter().any(|a| a == "--report") {
    let path = report_store::store_report(&base, &report)?;
    println!("Report stored: {}", path.display());
  }

  let passed = if cfg.validation.fail_on_warnings {
    report.passed_strict()
  } else {
    report.passed()
  };
  if passed {
    println!("Validation passed.");
    Ok(ConsoleAction::ExitOk)
  } else {
    anyhow::bail!(
      "validation failed ({} errors, {} warnings)",
      report.error_count(),
      report.warning_count()
    )
  }
}

fn run_datasets(tail: &[String]) -> anyhow::Result<ConsoleAction> {
  let base = paths::base_dir()?;

  let sub = tail.first().map(|s| s.as_str()).unwrap_or("");
  match sub {
    "status" => {
      for kind in DatasetKind::ALL {
        match store::try_load_dataset(&base, kind) {
          Ok(Some(d)) => println!("{}: {} record(s)", kind.file_name(), d.len()),
          Ok(None) => println!("{}: missing", kind.file_name()),
          Err(e) => println!("{}: unreadable ({e})", kind.file_name()),
        }
      }
      match store::load_version(&base) {
        Ok(v) => println!("version.json: {} (last updated {})", v.version, v.last_updated),
        Err(e) => println!("version.json: unreadable ({e})"),
      }
      Ok(ConsoleAction::ExitOk)
    }
    "list" => {
      let name = tail.get(1).map(|s| s.as_str()).unwrap_or("");
      let Some(kind) = DatasetKind::from_file_name(name) else {
        anyhow::bail!("expected: --datasets list <file> (one of links.json, sms_senders.json, sms_patterns.json, apps.json, words.json)");
      };
      let dataset = store::load_dataset(&base, kind)?;
      println!("{} ({}): {} record(s)", kind.file_name(), kind.label(), dataset.len());
      for value in dataset.values() {
        println!("  {value}");
      }
      Ok(ConsoleAction::ExitOk)
    }
    _ => {
      eprintln!("Unknown `--datasets` subcommand. Expected: status|list <file>");
      print_help();
      Ok(ConsoleAction::ExitOk)
    }
  }
}

fn run_publish(cfg: &Config, tail: &[String]) -> anyhow::Result<ConsoleAction> {
  let base = paths::base_dir()?;
  let force = tail.iter().any(|a| a == "--force");

  let outcome = publisher::publish(cfg, &base, force)?;
  if runtime::is_dry_run() {
    println!(
      "DRY-RUN: would publish data_version {} ({} entries).",
      outcome.data_version, outcome.total_entries
    );
    return Ok(ConsoleAction::ExitOk);
  }

  println!(
    "Published data_version {} ({} entries) to {}",
    outcome.data_version,
    outcome.total_entries,
    outcome.bundle_path.display()
  );
  if outcome.compressed {
    println!("Compressed copy: {}", paths::bundle_gz_path(&base).display());
  }
  Ok(ConsoleAction::ExitOk)
}

fn run_bundle(tail: &[String]) -> anyhow::Result<ConsoleAction> {
  let base = paths::base_dir()?;

  let sub = tail.first().map(|s| s.as_str()).unwrap_or("");
  match sub {
    "status" => {
      let meta = publisher::publish_status(&base);
      match meta.last_data_version {
        Some(v) => println!("Last published data_version: {v}"),
        None => println!("No bundle has been published yet."),
      }
      if let Some(ts) = meta.last_published_at {
        println!("Last published (unix seconds): {ts}");
      }
      if let Some(result) = meta.last_publish_result.as_deref() {
        println!("Last result: {result}");
      }
      Ok(ConsoleAction::ExitOk)
    }
    "verify" => {
      let b = tail.get(1).map(|s| s.as_str()).unwrap_or("");
      let s = tail.get(2).map(|s| s.as_str()).unwrap_or("");
      if b.is_empty() || s.is_empty() {
        anyhow::bail!("expected: --bundle verify <path-to-bundle.json> <path-to-bundle.sig>");
      }
      let feed = publisher::verify_files(std::path::Path::new(b), std::path::Path::new(s))?;
      println!("Bundle verified.");
      println!("Bundle format version: {}", feed.version);
      println!("Data version: {}", feed.data_version);
      println!("Created at (unix seconds): {}", feed.created_at);
      println!("Total entries: {}", feed.total_entries());
      Ok(ConsoleAction::ExitOk)
    }
    "import" => {
      let b = tail.get(1).map(|s| s.as_str()).unwrap_or("");
      let s = tail.get(2).map(|s| s.as_str()).unwrap_or("");
      if b.is_empty() || s.is_empty() {
        anyhow::bail!("expected: --bundle import <path-to-bundle.json> <path-to-bundle.sig>");
      }
      let st = publisher::import(&base, std::path::Path::new(b), std::path::Path::new(s))?;
      if runtime::is_dry_run() {
        println!("DRY-RUN: would install bundle into the mirror directory.");
        return Ok(ConsoleAction::ExitOk);
      }
      println!("Imported bundle into the mirror directory.");
      if let Some(v) = st.data_version {
        println!("Data version: {v}");
      }
      Ok(ConsoleAction::ExitOk)
    }
    _ => {
      eprintln!(
        "Unknown `--bundle` subcommand. Expected: status|verify <bundle.json> <bundle.sig>|import <bundle.json> <bundle.sig>"
      );
      print_help();
      Ok(ConsoleAction::ExitOk)
    }
  }
}

fn run_mirror(cfg: &Config, tail: &[String]) -> anyhow::Result<ConsoleAction> {
  let base = paths::base_dir()?;

  let sub = tail.first().map(|s| s.as_str()).unwrap_or("");
  match sub {
    "status" => {
      let st = publisher::mirror_status_at(&base);
      if !st.present {
        println!("Mirror bundle: not installed");
      } else {
        println!("Mirror bundle: installed");
        if let Some(v) = st.data_version {
          println!("Data version: {v}");
        }
        if let Some(ts) = st.created_at {
          println!("Created at (unix seconds): {ts}");
        }
        if let Some(n) = st.total_entries {
          println!("Total entries: {n}");
        }
        if let Some(ts) = st.verified_at {
          println!("Verified at (unix seconds): {ts}");
        }
      }
      println!(
        "Auto sync: {}",
        if cfg.mirror.auto_sync { "enabled" } else { "disabled" }
      );
      println!("Sync interval minutes: {}", cfg.mirror.sync_interval_minutes);
      match st.last_sync_attempt_at {
        Some(ts) => println!("Last sync attempt (unix seconds): {ts}"),
        None => println!("Last sync attempt: none"),
      }
      match st.last_sync_result {
        Some(v) => println!("Last sync result: {v}"),
        None => println!("Last sync result: none"),
      }
      Ok(ConsoleAction::ExitOk)
    }
    "sync-now" => {
      let res = publisher::sync_now(cfg, &base);
      if !res.attempted {
        println!("{}", res.reason);
        return Ok(ConsoleAction::ExitOk);
      }
      if runtime::is_dry_run() {
        println!("{}", res.reason);
        return Ok(ConsoleAction::ExitOk);
      }
      if res.success {
        println!("Mirror sync completed successfully.");
      } else {
        println!("Mirror sync failed: {}", res.reason);
      }
      Ok(ConsoleAction::ExitOk)
    }
    _ => {
      eprintln!("Unknown `--mirror` subcommand. Expected: status|sync-now");
      print_help();
      Ok(ConsoleAction::ExitOk)
    }
  }
}

fn run_reports(tail: &[String]) -> anyhow::Result<ConsoleAction> {
  let base = paths::base_dir()?;

  let sub = tail.first().map(|s| s.as_str()).unwrap_or("");
  match sub {
    "list" => {
      let limit = parse_limit(tail).unwrap_or(10);
      let items = report_store::list_recent(&base, limit)?;
      if items.is_empty() {
        println!("No reports found.");
        return Ok(ConsoleAction::ExitOk);
      }

      println!("Last {}/{} reports:", items.len(), limit);
      for it in items {
        println!(
          "- {} created_at_unix_ms={} errors={} warnings={} passed={}",
          it.report_id, it.created_at_unix_ms, it.errors, it.warnings, it.passed
        );
      }
      Ok(ConsoleAction::ExitOk)
    }
    _ => {
      eprintln!("Unknown `--reports` subcommand. Expected: list [--limit N]");
      print_help();
      Ok(ConsoleAction::ExitOk)
    }
  }
}

fn parse_limit(args: &[String]) -> Option<usize> {
  let mut i = 0;
  while i < args.len() {
    if args[i] == "--limit" {
      return args.get(i + 1).and_then(|s| s.parse::<usize>().ok());
    }
    i += 1;
  }
  None
}

fn strip_global_flags(args: &[String]) -> Vec<String> {
  args
    .iter()
    .filter(|a| a.as_str() != "--watch" && a.as_str() != "--dry-run")
    .cloned()
    .collect()
}

fn print_help() {
  println!("PhishGuard Data Pipeline v{}", env!("CARGO_PKG_VERSION"));
  println!("Commands:");
  println!("  --dry-run (global; logs actions without side effects)");
  println!("  --validate [--strict] [--allow-removals] [--report]");
  println!("  --datasets status");
  println!("  --datasets list <file>");
  println!("  --publish [--force]");
  println!("  --bundle status");
  println!("  --bundle verify <path-to-bundle.json> <path-to-bundle.sig>");
  println!("  --bundle import <path-to-bundle.json> <path-to-bundle.sig>");
  println!("  --mirror status");
  println!("  --mirror sync-now");
  println!("  --reports list [--limit N]");
  println!("  --watch (default when no command is given)");
}
