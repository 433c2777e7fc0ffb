use std::sync::atomic::{AtomicBool, Ordering};

// Global `--dry-run` flag. Commands that would write files or hit the
// network check this and log what they would have done instead.
static DRY_RUN: AtomicBool = AtomicBool::new(false);

pub fn set_dry_run(enabled: bool) {
  DRY_RUN.store(enabled, Ordering::SeqCst);
}

pub fn is_dry_run() -> bool {
  DRY_RUN.load(Ordering::SeqCst)
}
