//! Last-checked checkpoint persisted between runs.
//!
//! A single timestamp in a plain text file, `YYYY-MM-DD HH:MM:SS.ffffff`.
//! Attempts completed after this instant are the next run's batch. A missing
//! or unreadable file degrades to the floor date so the first run (or a run
//! after a corrupted file) simply processes everything.

use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{info, warn};

pub const CHECKPOINT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Read the checkpoint, falling back to the floor date.
pub fn load(path: &Path) -> NaiveDateTime {
  match std::fs::read_to_string(path) {
    Ok(raw) => match NaiveDateTime::parse_from_str(raw.trim(), CHECKPOINT_FORMAT) {
      Ok(ts) => {
        info!(target: "scoring_engine", checkpoint = %ts, "loaded checkpoint");
        ts
      }
      Err(e) => {
        warn!(
          target: "scoring_engine",
          path = %path.display(),
          error = %e,
          "unparseable checkpoint file; reprocessing full history"
        );
        NaiveDateTime::MIN
      }
    },
    Err(_) => {
      info!(
        target: "scoring_engine",
        path = %path.display(),
        "no checkpoint file; reprocessing full history"
      );
      NaiveDateTime::MIN
    }
  }
}

/// Persist the new checkpoint after a successful run.
pub fn save(path: &Path, ts: NaiveDateTime) -> Result<(), String> {
  std::fs::write(path, format!("{}", ts.format(CHECKPOINT_FORMAT)))
    .map_err(|e| format!("failed to write checkpoint {}: {e}", path.display()))
}
