//! Activity scoring engine.
//!
//! One run: fetch attempts completed since the last checkpoint, turn each
//! into a bounded reward (batch-relative normalization over the whole
//! fetch), persist the rewards, then rebuild every affected learner's UCB
//! priorities from their full scored history and upsert them. Scheduling is
//! external; this binary does exactly one pass and exits.
//!
//! Important env variables:
//!   STORE_BASE_URL      : score store root URL (required)
//!   CHECKPOINT_PATH     : last-checked file (default "last_check.txt")
//!   STORE_TIMEOUT_SECS  : HTTP timeout, default 20
//!   ENGINE_CONFIG_PATH  : optional TOML with the same keys
//!   LOG_LEVEL           : tracing filter, e.g. "debug"
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod config;
mod error;
mod domain;
mod reward;
mod ucb;
mod engine;
mod store;
mod checkpoint;

use std::collections::HashMap;
use std::path::Path;

use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::domain::ActivityProfile;
use crate::store::ScoreStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = EngineConfig::from_env()?;
  let store = ScoreStore::new(&cfg)?;
  let checkpoint_path = Path::new(&cfg.checkpoint_path).to_path_buf();

  let since = checkpoint::load(&checkpoint_path);
  let run_started = chrono::Local::now().naive_local();

  let new_attempts = store.fetch_attempts_since(since).await?;
  if new_attempts.is_empty() {
    info!(target: "scoring_engine", "no new attempts since checkpoint; nothing to do");
    return Ok(());
  }

  run_reward_pass(&store, &new_attempts).await?;
  run_aggregation_pass(&store).await?;

  checkpoint::save(&checkpoint_path, run_started)?;
  info!(target: "scoring_engine", checkpoint = %run_started, "run complete");
  Ok(())
}

/// Score the fetched batch and persist one reward per surviving attempt.
#[instrument(level = "info", skip_all, fields(batch = attempts.len()))]
async fn run_reward_pass(
  store: &ScoreStore,
  attempts: &[domain::AttemptRecord],
) -> Result<(), String> {
  // Resolve profiles up front so the scoring pass stays pure. An activity
  // the store does not know stays out of the map and its attempts are
  // skipped downstream with ids logged.
  let mut profiles: HashMap<String, ActivityProfile> = HashMap::new();
  for record in attempts {
    if profiles.contains_key(&record.activity_id) {
      continue;
    }
    if let Some(profile) = store.activity_profile(&record.activity_id).await? {
      profiles.insert(record.activity_id.clone(), profile);
    }
  }

  let (resolved, skipped) = engine::resolve_factors(attempts, &profiles);
  let scores = engine::score_batch(&resolved);
  info!(
    target: "scoring_engine",
    scored = scores.len(),
    skipped,
    "reward pass computed"
  );

  let mut persisted = 0usize;
  for score in &scores {
    match store.store_reward(score).await {
      Ok(()) => persisted += 1,
      Err(e) => {
        // Persistence is the store's concern; one failed update does not
        // abort the run.
        error!(
          target: "scoring_engine",
          result_id = %score.result_id,
          error = %e,
          "failed to persist reward"
        );
      }
    }
  }
  info!(target: "scoring_engine", persisted, "reward pass persisted");
  Ok(())
}

/// Rebuild and upsert every learner's UCB priorities from full history.
#[instrument(level = "info", skip_all)]
async fn run_aggregation_pass(store: &ScoreStore) -> Result<(), String> {
  let rows = store.fetch_scored_results().await?;
  let groups = engine::group_by_learner(&rows);

  for (learner_id, learner_rows) in &groups {
    let mut scores = match engine::aggregate_learner(learner_id, learner_rows) {
      Ok(scores) => scores,
      Err(e) => {
        // Fatal for this learner's group only.
        error!(target: "scoring_engine", %learner_id, error = %e, "aggregation failed");
        continue;
      }
    };
    ucb::rank_descending(&mut scores);

    for score in &scores {
      if let Err(e) = store.upsert_ucb(score).await {
        warn!(
          target: "scoring_engine",
          %learner_id,
          activity_id = %score.activity_id,
          error = %e,
          "failed to upsert UCB score"
        );
      }
    }
    info!(
      target: "scoring_engine",
      %learner_id,
      activities = scores.len(),
      "learner priorities updated"
    );
  }
  Ok(())
}
