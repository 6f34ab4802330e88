//! Reward calculation for one completed attempt.
//!
//! Each attempt contributes a fixed-order 7-feature vector:
//!   [attempts, assistance, elapsed_seconds, attention, difficulty, memory, perception]
//! Features are min-max scaled to [0, 1] against the WHOLE batch being
//! processed (all learners together), then combined with fixed weights:
//! fewer attempts, less assistance and less time raise the reward (inverted
//! terms); higher skill-index involvement raises it directly. The final value
//! is deliberately not clamped — downstream averaging treats it as a
//! comparable scalar, not a probability.

use chrono::{NaiveDateTime, Timelike};

use crate::domain::{ActivityProfile, AttemptRecord};
use crate::error::ScoreError;

pub const FEATURE_COUNT: usize = 7;

/// Cap on the assistance term. Keeps assistance weighted below the other
/// inverted terms; persisted rewards depend on this exact constant.
pub const ASSISTANCE_CAP: f64 = 0.8;

const COMPLETION_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Elapsed seconds within the day of an attempt's completion timestamp.
/// Accepts the store's `YYYY-MM-DDTHH:MM:SS.ffffffZ` shape.
pub fn seconds_of_day(raw: &str) -> Result<u32, ScoreError> {
  let ts = NaiveDateTime::parse_from_str(raw, COMPLETION_FORMAT)
    .map_err(|_| ScoreError::MalformedTimestamp(raw.to_string()))?;
  Ok(ts.hour() * 3600 + ts.minute() * 60 + ts.second())
}

/// The raw feature vector for one attempt, fixed order.
#[derive(Clone, Copy, Debug)]
pub struct RewardFactors([f64; FEATURE_COUNT]);

impl RewardFactors {
  pub fn new(record: &AttemptRecord, profile: &ActivityProfile) -> Result<Self, ScoreError> {
    let elapsed = seconds_of_day(&record.completed_at)?;
    Ok(Self([
      record.attempts as f64,
      record.assistance,
      elapsed as f64,
      profile.attention_index,
      profile.difficulty_index,
      profile.memory_index,
      profile.perception_index,
    ]))
  }

  #[cfg(test)]
  pub fn from_raw(raw: [f64; FEATURE_COUNT]) -> Self {
    Self(raw)
  }
}

/// Per-feature min/max over everything being scored in one call. Built once
/// per run, before any reward is produced; the same raw value can normalize
/// differently in different batches.
#[derive(Clone, Copy, Debug)]
pub struct BatchContext {
  min: [f64; FEATURE_COUNT],
  max: [f64; FEATURE_COUNT],
}

impl BatchContext {
  /// `EmptyBatch` on zero attempts: min/max are undefined on zero elements
  /// and the caller short-circuits to an empty result set.
  pub fn from_factors(batch: &[RewardFactors]) -> Result<Self, ScoreError> {
    let first = batch.first().ok_or(ScoreError::EmptyBatch)?;
    let mut min = first.0;
    let mut max = first.0;
    for f in &batch[1..] {
      for i in 0..FEATURE_COUNT {
        min[i] = min[i].min(f.0[i]);
        max[i] = max[i].max(f.0[i]);
      }
    }
    Ok(Self { min, max })
  }

  /// Min-max scale one feature into [0, 1]. A feature that is constant
  /// across the batch scales to exactly 0; that is policy, not an error.
  fn normalize(&self, i: usize, value: f64) -> f64 {
    let span = self.max[i] - self.min[i];
    if span == 0.0 {
      0.0
    } else {
      (value - self.min[i]) / span
    }
  }
}

/// Combine one attempt's normalized features into its scalar reward.
pub fn compute_reward(ctx: &BatchContext, factors: &RewardFactors) -> f64 {
  let n: Vec<f64> = (0..FEATURE_COUNT).map(|i| ctx.normalize(i, factors.0[i])).collect();
  (1.0 - n[0]) + (ASSISTANCE_CAP - n[1]) + (1.0 - n[2]) + n[3] + n[4] + n[5] + n[6]
}
