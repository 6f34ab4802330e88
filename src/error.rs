//! Engine-side failures and their skip-vs-fatal policy.
//!
//! Transport problems (HTTP status, connection) stay `Result<_, String>` in
//! the store client; this enum covers the scoring decisions the engine has to
//! make per attempt or per learner group:
//!   - MalformedTimestamp / MalformedRecord / ActivityNotFound: skip the
//!     attempt, log ids, keep going.
//!   - EmptyBatch: short-circuit to an empty result set.
//!   - DegenerateAggregation: fatal for that learner's group; never emit
//!     NaN/infinite scores.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum ScoreError {
  /// Completion time did not parse as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
  MalformedTimestamp(String),
  /// Activity metadata lookup failed; carries ids for investigation.
  ActivityNotFound {
    learner_id: String,
    activity_id: String,
    result_id: String,
  },
  /// A fetched row is missing a required field or has the wrong shape.
  MalformedRecord(String),
  /// Zero attempts supplied where normalization needs at least one.
  EmptyBatch,
  /// An activity appears in a group with a zero play count.
  DegenerateAggregation { activity_id: String },
}

impl fmt::Display for ScoreError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ScoreError::MalformedTimestamp(raw) => {
        write!(f, "malformed completion timestamp: {raw:?}")
      }
      ScoreError::ActivityNotFound { learner_id, activity_id, result_id } => write!(
        f,
        "activity profile not found (learner={learner_id}, activity={activity_id}, result={result_id})"
      ),
      ScoreError::MalformedRecord(what) => write!(f, "malformed attempt row: {what}"),
      ScoreError::EmptyBatch => write!(f, "empty batch: nothing to normalize"),
      ScoreError::DegenerateAggregation { activity_id } => {
        write!(f, "degenerate aggregation: activity {activity_id} grouped with zero plays")
      }
    }
  }
}

impl std::error::Error for ScoreError {}
