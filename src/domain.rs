//! Typed records exchanged with the remote score store.
//!
//! The store speaks loosely-shaped JSON rows; everything is funneled through
//! validating constructors here so that a missing key surfaces as
//! `ScoreError::MalformedRecord` at the boundary instead of a fault deep in
//! the scoring pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScoreError;

/// One completed attempt, immutable once fetched. Only ever constructed via
/// [`AttemptRecord::from_row`] so the wire shape is validated in one place.
#[derive(Clone, Debug)]
pub struct AttemptRecord {
  pub result_id: String,
  pub learner_id: String,
  pub activity_id: String,
  /// Number of tries taken; positive.
  pub attempts: u32,
  /// Help/assistance used during the attempt; non-negative.
  pub assistance: f64,
  /// Raw completion timestamp; only the time-of-day component is scored.
  pub completed_at: String,
}

impl AttemptRecord {
  /// Validate one raw store row. Field names follow the store's result
  /// table; any missing or mistyped field is a `MalformedRecord`.
  pub fn from_row(row: &Value) -> Result<Self, ScoreError> {
    fn missing(name: &str) -> ScoreError {
      ScoreError::MalformedRecord(format!("missing field `{name}`"))
    }
    let text = |name: &str| -> Result<String, ScoreError> {
      match row.get(name).ok_or_else(|| missing(name))? {
        Value::String(s) => Ok(s.clone()),
        // Some store deployments serve numeric ids; normalize to text.
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ScoreError::MalformedRecord(format!("field `{name}` is not a string"))),
      }
    };
    let number = |name: &str| -> Result<f64, ScoreError> {
      row
        .get(name)
        .ok_or_else(|| missing(name))?
        .as_f64()
        .ok_or_else(|| ScoreError::MalformedRecord(format!("field `{name}` is not a number")))
    };

    let attempts = number("attempts")?;
    if attempts < 1.0 || attempts.fract() != 0.0 {
      return Err(ScoreError::MalformedRecord(format!(
        "field `attempts` must be a positive integer, got {attempts}"
      )));
    }
    let assistance = number("assistance")?;
    if assistance < 0.0 {
      return Err(ScoreError::MalformedRecord(format!(
        "field `assistance` must be non-negative, got {assistance}"
      )));
    }

    Ok(Self {
      result_id: text("resultId")?,
      learner_id: text("learnerId")?,
      activity_id: text("activityId")?,
      attempts: attempts as u32,
      assistance,
      completed_at: text("completedAt")?,
    })
  }
}

/// Static difficulty/skill indices for one activity. Stable within a run, so
/// the store caches these per activity id.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ActivityProfile {
  #[serde(rename = "difficultyIndex")]
  pub difficulty_index: f64,
  #[serde(rename = "memoryIndex")]
  pub memory_index: f64,
  #[serde(rename = "attentionIndex")]
  pub attention_index: f64,
  #[serde(rename = "perceptionIndex")]
  pub perception_index: f64,
}

/// Computed reward for one attempt, keyed for the store update.
#[derive(Clone, Debug, Serialize)]
pub struct RewardScore {
  #[serde(rename = "resultId")]
  pub result_id: String,
  pub reward: f64,
}

/// One previously scored result row, as served back by the store once a
/// reward has been persisted. Input to the aggregation pass.
#[derive(Clone, Debug, Deserialize)]
pub struct ScoredResultRow {
  #[serde(rename = "resultId")]
  pub result_id: String,
  #[serde(rename = "learnerId")]
  pub learner_id: String,
  #[serde(rename = "activityId")]
  pub activity_id: String,
  pub reward: f64,
}

impl ScoredResultRow {
  /// Validate one raw result row. Attempts skipped at scoring time (or
  /// whose reward update failed) come back with a null or absent reward;
  /// those rows fail here individually and stay out of aggregation without
  /// poisoning the rest of the fetch.
  pub fn from_row(row: &Value) -> Result<Self, ScoreError> {
    serde_json::from_value(row.clone())
      .map_err(|e| ScoreError::MalformedRecord(format!("result row: {e}")))
  }
}

/// UCB priority for one (learner, activity) pair. Recomputed from scratch
/// every run; never read back from the store.
#[derive(Clone, Debug, Serialize)]
pub struct ActivityUcbScore {
  #[serde(rename = "learnerId")]
  pub learner_id: String,
  #[serde(rename = "activityId")]
  pub activity_id: String,
  #[serde(rename = "meanReward")]
  pub mean_reward: f64,
  #[serde(rename = "timesPlayed")]
  pub times_played: u64,
  #[serde(rename = "ucbIndex")]
  pub ucb_index: f64,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn full_row() -> Value {
    json!({
      "resultId": "r-17",
      "learnerId": "l-3",
      "activityId": "a-9",
      "attempts": 2,
      "assistance": 1.0,
      "completedAt": "2024-05-01T10:15:30.000000Z"
    })
  }

  #[test]
  fn from_row_accepts_complete_rows() {
    let rec = AttemptRecord::from_row(&full_row()).expect("valid row");
    assert_eq!(rec.result_id, "r-17");
    assert_eq!(rec.attempts, 2);
    assert_eq!(rec.assistance, 1.0);
  }

  #[test]
  fn from_row_flags_missing_keys() {
    let mut row = full_row();
    row.as_object_mut().unwrap().remove("activityId");
    match AttemptRecord::from_row(&row) {
      Err(ScoreError::MalformedRecord(msg)) => assert!(msg.contains("activityId")),
      other => panic!("expected MalformedRecord, got {other:?}"),
    }
  }

  #[test]
  fn from_row_accepts_numeric_ids() {
    let mut row = full_row();
    row["learnerId"] = json!(42);
    let rec = AttemptRecord::from_row(&row).expect("numeric id row");
    assert_eq!(rec.learner_id, "42");
  }

  #[test]
  fn unscored_result_rows_fail_individually() {
    let rows = vec![
      json!({ "resultId": "r1", "learnerId": "l1", "activityId": "a1", "reward": 2.5 }),
      json!({ "resultId": "r2", "learnerId": "l1", "activityId": "a2", "reward": null }),
      json!({ "resultId": "r3", "learnerId": "l2", "activityId": "a1" }),
    ];
    let survivors: Vec<ScoredResultRow> =
      rows.iter().filter_map(|r| ScoredResultRow::from_row(r).ok()).collect();
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].result_id, "r1");
    assert!(matches!(
      ScoredResultRow::from_row(&rows[1]),
      Err(ScoreError::MalformedRecord(_))
    ));
  }

  #[test]
  fn from_row_rejects_zero_attempts() {
    let mut row = full_row();
    row["attempts"] = json!(0);
    assert!(matches!(
      AttemptRecord::from_row(&row),
      Err(ScoreError::MalformedRecord(_))
    ));
  }
}
