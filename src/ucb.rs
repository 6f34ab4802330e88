//! UCB1 aggregation over one learner's reward history.
//!
//! `ucb_index = mean_reward + sqrt(2 * ln(total_attempts) / times_played)`
//!
//! The first term favors proven high performers; the second grows for
//! activities played rarely relative to the learner's total, so
//! under-explored activities bubble up. Scores are recomputed from scratch
//! from the full history every run; there is no incremental update.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::ActivityUcbScore;
use crate::error::ScoreError;

/// Aggregate one learner's rewards, grouped by activity, into UCB scores.
///
/// `total_attempts` is the learner's global attempt count across ALL
/// activities, which is what the exploration term divides by. Output order
/// carries no meaning; use [`rank_descending`] for a ranking.
pub fn compute_ucb(
  learner_id: &str,
  rewards_by_activity: &BTreeMap<String, Vec<f64>>,
) -> Result<Vec<ActivityUcbScore>, ScoreError> {
  let total_attempts: u64 = rewards_by_activity.values().map(|r| r.len() as u64).sum();
  if total_attempts == 0 {
    return Ok(Vec::new());
  }

  let mut scores = Vec::with_capacity(rewards_by_activity.len());
  for (activity_id, rewards) in rewards_by_activity {
    let times_played = rewards.len() as u64;
    if times_played == 0 {
      // Grouping cannot legitimately produce an empty bucket; refuse to
      // emit a NaN/infinite score for this learner.
      return Err(ScoreError::DegenerateAggregation { activity_id: activity_id.clone() });
    }
    let mean_reward = rewards.iter().sum::<f64>() / times_played as f64;
    // ln(1) = 0: a single-attempt history collapses to the mean, no error.
    let exploration = (2.0 * (total_attempts as f64).ln() / times_played as f64).sqrt();
    let ucb_index = mean_reward + exploration;
    debug!(
      target: "scoring_engine",
      learner_id,
      activity_id = %activity_id,
      mean_reward,
      times_played,
      ucb_index,
      "UCB index computed"
    );
    scores.push(ActivityUcbScore {
      learner_id: learner_id.to_string(),
      activity_id: activity_id.clone(),
      mean_reward,
      times_played,
      ucb_index,
    });
  }
  Ok(scores)
}

/// Sort scores best-first. Ties keep their relative order.
pub fn rank_descending(scores: &mut [ActivityUcbScore]) {
  scores.sort_by(|a, b| b.ucb_index.partial_cmp(&a.ucb_index).unwrap_or(std::cmp::Ordering::Equal));
}

#[cfg(test)]
mod tests {
  use super::*;

  fn groups(entries: &[(&str, &[f64])]) -> BTreeMap<String, Vec<f64>> {
    entries.iter().map(|(id, rs)| (id.to_string(), rs.to_vec())).collect()
  }

  #[test]
  fn empty_history_yields_empty_output() {
    let scores = compute_ucb("l-1", &BTreeMap::new()).expect("empty is fine");
    assert!(scores.is_empty());
  }

  #[test]
  fn single_attempt_collapses_to_mean() {
    let scores = compute_ucb("l-1", &groups(&[("a", &[3.25])])).expect("ok");
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].ucb_index, 3.25);
    assert_eq!(scores[0].times_played, 1);
  }

  #[test]
  fn higher_mean_wins_at_equal_play_counts() {
    let scores =
      compute_ucb("l-1", &groups(&[("hi", &[3.0, 3.0]), ("lo", &[2.0, 2.0])])).expect("ok");
    let hi = scores.iter().find(|s| s.activity_id == "hi").unwrap();
    let lo = scores.iter().find(|s| s.activity_id == "lo").unwrap();
    assert!(hi.ucb_index > lo.ucb_index);
  }

  #[test]
  fn fewer_plays_win_at_equal_means() {
    let scores =
      compute_ucb("l-1", &groups(&[("rare", &[2.0]), ("often", &[2.0, 2.0, 2.0])])).expect("ok");
    let rare = scores.iter().find(|s| s.activity_id == "rare").unwrap();
    let often = scores.iter().find(|s| s.activity_id == "often").unwrap();
    assert!(rare.ucb_index > often.ucb_index);
  }

  #[test]
  fn degenerate_empty_bucket_fails_loudly() {
    let mut g = groups(&[("a", &[1.0])]);
    g.insert("ghost".into(), Vec::new());
    assert!(matches!(
      compute_ucb("l-1", &g),
      Err(ScoreError::DegenerateAggregation { .. })
    ));
  }

  #[test]
  fn worked_three_attempt_example() {
    let scores =
      compute_ucb("l-1", &groups(&[("A", &[2.0, 3.0]), ("B", &[1.0])])).expect("ok");
    let a = scores.iter().find(|s| s.activity_id == "A").unwrap();
    let b = scores.iter().find(|s| s.activity_id == "B").unwrap();

    assert_eq!(a.mean_reward, 2.5);
    assert_eq!(a.times_played, 2);
    let expected_a = 2.5 + (2.0 * 3.0_f64.ln() / 2.0).sqrt();
    assert!((a.ucb_index - expected_a).abs() < 1e-12);
    assert!((a.ucb_index - 3.548).abs() < 1e-3);

    assert_eq!(b.mean_reward, 1.0);
    let expected_b = 1.0 + (2.0 * 3.0_f64.ln()).sqrt();
    assert!((b.ucb_index - expected_b).abs() < 1e-12);
    assert!((b.ucb_index - 2.482).abs() < 1e-3);

    assert!(a.ucb_index > b.ucb_index, "A must outrank B");
  }

  #[test]
  fn rank_descending_orders_best_first() {
    let mut scores =
      compute_ucb("l-1", &groups(&[("A", &[2.0, 3.0]), ("B", &[1.0]), ("C", &[4.0, 4.0])]))
        .expect("ok");
    rank_descending(&mut scores);
    assert_eq!(scores[0].activity_id, "C");
    assert_eq!(scores.last().unwrap().activity_id, "B");
  }
}
