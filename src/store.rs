//! REST client for the remote score store.
//!
//! The store owns persistence; this client only moves records. All calls are
//! instrumented and log ids, counts and statuses (never full payloads).
//! Activity profiles are cached per run: the indices are static for the
//! duration of a scoring pass, so each activity is fetched at most once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::checkpoint::CHECKPOINT_FORMAT;
use crate::config::EngineConfig;
use crate::domain::{ActivityProfile, ActivityUcbScore, AttemptRecord, RewardScore, ScoredResultRow};

const AGENT: &str = "activity-scoring-engine/0.1";

#[derive(Clone)]
pub struct ScoreStore {
  client: reqwest::Client,
  base_url: String,
  profiles: Arc<RwLock<HashMap<String, ActivityProfile>>>,
}

impl ScoreStore {
  pub fn new(cfg: &EngineConfig) -> Result<Self, String> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.store_timeout_secs))
      .build()
      .map_err(|e| format!("failed to build HTTP client: {e}"))?;
    Ok(Self {
      client,
      base_url: cfg.store_base_url.clone(),
      profiles: Arc::new(RwLock::new(HashMap::new())),
    })
  }

  /// Attempts completed since the checkpoint. Rows that fail boundary
  /// validation are skipped with a warning; the batch survives.
  #[instrument(level = "info", skip(self), fields(%since))]
  pub async fn fetch_attempts_since(
    &self,
    since: NaiveDateTime,
  ) -> Result<Vec<AttemptRecord>, String> {
    let since_str = since.format(CHECKPOINT_FORMAT).to_string();
    let url = format!("{}/attempts/{}", self.base_url, since_str);
    let rows: Vec<serde_json::Value> = self.get_json(&url).await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
      match AttemptRecord::from_row(row) {
        Ok(rec) => records.push(rec),
        Err(e) => {
          warn!(target: "scoring_engine", error = %e, "skipping unparseable attempt row");
        }
      }
    }
    info!(
      target: "scoring_engine",
      fetched = rows.len(),
      valid = records.len(),
      "fetched new attempts"
    );
    Ok(records)
  }

  /// Static indices for one activity, cached per run.
  /// `Ok(None)` means the store has no such activity (HTTP 404).
  #[instrument(level = "info", skip(self), fields(%activity_id))]
  pub async fn activity_profile(
    &self,
    activity_id: &str,
  ) -> Result<Option<ActivityProfile>, String> {
    if let Some(profile) = self.profiles.read().await.get(activity_id) {
      return Ok(Some(*profile));
    }

    let url = format!("{}/activities/{}", self.base_url, activity_id);
    let res = self
      .client
      .get(&url)
      .header(USER_AGENT, AGENT)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if res.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !res.status().is_success() {
      return Err(format!("store HTTP {} for {}", res.status(), url));
    }

    let profile: ActivityProfile = res.json().await.map_err(|e| e.to_string())?;
    self.profiles.write().await.insert(activity_id.to_string(), profile);
    Ok(Some(profile))
  }

  /// Persist one computed reward against its result row.
  #[instrument(level = "info", skip(self, score), fields(result_id = %score.result_id))]
  pub async fn store_reward(&self, score: &RewardScore) -> Result<(), String> {
    let url = format!("{}/attempts/{}", self.base_url, score.result_id);
    self.send_json(self.client.put(&url), score).await
  }

  /// Every result row that already carries a persisted reward. Input to the
  /// aggregation pass. Rows without a usable reward (attempts skipped at
  /// scoring time, or whose reward update failed) are dropped individually
  /// with a warning, same as unparseable attempt rows on fetch.
  #[instrument(level = "info", skip(self))]
  pub async fn fetch_scored_results(&self) -> Result<Vec<ScoredResultRow>, String> {
    let url = format!("{}/attempts", self.base_url);
    let raw: Vec<serde_json::Value> = self.get_json(&url).await?;

    let mut rows = Vec::with_capacity(raw.len());
    for row in &raw {
      match ScoredResultRow::from_row(row) {
        Ok(r) => rows.push(r),
        Err(e) => {
          warn!(target: "scoring_engine", error = %e, "skipping result row without a usable reward");
        }
      }
    }
    info!(
      target: "scoring_engine",
      fetched = raw.len(),
      scored = rows.len(),
      "fetched scored results"
    );
    Ok(rows)
  }

  /// Does the store already hold a UCB entry for this (learner, activity)
  /// pair? Decides insert vs update.
  #[instrument(level = "info", skip(self), fields(%learner_id, %activity_id))]
  pub async fn has_ucb_entry(&self, learner_id: &str, activity_id: &str) -> Result<bool, String> {
    let url = format!("{}/ucb/{}", self.base_url, learner_id);
    let res = self
      .client
      .get(&url)
      .header(USER_AGENT, AGENT)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if res.status() == StatusCode::NOT_FOUND {
      return Ok(false);
    }
    if !res.status().is_success() {
      return Err(format!("store HTTP {} for {}", res.status(), url));
    }

    let entries: Vec<serde_json::Value> = res.json().await.map_err(|e| e.to_string())?;
    Ok(
      entries
        .iter()
        .filter_map(|e| e.get("activityId").and_then(|v| v.as_str()))
        .any(|id| id == activity_id),
    )
  }

  /// Insert or update one UCB score depending on prior existence.
  #[instrument(
    level = "info",
    skip(self, score),
    fields(learner_id = %score.learner_id, activity_id = %score.activity_id)
  )]
  pub async fn upsert_ucb(&self, score: &ActivityUcbScore) -> Result<(), String> {
    let exists = self.has_ucb_entry(&score.learner_id, &score.activity_id).await?;
    if exists {
      let url = format!("{}/ucb/{}", self.base_url, score.learner_id);
      self.send_json(self.client.put(&url), score).await
    } else {
      let url = format!("{}/ucb", self.base_url);
      self.send_json(self.client.post(&url), score).await
    }
  }

  async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, String> {
    let res = self
      .client
      .get(url)
      .header(USER_AGENT, AGENT)
      .send()
      .await
      .map_err(|e| e.to_string())?;
    if !res.status().is_success() {
      return Err(format!("store HTTP {} for {}", res.status(), url));
    }
    res.json::<T>().await.map_err(|e| e.to_string())
  }

  async fn send_json<B: serde::Serialize>(
    &self,
    req: reqwest::RequestBuilder,
    body: &B,
  ) -> Result<(), String> {
    let res = req
      .header(USER_AGENT, AGENT)
      .header(CONTENT_TYPE, "application/json")
      .json(body)
      .send()
      .await
      .map_err(|e| e.to_string())?;
    if !res.status().is_success() {
      return Err(format!("store HTTP {}", res.status()));
    }
    Ok(())
  }
}
