//! Rule engine for the under-utilization flag
//!
//! Each tracked entity carries a sparse weekly series. Relative to the current
//! ISO week the engine reads a trailing actual window (completed weeks) and a
//! leading forecast window (starting next week). A flag is raised only with
//! enough forecast points at or below the threshold; a stale rule flag is
//! cleared, never rewritten to false, once the forecast stops supporting it.
//!
//! Evaluation itself is pure. [`RuleEngine::run`] feeds the candidates through
//! [`StatusStore::merge_rule`], so manual entries are never touched.

use crate::status::{MergeOutcome, RuleUpdate, StatusStore};
use serde::{Deserialize, Serialize};
use staffsync_common::config::RuleConfig;
use staffsync_common::events::SyncEvent;
use staffsync_common::models::{StatusEntry, StatusSource, StatusValue};
use staffsync_common::time::WeekKey;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub mod series;

pub use series::{SeriesPoint, WeeklySeries, WindowStats};

/// An entity the engine evaluates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub key: String,
    /// Designated owner or supervisor
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub series: WeeklySeries,
}

impl TrackedEntity {
    pub fn new(key: impl Into<String>, owner: Option<&str>, series: WeeklySeries) -> Self {
        Self {
            key: key.into(),
            owner: owner.map(str::to_string),
            series,
        }
    }

    /// Blank owners count as absent
    pub fn has_owner(&self) -> bool {
        self.owner.as_deref().is_some_and(|o| !o.trim().is_empty())
    }
}

/// Result of evaluating one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluation {
    pub entity: String,
    pub avg_actual: Option<f64>,
    pub actual_points: usize,
    pub avg_forecast: Option<f64>,
    pub forecast_points: usize,
    pub candidate: Option<RuleUpdate>,
}

/// Summary of one rule run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRunReport {
    pub week: Option<WeekKey>,
    pub evaluations: Vec<RuleEvaluation>,
    pub evaluated: usize,
    pub set: usize,
    pub cleared: usize,
    pub unchanged: usize,
    pub skipped_manual: usize,
    pub skipped_no_owner: usize,
    /// Merges applied in memory whose persistence failed
    pub persist_failures: usize,
    /// Status entries could not be loaded, nothing was merged
    pub skipped_cycle: bool,
}

/// Windowed evaluation of weekly series
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: RuleConfig,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Evaluate one entity against its current status entry
    ///
    /// Returns `None` for entities without an owner; those are never flagged.
    pub fn evaluate_entity(
        &self,
        entity: &TrackedEntity,
        current_week: WeekKey,
        current: Option<&StatusEntry>,
    ) -> Option<RuleEvaluation> {
        if !entity.has_owner() {
            return None;
        }

        let actual = entity
            .series
            .actual_stats(&current_week.trailing(self.config.actual_window_weeks));
        let forecast = entity
            .series
            .forecast_stats(&current_week.leading(self.config.forecast_window_weeks));

        let supported = forecast.count >= self.config.min_forecast_points
            && forecast
                .mean
                .is_some_and(|avg| avg <= self.config.underutilization_threshold);
        let holds_rule_flag = current.is_some_and(|e| {
            e.source == StatusSource::Rule && e.value.as_flag() == Some(true)
        });

        let candidate = if supported {
            Some(RuleUpdate::Set(StatusValue::Flag(true)))
        } else if holds_rule_flag {
            Some(RuleUpdate::Clear)
        } else {
            None
        };

        Some(RuleEvaluation {
            entity: entity.key.clone(),
            avg_actual: actual.mean,
            actual_points: actual.count,
            avg_forecast: forecast.mean,
            forecast_points: forecast.count,
            candidate,
        })
    }

    /// Evaluate every entity against a status snapshot
    pub fn evaluate(
        &self,
        entities: &[TrackedEntity],
        current_week: WeekKey,
        snapshot: &HashMap<String, StatusEntry>,
    ) -> Vec<RuleEvaluation> {
        entities
            .iter()
            .filter_map(|e| self.evaluate_entity(e, current_week, snapshot.get(&e.key)))
            .collect()
    }

    /// Evaluate and merge candidates into `store`
    ///
    /// An unseeded store is loaded first; if that fails the cycle is skipped
    /// and the next run tries again.
    pub async fn run(
        &self,
        entities: &[TrackedEntity],
        current_week: WeekKey,
        store: &StatusStore,
    ) -> RuleRunReport {
        let mut report = RuleRunReport {
            week: Some(current_week),
            ..Default::default()
        };

        if !store.is_seeded() {
            if let Err(e) = store.load().await {
                warn!(week = %current_week, error = %e, "Status entries unavailable, skipping rule cycle");
                report.skipped_cycle = true;
                return report;
            }
        }

        let snapshot = store.snapshot().await;
        report.evaluations = self.evaluate(entities, current_week, &snapshot);
        report.evaluated = report.evaluations.len();
        report.skipped_no_owner = entities.len() - report.evaluated;

        for evaluation in &report.evaluations {
            let Some(candidate) = evaluation.candidate.clone() else {
                continue;
            };
            let is_clear = candidate == RuleUpdate::Clear;
            match store.merge_rule(&evaluation.entity, candidate).await {
                Ok(MergeOutcome::Applied) if is_clear => report.cleared += 1,
                Ok(MergeOutcome::Applied) => report.set += 1,
                Ok(MergeOutcome::SkippedManual) => report.skipped_manual += 1,
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    warn!(entity = %evaluation.entity, error = %e, "Rule merge not persisted");
                    report.persist_failures += 1;
                }
            }
        }

        for evaluation in report.evaluations.iter().filter(|e| e.candidate.is_none()) {
            debug!(entity = %evaluation.entity, points = evaluation.forecast_points, "No rule candidate");
        }

        info!(
            week = %current_week,
            evaluated = report.evaluated,
            set = report.set,
            cleared = report.cleared,
            skipped_manual = report.skipped_manual,
            "Rule cycle complete"
        );
        store.events().emit_lossy(SyncEvent::RulesEvaluated {
            evaluated: report.evaluated,
            set: report.set,
            cleared: report.cleared,
            skipped_manual: report.skipped_manual,
            timestamp: chrono::Utc::now(),
        });

        report
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(RuleConfig::default())
    }
}
