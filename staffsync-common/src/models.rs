//! Assignment and status models
//!
//! Wire shapes use camelCase field names to match the remote document store.

use crate::uuid_utils;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Assignment id, either server-assigned or client-provisional
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(String);

impl AssignmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh provisional id for an optimistic insert
    pub fn provisional() -> Self {
        Self(uuid_utils::provisional_id())
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(uuid_utils::PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssignmentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Assignment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentStatus {
    Prospect,
    #[default]
    Planned,
    Active,
    OnHold,
    Closed,
}

impl AssignmentStatus {
    pub fn is_closed(self) -> bool {
        self == AssignmentStatus::Closed
    }

    /// Probability is only meaningful for planned or on-hold work
    pub fn allows_probability(self) -> bool {
        matches!(self, AssignmentStatus::Planned | AssignmentStatus::OnHold)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Prospect => "prospect",
            AssignmentStatus::Planned => "planned",
            AssignmentStatus::Active => "active",
            AssignmentStatus::OnHold => "onHold",
            AssignmentStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prospect" => Ok(AssignmentStatus::Prospect),
            "planned" => Ok(AssignmentStatus::Planned),
            "active" => Ok(AssignmentStatus::Active),
            "onHold" | "on_hold" | "onhold" => Ok(AssignmentStatus::OnHold),
            "closed" => Ok(AssignmentStatus::Closed),
            other => Err(Error::Validation(format!("Unknown assignment status '{}'", other))),
        }
    }
}

/// A record linking a person to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: AssignmentId,
    pub person_key: String,
    pub project_key: String,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_pct: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Server-side denormalized project name; never known to an optimistic insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    /// True unless the assignment is closed
    pub fn is_open(&self) -> bool {
        !self.status.is_closed()
    }

    /// True if this record links `person_key` to `project_key`
    pub fn links(&self, person_key: &str, project_key: &str) -> bool {
        self.person_key == person_key && self.project_key == project_key
    }

    /// Apply a patch in place and stamp `updated_at`
    pub fn apply_patch(&mut self, patch: &AssignmentPatch, updated_at: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(allocation_pct) = patch.allocation_pct {
            self.allocation_pct = allocation_pct;
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = end_date;
        }
        if let Some(probability) = patch.probability {
            self.probability = probability;
        }
        if let Some(comment) = &patch.comment {
            self.comment = comment.clone();
        }
        self.updated_at = updated_at;
    }
}

/// Caller-supplied metadata for a new link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentMeta {
    /// Defaults to planned when absent
    pub status: Option<AssignmentStatus>,
    pub allocation_pct: Option<u8>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub probability: Option<u8>,
    pub comment: Option<String>,
}

/// Assignment payload without an id, as sent to the remote create call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub person_key: String,
    pub project_key: String,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_pct: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl NewAssignment {
    pub fn from_meta(person_key: &str, project_key: &str, meta: AssignmentMeta) -> Self {
        Self {
            person_key: person_key.to_string(),
            project_key: project_key.to_string(),
            status: meta.status.unwrap_or_default(),
            allocation_pct: meta.allocation_pct,
            start_date: meta.start_date,
            end_date: meta.end_date,
            probability: meta.probability,
            comment: meta.comment,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_allocation(self.allocation_pct)?;
        check_dates(self.start_date, self.end_date)?;
        check_probability(self.probability, Some(self.status))
    }

    /// Materialize the payload as a full record under `id`
    pub fn into_record(self, id: AssignmentId, now: DateTime<Utc>) -> Assignment {
        Assignment {
            id,
            person_key: self.person_key,
            project_key: self.project_key,
            status: self.status,
            allocation_pct: self.allocation_pct,
            start_date: self.start_date,
            end_date: self.end_date,
            probability: self.probability,
            comment: self.comment,
            project_name: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an assignment
///
/// Outer `None` leaves a field untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AssignmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_pct: Option<Option<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<Option<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<Option<String>>,
}

impl AssignmentPatch {
    pub fn status(status: AssignmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Check the fields this patch writes
    ///
    /// Untouched fields are not re-checked, so a record may carry a value an
    /// earlier status allowed (a probability after planned -> active) without
    /// blocking later patches. Dates are checked as a pair once either one is
    /// written; a probability is checked against the status the record ends up
    /// with. Without `current`, only what the patch itself carries is checked.
    pub fn validate_against(&self, current: Option<&Assignment>) -> Result<()> {
        if let Some(pct) = self.allocation_pct {
            check_allocation(pct)?;
        }
        if self.start_date.is_some() || self.end_date.is_some() {
            let start = self
                .start_date
                .unwrap_or_else(|| current.and_then(|c| c.start_date));
            let end = self.end_date.unwrap_or_else(|| current.and_then(|c| c.end_date));
            check_dates(start, end)?;
        }
        if let Some(probability) = self.probability {
            let status = self.status.or_else(|| current.map(|c| c.status));
            check_probability(probability, status)?;
        }
        Ok(())
    }
}

fn check_allocation(allocation_pct: Option<u8>) -> Result<()> {
    match allocation_pct {
        Some(pct) if pct > 100 => Err(Error::Validation(format!(
            "allocationPct must be within 0-100, got {}",
            pct
        ))),
        _ => Ok(()),
    }
}

fn check_dates(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Result<()> {
    match (start_date, end_date) {
        (Some(start), Some(end)) if end < start => Err(Error::Validation(format!(
            "endDate {} is before startDate {}",
            end, start
        ))),
        _ => Ok(()),
    }
}

/// `status` is `None` when the status of the target record is unknown
fn check_probability(probability: Option<u8>, status: Option<AssignmentStatus>) -> Result<()> {
    let Some(p) = probability else {
        return Ok(());
    };
    if p > 100 {
        return Err(Error::Validation(format!(
            "probability must be within 0-100, got {}",
            p
        )));
    }
    match status {
        Some(status) if !status.allows_probability() => Err(Error::Validation(format!(
            "probability is not meaningful for status '{}'",
            status
        ))),
        _ => Ok(()),
    }
}

/// Provenance of a derived status value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Manual,
    Rule,
    Default,
}

impl StatusSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusSource::Manual => "manual",
            StatusSource::Rule => "rule",
            StatusSource::Default => "default",
        }
    }
}

impl fmt::Display for StatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(StatusSource::Manual),
            "rule" => Ok(StatusSource::Rule),
            "default" => Ok(StatusSource::Default),
            other => Err(Error::Validation(format!("Unknown status source '{}'", other))),
        }
    }
}

/// Value of a derived attribute: an action flag or a status label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Flag(bool),
    Label(String),
}

impl StatusValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            StatusValue::Flag(b) => Some(*b),
            StatusValue::Label(_) => None,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusValue::Flag(b) => write!(f, "{}", b),
            StatusValue::Label(s) => f.write_str(s),
        }
    }
}

impl From<bool> for StatusValue {
    fn from(b: bool) -> Self {
        StatusValue::Flag(b)
    }
}

impl From<&str> for StatusValue {
    fn from(s: &str) -> Self {
        StatusValue::Label(s.to_string())
    }
}

/// In-memory status entry for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub value: StatusValue,
    pub source: StatusSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Persisted status row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub entity: String,
    pub value: StatusValue,
    pub source: StatusSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> Assignment {
        NewAssignment::from_meta("anna", "p1", AssignmentMeta::default())
            .into_record(AssignmentId::new("a-1"), Utc::now())
    }

    #[test]
    fn test_status_defaults_to_planned() {
        let payload = NewAssignment::from_meta("anna", "p1", AssignmentMeta::default());
        assert_eq!(payload.status, AssignmentStatus::Planned);
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&AssignmentStatus::OnHold).unwrap();
        assert_eq!(json, "\"onHold\"");
        assert_eq!("onHold".parse::<AssignmentStatus>().unwrap(), AssignmentStatus::OnHold);
        assert!("archived".parse::<AssignmentStatus>().is_err());
    }

    #[test]
    fn test_assignment_deserializes_camel_case() {
        let json = r#"{
            "id": "a-9",
            "personKey": "tom",
            "projectKey": "p2",
            "status": "active",
            "allocationPct": 50,
            "projectName": "Apollo",
            "createdAt": "2026-01-05T10:00:00Z",
            "updatedAt": "2026-01-05T10:00:00Z"
        }"#;
        let a: Assignment = serde_json::from_str(json).unwrap();
        assert_eq!(a.id, AssignmentId::new("a-9"));
        assert_eq!(a.allocation_pct, Some(50));
        assert_eq!(a.project_name.as_deref(), Some("Apollo"));
        assert!(a.start_date.is_none());
    }

    #[test]
    fn test_provisional_id_detection() {
        assert!(AssignmentId::provisional().is_provisional());
        assert!(!AssignmentId::new("a-1").is_provisional());
    }

    #[test]
    fn test_new_assignment_rejects_allocation_over_100() {
        let mut payload = NewAssignment::from_meta("anna", "p1", AssignmentMeta::default());
        payload.allocation_pct = Some(101);
        assert!(matches!(payload.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_new_assignment_rejects_end_before_start() {
        let mut payload = NewAssignment::from_meta("anna", "p1", AssignmentMeta::default());
        payload.start_date = Some(date(2026, 3, 1));
        payload.end_date = Some(date(2026, 2, 1));
        assert!(payload.validate().is_err());

        payload.end_date = Some(date(2026, 3, 1));
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_new_assignment_probability_only_for_planned_or_on_hold() {
        let mut payload = NewAssignment::from_meta("anna", "p1", AssignmentMeta::default());
        payload.probability = Some(60);
        assert!(payload.validate().is_ok());

        payload.status = AssignmentStatus::Active;
        assert!(payload.validate().is_err());

        payload.status = AssignmentStatus::OnHold;
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_status_change_keeps_earlier_probability_valid() {
        let mut a = sample();
        a.probability = Some(50);

        let activate = AssignmentPatch::status(AssignmentStatus::Active);
        assert!(activate.validate_against(Some(&a)).is_ok());

        a.apply_patch(&activate, a.updated_at);
        let comment = AssignmentPatch {
            comment: Some(Some("kickoff done".into())),
            ..Default::default()
        };
        assert!(comment.validate_against(Some(&a)).is_ok());
    }

    #[test]
    fn test_patch_probability_checked_against_resulting_status() {
        let a = sample();

        let with_active = AssignmentPatch {
            status: Some(AssignmentStatus::Active),
            probability: Some(Some(40)),
            ..Default::default()
        };
        assert!(with_active.validate_against(Some(&a)).is_err());

        let on_planned = AssignmentPatch {
            probability: Some(Some(40)),
            ..Default::default()
        };
        assert!(on_planned.validate_against(Some(&a)).is_ok());

        let cleared = AssignmentPatch {
            status: Some(AssignmentStatus::Active),
            probability: Some(None),
            ..Default::default()
        };
        assert!(cleared.validate_against(Some(&a)).is_ok());
    }

    #[test]
    fn test_patch_dates_checked_with_current_values() {
        let mut a = sample();
        a.start_date = Some(date(2026, 3, 1));

        let early_end = AssignmentPatch {
            end_date: Some(Some(date(2026, 2, 1))),
            ..Default::default()
        };
        assert!(early_end.validate_against(Some(&a)).is_err());
        assert!(early_end.validate_against(None).is_ok());

        let over = AssignmentPatch {
            allocation_pct: Some(Some(150)),
            ..Default::default()
        };
        assert!(matches!(over.validate_against(None), Err(Error::Validation(_))));
    }

    #[test]
    fn test_apply_patch_sets_and_clears() {
        let mut a = sample();
        a.comment = Some("old".into());
        let later = a.updated_at + chrono::Duration::seconds(5);
        let patch = AssignmentPatch {
            status: Some(AssignmentStatus::Active),
            allocation_pct: Some(Some(80)),
            comment: Some(None),
            ..Default::default()
        };
        a.apply_patch(&patch, later);
        assert_eq!(a.status, AssignmentStatus::Active);
        assert_eq!(a.allocation_pct, Some(80));
        assert_eq!(a.comment, None);
        assert_eq!(a.updated_at, later);
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = AssignmentPatch {
            allocation_pct: Some(None),
            ..AssignmentPatch::status(AssignmentStatus::Closed)
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"status": "closed", "allocationPct": null}));
        assert!(AssignmentPatch::default().is_empty());
    }

    #[test]
    fn test_status_value_untagged() {
        let flag: StatusValue = serde_json::from_str("true").unwrap();
        assert_eq!(flag, StatusValue::Flag(true));
        let label: StatusValue = serde_json::from_str("\"at risk\"").unwrap();
        assert_eq!(label, StatusValue::Label("at risk".into()));
    }
}
