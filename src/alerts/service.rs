use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::{
        models::{AlertRecord, AlertType, Severity},
        DocumentStore, StoreError,
    },
    realtime::{self, RealtimeError, RealtimeStore},
    sensors::SensorSnapshot,
};

use super::thresholds::breaches;

/// How many alerts `active_alerts` returns at most.
pub const ACTIVE_ALERT_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("unknown room: {0:?}")]
    UnknownRoom(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Some alerts of a snapshot were recorded before others failed.
    #[error("{} of {} alerts recorded: {source}", created.len(), created.len() + failed)]
    PartiallyRecorded {
        created: Vec<AlertRecord>,
        failed: usize,
        source: StoreError,
    },
    #[error("alert mirror write failed: {0}")]
    Mirror(#[from] RealtimeError),
}

/// An alert as mirrored in the realtime store, where embedded displays and
/// the mobile app read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MirroredAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub gravite: Severity,
    /// Client clock, ISO-8601.
    pub datetime: String,
    pub traitee: bool,
    #[serde(default)]
    pub utilisateur: Option<String>,
    #[serde(rename = "dateTraitement", default, skip_serializing_if = "Option::is_none")]
    pub date_traitement: Option<String>,
}

impl From<&AlertRecord> for MirroredAlert {
    fn from(a: &AlertRecord) -> Self {
        Self {
            id: a.id.to_string(),
            alert_type: a.alert_type,
            message: a.message.clone(),
            gravite: a.severity,
            datetime: iso(a.created_at),
            traitee: a.handled,
            utilisateur: a.user_id.clone(),
            date_traitement: a.handled_at.map(iso),
        }
    }
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Raises alerts from sensor snapshots and tracks their handling.
///
/// The document store is authoritative. Every alert is mirrored to the
/// realtime store afterwards; the two can briefly disagree.
pub struct AlertService {
    documents: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeStore>,
}

impl AlertService {
    pub fn new(documents: Arc<dyn DocumentStore>, realtime: Arc<dyn RealtimeStore>) -> Self {
        Self { documents, realtime }
    }

    /// Record one alert per breached metric of `snapshot`.
    ///
    /// Returns the alerts written to the document store. A failed mirror
    /// write does not undo or fail the alert. Repeated breaches produce
    /// repeated alerts.
    ///
    /// Every breach is attempted even when an earlier one fails to record.
    /// If only some were recorded the error is
    /// [`AlertError::PartiallyRecorded`], which carries the alerts that were.
    pub async fn evaluate_and_alert(
        &self,
        room_id: &str,
        snapshot: &SensorSnapshot,
        user_id: Option<&str>,
    ) -> Result<Vec<AlertRecord>, AlertError> {
        check_room(room_id)?;

        let mut created = Vec::new();
        let mut failed = 0;
        let mut first_failure = None;

        for breach in breaches(snapshot) {
            let alert = AlertRecord {
                id: Uuid::new_v4(),
                room_id: room_id.to_owned(),
                alert_type: breach.alert_type,
                message: breach.message,
                severity: breach.severity,
                created_at: Utc::now(),
                handled: false,
                handled_at: None,
                user_id: user_id.map(str::to_owned),
            };

            if let Err(e) = self.documents.insert_alert(&alert).await {
                error!(
                    room_id = %room_id,
                    alert_type = %alert.alert_type,
                    error = %e,
                    "Failed to record alert"
                );
                failed += 1;
                first_failure.get_or_insert(e);
                continue;
            }

            if let Err(e) = self.mirror(&alert).await {
                warn!(
                    room_id = %room_id,
                    alert_id = %alert.id,
                    error = %e,
                    "Alert recorded but realtime mirror write failed"
                );
            }

            info!(
                room_id = %room_id,
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                severity = %alert.severity,
                message = %alert.message,
                "Alert created"
            );
            created.push(alert);
        }

        match first_failure {
            None => Ok(created),
            Some(source) if created.is_empty() => Err(AlertError::Store(source)),
            Some(source) => Err(AlertError::PartiallyRecorded { created, failed, source }),
        }
    }

    async fn mirror(&self, alert: &AlertRecord) -> Result<(), RealtimeError> {
        let value = serde_json::to_value(MirroredAlert::from(alert))?;
        self.realtime
            .set(&realtime::alert_path(&alert.room_id, &alert.id.to_string()), value)
            .await
    }

    /// Acknowledge an alert in both stores.
    ///
    /// The document store is updated first. If the mirror update then fails
    /// the error is returned and the document stays handled.
    pub async fn mark_handled(
        &self,
        room_id: &str,
        alert_id: Uuid,
    ) -> Result<AlertRecord, AlertError> {
        check_room(room_id)?;

        let handled_at = Utc::now();
        let alert = self
            .documents
            .mark_alert_handled(room_id, alert_id, handled_at)
            .await?;

        let mut fields = Map::new();
        fields.insert("traitee".into(), json!(true));
        fields.insert("dateTraitement".into(), json!(iso(handled_at)));
        self.realtime
            .update(&realtime::alert_path(room_id, &alert_id.to_string()), fields)
            .await?;

        info!(room_id = %room_id, alert_id = %alert_id, "Alert marked as handled");
        Ok(alert)
    }

    /// One alert as recorded in the document store.
    pub async fn get(&self, room_id: &str, alert_id: Uuid) -> Result<AlertRecord, AlertError> {
        check_room(room_id)?;
        self.documents
            .get_alert(room_id, alert_id)
            .await?
            .ok_or_else(|| {
                AlertError::Store(StoreError::AlertNotFound {
                    room_id: room_id.to_owned(),
                    alert_id,
                })
            })
    }

    /// The most recent unhandled alerts of a room, newest first, as seen by
    /// realtime consumers.
    pub async fn active_alerts(&self, room_id: &str) -> Result<Vec<MirroredAlert>, AlertError> {
        check_room(room_id)?;

        let node = self.realtime.get(&realtime::alerts_path(room_id)).await?;
        let Value::Object(entries) = node else {
            return Ok(Vec::new());
        };

        let mut alerts: Vec<MirroredAlert> = entries
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<MirroredAlert>(value) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(room_id = %room_id, key = %key, error = %e, "Skipping malformed mirrored alert");
                    None
                }
            })
            .filter(|a| !a.traitee)
            .collect();

        // ISO-8601 strings in the same format sort chronologically.
        alerts.sort_by(|a, b| b.datetime.cmp(&a.datetime));
        alerts.truncate(ACTIVE_ALERT_LIMIT);
        Ok(alerts)
    }
}

fn check_room(room_id: &str) -> Result<(), AlertError> {
    if realtime::is_valid_key(room_id) {
        Ok(())
    } else {
        Err(AlertError::UnknownRoom(room_id.to_owned()))
    }
}
