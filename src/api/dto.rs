use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    admin::NewUser,
    db::models::{AlertRecord, UserRole},
    sensors::{Evaluation, SensorSnapshot},
};

/// Request body for `POST /rooms/{room_id}/evaluate`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SnapshotRequest {
    /// °C.
    pub temperature: Option<f64>,
    /// %.
    pub humidity: Option<f64>,
    /// ppm CO2.
    pub air_quality: Option<f64>,
    /// ISO-8601. Defaults to now.
    pub timestamp: Option<String>,
}

impl SnapshotRequest {
    pub fn into_snapshot(self, room_id: &str) -> SensorSnapshot {
        SensorSnapshot {
            room_id: room_id.to_owned(),
            temperature: self.temperature.filter(|v| v.is_finite()),
            humidity: self.humidity.filter(|v| v.is_finite()),
            air_quality: self.air_quality.filter(|v| v.is_finite()),
            timestamp: self
                .timestamp
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            extra: BTreeMap::new(),
        }
    }
}

/// Response for `POST /rooms/{room_id}/evaluate`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EvaluateResponse {
    pub evaluation: Evaluation,
    /// Alerts recorded for this snapshot. Empty when nothing breached.
    pub alerts: Vec<AlertRecord>,
}

/// Response for `GET /rooms/{room_id}/sensors`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SensorStatusDto {
    pub snapshot: SensorSnapshot,
    pub evaluation: Evaluation,
}

/// Request body for `POST /rooms/{room_id}/equipment/{kind}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleRequest {
    #[serde(alias = "actif")]
    pub active: bool,
}

/// Request body for `POST /admin/users`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewUserRequest {
    /// Identity provider user id.
    pub id: String,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    #[serde(default = "default_role")]
    pub role: UserRole,
    #[serde(default)]
    pub salle_assignee: Option<String>,
}

fn default_role() -> UserRole {
    UserRole::Professeur
}

impl From<NewUserRequest> for NewUser {
    fn from(r: NewUserRequest) -> Self {
        Self {
            id: r.id,
            email: r.email,
            nom: r.nom,
            prenom: r.prenom,
            role: r.role,
            salle_assignee: r.salle_assignee,
        }
    }
}
