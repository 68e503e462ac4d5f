use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Mirrors the `alert_type` Postgres enum.
///
/// The kebab-case names are also the values written to the realtime mirror,
/// where embedded consumers match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "alert_type", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    TemperatureBasse,
    TemperatureHaute,
    HumiditeBasse,
    HumiditeHaute,
    QualiteAir,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertType::TemperatureBasse => "temperature-basse",
            AlertType::TemperatureHaute => "temperature-haute",
            AlertType::HumiditeBasse => "humidite-basse",
            AlertType::HumiditeHaute => "humidite-haute",
            AlertType::QualiteAir => "qualite-air",
        };
        f.write_str(s)
    }
}

/// Mirrors the `alert_severity` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "alert_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        };
        f.write_str(s)
    }
}

/// Mirrors the `equipment_kind` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "equipment_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    Climatiseur,
    Projecteur,
}

impl EquipmentKind {
    /// Realtime keys under `salles/{id}/equipements` holding this equipment's
    /// state. The projector is stored under both historical names.
    pub fn realtime_keys(self) -> &'static [&'static str] {
        match self {
            EquipmentKind::Climatiseur => &["climatiseur"],
            EquipmentKind::Projecteur => &["projecteur", "videoprojecteur"],
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EquipmentKind::Climatiseur => "climatiseur",
            EquipmentKind::Projecteur => "projecteur",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EquipmentKind {
    type Err = UnknownEquipment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "climatiseur" => Ok(Self::Climatiseur),
            "projecteur" | "videoprojecteur" => Ok(Self::Projecteur),
            other => Err(UnknownEquipment(other.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown equipment kind: {0:?}")]
pub struct UnknownEquipment(pub String);

/// Mirrors the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Professeur,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct AlertRecord {
    pub id: Uuid,
    pub room_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub handled: bool,
    pub handled_at: Option<DateTime<Utc>>,
    /// User signed in when the alert was raised, if any.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct EquipmentHistoryEntry {
    pub id: Uuid,
    pub room_id: String,
    pub equipment: EquipmentKind,
    /// `activation` or `désactivation`.
    pub action: String,
    pub recorded_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Room {
    pub id: String,
    pub nom: String,
    /// Free-form fields carried by the room document.
    #[schema(value_type = Object)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub role: UserRole,
    pub salle_assignee: Option<String>,
    pub date_creation: DateTime<Utc>,
}

/// Editable fields of a user profile. Email and creation date are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub nom: String,
    pub prenom: String,
    pub role: UserRole,
    #[serde(default)]
    pub salle_assignee: Option<String>,
}

/// Headline counts for the administration dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, ToSchema)]
pub struct SystemCounts {
    pub utilisateurs_total: i64,
    pub professeurs_total: i64,
    pub admins_total: i64,
    pub salles_total: i64,
    pub alertes_total: i64,
}
