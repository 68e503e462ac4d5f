use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// One reading of a room's sensors.
///
/// Built from the room's `capteurs` node, which devices write as
/// `{ "temperature": °C, "humidite": %, "qualiteAir": ppm CO2, "timestamp": ISO-8601 }`.
/// A metric that is missing or not numeric is `None` (unknown).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorSnapshot {
    pub room_id: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub air_quality: Option<f64>,
    /// ISO-8601. Epoch milliseconds written by the device are converted;
    /// any other non-string value is kept in `extra` and replaced by the
    /// time of reading.
    pub timestamp: String,
    /// Fields of the node other than the known metrics.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub extra: BTreeMap<String, Value>,
}

const TEMPERATURE: &str = "temperature";
const HUMIDITY: &str = "humidite";
const AIR_QUALITY: &str = "qualiteAir";
const TIMESTAMP: &str = "timestamp";

impl SensorSnapshot {
    /// Map a `capteurs` node to a snapshot.
    ///
    /// Returns `None` when the node holds no object (the room has not
    /// reported anything yet).
    pub fn from_node(room_id: &str, node: &Value) -> Option<Self> {
        let Value::Object(fields) = node else {
            return None;
        };

        let mut snapshot = Self {
            room_id: room_id.to_owned(),
            temperature: None,
            humidity: None,
            air_quality: None,
            timestamp: String::new(),
            extra: BTreeMap::new(),
        };

        for (key, value) in fields {
            match key.as_str() {
                TEMPERATURE => snapshot.temperature = metric(value),
                HUMIDITY => snapshot.humidity = metric(value),
                AIR_QUALITY => snapshot.air_quality = metric(value),
                TIMESTAMP => match timestamp(value) {
                    Some(ts) => snapshot.timestamp = ts,
                    None => {
                        snapshot.extra.insert(key.clone(), value.clone());
                    }
                },
                _ => {
                    snapshot.extra.insert(key.clone(), value.clone());
                }
            }
        }

        if snapshot.timestamp.is_empty() {
            snapshot.timestamp = iso(Utc::now());
        }
        Some(snapshot)
    }
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Strings as written, integers as epoch milliseconds.
fn timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(iso),
        _ => None,
    }
}

/// Numbers, and numeric strings some firmwares send, are accepted.
fn metric(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}
