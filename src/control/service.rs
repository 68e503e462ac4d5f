use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::{
        models::{EquipmentHistoryEntry, EquipmentKind, Room},
        DocumentStore, StoreError,
    },
    realtime::{self, RealtimeError, RealtimeStore},
    sensors::SensorSnapshot,
};

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("unknown room: {0:?}")]
    UnknownRoom(String),
    #[error("equipment write failed: {0}")]
    Realtime(#[from] RealtimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// State of one piece of equipment, as stored under
/// `salles/{id}/equipements/{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EquipmentState {
    #[serde(rename = "actif")]
    pub active: bool,
    #[serde(rename = "dernierChangement")]
    pub last_changed: DateTime<Utc>,
}

/// A room as seen by realtime consumers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RoomState {
    pub room_id: String,
    pub sensors: Option<SensorSnapshot>,
    /// Equipment nodes keyed by name, with the projector present under both
    /// of its names whenever either exists.
    #[schema(value_type = Object)]
    pub equipment: Map<String, Value>,
}

pub struct ControlService {
    documents: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeStore>,
}

impl ControlService {
    pub fn new(documents: Arc<dyn DocumentStore>, realtime: Arc<dyn RealtimeStore>) -> Self {
        Self { documents, realtime }
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, ControlError> {
        Ok(self.documents.list_rooms().await?)
    }

    /// Switch `kind` on or off in `room_id`.
    ///
    /// Every realtime key of the equipment is overwritten (the projector has
    /// two and both must succeed), then one history entry is appended. There
    /// is no rollback: on error some keys may already hold the new state.
    pub async fn toggle(
        &self,
        room_id: &str,
        kind: EquipmentKind,
        active: bool,
        user_id: Option<&str>,
    ) -> Result<EquipmentState, ControlError> {
        check_room(room_id)?;

        let state = EquipmentState { active, last_changed: Utc::now() };
        let node = json!({
            "actif": state.active,
            "dernierChangement": state.last_changed.to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let paths: Vec<String> = kind
            .realtime_keys()
            .iter()
            .map(|key| realtime::equipment_path(room_id, key))
            .collect();
        try_join_all(paths.iter().map(|path| self.realtime.set(path, node.clone()))).await?;

        let entry = EquipmentHistoryEntry {
            id: Uuid::new_v4(),
            room_id: room_id.to_owned(),
            equipment: kind,
            action: if active { "activation" } else { "désactivation" }.to_owned(),
            recorded_at: state.last_changed,
            user_id: user_id.map(str::to_owned),
        };
        self.documents.append_equipment_history(&entry).await?;

        info!(
            room_id = %room_id,
            equipment = %kind,
            active,
            "Equipment switched"
        );
        Ok(state)
    }

    /// Current realtime view of a room.
    pub async fn room_state(&self, room_id: &str) -> Result<RoomState, ControlError> {
        check_room(room_id)?;

        let node = self.realtime.get(&realtime::room_path(room_id)).await?;
        let sensors = node
            .get("capteurs")
            .and_then(|c| SensorSnapshot::from_node(room_id, c));
        let mut equipment = match node.get("equipements") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        reconcile_projector(&mut equipment);

        Ok(RoomState { room_id: room_id.to_owned(), sensors, equipment })
    }
}

/// Fill in whichever projector key is missing from the other one.
pub fn reconcile_projector(equipment: &mut Map<String, Value>) {
    let [a, b] = ["projecteur", "videoprojecteur"];
    match (equipment.get(a).cloned(), equipment.get(b).cloned()) {
        (Some(v), None) => {
            equipment.insert(b.to_owned(), v);
        }
        (None, Some(v)) => {
            equipment.insert(a.to_owned(), v);
        }
        _ => {}
    }
}

fn check_room(room_id: &str) -> Result<(), ControlError> {
    if realtime::is_valid_key(room_id) {
        Ok(())
    } else {
        Err(ControlError::UnknownRoom(room_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryDocumentStore, realtime::MemoryRealtimeStore};

    struct Fixture {
        service: ControlService,
        documents: MemoryDocumentStore,
        realtime: MemoryRealtimeStore,
    }

    fn fixture() -> Fixture {
        let documents = MemoryDocumentStore::new();
        let realtime = MemoryRealtimeStore::new();
        Fixture {
            service: ControlService::new(Arc::new(documents.clone()), Arc::new(realtime.clone())),
            documents,
            realtime,
        }
    }

    #[tokio::test]
    async fn projector_writes_both_keys() {
        let f = fixture();
        let state = f
            .service
            .toggle("A101", EquipmentKind::Projecteur, true, Some("u1"))
            .await
            .unwrap();
        assert!(state.active);

        let eq = f.realtime.snapshot("salles/A101/equipements");
        assert_eq!(eq["projecteur"]["actif"], true);
        assert_eq!(eq["videoprojecteur"]["actif"], true);
        assert_eq!(eq["projecteur"], eq["videoprojecteur"]);

        let history = f.documents.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].equipment, EquipmentKind::Projecteur);
        assert_eq!(history[0].action, "activation");
        assert_eq!(history[0].user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn air_conditioner_writes_one_key() {
        let f = fixture();
        f.service
            .toggle("A101", EquipmentKind::Climatiseur, false, None)
            .await
            .unwrap();

        let eq = f.realtime.snapshot("salles/A101/equipements");
        assert_eq!(eq["climatiseur"]["actif"], false);
        assert!(eq.get("projecteur").is_none());
        assert_eq!(f.documents.history()[0].action, "désactivation");
    }

    #[tokio::test]
    async fn toggle_overwrites_whole_node() {
        let f = fixture();
        f.realtime
            .set(
                "salles/A101/equipements/climatiseur",
                json!({ "actif": false, "consigne": 21 }),
            )
            .await
            .unwrap();

        f.service
            .toggle("A101", EquipmentKind::Climatiseur, true, None)
            .await
            .unwrap();

        let node = f.realtime.snapshot("salles/A101/equipements/climatiseur");
        assert_eq!(node["actif"], true);
        assert!(node.get("consigne").is_none());
        assert!(node["dernierChangement"].is_string());
    }

    #[tokio::test]
    async fn projector_fails_if_either_key_fails() {
        let f = fixture();
        f.realtime.fail_writes_under("salles/A101/equipements/videoprojecteur");

        let err = f
            .service
            .toggle("A101", EquipmentKind::Projecteur, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Realtime(_)));
        assert!(f.documents.history().is_empty());
    }

    #[tokio::test]
    async fn history_failure_fails_toggle() {
        let f = fixture();
        f.documents.set_unavailable(true);

        let err = f
            .service
            .toggle("A101", EquipmentKind::Climatiseur, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Store(_)));
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let f = fixture();
        f.service.toggle("A101", EquipmentKind::Projecteur, true, None).await.unwrap();
        f.service.toggle("A101", EquipmentKind::Projecteur, false, None).await.unwrap();

        let eq = f.realtime.snapshot("salles/A101/equipements");
        assert_eq!(eq["projecteur"]["actif"], false);
        assert_eq!(eq["videoprojecteur"]["actif"], false);
        assert_eq!(f.documents.history().len(), 2);
    }

    #[tokio::test]
    async fn empty_room_is_rejected() {
        let f = fixture();
        let err = f
            .service
            .toggle("", EquipmentKind::Climatiseur, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::UnknownRoom(_)));
    }

    #[tokio::test]
    async fn room_state_fills_missing_projector_alias() {
        let f = fixture();
        f.realtime
            .set(
                "salles/A101",
                json!({
                    "capteurs": { "temperature": 23 },
                    "equipements": { "videoprojecteur": { "actif": true } }
                }),
            )
            .await
            .unwrap();

        let state = f.service.room_state("A101").await.unwrap();
        assert_eq!(state.equipment["projecteur"]["actif"], true);
        assert_eq!(state.sensors.unwrap().temperature, Some(23.0));
    }

    #[tokio::test]
    async fn room_state_of_unknown_room_is_empty() {
        let f = fixture();
        let state = f.service.room_state("Z999").await.unwrap();
        assert!(state.sensors.is_none());
        assert!(state.equipment.is_empty());
    }

    #[test]
    fn reconcile_leaves_both_present_alone() {
        let mut eq = Map::new();
        eq.insert("projecteur".into(), json!({ "actif": true }));
        eq.insert("videoprojecteur".into(), json!({ "actif": false }));
        reconcile_projector(&mut eq);
        assert_eq!(eq["projecteur"]["actif"], true);
        assert_eq!(eq["videoprojecteur"]["actif"], false);
    }
}
