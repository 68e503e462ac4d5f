use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{
    models::{
        AlertRecord, AlertType, EquipmentHistoryEntry, Room, SystemCounts, UserProfile,
        UserRole, UserUpdate,
    },
    DocumentStore, StoreError,
};

/// In-memory [`DocumentStore`].
///
/// Used by the test suite and for running the service without Postgres
/// (`DOCUMENT_STORE=memory`). Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<Collections>>,
    unavailable: Arc<AtomicBool>,
}

#[derive(Default)]
struct Collections {
    rooms: BTreeMap<String, Room>,
    users: BTreeMap<String, UserProfile>,
    alerts: Vec<AlertRecord>,
    history: Vec<EquipmentHistoryEntry>,
    configuration: BTreeMap<String, Value>,
    rejected_alert_types: Vec<AlertType>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl MemoryDocumentStore {
    pub fn insert_room(&self, room: Room) {
        self.lock().rooms.insert(room.id.clone(), room);
    }

    pub fn insert_user(&self, user: UserProfile) {
        self.lock().users.insert(user.id.clone(), user);
    }

    /// All stored alerts, in insertion order.
    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.lock().alerts.clone()
    }

    /// The equipment history log, in insertion order.
    pub fn history(&self) -> Vec<EquipmentHistoryEntry> {
        self.lock().history.clone()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make inserting alerts of `alert_type` fail with [`StoreError::Unavailable`].
    pub fn reject_alerts_of_type(&self, alert_type: AlertType) {
        self.lock().rejected_alert_types.push(alert_type);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        self.check()?;
        Ok(self.lock().rooms.values().cloned().collect())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.check()?;
        Ok(self.lock().users.get(user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError> {
        self.check()?;
        let mut users: Vec<UserProfile> = self.lock().users.values().cloned().collect();
        users.sort_by(|a, b| a.date_creation.cmp(&b.date_creation).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn create_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        self.check()?;
        let mut collections = self.lock();
        if collections.users.contains_key(&user.id) {
            return Err(StoreError::UserExists(user.id.clone()));
        }
        collections.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserUpdate,
    ) -> Result<UserProfile, StoreError> {
        self.check()?;
        let mut collections = self.lock();
        let user = collections
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_owned()))?;
        user.nom = changes.nom.clone();
        user.prenom = changes.prenom.clone();
        user.role = changes.role;
        user.salle_assignee = changes.salle_assignee.clone();
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.lock()
            .users
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_owned()))
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut collections = self.lock();
        if collections.rejected_alert_types.contains(&alert.alert_type) {
            return Err(StoreError::Unavailable(format!(
                "{} alerts rejected",
                alert.alert_type
            )));
        }
        collections.alerts.push(alert.clone());
        Ok(())
    }

    async fn get_alert(
        &self,
        room_id: &str,
        alert_id: Uuid,
    ) -> Result<Option<AlertRecord>, StoreError> {
        self.check()?;
        Ok(self
            .lock()
            .alerts
            .iter()
            .find(|a| a.room_id == room_id && a.id == alert_id)
            .cloned())
    }

    async fn mark_alert_handled(
        &self,
        room_id: &str,
        alert_id: Uuid,
        handled_at: DateTime<Utc>,
    ) -> Result<AlertRecord, StoreError> {
        self.check()?;
        let mut collections = self.lock();
        let alert = collections
            .alerts
            .iter_mut()
            .find(|a| a.room_id == room_id && a.id == alert_id)
            .ok_or_else(|| StoreError::AlertNotFound {
                room_id: room_id.to_owned(),
                alert_id,
            })?;
        alert.handled = true;
        alert.handled_at = Some(handled_at);
        Ok(alert.clone())
    }

    async fn append_equipment_history(
        &self,
        entry: &EquipmentHistoryEntry,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.lock().history.push(entry.clone());
        Ok(())
    }

    async fn get_configuration(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        Ok(self.lock().configuration.get(id).cloned())
    }

    async fn put_configuration(&self, id: &str, document: &Value) -> Result<(), StoreError> {
        self.check()?;
        self.lock().configuration.insert(id.to_owned(), document.clone());
        Ok(())
    }

    async fn system_counts(&self) -> Result<SystemCounts, StoreError> {
        self.check()?;
        let collections = self.lock();
        let with_role =
            |role: UserRole| collections.users.values().filter(|u| u.role == role).count() as i64;
        Ok(SystemCounts {
            utilisateurs_total: collections.users.len() as i64,
            professeurs_total: with_role(UserRole::Professeur),
            admins_total: with_role(UserRole::Admin),
            salles_total: collections.rooms.len() as i64,
            alertes_total: collections.alerts.len() as i64,
        })
    }
}
