pub mod memory;
pub mod models;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use self::models::{
    AlertRecord, EquipmentHistoryEntry, Room, SystemCounts, UserProfile, UserUpdate,
};

pub use self::memory::MemoryDocumentStore;
pub use self::postgres::PgDocumentStore;

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("alert {alert_id} not found in room {room_id}")]
    AlertNotFound { room_id: String, alert_id: Uuid },
    #[error("user {0:?} not found")]
    UserNotFound(String),
    #[error("user {0:?} already exists")]
    UserExists(String),
    #[error("document store query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// The authoritative document store.
///
/// Holds rooms, user profiles, alerts, the equipment history log and the
/// `configuration` documents.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Every profile, oldest first.
    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError>;

    /// Fails with [`StoreError::UserExists`] if the id is taken.
    async fn create_user(&self, user: &UserProfile) -> Result<(), StoreError>;

    /// Fails with [`StoreError::UserNotFound`] if there is no such profile.
    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserUpdate,
    ) -> Result<UserProfile, StoreError>;

    /// Fails with [`StoreError::UserNotFound`] if there is no such profile.
    async fn delete_user(&self, user_id: &str) -> Result<(), StoreError>;

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<(), StoreError>;

    async fn get_alert(
        &self,
        room_id: &str,
        alert_id: Uuid,
    ) -> Result<Option<AlertRecord>, StoreError>;

    /// Flag an alert as handled and return the updated record.
    ///
    /// Fails with [`StoreError::AlertNotFound`] if the room holds no such alert.
    async fn mark_alert_handled(
        &self,
        room_id: &str,
        alert_id: Uuid,
        handled_at: DateTime<Utc>,
    ) -> Result<AlertRecord, StoreError>;

    async fn append_equipment_history(
        &self,
        entry: &EquipmentHistoryEntry,
    ) -> Result<(), StoreError>;

    async fn get_configuration(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Create or fully replace a configuration document.
    async fn put_configuration(&self, id: &str, document: &Value) -> Result<(), StoreError>;

    async fn system_counts(&self) -> Result<SystemCounts, StoreError>;
}
