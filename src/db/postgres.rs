use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    models::{AlertRecord, EquipmentHistoryEntry, Room, SystemCounts, UserProfile, UserUpdate},
    DocumentStore, StoreError,
};

/// Postgres-backed [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let rooms = sqlx::query_as::<_, Room>(
            "SELECT id, nom, extra FROM rooms ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rooms)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, email, nom, prenom, role, salle_assignee, date_creation
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError> {
        let users = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, email, nom, prenom, role, salle_assignee, date_creation
            FROM users
            ORDER BY date_creation, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, nom, prenom, role, salle_assignee, date_creation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.nom)
        .bind(&user.prenom)
        .bind(user.role)
        .bind(&user.salle_assignee)
        .bind(user.date_creation)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UserExists(user.id.clone()));
        }
        Ok(())
    }

    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserUpdate,
    ) -> Result<UserProfile, StoreError> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            UPDATE users
            SET nom = $2, prenom = $3, role = $4, salle_assignee = $5
            WHERE id = $1
            RETURNING id, email, nom, prenom, role, salle_assignee, date_creation
            "#,
        )
        .bind(user_id)
        .bind(&changes.nom)
        .bind(&changes.prenom)
        .bind(changes.role)
        .bind(&changes.salle_assignee)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::UserNotFound(user_id.to_owned()))
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(user_id.to_owned()));
        }
        Ok(())
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alerts
                (id, room_id, alert_type, message, severity, created_at, handled, handled_at, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.room_id)
        .bind(alert.alert_type)
        .bind(&alert.message)
        .bind(alert.severity)
        .bind(alert.created_at)
        .bind(alert.handled)
        .bind(alert.handled_at)
        .bind(&alert.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_alert(
        &self,
        room_id: &str,
        alert_id: Uuid,
    ) -> Result<Option<AlertRecord>, StoreError> {
        let alert = sqlx::query_as::<_, AlertRecord>(
            r#"
            SELECT id, room_id, alert_type, message, severity,
                   created_at, handled, handled_at, user_id
            FROM alerts
            WHERE room_id = $1 AND id = $2
            "#,
        )
        .bind(room_id)
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(alert)
    }

    async fn mark_alert_handled(
        &self,
        room_id: &str,
        alert_id: Uuid,
        handled_at: DateTime<Utc>,
    ) -> Result<AlertRecord, StoreError> {
        sqlx::query_as::<_, AlertRecord>(
            r#"
            UPDATE alerts
            SET handled = TRUE, handled_at = $3
            WHERE room_id = $1 AND id = $2
            RETURNING id, room_id, alert_type, message, severity,
                      created_at, handled, handled_at, user_id
            "#,
        )
        .bind(room_id)
        .bind(alert_id)
        .bind(handled_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::AlertNotFound {
            room_id: room_id.to_owned(),
            alert_id,
        })
    }

    async fn append_equipment_history(
        &self,
        entry: &EquipmentHistoryEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO equipment_history (id, room_id, equipment, action, recorded_at, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.room_id)
        .bind(entry.equipment)
        .bind(&entry.action)
        .bind(entry.recorded_at)
        .bind(&entry.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_configuration(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let document = sqlx::query_scalar::<_, Value>(
            "SELECT data FROM configuration WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    async fn put_configuration(&self, id: &str, document: &Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO configuration (id, data, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (id) DO UPDATE
            SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(id)
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn system_counts(&self) -> Result<SystemCounts, StoreError> {
        let counts = sqlx::query_as::<_, SystemCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users)                          AS utilisateurs_total,
                (SELECT COUNT(*) FROM users WHERE role = 'professeur') AS professeurs_total,
                (SELECT COUNT(*) FROM users WHERE role = 'admin')      AS admins_total,
                (SELECT COUNT(*) FROM rooms)                          AS salles_total,
                (SELECT COUNT(*) FROM alerts)                         AS alertes_total
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }
}
