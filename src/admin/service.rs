use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    db::{
        models::{SystemCounts, UserProfile, UserRole, UserUpdate},
        DocumentStore, StoreError,
    },
    realtime,
};

use super::settings::{Settings, SETTINGS_DOCUMENT};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("invalid user: {0}")]
    InvalidUser(String),
    #[error("invalid settings: {}", .0.join("; "))]
    InvalidSettings(Vec<String>),
    #[error("stored settings are unreadable: {0}")]
    CorruptSettings(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A profile to create. The id is the one issued by the identity provider
/// when the account was registered there.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub role: UserRole,
    pub salle_assignee: Option<String>,
}

/// User profiles, site settings and dashboard counts.
pub struct AdminService {
    documents: Arc<dyn DocumentStore>,
}

impl AdminService {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, AdminError> {
        Ok(self.documents.list_users().await?)
    }

    pub async fn create_user(&self, new: NewUser) -> Result<UserProfile, AdminError> {
        if !realtime::is_valid_key(&new.id) {
            return Err(AdminError::InvalidUser(format!("bad id {:?}", new.id)));
        }
        if !is_plausible_email(&new.email) {
            return Err(AdminError::InvalidUser(format!("bad email {:?}", new.email)));
        }
        let salle_assignee = self.check_room(new.salle_assignee).await?;

        let user = UserProfile {
            id: new.id,
            email: new.email.trim().to_owned(),
            nom: new.nom,
            prenom: new.prenom,
            role: new.role,
            salle_assignee,
            date_creation: Utc::now(),
        };
        self.documents.create_user(&user).await?;

        info!(user_id = %user.id, role = ?user.role, "User created");
        Ok(user)
    }

    pub async fn update_user(
        &self,
        user_id: &str,
        mut changes: UserUpdate,
    ) -> Result<UserProfile, AdminError> {
        changes.salle_assignee = self.check_room(changes.salle_assignee).await?;
        let user = self.documents.update_user(user_id, &changes).await?;

        info!(user_id = %user_id, role = ?user.role, "User updated");
        Ok(user)
    }

    /// Removes the profile only. The identity provider account stays, and
    /// signs in as a `professeur` without an assigned room.
    pub async fn delete_user(&self, user_id: &str) -> Result<(), AdminError> {
        self.documents.delete_user(user_id).await?;
        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Current settings. Writes the defaults first if none were saved yet.
    pub async fn settings(&self) -> Result<Settings, AdminError> {
        match self.documents.get_configuration(SETTINGS_DOCUMENT).await? {
            Some(document) => Ok(serde_json::from_value(document)?),
            None => {
                warn!("No settings saved yet, storing defaults");
                let defaults = Settings::default();
                self.store_settings(&defaults).await?;
                Ok(defaults)
            }
        }
    }

    /// Replace the settings.
    pub async fn update_settings(&self, settings: Settings) -> Result<Settings, AdminError> {
        let problems = settings.problems();
        if !problems.is_empty() {
            return Err(AdminError::InvalidSettings(problems));
        }
        self.store_settings(&settings).await?;
        info!("Settings updated");
        Ok(settings)
    }

    pub async fn restore_default_settings(&self) -> Result<Settings, AdminError> {
        let defaults = Settings::default();
        self.store_settings(&defaults).await?;
        info!("Settings restored to defaults");
        Ok(defaults)
    }

    pub async fn system_counts(&self) -> Result<SystemCounts, AdminError> {
        Ok(self.documents.system_counts().await?)
    }

    async fn store_settings(&self, settings: &Settings) -> Result<(), AdminError> {
        let document = serde_json::to_value(settings)?;
        self.documents
            .put_configuration(SETTINGS_DOCUMENT, &document)
            .await?;
        Ok(())
    }

    /// Blank means no assignment. Anything else must name an existing room.
    async fn check_room(&self, room: Option<String>) -> Result<Option<String>, AdminError> {
        let Some(room) = room.filter(|r| !r.trim().is_empty()) else {
            return Ok(None);
        };
        let rooms = self.documents.list_rooms().await?;
        if rooms.iter().any(|r| r.id == room) {
            Ok(Some(room))
        } else {
            Err(AdminError::InvalidUser(format!("unknown room {room:?}")))
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}
