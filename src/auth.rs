use serde::Serialize;
use utoipa::ToSchema;

use crate::db::{models::UserRole, DocumentStore, StoreError};

/// Effective role of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Professeur,
    NonAuthentifie,
}

/// Feature flags derived from a [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Permissions {
    pub role: Role,
    pub is_admin: bool,
    pub is_professeur: bool,
    pub is_authenticated: bool,
    pub can_manage_users: bool,
    pub can_view_all_rooms: bool,
    pub can_modify_room_settings: bool,
    pub can_view_statistics: bool,
}

impl Permissions {
    pub fn for_role(role: Role) -> Self {
        let is_admin = role == Role::Admin;
        let is_authenticated = role != Role::NonAuthentifie;
        Self {
            role,
            is_admin,
            is_professeur: role == Role::Professeur,
            is_authenticated,
            can_manage_users: is_admin,
            can_view_all_rooms: is_admin,
            can_modify_room_settings: is_authenticated,
            can_view_statistics: is_authenticated,
        }
    }
}

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<String>,
    pub role: Role,
    pub assigned_room: Option<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self { user_id: None, role: Role::NonAuthentifie, assigned_room: None }
    }

    /// Build the actor for `user_id` as reported by the identity provider.
    ///
    /// A signed-in user without a profile document is a `Professeur`.
    pub async fn resolve(
        documents: &dyn DocumentStore,
        user_id: Option<&str>,
    ) -> Result<Self, StoreError> {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            return Ok(Self::anonymous());
        };

        let profile = documents.get_user(user_id).await?;
        let role = match profile.as_ref().map(|p| p.role) {
            Some(UserRole::Admin) => Role::Admin,
            _ => Role::Professeur,
        };
        Ok(Self {
            user_id: Some(user_id.to_owned()),
            role,
            assigned_room: profile.and_then(|p| p.salle_assignee),
        })
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::for_role(self.role)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::{models::UserProfile, MemoryDocumentStore};

    fn profile(id: &str, role: UserRole, room: Option<&str>) -> UserProfile {
        UserProfile {
            id: id.to_owned(),
            email: format!("{id}@ecole.fr"),
            nom: "Nom".into(),
            prenom: "Prenom".into(),
            role,
            salle_assignee: room.map(str::to_owned),
            date_creation: Utc::now(),
        }
    }

    #[test]
    fn admin_can_do_everything() {
        let p = Permissions::for_role(Role::Admin);
        assert!(p.is_admin && p.is_authenticated);
        assert!(p.can_manage_users && p.can_view_all_rooms);
        assert!(p.can_modify_room_settings && p.can_view_statistics);
    }

    #[test]
    fn professeur_cannot_manage_users() {
        let p = Permissions::for_role(Role::Professeur);
        assert!(p.is_professeur && p.is_authenticated);
        assert!(!p.can_manage_users && !p.can_view_all_rooms);
        assert!(p.can_modify_room_settings && p.can_view_statistics);
    }

    #[test]
    fn anonymous_has_no_permissions() {
        let p = Permissions::for_role(Role::NonAuthentifie);
        assert!(!p.is_authenticated);
        assert!(!p.can_modify_room_settings && !p.can_view_statistics);
    }

    #[tokio::test]
    async fn resolve_uses_profile_role() {
        let store = MemoryDocumentStore::new();
        store.insert_user(profile("boss", UserRole::Admin, None));
        store.insert_user(profile("prof", UserRole::Professeur, Some("A101")));

        let admin = Actor::resolve(&store, Some("boss")).await.unwrap();
        assert_eq!(admin.role, Role::Admin);

        let prof = Actor::resolve(&store, Some("prof")).await.unwrap();
        assert_eq!(prof.role, Role::Professeur);
        assert_eq!(prof.assigned_room.as_deref(), Some("A101"));
    }

    #[tokio::test]
    async fn resolve_without_profile_or_user() {
        let store = MemoryDocumentStore::new();
        let stranger = Actor::resolve(&store, Some("new-user")).await.unwrap();
        assert_eq!(stranger.role, Role::Professeur);

        assert_eq!(Actor::resolve(&store, None).await.unwrap(), Actor::anonymous());
        assert_eq!(Actor::resolve(&store, Some("")).await.unwrap(), Actor::anonymous());
    }
}
