use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
};
use utoipa::OpenApi;
use uuid::Uuid;

use super::{
    dto::{EvaluateResponse, NewUserRequest, SensorStatusDto, SnapshotRequest, ToggleRequest},
    errors::AppError,
    extract::{Json, Path},
};
use crate::{
    admin::{
        settings::{
            Bounds, GeneralSettings, MaintenanceSettings, SecuritySettings, SensorSettings,
            UpperBound,
        },
        Settings,
    },
    alerts::MirroredAlert,
    auth::{Actor, Permissions, Role},
    context::AppContext,
    control::{EquipmentState, RoomState},
    db::models::{
        AlertRecord, AlertType, EquipmentKind, Room, Severity, SystemCounts, UnknownEquipment,
        UserProfile, UserRole, UserUpdate,
    },
    sensors::{evaluate, Evaluation, SensorSnapshot},
};

/// Header carrying the signed-in user id, set by the identity-aware proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// The resolved caller of a request.
pub struct Caller(pub Actor);

impl FromRequestParts<AppContext> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        let actor = Actor::resolve(state.documents.as_ref(), user_id).await?;
        Ok(Self(actor))
    }
}

impl Caller {
    /// Signed-in callers may change settings, but only of their assigned
    /// room unless they can see every room.
    fn require_room_settings(&self, room_id: &str) -> Result<(), AppError> {
        let permissions = self.0.permissions();
        if !permissions.can_modify_room_settings {
            return Err(AppError::unauthorized());
        }
        match &self.0.assigned_room {
            Some(assigned) if !permissions.can_view_all_rooms && assigned != room_id => Err(
                AppError::forbidden(format!("room {room_id:?} is not assigned to this user")),
            ),
            _ => Ok(()),
        }
    }

    /// 401 for anonymous callers, 403 when the role lacks the permission.
    fn require(&self, allowed: fn(&Permissions) -> bool) -> Result<(), AppError> {
        let permissions = self.0.permissions();
        if !permissions.is_authenticated {
            return Err(AppError::unauthorized());
        }
        if !allowed(&permissions) {
            return Err(AppError::forbidden(format!(
                "not permitted for role {:?}",
                permissions.role
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// List rooms. Users who cannot view every room only see their assigned
/// one, or nothing when no room is assigned to them.
#[utoipa::path(
    get,
    path = "/rooms",
    responses(
        (status = 200, description = "Rooms visible to the caller", body = Vec<Room>),
        (status = 502, description = "Document store failure"),
    ),
    tag = "rooms"
)]
pub async fn list_rooms(
    State(ctx): State<AppContext>,
    Caller(actor): Caller,
) -> Result<Json<Vec<Room>>, AppError> {
    let mut rooms = ctx.control.list_rooms().await?;
    if !actor.permissions().can_view_all_rooms {
        rooms.retain(|r| actor.assigned_room.as_ref() == Some(&r.id));
    }
    Ok(Json(rooms))
}

/// Realtime view of a room: latest sensors and equipment state.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/state",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room state", body = RoomState),
        (status = 400, description = "Unknown room"),
        (status = 502, description = "Realtime store failure"),
    ),
    tag = "rooms"
)]
pub async fn room_state(
    State(ctx): State<AppContext>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomState>, AppError> {
    Ok(Json(ctx.control.room_state(&room_id).await?))
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// Latest sensor snapshot of a room with its comfort evaluation.
/// Returns `null` when the room has not reported yet.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/sensors",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Latest snapshot", body = SensorStatusDto),
        (status = 400, description = "Unknown room"),
        (status = 502, description = "Realtime store failure"),
    ),
    tag = "sensors"
)]
pub async fn get_sensors(
    State(ctx): State<AppContext>,
    Path(room_id): Path<String>,
) -> Result<Json<Option<SensorStatusDto>>, AppError> {
    let snapshot = match ctx.cache.get(&room_id).await {
        Some(snapshot) => Some(snapshot),
        None => ctx.gateway.current(&room_id).await?,
    };

    Ok(Json(snapshot.map(|snapshot| SensorStatusDto {
        evaluation: evaluate(&snapshot),
        snapshot,
    })))
}

/// Latest cached snapshot of every monitored room, ordered by room id.
#[utoipa::path(
    get,
    path = "/sensors",
    responses(
        (status = 200, description = "Latest snapshot per monitored room", body = Vec<SensorStatusDto>),
    ),
    tag = "sensors"
)]
pub async fn list_sensors(State(ctx): State<AppContext>) -> Json<Vec<SensorStatusDto>> {
    let all = ctx.cache.all().await;
    Json(
        all.into_iter()
            .map(|snapshot| SensorStatusDto { evaluation: evaluate(&snapshot), snapshot })
            .collect(),
    )
}

/// Evaluate a snapshot and record an alert for every breached metric.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/evaluate",
    params(("room_id" = String, Path, description = "Room identifier")),
    request_body = SnapshotRequest,
    responses(
        (status = 200, description = "Evaluation and created alerts", body = EvaluateResponse),
        (status = 400, description = "Unknown room or malformed body"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "sensors"
)]
pub async fn evaluate_snapshot(
    State(ctx): State<AppContext>,
    Path(room_id): Path<String>,
    Caller(actor): Caller,
    Json(body): Json<SnapshotRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let snapshot = body.into_snapshot(&room_id);
    let alerts = ctx
        .alerts
        .evaluate_and_alert(&room_id, &snapshot, actor.user_id.as_deref())
        .await?;

    Ok(Json(EvaluateResponse { evaluation: evaluate(&snapshot), alerts }))
}

// ---------------------------------------------------------------------------
// Equipment
// ---------------------------------------------------------------------------

/// Switch a piece of equipment on or off. `kind` is `climatiseur`,
/// `projecteur` or `videoprojecteur`.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/equipment/{kind}",
    params(
        ("room_id" = String, Path, description = "Room identifier"),
        ("kind"    = String, Path, description = "Equipment kind"),
    ),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "New equipment state", body = EquipmentState),
        (status = 400, description = "Unknown room or equipment, or malformed body"),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Room not assigned to the caller"),
        (status = 502, description = "Store failure"),
    ),
    tag = "equipment"
)]
pub async fn toggle_equipment(
    State(ctx): State<AppContext>,
    Path((room_id, kind)): Path<(String, String)>,
    caller: Caller,
    Json(body): Json<ToggleRequest>,
) -> Result<Json<EquipmentState>, AppError> {
    caller.require_room_settings(&room_id)?;
    let kind: EquipmentKind = kind
        .parse()
        .map_err(|e: UnknownEquipment| AppError::bad_request(e.to_string()))?;

    let state = ctx
        .control
        .toggle(&room_id, kind, body.active, caller.0.user_id.as_deref())
        .await?;
    Ok(Json(state))
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Up to ten most recent unhandled alerts of a room.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/alerts/active",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Unhandled alerts, newest first", body = Vec<MirroredAlert>),
        (status = 400, description = "Unknown room"),
        (status = 502, description = "Realtime store failure"),
    ),
    tag = "alerts"
)]
pub async fn active_alerts(
    State(ctx): State<AppContext>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<MirroredAlert>>, AppError> {
    Ok(Json(ctx.alerts.active_alerts(&room_id).await?))
}

/// One alert as recorded in the document store.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/alerts/{alert_id}",
    params(
        ("room_id"  = String, Path, description = "Room identifier"),
        ("alert_id" = Uuid,   Path, description = "Alert identifier"),
    ),
    responses(
        (status = 200, description = "Alert", body = AlertRecord),
        (status = 400, description = "Malformed alert id"),
        (status = 404, description = "No such alert"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "alerts"
)]
pub async fn get_alert(
    State(ctx): State<AppContext>,
    Path((room_id, alert_id)): Path<(String, Uuid)>,
) -> Result<Json<AlertRecord>, AppError> {
    Ok(Json(ctx.alerts.get(&room_id, alert_id).await?))
}

/// Acknowledge an alert.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/alerts/{alert_id}/handled",
    params(
        ("room_id"  = String, Path, description = "Room identifier"),
        ("alert_id" = Uuid,   Path, description = "Alert identifier"),
    ),
    responses(
        (status = 200, description = "Handled alert", body = AlertRecord),
        (status = 400, description = "Malformed alert id"),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Room not assigned to the caller"),
        (status = 404, description = "No such alert"),
        (status = 502, description = "Store failure"),
    ),
    tag = "alerts"
)]
pub async fn mark_alert_handled(
    State(ctx): State<AppContext>,
    Path((room_id, alert_id)): Path<(String, Uuid)>,
    caller: Caller,
) -> Result<Json<AlertRecord>, AppError> {
    caller.require_room_settings(&room_id)?;
    Ok(Json(ctx.alerts.mark_handled(&room_id, alert_id).await?))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Permissions of the caller.
#[utoipa::path(
    get,
    path = "/me/permissions",
    responses(
        (status = 200, description = "Caller permissions", body = Permissions),
    ),
    tag = "system"
)]
pub async fn my_permissions(Caller(actor): Caller) -> Json<Permissions> {
    Json(actor.permissions())
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

/// All user profiles, oldest first.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "User profiles", body = Vec<UserProfile>),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Administrators only"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "admin"
)]
pub async fn list_users(
    State(ctx): State<AppContext>,
    caller: Caller,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    caller.require(|p| p.can_manage_users)?;
    Ok(Json(ctx.admin.list_users().await?))
}

/// Create the profile of an identity provider account.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = NewUserRequest,
    responses(
        (status = 201, description = "Created profile", body = UserProfile),
        (status = 400, description = "Invalid fields or unknown room"),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Administrators only"),
        (status = 409, description = "Profile already exists"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "admin"
)]
pub async fn create_user(
    State(ctx): State<AppContext>,
    caller: Caller,
    Json(body): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    caller.require(|p| p.can_manage_users)?;
    let user = ctx.admin.create_user(body.into()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Change name, role or assigned room of a profile. A blank room clears the
/// assignment.
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Unknown room or malformed body"),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Administrators only"),
        (status = 404, description = "No such user"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "admin"
)]
pub async fn update_user(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
    caller: Caller,
    Json(body): Json<UserUpdate>,
) -> Result<Json<UserProfile>, AppError> {
    caller.require(|p| p.can_manage_users)?;
    Ok(Json(ctx.admin.update_user(&user_id, body).await?))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Administrators only"),
        (status = 404, description = "No such user"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "admin"
)]
pub async fn delete_user(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
    caller: Caller,
) -> Result<StatusCode, AppError> {
    caller.require(|p| p.can_manage_users)?;
    ctx.admin.delete_user(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Site settings. The defaults are stored on first read.
#[utoipa::path(
    get,
    path = "/admin/settings",
    responses(
        (status = 200, description = "Current settings", body = Settings),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Administrators only"),
        (status = 502, description = "Document store failure or unreadable document"),
    ),
    tag = "admin"
)]
pub async fn get_settings(
    State(ctx): State<AppContext>,
    caller: Caller,
) -> Result<Json<Settings>, AppError> {
    caller.require(|p| p.can_manage_users)?;
    Ok(Json(ctx.admin.settings().await?))
}

#[utoipa::path(
    put,
    path = "/admin/settings",
    request_body = Settings,
    responses(
        (status = 200, description = "Saved settings", body = Settings),
        (status = 400, description = "Invalid settings"),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Administrators only"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "admin"
)]
pub async fn update_settings(
    State(ctx): State<AppContext>,
    caller: Caller,
    Json(body): Json<Settings>,
) -> Result<Json<Settings>, AppError> {
    caller.require(|p| p.can_manage_users)?;
    Ok(Json(ctx.admin.update_settings(body).await?))
}

#[utoipa::path(
    post,
    path = "/admin/settings/restore",
    responses(
        (status = 200, description = "Default settings, now saved", body = Settings),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Administrators only"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "admin"
)]
pub async fn restore_settings(
    State(ctx): State<AppContext>,
    caller: Caller,
) -> Result<Json<Settings>, AppError> {
    caller.require(|p| p.can_manage_users)?;
    Ok(Json(ctx.admin.restore_default_settings().await?))
}

/// Counts of users, rooms and alerts.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "System counts", body = SystemCounts),
        (status = 401, description = "Sign-in required"),
        (status = 502, description = "Document store failure"),
    ),
    tag = "admin"
)]
pub async fn system_counts(
    State(ctx): State<AppContext>,
    caller: Caller,
) -> Result<Json<SystemCounts>, AppError> {
    caller.require(|p| p.can_view_statistics)?;
    Ok(Json(ctx.admin.system_counts().await?))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        list_rooms,
        room_state,
        get_sensors,
        list_sensors,
        evaluate_snapshot,
        toggle_equipment,
        active_alerts,
        get_alert,
        mark_alert_handled,
        my_permissions,
        list_users,
        create_user,
        update_user,
        delete_user,
        get_settings,
        update_settings,
        restore_settings,
        system_counts,
        health,
    ),
    components(schemas(
        Room,
        RoomState,
        SensorSnapshot,
        Evaluation,
        SensorStatusDto,
        SnapshotRequest,
        EvaluateResponse,
        AlertRecord,
        AlertType,
        Severity,
        MirroredAlert,
        EquipmentKind,
        EquipmentState,
        ToggleRequest,
        Permissions,
        Role,
        UserProfile,
        UserRole,
        NewUserRequest,
        UserUpdate,
        SystemCounts,
        Settings,
        GeneralSettings,
        SecuritySettings,
        SensorSettings,
        MaintenanceSettings,
        Bounds,
        UpperBound,
    )),
    tags(
        (name = "rooms",     description = "Rooms"),
        (name = "sensors",   description = "Sensor readings and evaluation"),
        (name = "equipment", description = "Equipment control"),
        (name = "alerts",    description = "Environmental alerts"),
        (name = "admin",     description = "Users, site settings and counts"),
        (name = "system",    description = "System endpoints"),
    ),
    info(
        title = "Smart Salle API",
        version = "0.1.0",
        description = "Classroom sensor monitoring and equipment control"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use std::collections::BTreeMap;

    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use chrono::Utc;
    use serde_json::{json, Value};

    use crate::{
        api::router,
        context::AppContext,
        db::{
            models::{Room, UserProfile, UserRole},
            DocumentStore, MemoryDocumentStore,
        },
        realtime::{MemoryRealtimeStore, RealtimeStore},
        sensors::SensorSnapshot,
        snapshot_cache::SnapshotCache,
    };

    struct Harness {
        server: TestServer,
        documents: MemoryDocumentStore,
        realtime: MemoryRealtimeStore,
        cache: SnapshotCache,
    }

    fn harness() -> Harness {
        let documents = MemoryDocumentStore::new();
        let realtime = MemoryRealtimeStore::new();
        let ctx = AppContext::new(Arc::new(documents.clone()), Arc::new(realtime.clone()));
        Harness {
            cache: ctx.cache.clone(),
            server: TestServer::new(router(ctx)).unwrap(),
            documents,
            realtime,
        }
    }

    fn user_header() -> HeaderName {
        HeaderName::from_static("x-user-id")
    }

    fn user(id: &'static str) -> HeaderValue {
        HeaderValue::from_static(id)
    }

    fn room(id: &str) -> Room {
        Room { id: id.to_owned(), nom: format!("Salle {id}"), extra: json!({}) }
    }

    fn profile(id: &str, role: UserRole, assigned: Option<&str>) -> UserProfile {
        UserProfile {
            id: id.to_owned(),
            email: format!("{id}@ecole.fr"),
            nom: "Nom".into(),
            prenom: "Prenom".into(),
            role,
            salle_assignee: assigned.map(str::to_owned),
            date_creation: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // GET /health, /api-docs/openapi.json
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_returns_ok() {
        let h = harness();
        let resp = h.server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let h = harness();
        let resp = h.server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Smart Salle API");
        assert!(body["paths"]["/rooms/{room_id}/equipment/{kind}"].is_object());
    }

    // -----------------------------------------------------------------------
    // GET /rooms
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn rooms_are_filtered_to_assigned_room() {
        let h = harness();
        h.documents.insert_room(room("A101"));
        h.documents.insert_room(room("B202"));
        h.documents.insert_user(profile("prof", UserRole::Professeur, Some("B202")));
        h.documents.insert_user(profile("boss", UserRole::Admin, Some("B202")));

        let body: Vec<Value> = h
            .server
            .get("/rooms")
            .add_header(user_header(), user("prof"))
            .await
            .json();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["id"], "B202");

        let body: Vec<Value> = h
            .server
            .get("/rooms")
            .add_header(user_header(), user("boss"))
            .await
            .json();
        assert_eq!(body.len(), 2);
    }

    #[tokio::test]
    async fn rooms_are_hidden_without_an_assignment() {
        let h = harness();
        h.documents.insert_room(room("A101"));
        h.documents.insert_room(room("B202"));

        let resp = h.server.get("/rooms").await;
        resp.assert_status_ok();
        let body: Vec<Value> = resp.json();
        assert!(body.is_empty());

        // Signed in, but no profile document: a professeur with no room.
        let body: Vec<Value> = h
            .server
            .get("/rooms")
            .add_header(user_header(), user("newcomer"))
            .await
            .json();
        assert!(body.is_empty());
    }

    // -----------------------------------------------------------------------
    // Sensors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn sensors_null_before_first_report() {
        let h = harness();
        let resp = h.server.get("/rooms/A101/sensors").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn sensors_include_evaluation() {
        let h = harness();
        h.realtime
            .set(
                "salles/A101/capteurs",
                json!({ "temperature": 15, "humidite": 45, "qualiteAir": 500 }),
            )
            .await
            .unwrap();

        let body: Value = h.server.get("/rooms/A101/sensors").await.json();
        assert_eq!(body["snapshot"]["temperature"], 15.0);
        assert_eq!(body["evaluation"]["temperature_normal"], false);
        assert_eq!(body["evaluation"]["humidity_normal"], true);
        assert_eq!(body["evaluation"]["air_quality_normal"], true);
    }

    #[tokio::test]
    async fn sensor_overview_lists_cached_rooms() {
        let h = harness();
        let body: Vec<Value> = h.server.get("/sensors").await.json();
        assert!(body.is_empty());

        for (room_id, temperature) in [("B202", 30.0), ("A101", 21.0)] {
            h.cache
                .update(SensorSnapshot {
                    room_id: room_id.to_owned(),
                    temperature: Some(temperature),
                    humidity: Some(45.0),
                    air_quality: Some(500.0),
                    timestamp: "2025-03-01T08:00:00.000Z".into(),
                    extra: BTreeMap::new(),
                })
                .await;
        }

        let body: Vec<Value> = h.server.get("/sensors").await.json();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0]["snapshot"]["room_id"], "A101");
        assert_eq!(body[0]["evaluation"]["temperature_normal"], true);
        assert_eq!(body[1]["snapshot"]["room_id"], "B202");
        assert_eq!(body[1]["evaluation"]["temperature_normal"], false);
    }

    #[tokio::test]
    async fn invalid_room_is_bad_request() {
        let h = harness();
        let resp = h.server.get("/rooms/a.b/sensors").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].as_str().unwrap().contains("unknown room"));
    }

    #[tokio::test]
    async fn evaluate_records_alerts() {
        let h = harness();
        let resp = h
            .server
            .post("/rooms/A101/evaluate")
            .add_header(user_header(), user("prof"))
            .json(&json!({ "temperature": 32, "humidity": 50, "air_quality": 1100 }))
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        let alerts = body["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0]["alert_type"], "temperature-haute");
        assert_eq!(alerts[0]["severity"], "danger");
        assert_eq!(alerts[0]["user_id"], "prof");
        assert_eq!(alerts[1]["alert_type"], "qualite-air");
        assert_eq!(alerts[1]["severity"], "warning");
        assert_eq!(body["evaluation"]["humidity_normal"], true);

        assert_eq!(h.documents.alerts().len(), 2);
    }

    #[tokio::test]
    async fn evaluate_reports_document_store_failure() {
        let h = harness();
        h.documents.set_unavailable(true);
        let resp = h
            .server
            .post("/rooms/A101/evaluate")
            .json(&json!({ "temperature": 40 }))
            .await;
        resp.assert_status(StatusCode::BAD_GATEWAY);
    }

    // -----------------------------------------------------------------------
    // Equipment
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn toggle_requires_sign_in() {
        let h = harness();
        let resp = h
            .server
            .post("/rooms/A101/equipment/projecteur")
            .json(&json!({ "active": true }))
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(h.realtime.snapshot("salles/A101"), Value::Null);
    }

    #[tokio::test]
    async fn toggle_projector_sets_both_keys() {
        let h = harness();
        let resp = h
            .server
            .post("/rooms/A101/equipment/videoprojecteur")
            .add_header(user_header(), user("prof"))
            .json(&json!({ "actif": true }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["actif"], true);

        let state: Value = h.server.get("/rooms/A101/state").await.json();
        assert_eq!(state["equipment"]["projecteur"]["actif"], true);
        assert_eq!(state["equipment"]["videoprojecteur"]["actif"], true);
        assert_eq!(h.documents.history().len(), 1);
    }

    #[tokio::test]
    async fn toggle_outside_assigned_room_is_forbidden() {
        let h = harness();
        h.documents.insert_user(profile("prof", UserRole::Professeur, Some("B202")));
        h.documents.insert_user(profile("boss", UserRole::Admin, Some("B202")));

        let resp = h
            .server
            .post("/rooms/A101/equipment/climatiseur")
            .add_header(user_header(), user("prof"))
            .json(&json!({ "active": true }))
            .await;
        resp.assert_status(StatusCode::FORBIDDEN);
        assert!(h.documents.history().is_empty());

        h.server
            .post("/rooms/B202/equipment/climatiseur")
            .add_header(user_header(), user("prof"))
            .json(&json!({ "active": true }))
            .await
            .assert_status_ok();
        h.server
            .post("/rooms/A101/equipment/climatiseur")
            .add_header(user_header(), user("boss"))
            .json(&json!({ "active": false }))
            .await
            .assert_status_ok();
        assert_eq!(h.documents.history().len(), 2);
    }

    #[tokio::test]
    async fn toggle_unknown_equipment_is_bad_request() {
        let h = harness();
        let resp = h
            .server
            .post("/rooms/A101/equipment/radiateur")
            .add_header(user_header(), user("prof"))
            .json(&json!({ "active": true }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    fn assert_json_error(resp: &axum_test::TestResponse) {
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].is_string(), "unexpected body {body}");
    }

    #[tokio::test]
    async fn malformed_evaluate_body_is_json_error() {
        let h = harness();
        let resp = h
            .server
            .post("/rooms/A101/evaluate")
            .json(&json!({ "temperature": "hot" }))
            .await;
        assert_json_error(&resp);
        assert!(h.documents.alerts().is_empty());
    }

    #[tokio::test]
    async fn toggle_without_state_is_json_error() {
        let h = harness();
        let resp = h
            .server
            .post("/rooms/A101/equipment/climatiseur")
            .add_header(user_header(), user("prof"))
            .json(&json!({}))
            .await;
        assert_json_error(&resp);
        assert!(h.documents.history().is_empty());
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn handled_alert_leaves_active_list() {
        let h = harness();
        let body: Value = h
            .server
            .post("/rooms/A101/evaluate")
            .json(&json!({ "temperature": 10 }))
            .await
            .json();
        let id = body["alerts"][0]["id"].as_str().unwrap().to_owned();

        let active: Vec<Value> = h.server.get("/rooms/A101/alerts/active").await.json();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["id"], id.as_str());

        let resp = h
            .server
            .post(&format!("/rooms/A101/alerts/{id}/handled"))
            .add_header(user_header(), user("prof"))
            .await;
        resp.assert_status_ok();
        let handled: Value = resp.json();
        assert_eq!(handled["handled"], true);

        let active: Vec<Value> = h.server.get("/rooms/A101/alerts/active").await.json();
        assert!(active.is_empty());
        assert!(h.documents.alerts()[0].handled);
    }

    #[tokio::test]
    async fn handling_unknown_alert_is_not_found() {
        let h = harness();
        let resp = h
            .server
            .post(&format!("/rooms/A101/alerts/{}/handled", uuid::Uuid::new_v4()))
            .add_header(user_header(), user("prof"))
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_alert_id_is_json_error() {
        let h = harness();
        let resp = h
            .server
            .post("/rooms/A101/alerts/not-a-uuid/handled")
            .add_header(user_header(), user("prof"))
            .await;
        assert_json_error(&resp);

        let resp = h.server.get("/rooms/A101/alerts/not-a-uuid").await;
        assert_json_error(&resp);
    }

    #[tokio::test]
    async fn alert_is_read_by_id() {
        let h = harness();
        let body: Value = h
            .server
            .post("/rooms/A101/evaluate")
            .json(&json!({ "humidity": 85 }))
            .await
            .json();
        let id = body["alerts"][0]["id"].as_str().unwrap().to_owned();

        let resp = h.server.get(&format!("/rooms/A101/alerts/{id}")).await;
        resp.assert_status_ok();
        let alert: Value = resp.json();
        assert_eq!(alert["alert_type"], "humidite-haute");
        assert_eq!(alert["handled"], false);

        h.server
            .get(&format!("/rooms/B202/alerts/{id}"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handling_requires_sign_in() {
        let h = harness();
        let resp = h
            .server
            .post(&format!("/rooms/A101/alerts/{}/handled", uuid::Uuid::new_v4()))
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn user_management_is_admin_only() {
        let h = harness();
        h.documents.insert_user(profile("prof", UserRole::Professeur, None));

        h.server.get("/admin/users").await.assert_status(StatusCode::UNAUTHORIZED);
        h.server
            .get("/admin/users")
            .add_header(user_header(), user("prof"))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        h.server
            .delete("/admin/users/prof")
            .add_header(user_header(), user("prof"))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        assert_eq!(h.documents.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admin_manages_user_lifecycle() {
        let h = harness();
        h.documents.insert_room(room("A101"));
        h.documents.insert_user(profile("boss", UserRole::Admin, None));

        let resp = h
            .server
            .post("/admin/users")
            .add_header(user_header(), user("boss"))
            .json(&json!({
                "id": "uid-7",
                "email": "luc.martin@ecole.fr",
                "nom": "Martin",
                "prenom": "Luc",
                "salle_assignee": "A101"
            }))
            .await;
        resp.assert_status(StatusCode::CREATED);
        let created: Value = resp.json();
        assert_eq!(created["role"], "professeur");

        h.server
            .post("/admin/users")
            .add_header(user_header(), user("boss"))
            .json(&json!({ "id": "uid-7", "email": "x@ecole.fr", "nom": "X", "prenom": "Y" }))
            .await
            .assert_status(StatusCode::CONFLICT);

        // The new profile now drives room visibility.
        let rooms: Vec<Value> = h
            .server
            .get("/rooms")
            .add_header(user_header(), user("uid-7"))
            .await
            .json();
        assert_eq!(rooms.len(), 1);

        let resp = h
            .server
            .put("/admin/users/uid-7")
            .add_header(user_header(), user("boss"))
            .json(&json!({ "nom": "Martin", "prenom": "Luc", "role": "admin" }))
            .await;
        resp.assert_status_ok();
        let updated: Value = resp.json();
        assert_eq!(updated["role"], "admin");
        assert!(updated["salle_assignee"].is_null());

        let users: Vec<Value> = h
            .server
            .get("/admin/users")
            .add_header(user_header(), user("boss"))
            .await
            .json();
        assert_eq!(users.len(), 2);

        h.server
            .delete("/admin/users/uid-7")
            .add_header(user_header(), user("boss"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        h.server
            .delete("/admin/users/uid-7")
            .add_header(user_header(), user("boss"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn user_with_unknown_room_is_rejected() {
        let h = harness();
        h.documents.insert_user(profile("boss", UserRole::Admin, None));

        let resp = h
            .server
            .post("/admin/users")
            .add_header(user_header(), user("boss"))
            .json(&json!({
                "id": "uid-8",
                "email": "a@ecole.fr",
                "nom": "A",
                "prenom": "B",
                "salle_assignee": "Z999"
            }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].as_str().unwrap().contains("Z999"));
    }

    #[tokio::test]
    async fn settings_round_trip_through_the_api() {
        let h = harness();
        h.documents.insert_user(profile("boss", UserRole::Admin, None));
        h.documents.insert_user(profile("prof", UserRole::Professeur, None));

        h.server
            .get("/admin/settings")
            .add_header(user_header(), user("prof"))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let mut settings: Value = h
            .server
            .get("/admin/settings")
            .add_header(user_header(), user("boss"))
            .await
            .json();
        assert_eq!(settings["capteurs"]["seuilsTemperature"]["min"], 18.0);

        settings["maintenance"]["modeMaintenance"] = json!(true);
        h.server
            .put("/admin/settings")
            .add_header(user_header(), user("boss"))
            .json(&settings)
            .await
            .assert_status_ok();

        settings["capteurs"]["seuilsHumidite"] = json!({ "min": 80.0, "max": 20.0 });
        let resp = h
            .server
            .put("/admin/settings")
            .add_header(user_header(), user("boss"))
            .json(&settings)
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let saved: Value = h
            .server
            .get("/admin/settings")
            .add_header(user_header(), user("boss"))
            .await
            .json();
        assert_eq!(saved["maintenance"]["modeMaintenance"], true);
        assert_eq!(saved["capteurs"]["seuilsHumidite"]["max"], 60.0);

        let restored: Value = h
            .server
            .post("/admin/settings/restore")
            .add_header(user_header(), user("boss"))
            .await
            .json();
        assert_eq!(restored["maintenance"]["modeMaintenance"], false);
    }

    #[tokio::test]
    async fn counts_need_sign_in() {
        let h = harness();
        h.documents.insert_room(room("A101"));
        h.documents.insert_user(profile("prof", UserRole::Professeur, Some("A101")));
        h.documents.insert_user(profile("boss", UserRole::Admin, None));

        h.server.get("/admin/stats").await.assert_status(StatusCode::UNAUTHORIZED);

        let resp = h
            .server
            .get("/admin/stats")
            .add_header(user_header(), user("prof"))
            .await;
        resp.assert_status_ok();
        let counts: Value = resp.json();
        assert_eq!(counts["utilisateurs_total"], 2);
        assert_eq!(counts["professeurs_total"], 1);
        assert_eq!(counts["admins_total"], 1);
        assert_eq!(counts["salles_total"], 1);
        assert_eq!(counts["alertes_total"], 0);
    }

    // -----------------------------------------------------------------------
    // GET /me/permissions
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn permissions_follow_role() {
        let h = harness();
        h.documents.insert_user(profile("boss", UserRole::Admin, None));

        let anon: Value = h.server.get("/me/permissions").await.json();
        assert_eq!(anon["role"], "non-authentifie");
        assert_eq!(anon["can_modify_room_settings"], false);

        let admin: Value = h
            .server
            .get("/me/permissions")
            .add_header(user_header(), user("boss"))
            .await
            .json();
        assert_eq!(admin["role"], "admin");
        assert_eq!(admin["can_manage_users"], true);
    }
}
