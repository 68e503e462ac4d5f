pub mod dto;
pub mod errors;
pub mod extract;
pub mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::context::AppContext;
use handlers::ApiDoc;

pub fn router(ctx: AppContext) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/rooms", get(handlers::list_rooms))
        .route("/rooms/{room_id}/state", get(handlers::room_state))
        .route("/rooms/{room_id}/sensors", get(handlers::get_sensors))
        .route("/sensors", get(handlers::list_sensors))
        .route("/rooms/{room_id}/evaluate", post(handlers::evaluate_snapshot))
        .route(
            "/rooms/{room_id}/equipment/{kind}",
            post(handlers::toggle_equipment),
        )
        .route("/rooms/{room_id}/alerts/active", get(handlers::active_alerts))
        .route("/rooms/{room_id}/alerts/{alert_id}", get(handlers::get_alert))
        .route(
            "/rooms/{room_id}/alerts/{alert_id}/handled",
            post(handlers::mark_alert_handled),
        )
        .route("/me/permissions", get(handlers::my_permissions))
        .route(
            "/admin/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/admin/users/{user_id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        .route(
            "/admin/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/admin/settings/restore", post(handlers::restore_settings))
        .route("/admin/stats", get(handlers::system_counts))
        .with_state(ctx)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
