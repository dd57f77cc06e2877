use axum::http::{header, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers::{admin, attendance, core, login, profile};
use crate::api::types::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(core::health))
        .route("/login", post(login::login))
        .route("/attendance", post(attendance::register))
        .route("/history/{email}", get(attendance::history))
        .route("/profile", put(profile::update))
        .route("/admin/search", get(admin::search))
        .route(
            "/admin/student/{email}",
            put(admin::update_student).delete(admin::delete_student),
        )
        .route("/admin/manual-attendance", post(admin::manual_attendance))
        .route("/admin/stats/{cohort}", get(admin::stats))
        .route("/admin/report/{cohort}", get(admin::report))
        .layer(cors)
        .with_state(state)
}
