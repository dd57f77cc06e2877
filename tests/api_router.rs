use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
use rusqlite::Connection;
use tower::ServiceExt;

use rollcalld::api::router::build_router;
use rollcalld::api::types::AppState;
use rollcalld::clock::Clock;
use rollcalld::config::Config;
use rollcalld::policy::{Band, WindowConfig};

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

fn test_config() -> Config {
    let offset = FixedOffset::west_opt(3 * 3600).expect("offset in range");
    Config {
        port: 0,
        db_path: "unused".into(),
        admin: None,
        offset,
        windows: WindowConfig {
            weekday: Weekday::Mon,
            check_in: band(18, 0, 20, 0),
            check_out: band(21, 30, 23, 30),
        },
        cohort_locked: true,
        cohorts: vec!["fullstack".into()],
    }
}

fn band(sh: u32, sm: u32, eh: u32, em: u32) -> Band {
    Band {
        start: NaiveTime::from_hms_opt(sh, sm, 0).expect("valid time"),
        end: NaiveTime::from_hms_opt(eh, em, 0).expect("valid time"),
    }
}

/// Router over an in-memory store, with the clock pinned to a local
/// Tuesday morning (2026-08-04 09:00 at UTC-3 is 12:00 UTC).
fn test_router() -> axum::Router {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    rollcalld::db::init_schema(&conn).expect("init schema");
    let clock = FixedClock(
        Utc.with_ymd_and_hms(2026, 8, 4, 12, 0, 0)
            .single()
            .expect("valid instant"),
    );
    let state = Arc::new(AppState::new(conn, test_config(), Arc::new(clock)));
    build_router(state)
}

#[tokio::test]
async fn health_answers_ok() {
    let router = test_router();
    let resp = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let router = test_router();
    let resp = router
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_then_attendance_maps_errors_to_statuses() {
    let router = test_router();

    let login = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"identityKey":"ana@x.com","birthdate":"2000-01-01","cohort":"fullstack"}"#,
        ))
        .expect("request");
    let resp = router.clone().oneshot(login).await.expect("response");
    assert_eq!(resp.status(), StatusCode::OK);

    // Wrong birthdate on the now-registered record.
    let bad_login = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"identityKey":"ana@x.com","birthdate":"2000-01-02"}"#,
        ))
        .expect("request");
    let resp = router.clone().oneshot(bad_login).await.expect("response");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // The pinned clock reads Tuesday: the attendance gate is closed.
    let attendance = Request::builder()
        .method(Method::POST)
        .uri("/attendance")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"identityKey":"ana@x.com"}"#))
        .expect("request");
    let resp = router.clone().oneshot(attendance).await.expect("response");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let history = Request::builder()
        .uri("/history/ana@x.com")
        .body(Body::empty())
        .expect("request");
    let resp = router.oneshot(history).await.expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn csv_report_is_served_as_text_csv() {
    let router = test_router();
    let resp = router
        .oneshot(
            Request::builder()
                .uri("/admin/report/all")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(content_type.starts_with("text/csv"), "{content_type}");
}
