use std::sync::Arc;

use api::route::v1;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use kernel::{
    clock::ManualClock,
    model::{
        id::UserId,
        role::LegacyPermissions,
        user::UserRecord,
    },
};
use registry::AppRegistry;
use serde_json::{json, Value};
use shared::config::{ReviewConfig, SettingsConfig};
use tower::ServiceExt;

const REQUESTER: &str = "requester@example.org";
const REVIEWER_A: &str = "a@example.org";
const REVIEWER_B: &str = "b@example.org";
const ADMIN: &str = "admin@example.org";

fn user(email: &str, role: Option<&str>) -> UserRecord {
    UserRecord {
        user_id: UserId::new(),
        email: email.into(),
        display_name: email.split('@').next().unwrap_or_default().into(),
        role: role.map(String::from),
        is_admin: None,
        permissions: None,
    }
}

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
        ));
        let users = vec![
            user(REQUESTER, Some("requester")),
            user(REVIEWER_A, Some("approver")),
            // 旧形式の権限しか持たないレビュー担当者
            UserRecord {
                permissions: Some(LegacyPermissions {
                    can_approve_reservations: true,
                    ..Default::default()
                }),
                ..user(REVIEWER_B, None)
            },
            UserRecord {
                is_admin: Some(true),
                ..user(ADMIN, None)
            },
        ];
        let registry = AppRegistry::in_memory(
            users,
            clock.clone(),
            ReviewConfig::default(),
            SettingsConfig::default(),
        );
        Self {
            router: v1::routes().with_state(registry),
            clock,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        principal: Option<&str>,
        if_match: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(p) = principal {
            req = req.header("X-MS-CLIENT-PRINCIPAL-NAME", p);
        }
        if let Some(k) = if_match {
            req = req.header(header::IF_MATCH, k);
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, value)
    }

    async fn submit(&self) -> Value {
        let (status, headers, body) = self
            .send(
                Method::POST,
                "/api/v1/reservations",
                Some(REQUESTER),
                None,
                Some(json!({
                    "eventTitle": "Board meeting",
                    "startDateTime": "2026-02-18T10:00",
                    "endDateTime": "2026-02-18T12:00",
                    "attendeeCount": 50,
                    "requestedRooms": ["room-a"]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            headers[header::ETAG].to_str().unwrap(),
            format!("\"{}\"", body["changeKey"].as_str().unwrap())
        );
        body
    }
}

fn path(body: &Value, suffix: &str) -> String {
    format!("/api/v1/reservations/{}{suffix}", body["id"].as_str().unwrap())
}

#[tokio::test]
async fn missing_principal_is_unauthenticated() {
    let app = TestApp::new();
    let (status, _, _) = app
        .send(Method::GET, "/api/v1/reservations", None, None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_principal_is_a_viewer() {
    let app = TestApp::new();
    let (status, _, me) = app
        .send(Method::GET, "/api/v1/users/me", Some("guest@example.org"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "viewer");
    assert_eq!(me["userId"], Value::Null);
    assert_eq!(me["permissions"]["canSubmit"], false);

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/reservations",
            Some("guest@example.org"),
            None,
            Some(json!({ "eventTitle": "x" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn submission_is_recorded_in_communication_history() {
    let app = TestApp::new();
    let created = app.submit().await;

    assert_eq!(created["status"], "pending");
    assert_eq!(created["revision"], 1);
    let history = created["communicationHistory"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["type"], "submitted");
    assert_eq!(history[0]["success"], true);
    assert_eq!(history[0]["recipients"], json!([REQUESTER]));
}

#[tokio::test]
async fn concurrent_review_and_stale_update() {
    let app = TestApp::new();
    let created = app.submit().await;

    // A がホールドを取得し、B は 423 になる
    let (status, _, hold) = app
        .send(Method::POST, &path(&created, "/start-review"), Some(REVIEWER_A), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hold["acquired"], true);
    assert_eq!(hold["durationMinutes"], 15);
    let token = hold["changeKey"].as_str().unwrap().to_string();

    let (status, _, conflict) = app
        .send(Method::POST, &path(&created, "/start-review"), Some(REVIEWER_B), None, None)
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(conflict["reviewingBy"], REVIEWER_A);
    assert_eq!(conflict["minutesRemaining"], 15);

    // A の更新は成功し、新しい changeKey が発行される
    let (status, headers, updated) = app
        .send(
            Method::PUT,
            &path(&created, ""),
            Some(REVIEWER_A),
            Some(&format!("\"{token}\"")),
            Some(json!({ "attendeeCount": 75 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_token = updated["reservation"]["changeKey"].as_str().unwrap();
    assert_ne!(new_token, token);
    assert_eq!(
        headers[header::ETAG].to_str().unwrap(),
        format!("\"{new_token}\"")
    );
    assert_eq!(
        updated["changes"],
        json!([{
            "field": "attendeeCount",
            "displayName": "Attendee Count",
            "oldValue": 50,
            "newValue": 75,
            "oldDisplay": "50",
            "newDisplay": "75"
        }])
    );
    assert_eq!(updated["reservation"]["reviewHold"], Value::Null);

    // B は古い changeKey のままなので 409
    let (status, _, conflict) = app
        .send(
            Method::PUT,
            &path(&created, ""),
            Some(REVIEWER_B),
            None,
            Some(json!({ "changeKey": token, "eventTitle": "Gala" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["currentChangeKey"], new_token);
    assert_eq!(conflict["lastModifiedBy"], REVIEWER_A);
    assert_eq!(conflict["changes"][0]["field"], "attendeeCount");
    assert_eq!(conflict["changes"][0]["newValue"], 75);

    let (_, _, current) = app
        .send(Method::GET, &path(&created, ""), Some(REVIEWER_B), None, None)
        .await;
    assert_eq!(current["eventTitle"], "Board meeting");
    assert_eq!(current["attendeeCount"], 75);
}

#[tokio::test]
async fn update_without_change_key_is_rejected() {
    let app = TestApp::new();
    let created = app.submit().await;

    let (status, _, _) = app
        .send(
            Method::PUT,
            &path(&created, ""),
            Some(REVIEWER_A),
            None,
            Some(json!({ "attendeeCount": 75 })),
        )
        .await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
}

#[tokio::test]
async fn expired_hold_is_reclaimed_and_release_never_fails() {
    let app = TestApp::new();
    let created = app.submit().await;

    let (status, _, _) = app
        .send(Method::POST, &path(&created, "/start-review"), Some(REVIEWER_A), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // 他人の解除は何もしないが 204 を返す
    let (status, _, _) = app
        .send(Method::POST, &path(&created, "/release-review"), Some(REVIEWER_B), None, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    app.clock.advance(Duration::minutes(10));
    let (status, _, conflict) = app
        .send(Method::POST, &path(&created, "/start-review"), Some(REVIEWER_B), None, None)
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(conflict["minutesRemaining"], 5);

    app.clock.advance(Duration::minutes(5));
    let (status, _, hold) = app
        .send(Method::POST, &path(&created, "/start-review"), Some(REVIEWER_B), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hold["reviewingBy"], REVIEWER_B);

    let (status, _, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/reservations/{}/release-review", UserId::new()),
            Some(REVIEWER_B),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn reject_then_resubmit_once() {
    let app = TestApp::new();
    let created = app.submit().await;
    let key = created["changeKey"].as_str().unwrap();

    let (status, _, _) = app
        .send(
            Method::POST,
            &path(&created, "/reject"),
            Some(REVIEWER_A),
            Some(key),
            Some(json!({ "reason": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, rejected) = app
        .send(
            Method::POST,
            &path(&created, "/reject"),
            Some(REVIEWER_A),
            Some(key),
            Some(json!({ "reason": "Room is closed that day" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["reviewNotes"], "Room is closed that day");

    // 却下後はホールドを取得できない
    let (status, _, _) = app
        .send(Method::POST, &path(&created, "/start-review"), Some(REVIEWER_A), None, None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, _) = app
        .send(
            Method::POST,
            &path(&created, "/resubmit"),
            Some(REVIEWER_B),
            None,
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, resubmitted) = app
        .send(
            Method::POST,
            &path(&created, "/resubmit"),
            Some(REQUESTER),
            None,
            Some(json!({ "startDateTime": "2026-02-19T10:00", "endDateTime": "2026-02-19T12:00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(resubmitted["status"], "pending");
    assert_eq!(resubmitted["revision"], 2);
    assert_eq!(resubmitted["previousReservationId"], created["id"]);
    assert_eq!(resubmitted["startDateTime"], "2026-02-19T10:00:00");

    let (status, _, _) = app
        .send(
            Method::POST,
            &path(&created, "/resubmit"),
            Some(REQUESTER),
            None,
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn requester_may_cancel_own_reservation() {
    let app = TestApp::new();
    let created = app.submit().await;

    let (status, _, cancelled) = app
        .send(
            Method::POST,
            &path(&created, "/cancel"),
            Some(REQUESTER),
            None,
            Some(json!({ "changeKey": created["changeKey"], "reason": "No longer needed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    // 取消済みの予約は承認できない
    let (status, _, _) = app
        .send(
            Method::POST,
            &path(&created, "/approve"),
            Some(REVIEWER_A),
            None,
            Some(json!({ "changeKey": cancelled["changeKey"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn email_settings_are_admin_only_and_redirect_notifications() {
    let app = TestApp::new();

    let (status, _, _) = app
        .send(Method::GET, "/api/v1/settings/email", Some(REVIEWER_A), None, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, saved) = app
        .send(
            Method::PUT,
            "/api/v1/settings/email",
            Some(ADMIN),
            None,
            Some(json!({
                "enabled": true,
                "fromAddress": "calendar@example.org",
                "redirectTo": "qa@example.org",
                "ccContact": false
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["redirectTo"], "qa@example.org");

    let created = app.submit().await;
    assert_eq!(
        created["communicationHistory"][0]["recipients"],
        json!(["qa@example.org"])
    );
}

#[tokio::test]
async fn admin_changes_roles() {
    let app = TestApp::new();

    let (status, _, users) = app
        .send(Method::GET, "/api/v1/users", Some(ADMIN), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = users["items"].as_array().unwrap();
    let b = items.iter().find(|u| u["email"] == REVIEWER_B).unwrap();
    assert_eq!(b["role"], "approver");

    let (status, _, _) = app
        .send(
            Method::PUT,
            &format!("/api/v1/users/{}/role", b["userId"].as_str().unwrap()),
            Some(ADMIN),
            None,
            Some(json!({ "role": "viewer" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, me) = app
        .send(Method::GET, "/api/v1/users/me", Some(REVIEWER_B), None, None)
        .await;
    assert_eq!(me["role"], "viewer");
}
