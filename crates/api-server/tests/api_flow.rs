//! End-to-end flow through the router: signup, join/approve, role gating,
//! events, and the billing webhook.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use greekdash_api::{build_router, ApiContext};
use greekdash_billing::webhook::sign_payload;
use greekdash_core::AppConfig;
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register_and_login(app: &Router, email: &str, name: &str) -> String {
    let (status, _) = send(
        app,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({
            "email": email,
            "name": name,
            "phone": "+15551234567",
            "password": "correct-horse-battery"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": "correct-horse-battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_chapter_lifecycle() {
    let app = build_router(ApiContext::new(AppConfig::default()));

    // Unauthenticated requests are rejected.
    let (status, _) = send(&app, "GET", "/api/v1/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Health is public.
    let (status, health) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");

    // Owner signs up and creates a chapter.
    let owner_token = register_and_login(&app, "owner@example.com", "Owner").await;
    let (status, chapter) = send(
        &app,
        "POST",
        "/api/v1/chapters",
        Some(&owner_token),
        Some(json!({ "name": "Alpha Beta" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(chapter["slug"], "alpha-beta");
    assert_eq!(chapter["plan"], "free");
    let join_code = chapter["join_code"].as_str().unwrap().to_string();
    let chapter_id = chapter["id"].as_str().unwrap().to_string();

    // A prospective member registers; no access before joining.
    let member_token = register_and_login(&app, "member@example.com", "Member").await;
    let (status, _) = send(
        &app,
        "GET",
        "/api/v1/chapters/alpha-beta",
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Wrong join code is rejected; the right one creates a pending request.
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/chapters/alpha-beta/join",
        Some(&member_token),
        Some(json!({ "join_code": "WRONGCOD" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, pending) = send(
        &app,
        "POST",
        "/api/v1/chapters/alpha-beta/join",
        Some(&member_token),
        Some(json!({ "join_code": join_code })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pending["role"], "pending_member");
    let membership_id = pending["membership_id"].as_str().unwrap().to_string();

    // Pending members still have no chapter access.
    let (status, _) = send(
        &app,
        "GET",
        "/api/v1/chapters/alpha-beta",
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The pending member cannot approve themselves.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/chapters/alpha-beta/members/{membership_id}/approve"),
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The owner sees and approves the request.
    let (status, pending_list) = send(
        &app,
        "GET",
        "/api/v1/chapters/alpha-beta/members/pending",
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending_list.as_array().unwrap().len(), 1);

    let (status, approved) = send(
        &app,
        "POST",
        &format!("/api/v1/chapters/alpha-beta/members/{membership_id}/approve"),
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["role"], "member");

    // Approval refreshes the member's live session claims.
    let (status, chapter_view) = send(
        &app,
        "GET",
        "/api/v1/chapters/alpha-beta",
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // Members do not see the join code.
    assert!(chapter_view.get("join_code").is_none());

    // Members cannot create events; the owner can.
    let starts = Utc::now() + chrono::Duration::days(7);
    let ends = starts + chrono::Duration::hours(2);
    let event_body = json!({
        "title": "Rush Week Kickoff",
        "location": "Chapter house",
        "starts_at": starts,
        "ends_at": ends,
        "capacity": 2
    });
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/chapters/alpha-beta/events",
        Some(&member_token),
        Some(event_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, event) = send(
        &app,
        "POST",
        "/api/v1/chapters/alpha-beta/events",
        Some(&owner_token),
        Some(event_body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = event["id"].as_str().unwrap().to_string();

    // The member RSVPs.
    let (status, rsvp) = send(
        &app,
        "POST",
        &format!("/api/v1/chapters/alpha-beta/events/{event_id}/rsvp"),
        Some(&member_token),
        Some(json!({ "status": "going" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rsvp["status"], "going");

    let (status, detail) = send(
        &app,
        "GET",
        &format!("/api/v1/chapters/alpha-beta/events/{event_id}"),
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["rsvps"]["going"], 1);

    // Billing webhook: a tampered signature is rejected.
    let payload = json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": "cs_test_1",
                "subscription": "sub_test_1",
                "metadata": { "chapter_id": chapter_id, "plan": "pro" }
            }
        }
    })
    .to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/billing/webhook")
        .header("content-type", "application/json")
        .header("Stripe-Signature", "t=0,v1=deadbeef")
        .body(Body::from(payload.clone()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A correctly signed event upgrades the chapter.
    let secret = AppConfig::default().billing.webhook_secret;
    let header = sign_payload(&secret, Utc::now().timestamp(), &payload);
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/billing/webhook")
        .header("content-type", "application/json")
        .header("Stripe-Signature", header)
        .body(Body::from(payload))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, chapter_after) = send(
        &app,
        "GET",
        "/api/v1/chapters/alpha-beta",
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chapter_after["plan"], "pro");

    // The audit log recorded the flow; members may not read it.
    let (status, _) = send(
        &app,
        "GET",
        "/api/v1/chapters/alpha-beta/audit-log",
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, log) = send(
        &app,
        "GET",
        "/api/v1/chapters/alpha-beta/audit-log",
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = log
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"chapter.create"));
    assert!(actions.contains(&"member.approve"));
    assert!(actions.contains(&"billing.plan_changed"));
}

#[tokio::test]
async fn test_finance_flow_over_http() {
    let app = build_router(ApiContext::new(AppConfig::default()));

    let owner_token = register_and_login(&app, "treasurer@example.com", "Treasurer").await;
    let (status, chapter) = send(
        &app,
        "POST",
        "/api/v1/chapters",
        Some(&owner_token),
        Some(json!({ "name": "Sigma Phi", "slug": "sigma-phi" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let owner_id = {
        let (_, me) = send(&app, "GET", "/api/v1/me", Some(&owner_token), None).await;
        me["user"]["id"].as_str().unwrap().to_string()
    };
    assert_eq!(chapter["slug"], "sigma-phi");

    // Assign dues to the owner (an active member) and pay them.
    let (status, dues) = send(
        &app,
        "POST",
        "/api/v1/chapters/sigma-phi/finance/dues",
        Some(&owner_token),
        Some(json!({
            "user_id": owner_id,
            "amount_cents": 45_000,
            "due_date": Utc::now() + chrono::Duration::days(14)
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let dues_id = dues["id"].as_str().unwrap().to_string();

    let (status, paid) = send(
        &app,
        "POST",
        &format!("/api/v1/chapters/sigma-phi/finance/dues/{dues_id}/pay"),
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");

    // Submit and approve an expense; the balance reflects both.
    let (status, expense) = send(
        &app,
        "POST",
        "/api/v1/chapters/sigma-phi/finance/expenses",
        Some(&owner_token),
        Some(json!({ "title": "Composite photos", "amount_cents": 15_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let expense_id = expense["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/chapters/sigma-phi/finance/expenses/{expense_id}/approve"),
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, balance) = send(
        &app,
        "GET",
        "/api/v1/chapters/sigma-phi/finance/balance",
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["balance_cents"], 30_000);

    let (status, txns) = send(
        &app,
        "GET",
        "/api/v1/chapters/sigma-phi/finance/transactions",
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(txns.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_broadcast_over_http() {
    let app = build_router(ApiContext::new(AppConfig::default()));

    let owner_token = register_and_login(&app, "president@example.com", "President").await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/chapters",
        Some(&owner_token),
        Some(json!({ "name": "Delta Gamma", "slug": "delta-gamma" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, summary) = send(
        &app,
        "POST",
        "/api/v1/chapters/delta-gamma/broadcasts",
        Some(&owner_token),
        Some(json!({
            "subject": "Chapter meeting",
            "body": "Meeting tonight at 7pm in the chapter room.",
            "channels": ["email", "sms"],
            "audience": { "kind": "all_members" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(summary["recipients"], 1);
    assert_eq!(summary["sent"], 2);
    assert_eq!(summary["failed"], 0);

    let broadcast_id = summary["broadcast_id"].as_str().unwrap().to_string();
    let (status, log) = send(
        &app,
        "GET",
        &format!("/api/v1/chapters/delta-gamma/broadcasts/{broadcast_id}/log"),
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log.as_array().unwrap().len(), 2);
}
