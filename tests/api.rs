use hmac::{Hmac, Mac};
use mongodb::bson::oid::ObjectId;
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::Value;
use sha2::Sha256;

use workbond_server::config::Config;
use workbond_server::models::Role;
use workbond_server::services::JwtService;

/// The app with a driver handle that never connects; guards reject before any query.
async fn client() -> Client {
    let database = mongodb::Client::with_uri_str("mongodb://127.0.0.1:27017")
        .await
        .expect("valid uri")
        .database("workbond_test");

    Client::untracked(workbond_server::app().manage(database))
        .await
        .expect("valid rocket instance")
}

fn bearer(role: Role) -> Header<'static> {
    let token = JwtService::generate_token(&ObjectId::new(), role).expect("token");
    Header::new("Authorization", format!("Bearer {}", token))
}

async fn json_body(response: rocket::local::asynchronous::LocalResponse<'_>) -> Value {
    let body = response.into_string().await.expect("body");
    serde_json::from_str(&body).expect("json body")
}

#[rocket::async_test]
async fn root_answers_with_welcome() {
    let client = client().await;
    let response = client.get("/").dispatch().await;

    assert_eq!(response.status(), Status::Ok);
    assert!(response.into_string().await.unwrap().contains("WorkBond"));
}

#[rocket::async_test]
async fn unknown_routes_get_json_404() {
    let client = client().await;
    let response = client.get("/api/does-not-exist").dispatch().await;

    assert_eq!(response.status(), Status::NotFound);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Resource not found");
}

#[rocket::async_test]
async fn preflight_echoes_origin() {
    let client = client().await;
    let response = client
        .options("/api/auth/login")
        .header(Header::new("Origin", "http://localhost:3000"))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    let headers = response.headers();
    assert_eq!(
        headers.get_one("Access-Control-Allow-Origin"),
        Some("http://localhost:3000")
    );
    assert!(headers
        .get_one("Access-Control-Allow-Methods")
        .is_some_and(|m| m.contains("PATCH")));
}

#[rocket::async_test]
async fn missing_token_is_401() {
    let client = client().await;
    let response = client.get("/api/notifications").dispatch().await;

    assert_eq!(response.status(), Status::Unauthorized);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Access denied. No token provided.");
}

#[rocket::async_test]
async fn garbage_token_is_401() {
    let client = client().await;
    let response = client
        .get("/api/jobposts")
        .header(Header::new("Authorization", "Bearer not.a.jwt"))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid token.");
}

#[rocket::async_test]
async fn admin_routes_reject_other_roles() {
    let client = client().await;
    let response = client
        .post("/api/services")
        .header(bearer(Role::Customer))
        .header(ContentType::JSON)
        .body(r#"{"name":"Plumbing","category":"Home","base_price":40}"#)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Forbidden);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Access denied. Admin privileges required.");
}

#[rocket::async_test]
async fn customer_routes_reject_providers() {
    let client = client().await;
    let response = client
        .get("/api/customers/profile")
        .header(bearer(Role::Provider))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Forbidden);
    let body = json_body(response).await;
    assert_eq!(body["message"], "This route is only accessible to customers.");
}

fn stripe_signature(payload: &str) -> Header<'static> {
    let secret = Config::stripe_webhook_secret().expect("webhook secret set for debug builds");
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Header::new("Stripe-Signature", format!("t={},v1={}", timestamp, signature))
}

#[rocket::async_test]
async fn webhook_without_signature_is_400() {
    let client = client().await;
    let response = client
        .post("/api/payments/webhook")
        .body(r#"{"type":"checkout.session.completed","data":{"object":{}}}"#)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().starts_with("Webhook Error"));
}

#[rocket::async_test]
async fn webhook_with_forged_signature_is_400() {
    let client = client().await;
    let payload = r#"{"type":"checkout.session.completed","data":{"object":{}}}"#;
    let forged = format!("t={},v1={}", chrono::Utc::now().timestamp(), "00".repeat(32));
    let response = client
        .post("/api/payments/webhook")
        .header(Header::new("Stripe-Signature", forged))
        .body(payload)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn webhook_rejects_a_tampered_body() {
    let client = client().await;
    let signed = r#"{"type":"customer.created","data":{"object":{}}}"#;
    let response = client
        .post("/api/payments/webhook")
        .header(stripe_signature(signed))
        .body(r#"{"type":"checkout.session.completed","data":{"object":{}}}"#)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn signed_events_are_acknowledged() {
    let client = client().await;
    let payload = r#"{"type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
    let response = client
        .post("/api/payments/webhook")
        .header(stripe_signature(payload))
        .body(payload)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    assert_eq!(json_body(response).await["received"], true);
}

#[rocket::async_test]
async fn signed_checkouts_for_other_purposes_are_acknowledged() {
    let client = client().await;
    let payload = r#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1","metadata":{"type":"donation"}}}}"#;
    let response = client
        .post("/api/payments/webhook")
        .header(stripe_signature(payload))
        .body(payload)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    assert_eq!(json_body(response).await["received"], true);
}

#[rocket::async_test]
async fn login_validates_before_touching_accounts() {
    let client = client().await;

    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email":"a@b.co","password":"secret123"}"#)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(json_body(response).await["message"], "Email, password, and role are required");

    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email":"a@b.co","password":"secret123","role":"superuser"}"#)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(json_body(response).await["message"], "Invalid role");
}
