use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use crate::config::Config;
use crate::utils::ApiError;

const API_BASE: &str = "https://api.stripe.com/v1";
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

#[derive(Debug)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub product_name: String,
    pub description: String,
    pub amount_cents: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    MissingHeader,
    Malformed,
    OutsideTolerance,
    Mismatch,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            SignatureError::MissingHeader => "No stripe-signature header value was provided",
            SignatureError::Malformed => "Unable to extract timestamp and signatures from header",
            SignatureError::OutsideTolerance => "Timestamp outside the tolerance zone",
            SignatureError::Mismatch => "No signatures found matching the expected signature for payload",
        };
        f.write_str(msg)
    }
}

pub fn amount_in_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub struct StripeService;

impl StripeService {
    fn secret_key() -> Result<String, ApiError> {
        Config::stripe_secret_key().ok_or_else(|| ApiError::internal_error("Payment gateway is not configured"))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(path: &str, form: &[(String, String)]) -> Result<T, ApiError> {
        let response = Client::new()
            .post(format!("{}{}", API_BASE, path))
            .bearer_auth(Self::secret_key()?)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                log::error!("Stripe request to {} failed: {}", path, e);
                ApiError::bad_gateway("Payment gateway unavailable")
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Stripe {} returned {}: {}", path, status, body);
            return Err(ApiError::bad_gateway("Payment gateway rejected the request"));
        }

        response.json::<T>().await.map_err(|e| {
            log::error!("Unexpected Stripe response from {}: {}", path, e);
            ApiError::bad_gateway("Invalid response from payment gateway")
        })
    }

    pub async fn create_customer(email: &str, name: &str, account_id: &str, role: &str) -> Result<StripeCustomer, ApiError> {
        let form = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
            ("metadata[userId]".to_string(), account_id.to_string()),
            ("metadata[role]".to_string(), role.to_string()),
        ];
        Self::post_form("/customers", &form).await
    }

    pub async fn create_checkout_session(request: &CheckoutRequest) -> Result<CheckoutSession, ApiError> {
        Self::post_form("/checkout/sessions", &checkout_form(request, &Config::stripe_currency())).await
    }

    pub fn verify_webhook(payload: &str, header: Option<&str>) -> Result<WebhookEvent, ApiError> {
        let secret = Config::stripe_webhook_secret()
            .ok_or_else(|| ApiError::internal_error("Webhook secret is not configured"))?;
        let now = chrono::Utc::now().timestamp();

        verify_signature(payload, header, &secret, now)
            .map_err(|e| ApiError::bad_request(format!("Webhook Error: {}", e)))?;

        serde_json::from_str(payload).map_err(|e| ApiError::bad_request(format!("Webhook Error: {}", e)))
    }
}

fn checkout_form(request: &CheckoutRequest, currency: &str) -> Vec<(String, String)> {
    let mut form = vec![
        ("customer".to_string(), request.customer_id.clone()),
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("line_items[0][price_data][currency]".to_string(), currency.to_string()),
        ("line_items[0][price_data][unit_amount]".to_string(), request.amount_cents.to_string()),
        ("line_items[0][price_data][product_data][name]".to_string(), request.product_name.clone()),
        (
            "line_items[0][price_data][product_data][description]".to_string(),
            request.description.clone(),
        ),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    form.extend(
        request
            .metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{}]", key), value.clone())),
    );
    form
}

/// Checks a `Stripe-Signature` header (`t=<ts>,v1=<hex>`) against the raw body.
pub fn verify_signature(payload: &str, header: Option<&str>, secret: &str, now: i64) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::OutsideTolerance);
    }

    let signed = format!("{}.{}", timestamp, payload);
    let matches = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(signed.as_bytes());
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &str = r#"{"type":"checkout.session.completed","data":{"object":{}}}"#;

    fn sign(payload: &str, timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let header = sign(BODY, 1_700_000_000);
        assert_eq!(verify_signature(BODY, Some(&header), SECRET, 1_700_000_100), Ok(()));
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let header = format!("{},v1=deadbeef", sign(BODY, 1_700_000_000));
        assert!(verify_signature(BODY, Some(&header), SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let header = sign(BODY, 1_700_000_000);
        assert_eq!(
            verify_signature("{}", Some(&header), SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_or_malformed_headers_fail() {
        let header = sign(BODY, 1_700_000_000);
        assert_eq!(
            verify_signature(BODY, Some(&header), SECRET, 1_700_000_000 + 301),
            Err(SignatureError::OutsideTolerance)
        );
        assert_eq!(verify_signature(BODY, None, SECRET, 0), Err(SignatureError::MissingHeader));
        assert_eq!(verify_signature(BODY, Some("v1=abc"), SECRET, 0), Err(SignatureError::Malformed));
        assert_eq!(verify_signature(BODY, Some("t=5"), SECRET, 5), Err(SignatureError::Malformed));
        assert_eq!(
            verify_signature(BODY, Some("t=-9223372036854775808,v1=00"), SECRET, 1_700_000_000),
            Err(SignatureError::OutsideTolerance)
        );
    }

    #[test]
    fn cents_are_rounded() {
        assert_eq!(amount_in_cents(19.99), 1999);
        assert_eq!(amount_in_cents(0.0), 0);
        assert_eq!(amount_in_cents(49.5), 4950);
    }

    #[test]
    fn checkout_form_carries_metadata_and_amount() {
        let request = CheckoutRequest {
            customer_id: "cus_123".into(),
            product_name: "Premium Subscription Plan".into(),
            description: "Subscription".into(),
            amount_cents: 2500,
            success_url: "http://localhost:3000/provider/subscription/success".into(),
            cancel_url: "http://localhost:3000/provider/subscription/cancel".into(),
            metadata: vec![("type", "subscription_payment".into())],
        };
        let form = checkout_form(&request, "usd");
        assert!(form.contains(&("line_items[0][price_data][unit_amount]".into(), "2500".into())));
        assert!(form.contains(&("metadata[type]".into(), "subscription_payment".into())));
        assert!(form.contains(&("line_items[0][price_data][currency]".into(), "usd".into())));
    }
}
