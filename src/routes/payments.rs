use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::{json, Json, Value};
use rocket::State;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use super::find_account;
use super::subscriptions::{load_subscription, set_current_subscription};
use crate::config::Config;
use crate::db::{self, DbConn};
use crate::guards::SubscriberUser;
use crate::models::{
    is_within_trial, trial_expires_at, PaymentStatus, Subscription, SubscriptionResponse, SubscriptionStatus,
    UserSubscriptionStatus, UserType,
};
use crate::services::stripe::{amount_in_cents, CheckoutRequest};
use crate::services::StripeService;
use crate::utils::{fmt_date, fmt_day, non_blank, parse_id, ApiError, ApiResponse};

pub const SUBSCRIPTION_PAYMENT: &str = "subscription_payment";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubscriptionPaymentDto {
    pub subscription_id: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CheckoutData {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub url: Option<String>,
}

/// Raw `Stripe-Signature` header; absence is reported by the verifier.
pub struct StripeSignature(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for StripeSignature {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(StripeSignature(
            req.headers().get_one("Stripe-Signature").map(str::to_string),
        ))
    }
}

fn success_url(role: &str) -> String {
    format!(
        "{}/{}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}",
        Config::client_url(),
        role
    )
}

fn cancel_url(role: &str) -> String {
    format!("{}/{}/subscription/cancel", Config::client_url(), role)
}

#[openapi(tag = "Payments")]
#[post("/payments/subscription-payment", data = "<dto>")]
pub async fn create_subscription_payment(
    user: SubscriberUser,
    db: &State<DbConn>,
    dto: Json<SubscriptionPaymentDto>,
) -> Result<Json<ApiResponse<CheckoutData>>, ApiError> {
    let raw_id = non_blank(&dto.subscription_id).ok_or_else(|| ApiError::bad_request("Subscription ID is required"))?;
    let subscription = load_subscription(db, parse_id(&raw_id, "subscription")?).await?;

    if !user.owns(&subscription.user_id) {
        return Err(ApiError::forbidden("You can only pay for your own subscriptions"));
    }
    if subscription.is_paid() {
        return Err(ApiError::bad_request("This subscription has already been paid"));
    }

    let account = find_account(db, user.role, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let customer_id = match account.stripe_customer_id {
        Some(id) if !id.is_empty() => id,
        _ => {
            let customer =
                StripeService::create_customer(&account.email, &account.name, &user.id.to_hex(), user.role.as_str())
                    .await?;
            db.collection::<Document>(user.role.collection())
                .update_one(
                    doc! { "_id": user.id },
                    doc! { "$set": { "stripe_customer_id": &customer.id, "updated_at": DateTime::now() } },
                    None,
                )
                .await?;
            customer.id
        }
    };

    let subscription_id = subscription
        .id
        .ok_or_else(|| ApiError::internal_error("Invalid subscription ID"))?;
    let request = CheckoutRequest {
        customer_id,
        product_name: format!("{} Subscription Plan", subscription.plan_name.as_str()),
        description: format!(
            "Subscription from {} to {}",
            fmt_day(&subscription.start_date),
            fmt_day(&subscription.end_date)
        ),
        amount_cents: amount_in_cents(subscription.amount),
        success_url: success_url(user.role.as_str()),
        cancel_url: cancel_url(user.role.as_str()),
        metadata: vec![
            ("subscriptionId", subscription_id.to_hex()),
            ("userId", user.id.to_hex()),
            ("userType", subscription.user_type.as_str().to_string()),
            ("type", SUBSCRIPTION_PAYMENT.to_string()),
        ],
    };
    let session = StripeService::create_checkout_session(&request).await?;

    db.collection::<Subscription>(db::SUBSCRIPTIONS)
        .update_one(
            doc! { "_id": subscription_id },
            doc! { "$set": { "stripe_checkout_session_id": &session.id, "updated_at": DateTime::now() } },
            None,
        )
        .await?;
    log::info!("Checkout session {} created for subscription {}", session.id, subscription_id);

    Ok(Json(ApiResponse::success(CheckoutData {
        session_id: session.id,
        url: session.url,
    })))
}

#[openapi(tag = "Payments")]
#[get("/payments/user-subscription")]
pub async fn user_subscription_status(
    user: SubscriberUser,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<UserSubscriptionStatus>>, ApiError> {
    let account = find_account(db, user.role, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let subscriptions: Vec<Subscription> = db
        .collection::<Subscription>(db::SUBSCRIPTIONS)
        .find(doc! { "user_id": user.id }, options)
        .await?
        .try_collect()
        .await?;

    let active = subscriptions
        .iter()
        .find(|s| s.status == SubscriptionStatus::Active && s.is_paid())
        .cloned();
    let pending = subscriptions
        .iter()
        .find(|s| s.payment_status == PaymentStatus::Pending)
        .cloned();

    Ok(Json(ApiResponse::success(UserSubscriptionStatus {
        active_subscription: active.map(SubscriptionResponse::from),
        pending_subscription: pending.map(SubscriptionResponse::from),
        all_subscriptions: subscriptions.into_iter().map(Into::into).collect(),
        is_trial_active: is_within_trial(account.created_at, DateTime::now()),
        trial_expires_at: fmt_date(&trial_expires_at(account.created_at)),
    })))
}

/// Subscription id, account id and account kind carried in checkout metadata.
fn paid_subscription_of(session: &Value) -> Option<(ObjectId, ObjectId, UserType)> {
    let metadata = session.get("metadata")?;
    if metadata.get("type")?.as_str()? != SUBSCRIPTION_PAYMENT {
        return None;
    }
    let subscription_id = ObjectId::parse_str(metadata.get("subscriptionId")?.as_str()?).ok()?;
    let user_id = ObjectId::parse_str(metadata.get("userId")?.as_str()?).ok()?;
    let user_type = UserType::parse(metadata.get("userType")?.as_str()?)?;
    Some((subscription_id, user_id, user_type))
}

async fn mark_paid(db: &DbConn, subscription_id: ObjectId, user_id: ObjectId, user_type: UserType) -> Result<(), ApiError> {
    let now = DateTime::now();
    let result = db
        .collection::<Subscription>(db::SUBSCRIPTIONS)
        .update_one(
            doc! { "_id": subscription_id },
            doc! { "$set": {
                "payment_status": "paid",
                "status": "Active",
                "paid_at": now,
                "updated_at": now,
            } },
            None,
        )
        .await?;
    if result.matched_count == 0 {
        log::warn!("Paid checkout for unknown subscription {}", subscription_id);
        return Ok(());
    }

    set_current_subscription(db, user_type, user_id, subscription_id).await?;
    log::info!("{} subscription payment completed: {}", user_type.as_str(), subscription_id);
    Ok(())
}

/// Stripe calls this with the raw event body; it is mounted outside the OpenAPI set.
#[post("/payments/webhook", data = "<payload>")]
pub async fn stripe_webhook(
    signature: StripeSignature,
    db: &State<DbConn>,
    payload: String,
) -> Result<Json<Value>, ApiError> {
    let event = StripeService::verify_webhook(&payload, signature.0.as_deref()).map_err(|e| {
        log::warn!("Webhook signature verification failed: {}", e.message);
        e
    })?;

    match event.kind.as_str() {
        "checkout.session.completed" => {
            if let Some((subscription_id, user_id, user_type)) = paid_subscription_of(&event.data.object) {
                mark_paid(db, subscription_id, user_id, user_type).await?;
            }
        }
        other => log::info!("Unhandled Stripe event type {}", other),
    }

    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_metadata_is_read_back() {
        let sub = ObjectId::new();
        let user = ObjectId::new();
        let session = json!({
            "id": "cs_test_1",
            "metadata": {
                "subscriptionId": sub.to_hex(),
                "userId": user.to_hex(),
                "userType": "Customer",
                "type": "subscription_payment",
            }
        });
        assert_eq!(paid_subscription_of(&session), Some((sub, user, UserType::Customer)));
    }

    #[test]
    fn other_checkouts_are_ignored() {
        let session = json!({ "metadata": { "type": "donation" } });
        assert!(paid_subscription_of(&session).is_none());
        assert!(paid_subscription_of(&json!({ "id": "cs_test_2" })).is_none());
    }

    #[test]
    fn redirect_urls_carry_the_role() {
        assert!(success_url("provider").ends_with("/provider/subscription/success?session_id={CHECKOUT_SESSION_ID}"));
        assert!(cancel_url("customer").ends_with("/customer/subscription/cancel"));
    }
}
