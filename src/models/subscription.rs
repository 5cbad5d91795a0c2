use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{is_within_trial, AccountSummary, UserType};
use crate::utils::fmt_date;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum PlanName {
    Free,
    Standard,
    Premium,
    Business,
    Individual,
}

impl PlanName {
    pub fn parse(raw: &str) -> Option<PlanName> {
        match raw.trim() {
            "Free" => Some(PlanName::Free),
            "Standard" => Some(PlanName::Standard),
            "Premium" => Some(PlanName::Premium),
            "Business" => Some(PlanName::Business),
            "Individual" => Some(PlanName::Individual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanName::Free => "Free",
            PlanName::Standard => "Standard",
            PlanName::Premium => "Premium",
            PlanName::Business => "Business",
            PlanName::Individual => "Individual",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Option<SubscriptionStatus> {
        match raw.trim() {
            "Active" => Some(SubscriptionStatus::Active),
            "Expired" => Some(SubscriptionStatus::Expired),
            "Cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Option<PaymentStatus> {
        match raw.trim() {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Admin-summary standing of an account.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum Standing {
    Active,
    Expired,
    Trial,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Subscription {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub user_type: UserType,
    pub plan_name: PlanName,
    pub start_date: DateTime,
    pub end_date: DateTime,
    #[serde(default)]
    pub renewal_date: Option<DateTime>,
    pub status: SubscriptionStatus,
    pub amount: f64,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub stripe_payment_intent_id: Option<String>,
    #[serde(default)]
    pub stripe_checkout_session_id: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Subscription {
    /// Builds a new plan; free plans are paid on creation.
    pub fn new(
        user_id: ObjectId,
        user_type: UserType,
        plan_name: PlanName,
        start_date: DateTime,
        end_date: DateTime,
        amount: f64,
    ) -> Self {
        let now = DateTime::now();
        let is_free = amount == 0.0;

        Subscription {
            id: None,
            user_id,
            user_type,
            plan_name,
            start_date,
            end_date,
            renewal_date: None,
            status: SubscriptionStatus::Active,
            amount,
            payment_status: if is_free { PaymentStatus::Paid } else { PaymentStatus::Pending },
            stripe_payment_intent_id: None,
            stripe_checkout_session_id: None,
            paid_at: is_free.then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    pub fn is_active_paid(&self, now: DateTime) -> bool {
        self.status == SubscriptionStatus::Active && self.is_paid() && self.end_date > now
    }

    pub fn active_paid_filter(user_id: ObjectId, now: DateTime) -> Document {
        doc! {
            "user_id": user_id,
            "status": "Active",
            "payment_status": "paid",
            "end_date": { "$gt": now },
        }
    }
}

/// `Active` beats everything, then an elapsed trial means `Expired`.
pub fn standing(current: Option<&Subscription>, created_at: DateTime, now: DateTime) -> Standing {
    if current.is_some_and(|sub| sub.is_active_paid(now)) {
        Standing::Active
    } else if !is_within_trial(created_at, now) {
        Standing::Expired
    } else {
        Standing::Trial
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SubscriptionResponse {
    pub id: String,
    pub user_id: String,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AccountSummary>,
    pub plan_name: PlanName,
    pub start_date: String,
    pub end_date: String,
    pub renewal_date: Option<String>,
    pub status: SubscriptionStatus,
    pub amount: f64,
    pub payment_status: PaymentStatus,
    pub stripe_checkout_session_id: Option<String>,
    pub paid_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        SubscriptionResponse {
            id: s.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: s.user_id.to_hex(),
            user_type: s.user_type,
            user: None,
            plan_name: s.plan_name,
            start_date: fmt_date(&s.start_date),
            end_date: fmt_date(&s.end_date),
            renewal_date: s.renewal_date.as_ref().map(fmt_date),
            status: s.status,
            amount: s.amount,
            payment_status: s.payment_status,
            stripe_checkout_session_id: s.stripe_checkout_session_id,
            paid_at: s.paid_at.as_ref().map(fmt_date),
            created_at: fmt_date(&s.created_at),
            updated_at: fmt_date(&s.updated_at),
        }
    }
}

impl SubscriptionResponse {
    pub fn with_user(mut self, user: Option<AccountSummary>) -> Self {
        self.user = user;
        self
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CurrentPlan {
    pub plan: PlanName,
    pub status: SubscriptionStatus,
    pub start_date: String,
    pub end_date: String,
    pub payment_status: PaymentStatus,
}

impl From<&Subscription> for CurrentPlan {
    fn from(s: &Subscription) -> Self {
        CurrentPlan {
            plan: s.plan_name,
            status: s.status,
            start_date: fmt_date(&s.start_date),
            end_date: fmt_date(&s.end_date),
            payment_status: s.payment_status,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SubscriptionSummaryEntry {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub created_at: String,
    pub trial_expires_at: String,
    pub subscription: Option<CurrentPlan>,
    pub status: Standing,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UserSubscriptionStatus {
    #[serde(rename = "activeSubscription")]
    pub active_subscription: Option<SubscriptionResponse>,
    #[serde(rename = "pendingSubscription")]
    pub pending_subscription: Option<SubscriptionResponse>,
    #[serde(rename = "allSubscriptions")]
    pub all_subscriptions: Vec<SubscriptionResponse>,
    #[serde(rename = "isTrialActive")]
    pub is_trial_active: bool,
    #[serde(rename = "trialExpiresAt")]
    pub trial_expires_at: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSubscriptionDto {
    pub user_id: Option<String>,
    pub user_type: Option<String>,
    pub plan_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub renewal_date: Option<String>,
    pub status: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubscribeDto {
    pub plan_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateSubscriptionDto {
    pub status: Option<String>,
    pub plan_name: Option<String>,
    pub end_date: Option<String>,
    pub amount: Option<f64>,
    pub payment_status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trial_expires_at;
    use crate::utils::add_days;

    fn plan(amount: f64, end: DateTime) -> Subscription {
        Subscription::new(ObjectId::new(), UserType::Provider, PlanName::Standard, DateTime::now(), end, amount)
    }

    #[test]
    fn free_plans_are_paid_immediately() {
        let free = plan(0.0, add_days(DateTime::now(), 30));
        assert_eq!(free.payment_status, PaymentStatus::Paid);
        assert!(free.paid_at.is_some());

        let paid = plan(19.99, add_days(DateTime::now(), 30));
        assert_eq!(paid.payment_status, PaymentStatus::Pending);
        assert!(paid.paid_at.is_none());
        assert_eq!(paid.status, SubscriptionStatus::Active);
    }

    #[test]
    fn active_paid_requires_all_three_conditions() {
        let now = DateTime::now();
        let mut sub = plan(0.0, add_days(now, 10));
        assert!(sub.is_active_paid(now));

        sub.end_date = add_days(now, -1);
        assert!(!sub.is_active_paid(now));

        sub.end_date = add_days(now, 10);
        sub.status = SubscriptionStatus::Cancelled;
        assert!(!sub.is_active_paid(now));

        sub.status = SubscriptionStatus::Active;
        sub.payment_status = PaymentStatus::Pending;
        assert!(!sub.is_active_paid(now));
    }

    #[test]
    fn standing_prefers_active_then_expired_then_trial() {
        let now = DateTime::now();
        let old_account = add_days(now, -45);
        let new_account = add_days(now, -5);
        let active = plan(0.0, add_days(now, 10));
        let lapsed = plan(0.0, add_days(now, -1));

        assert_eq!(standing(Some(&active), old_account, now), Standing::Active);
        assert_eq!(standing(Some(&lapsed), old_account, now), Standing::Expired);
        assert_eq!(standing(None, old_account, now), Standing::Expired);
        assert_eq!(standing(None, new_account, now), Standing::Trial);
        assert_eq!(standing(Some(&lapsed), new_account, now), Standing::Trial);

        let expiry = trial_expires_at(new_account);
        assert_eq!(standing(None, new_account, expiry), Standing::Expired);
        assert_eq!(
            standing(None, new_account, DateTime::from_millis(expiry.timestamp_millis() - 1)),
            Standing::Trial
        );
    }

    #[test]
    fn status_strings_parse() {
        assert_eq!(PlanName::parse("Premium"), Some(PlanName::Premium));
        assert_eq!(PlanName::parse("Gold"), None);
        assert_eq!(SubscriptionStatus::parse("Expired"), Some(SubscriptionStatus::Expired));
        assert_eq!(SubscriptionStatus::parse("Paused"), None);
        assert_eq!(PaymentStatus::parse("refunded"), Some(PaymentStatus::Refunded));
        assert_eq!(serde_json::to_value(PaymentStatus::Paid).unwrap(), "paid");
    }
}
