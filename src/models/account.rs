use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db;
use crate::utils::{add_days, fmt_date};

pub const BCRYPT_COST: u32 = 10;
pub const TRIAL_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Provider,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim() {
            "customer" => Some(Role::Customer),
            "provider" => Some(Role::Provider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }

    pub fn collection(&self) -> &'static str {
        match self {
            Role::Customer => db::CUSTOMERS,
            Role::Provider => db::PROVIDERS,
            Role::Admin => db::ADMINS,
        }
    }

    /// Subscriber kind for roles that can hold subscriptions.
    pub fn user_type(&self) -> Option<UserType> {
        match self {
            Role::Customer => Some(UserType::Customer),
            Role::Provider => Some(UserType::Provider),
            Role::Admin => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum UserType {
    Provider,
    Customer,
}

impl UserType {
    pub fn parse(raw: &str) -> Option<UserType> {
        match raw.trim() {
            "Provider" => Some(UserType::Provider),
            "Customer" => Some(UserType::Customer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Provider => "Provider",
            UserType::Customer => "Customer",
        }
    }

    pub fn role(&self) -> Role {
        match self {
            UserType::Provider => Role::Provider,
            UserType::Customer => Role::Customer,
        }
    }

    pub fn collection(&self) -> &'static str {
        self.role().collection()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum Availability {
    #[default]
    Available,
    Unavailable,
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, BCRYPT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// End of the free trial that starts when an account is created.
pub fn trial_expires_at(created_at: DateTime) -> DateTime {
    add_days(created_at, TRIAL_PERIOD_DAYS)
}

pub fn is_within_trial(created_at: DateTime, now: DateTime) -> bool {
    now < trial_expires_at(created_at)
}

// ============================================================================
// STORED DOCUMENTS
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Provider {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub address: String,
    pub experience_years: i32,
    pub skills: Vec<String>,
    #[serde(default)]
    pub availability_status: Availability,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub current_subscription_id: Option<ObjectId>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Customer {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub current_subscription_id: Option<ObjectId>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Admin {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Fields shared by every account collection; used by guards and lookups
/// that do not care which role they are reading.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_approved: Option<bool>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub current_subscription_id: Option<ObjectId>,
    pub created_at: DateTime,
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Serialize, JsonSchema)]
pub struct ProviderResponse {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub experience_years: i32,
    pub skills: Vec<String>,
    pub availability_status: Availability,
    pub rating: f64,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub is_approved: bool,
    pub current_subscription_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Provider> for ProviderResponse {
    fn from(p: Provider) -> Self {
        ProviderResponse {
            id: p.id.map(|id| id.to_hex()).unwrap_or_default(),
            role: Role::Provider,
            name: p.name,
            email: p.email,
            phone: p.phone,
            address: p.address,
            experience_years: p.experience_years,
            skills: p.skills,
            availability_status: p.availability_status,
            rating: p.rating,
            profile_image: p.profile_image,
            is_active: p.is_active,
            is_approved: p.is_approved,
            current_subscription_id: p.current_subscription_id.map(|id| id.to_hex()),
            created_at: fmt_date(&p.created_at),
            updated_at: fmt_date(&p.updated_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CustomerResponse {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub current_subscription_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        CustomerResponse {
            id: c.id.map(|id| id.to_hex()).unwrap_or_default(),
            role: Role::Customer,
            name: c.name,
            email: c.email,
            phone: c.phone,
            address: c.address,
            current_subscription_id: c.current_subscription_id.map(|id| id.to_hex()),
            created_at: fmt_date(&c.created_at),
            updated_at: fmt_date(&c.updated_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AdminResponse {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl From<Admin> for AdminResponse {
    fn from(a: Admin) -> Self {
        AdminResponse {
            id: a.id.map(|id| id.to_hex()).unwrap_or_default(),
            role: Role::Admin,
            name: a.name,
            email: a.email,
            created_at: fmt_date(&a.created_at),
        }
    }
}

/// Compact account reference embedded in other responses.
#[derive(Debug, Serialize, JsonSchema)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<AccountRecord> for AccountSummary {
    fn from(a: AccountRecord) -> Self {
        AccountSummary {
            id: a.id.to_hex(),
            name: a.name,
            email: a.email,
        }
    }
}

// ============================================================================
// REQUEST BODIES
// ============================================================================

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct RegisterCustomerDto {
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct RegisterProviderDto {
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(range(min = 1, message = "Minimum 1 year of experience is required"))]
    pub experience_years: Option<i32>,
    #[validate(length(min = 1, message = "At least one skill is required"))]
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct RegisterAdminDto {
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoginDto {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateProviderProfileDto {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(range(min = 1, message = "Minimum 1 year of experience is required"))]
    pub experience_years: Option<i32>,
    #[validate(length(min = 1, message = "At least one skill is required"))]
    pub skills: Option<Vec<String>>,
    pub availability_status: Option<Availability>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateCustomerProfileDto {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProfileImageDto {
    pub profile_image: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct RejectProviderDto {
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_collections() {
        assert_eq!(Role::parse("provider"), Some(Role::Provider));
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::Admin.collection(), db::ADMINS);
        assert_eq!(Role::Customer.user_type(), Some(UserType::Customer));
        assert_eq!(Role::Admin.user_type(), None);
        assert_eq!(UserType::parse("Provider").map(|t| t.role()), Some(Role::Provider));
    }

    #[test]
    fn trial_lasts_thirty_days() {
        let created = DateTime::from_millis(1_700_000_000_000);
        assert_eq!(
            trial_expires_at(created).timestamp_millis() - created.timestamp_millis(),
            30 * 24 * 60 * 60 * 1000
        );
        assert!(is_within_trial(created, add_days(created, 29)));
        assert!(!is_within_trial(created, add_days(created, 30)));
        assert!(!is_within_trial(created, add_days(created, 31)));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("hunter22", 4).unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn provider_response_hides_password() {
        let now = DateTime::now();
        let provider = Provider {
            id: Some(ObjectId::new()),
            name: "Sam".into(),
            email: "sam@example.com".into(),
            password: "$2b$10$secret".into(),
            phone: "0123456789".into(),
            address: "1 Main St".into(),
            experience_years: 3,
            skills: vec!["Plumbing".into()],
            availability_status: Availability::Available,
            rating: 0.0,
            profile_image: None,
            is_active: false,
            is_approved: false,
            rejection_reason: None,
            stripe_customer_id: None,
            current_subscription_id: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(ProviderResponse::from(provider)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "provider");
        assert_eq!(json["availability_status"], "Available");
    }
}
