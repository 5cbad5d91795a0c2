use rocket::figment::Figment;
use std::sync::LazyLock;

// Rocket's own figment: Rocket.toml (profile-selected) merged with ROCKET_* env vars.
static FIGMENT: LazyLock<Figment> = LazyLock::new(rocket::Config::figment);

pub const DEFAULT_JWT_EXPIRY_SECS: i64 = 30 * 24 * 60 * 60;

pub struct Config;

impl Config {
    fn figment() -> &'static Figment {
        &FIGMENT
    }

    fn string_or(key: &str, default: &str) -> String {
        Self::figment()
            .extract_inner(key)
            .unwrap_or_else(|_| default.to_string())
    }

    fn optional(key: &str) -> Option<String> {
        Self::figment()
            .extract_inner::<String>(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn jwt_secret() -> String {
        Self::string_or("jwt_secret", "your-secret-key")
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(DEFAULT_JWT_EXPIRY_SECS)
    }

    pub fn mongodb_uri() -> String {
        Self::string_or("mongodb_uri", "mongodb://localhost:27017")
    }

    pub fn database_name() -> String {
        Self::string_or("database_name", "workbond")
    }

    pub fn client_url() -> String {
        Self::string_or("client_url", "http://localhost:3000")
    }

    pub fn app_name() -> String {
        Self::string_or("app_name", "WorkBond")
    }

    pub fn mail_host() -> String {
        Self::string_or("mail_host", "smtp.gmail.com")
    }

    pub fn mail_port() -> u16 {
        Self::figment().extract_inner("mail_port").unwrap_or(587)
    }

    pub fn mail_user() -> String {
        Self::figment().extract_inner("mail_user").unwrap_or_default()
    }

    pub fn mail_password() -> String {
        Self::figment()
            .extract_inner("mail_password")
            .unwrap_or_default()
    }

    pub fn mail_from() -> String {
        Self::optional("mail_from")
            .unwrap_or_else(|| format!("{} <{}>", Self::app_name(), Self::mail_user()))
    }

    pub fn stripe_secret_key() -> Option<String> {
        Self::optional("stripe_secret_key")
    }

    pub fn stripe_webhook_secret() -> Option<String> {
        Self::optional("stripe_webhook_secret")
    }

    pub fn stripe_currency() -> String {
        Self::string_or("stripe_currency", "usd")
    }
}
