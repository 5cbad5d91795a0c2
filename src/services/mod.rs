pub mod email;
pub mod jwt;
pub mod notifier;
pub mod stripe;

pub use email::EmailService;
pub use jwt::JwtService;
pub use notifier::Notifier;
pub use stripe::StripeService;
