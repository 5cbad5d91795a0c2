pub mod auth;
pub mod subscription;

pub use auth::{
    rejection_for, AdminUser, ApprovedProvider, AuthUser, CustomerUser, GuardRejection, ProviderUser,
    SubscriberUser,
};
pub use subscription::Subscribed;
