use mongodb::bson::{doc, oid::ObjectId, DateTime};
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket::State;

// === OpenAPI (compatible with rocket_okapi 0.8.0 / 0.8.1) ===
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::db::DbConn;
use crate::models::{AccountRecord, Role};
use crate::services::jwt::{Claims, TokenError};
use crate::services::JwtService;
use crate::utils::ApiError;

/// Reason the first failing guard gave; the catchers echo it.
pub struct GuardRejection(pub ApiError);

pub(crate) fn reject<T>(req: &Request<'_>, error: ApiError) -> request::Outcome<T, ()> {
    let status = error.status;
    req.local_cache(|| Some(GuardRejection(error)));
    Outcome::Error((status, ()))
}

pub fn rejection_for<'a>(req: &'a Request<'_>) -> Option<&'a ApiError> {
    req.local_cache(|| None::<GuardRejection>)
        .as_ref()
        .map(|rejection| &rejection.0)
}

fn bearer_claims(req: &Request<'_>) -> Result<Claims, ApiError> {
    req.local_cache(|| {
        let header = req.headers().get_one("Authorization").map(str::trim);
        let token = match header {
            Some(value) if !value.is_empty() => value.strip_prefix("Bearer ").unwrap_or(value).trim(),
            _ => return Err(ApiError::unauthorized("Access denied. No token provided.")),
        };
        if token.is_empty() {
            return Err(ApiError::unauthorized("Access denied. No token provided."));
        }

        JwtService::verify_token(token).map_err(|e| match e {
            TokenError::Expired => ApiError::unauthorized("Token expired."),
            TokenError::Invalid => ApiError::unauthorized("Invalid token."),
        })
    })
    .clone()
}

/// Authenticated caller whose account still exists.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: ObjectId,
    pub role: Role,
    pub email: String,
    pub name: String,
    /// Only set for providers.
    pub is_approved: Option<bool>,
    pub created_at: DateTime,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, account_id: &ObjectId) -> bool {
        &self.id == account_id
    }
}

async fn resolve(req: &Request<'_>) -> Result<AuthUser, ApiError> {
    let claims = bearer_claims(req)?;
    let id = ObjectId::parse_str(&claims.sub).map_err(|_| ApiError::unauthorized("Invalid token."))?;

    let db = match req.guard::<&State<DbConn>>().await {
        Outcome::Success(db) => db,
        _ => {
            log::error!("Authentication attempted without a database handle");
            return Err(ApiError::internal_error("Authentication error."));
        }
    };

    let account = db
        .collection::<AccountRecord>(claims.role.collection())
        .find_one(doc! { "_id": id }, None)
        .await
        .map_err(|e| {
            log::error!("Account lookup failed: {}", e);
            ApiError::internal_error("Authentication error.")
        })?
        .ok_or_else(|| ApiError::unauthorized("Invalid token. User not found."))?;

    Ok(AuthUser {
        id: account.id,
        role: claims.role,
        email: account.email,
        name: account.name,
        is_approved: match claims.role {
            Role::Provider => Some(account.is_approved.unwrap_or(false)),
            _ => None,
        },
        created_at: account.created_at,
    })
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let resolved = req.local_cache_async(async { resolve(req).await }).await;

        match resolved {
            Ok(user) => Outcome::Success(user.clone()),
            Err(e) => reject(req, e.clone()),
        }
    }
}

/// Checks the role carried by the token before touching the database.
async fn with_role<'r>(req: &'r Request<'_>, allowed: &[Role], message: &str) -> request::Outcome<AuthUser, ()> {
    match bearer_claims(req) {
        Ok(claims) if allowed.contains(&claims.role) => {}
        Ok(_) => return reject(req, ApiError::forbidden(message)),
        Err(e) => return reject(req, e),
    }
    req.guard::<AuthUser>().await
}

macro_rules! role_guard {
    ($(#[$doc:meta])* $name:ident, [$($role:expr),+], $message:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(pub AuthUser);

        impl std::ops::Deref for $name {
            type Target = AuthUser;

            fn deref(&self) -> &AuthUser {
                &self.0
            }
        }

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = ();

            async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
                with_role(req, &[$($role),+], $message).await.map($name)
            }
        }

        impl<'a> OpenApiFromRequest<'a> for $name {
            fn from_request_input(
                _gen: &mut OpenApiGenerator,
                _name: String,
                _required: bool,
            ) -> rocket_okapi::Result<RequestHeaderInput> {
                Ok(RequestHeaderInput::None)
            }
        }
    };
}

role_guard!(AdminUser, [Role::Admin], "Access denied. Admin privileges required.");
role_guard!(CustomerUser, [Role::Customer], "This route is only accessible to customers.");
role_guard!(ProviderUser, [Role::Provider], "This route is only accessible to providers.");
role_guard!(
    /// Provider or customer; the roles that hold subscriptions.
    SubscriberUser,
    [Role::Provider, Role::Customer],
    "This route is only accessible to providers and customers."
);

/// Provider whose account has been approved by an admin.
#[derive(Debug, Clone)]
pub struct ApprovedProvider(pub AuthUser);

impl std::ops::Deref for ApprovedProvider {
    type Target = AuthUser;

    fn deref(&self) -> &AuthUser {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApprovedProvider {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let provider = match req.guard::<ProviderUser>().await {
            Outcome::Success(provider) => provider,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        if provider.is_approved != Some(true) {
            return reject(
                req,
                ApiError::new(Status::Forbidden, "Access denied. Your provider account is pending approval."),
            );
        }

        Outcome::Success(ApprovedProvider(provider.0))
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthUser {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for ApprovedProvider {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
