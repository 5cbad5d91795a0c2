use mongodb::bson::DateTime;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket::State;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use super::auth::reject;
use super::AuthUser;
use crate::db::{self, DbConn};
use crate::models::{is_within_trial, Subscription};
use crate::utils::ApiError;

/// Caller is an admin, inside the free trial, or holds a paid active plan.
#[derive(Debug, Clone)]
pub struct Subscribed(pub AuthUser);

impl std::ops::Deref for Subscribed {
    type Target = AuthUser;

    fn deref(&self) -> &AuthUser {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Subscribed {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let user = match req.guard::<AuthUser>().await {
            Outcome::Success(user) => user,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        let now = DateTime::now();
        if user.is_admin() || is_within_trial(user.created_at, now) {
            return Outcome::Success(Subscribed(user));
        }

        let db = match req.guard::<&State<DbConn>>().await {
            Outcome::Success(db) => db,
            _ => return reject(req, ApiError::internal_error("Subscription check failed.")),
        };

        let active = db
            .collection::<Subscription>(db::SUBSCRIPTIONS)
            .find_one(Subscription::active_paid_filter(user.id, now), None)
            .await;

        match active {
            Ok(Some(_)) => Outcome::Success(Subscribed(user)),
            Ok(None) => reject(
                req,
                ApiError::forbidden("Access denied. An active subscription is required after the 1-month free trial.")
                    .with("requiresSubscription", true)
                    .with("trialExpired", true),
            ),
            Err(e) => {
                log::error!("Subscription check error: {}", e);
                reject(req, ApiError::internal_error("Subscription check failed."))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for Subscribed {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
