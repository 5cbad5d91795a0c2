#[macro_use]
extern crate rocket;

pub mod config;
pub mod db;
pub mod guards;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::fs::{FileServer, Options};
use rocket::http::{Header, Status};
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{make_swagger_ui, SwaggerUIConfig};

use crate::guards::rejection_for;
use crate::utils::ApiError;

/* ----------------------------- CORS ----------------------------- */

pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, PATCH, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, Stripe-Signature",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- ROOT ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

#[get("/")]
fn index() -> &'static str {
    "Welcome to the WorkBond API"
}

/* ----------------------------- ERRORS ----------------------------- */

/// Prefers the reason a guard recorded over the generic message.
fn caught(req: &Request<'_>, status: Status, fallback: &str) -> ApiError {
    rejection_for(req)
        .cloned()
        .unwrap_or_else(|| ApiError::new(status, fallback))
}

#[catch(400)]
fn bad_request(req: &Request<'_>) -> ApiError {
    caught(req, Status::BadRequest, "Bad request")
}

#[catch(401)]
fn unauthorized(req: &Request<'_>) -> ApiError {
    caught(req, Status::Unauthorized, "Access denied. No token provided.")
}

#[catch(403)]
fn forbidden(req: &Request<'_>) -> ApiError {
    caught(req, Status::Forbidden, "Access denied")
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> ApiError {
    caught(req, Status::NotFound, "Resource not found")
}

#[catch(422)]
fn unprocessable(req: &Request<'_>) -> ApiError {
    caught(req, Status::UnprocessableEntity, "Invalid request body")
}

#[catch(500)]
fn internal_error(req: &Request<'_>) -> ApiError {
    caught(req, Status::InternalServerError, "Internal server error")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- APP ----------------------------- */

/// Routes, catchers and fairings without the database fairing.
pub fn app() -> Rocket<Build> {
    rocket::build()
        .attach(Cors)
        .mount("/", routes![index, options_handler])
        .mount(
            "/api",
            openapi_get_routes![
                // Auth
                routes::auth::register_customer,
                routes::auth::register_provider,
                routes::auth::register_admin,
                routes::auth::login,
                // Providers
                routes::providers::list_public_providers,
                routes::providers::get_public_provider,
                routes::providers::get_public_provider_work_posts,
                routes::providers::check_approval,
                routes::providers::list_pending_providers,
                routes::providers::list_all_providers,
                routes::providers::approve,
                routes::providers::reject,
                routes::providers::delete_provider,
                routes::providers::get_profile,
                routes::providers::update_profile,
                routes::providers::set_profile_image,
                routes::providers::remove_profile_image,
                routes::providers::get_subscription,
                routes::providers::get_bookings,
                routes::providers::get_reviews,
                // Customers
                routes::customers::get_profile,
                routes::customers::update_profile,
                routes::customers::list_providers,
                routes::customers::get_provider,
                routes::customers::list_services,
                routes::customers::get_service,
                routes::customers::get_service_providers,
                routes::customers::create_booking,
                routes::customers::list_bookings,
                routes::customers::get_booking,
                routes::customers::update_booking,
                routes::customers::cancel_booking,
                routes::customers::create_review,
                routes::customers::list_reviews,
                // Services
                routes::services::list_services,
                routes::services::get_service,
                routes::services::create_service,
                routes::services::update_service,
                routes::services::delete_service,
                // Price lists
                routes::price_lists::list_price_lists,
                routes::price_lists::list_for_service,
                routes::price_lists::get_price_list,
                routes::price_lists::create_price_list,
                routes::price_lists::update_price_list,
                routes::price_lists::delete_price_list,
                // Reviews
                routes::reviews::list_reviews,
                routes::reviews::get_review,
                routes::reviews::create_review,
                routes::reviews::update_review,
                routes::reviews::delete_review,
                // Job posts
                routes::job_posts::list_job_posts,
                routes::job_posts::get_job_post,
                routes::job_posts::create_job_post,
                routes::job_posts::update_job_post,
                routes::job_posts::delete_job_post,
                routes::job_posts::apply_to_job_post,
                routes::job_posts::approve_application,
                routes::job_posts::reject_application,
                routes::job_posts::complete_job_post,
                // Work posts
                routes::work_posts::list_work_posts,
                routes::work_posts::get_work_post,
                routes::work_posts::create_work_post,
                routes::work_posts::update_work_post,
                routes::work_posts::delete_work_post,
                routes::work_posts::list_by_provider,
                routes::work_posts::list_by_job_post,
                // Uploads
                routes::file_upload::upload_image,
                routes::file_upload::upload_image_base64,
                // Subscriptions
                routes::subscriptions::admin_summary,
                routes::subscriptions::list_subscriptions,
                routes::subscriptions::get_subscription,
                routes::subscriptions::create_subscription,
                routes::subscriptions::subscribe,
                routes::subscriptions::update_subscription,
                routes::subscriptions::delete_subscription,
                // Payments
                routes::payments::create_subscription_payment,
                routes::payments::user_subscription_status,
                // Notifications
                routes::notifications::list_notifications,
                routes::notifications::mark_read,
                routes::notifications::mark_all_read,
                // Admin
                routes::admin::list_providers,
                routes::admin::list_pending_providers,
                routes::admin::get_provider,
                routes::admin::approve_provider_account,
                routes::admin::reject_provider_account,
                routes::admin::delete_provider,
                routes::admin::list_customers,
                routes::admin::get_customer,
                routes::admin::delete_customer,
                routes::admin::list_admins,
                routes::admin::list_subscriptions,
                routes::admin::list_bookings,
                routes::admin::list_reviews,
            ],
        )
        .mount("/api", routes![routes::payments::stripe_webhook])
        .mount(
            "/uploads",
            FileServer::new("uploads", Options::Index | Options::Missing),
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![bad_request, unauthorized, forbidden, not_found, unprocessable, internal_error],
        )
}

/// The full server: `app()` plus the MongoDB fairing.
pub fn rocket() -> Rocket<Build> {
    log::info!("🚀 {} API starting", config::Config::app_name());
    log::info!("📚 Swagger UI → /api/docs");
    app().attach(db::init())
}
