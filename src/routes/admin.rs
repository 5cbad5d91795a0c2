use mongodb::bson::{doc, Document};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::collections::HashMap;

use super::bookings_with_parties;
use super::providers::{
    approve_provider, delete_provider_account, load_provider, reject_provider, rejection_message, RejectionData,
    PROVIDER_LIST,
};
use super::reviews::with_accounts;
use super::subscriptions::with_users;
use crate::db::{self, DbConn};
use crate::guards::AdminUser;
use crate::models::{
    Admin, AdminResponse, Booking, BookingResponse, Customer, CustomerResponse, Provider, ProviderResponse,
    RejectProviderDto, Review, ReviewResponse, Subscription, SubscriptionResponse,
};
use crate::utils::{non_blank, paginate, parse_id, ApiError, ApiResponse, ListQuery, ListSpec};

const CUSTOMER_LIST: ListSpec = ListSpec::new(&["name", "email", "phone", "address"]);
const ADMIN_LIST: ListSpec = ListSpec::new(&["name", "email"]);

fn newest_first() -> Document {
    doc! { "created_at": -1 }
}

// ============================================================================
// PROVIDERS
// ============================================================================

#[openapi(tag = "Admin")]
#[get("/admin/providers?<params..>")]
pub async fn list_providers(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &PROVIDER_LIST, Document::new());
    let (providers, pagination) = paginate(&db.collection::<Provider>(db::PROVIDERS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        providers.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Admin")]
#[get("/admin/providers/pending?<params..>")]
pub async fn list_pending_providers(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, doc! { "is_approved": false }, newest_first());
    let (providers, pagination) = paginate(&db.collection::<Provider>(db::PROVIDERS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        providers.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Admin")]
#[get("/admin/providers/<id>")]
pub async fn get_provider(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    let provider = load_provider(db, parse_id(&id, "provider")?).await?;
    Ok(Json(ApiResponse::success(provider.into())))
}

#[openapi(tag = "Admin")]
#[put("/admin/providers/<id>/approve")]
pub async fn approve_provider_account(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    let provider = approve_provider(db, parse_id(&id, "provider")?).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Provider approved successfully. The provider can now log in and access all provider features.",
        provider,
    )))
}

#[openapi(tag = "Admin")]
#[put("/admin/providers/<id>/reject", data = "<dto>")]
pub async fn reject_provider_account(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
    dto: Option<Json<RejectProviderDto>>,
) -> Result<Json<ApiResponse<RejectionData>>, ApiError> {
    let reason = dto.and_then(|d| non_blank(&d.reason));
    let message = rejection_message(&reason);
    let data = reject_provider(db, parse_id(&id, "provider")?, reason).await?;
    Ok(Json(ApiResponse::success_with_message(message, data)))
}

#[openapi(tag = "Admin")]
#[delete("/admin/providers/<id>")]
pub async fn delete_provider(_admin: AdminUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    delete_provider_account(db, parse_id(&id, "provider")?).await?;
    Ok(Json(ApiResponse::message("Provider deleted successfully")))
}

// ============================================================================
// CUSTOMERS & ADMINS
// ============================================================================

#[openapi(tag = "Admin")]
#[get("/admin/customers?<params..>")]
pub async fn list_customers(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<CustomerResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &CUSTOMER_LIST, Document::new());
    let (customers, pagination) = paginate(&db.collection::<Customer>(db::CUSTOMERS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        customers.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Admin")]
#[get("/admin/customers/<id>")]
pub async fn get_customer(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    let id = parse_id(&id, "customer")?;
    let customer = db
        .collection::<Customer>(db::CUSTOMERS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found"))?;
    Ok(Json(ApiResponse::success(customer.into())))
}

#[openapi(tag = "Admin")]
#[delete("/admin/customers/<id>")]
pub async fn delete_customer(_admin: AdminUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "customer")?;
    let result = db
        .collection::<Customer>(db::CUSTOMERS)
        .delete_one(doc! { "_id": id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Customer not found"));
    }
    log::info!("Customer deleted: {}", id);
    Ok(Json(ApiResponse::message("Customer deleted successfully")))
}

#[openapi(tag = "Admin")]
#[get("/admin/admins?<params..>")]
pub async fn list_admins(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<AdminResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &ADMIN_LIST, Document::new());
    let (admins, pagination) = paginate(&db.collection::<Admin>(db::ADMINS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        admins.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

// ============================================================================
// ACTIVITY
// ============================================================================

#[openapi(tag = "Admin")]
#[get("/admin/subscriptions?<params..>")]
pub async fn list_subscriptions(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<SubscriptionResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, Document::new(), newest_first());
    let (subs, pagination) = paginate(&db.collection::<Subscription>(db::SUBSCRIPTIONS), &query).await?;
    Ok(Json(ApiResponse::paginated(with_users(db, subs).await?, pagination)))
}

#[openapi(tag = "Admin")]
#[get("/admin/bookings?<params..>")]
pub async fn list_bookings(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, Document::new(), newest_first());
    let (bookings, pagination) = paginate(&db.collection::<Booking>(db::BOOKINGS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        bookings_with_parties(db, bookings).await?,
        pagination,
    )))
}

#[openapi(tag = "Admin")]
#[get("/admin/reviews?<params..>")]
pub async fn list_reviews(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ReviewResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, Document::new(), newest_first());
    let (reviews, pagination) = paginate(&db.collection::<Review>(db::REVIEWS), &query).await?;
    Ok(Json(ApiResponse::paginated(with_accounts(db, reviews).await?, pagination)))
}
