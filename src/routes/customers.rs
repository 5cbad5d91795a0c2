use mongodb::bson::{doc, DateTime};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::collections::HashMap;

use super::providers::PROVIDER_LIST;
use super::reviews::{create_review_for, with_accounts};
use super::services::{load_service, SERVICE_LIST};
use super::{account_summaries, bookings_with_parties, summary_of};
use crate::db::{self, DbConn};
use crate::guards::{CustomerUser, Subscribed};
use crate::models::{
    Booking, BookingResponse, BookingStatus, CreateBookingDto, CreateReviewDto, Customer, CustomerResponse, Provider,
    ProviderResponse, Review, ReviewResponse, Role, Service, ServiceResponse, UpdateCustomerProfileDto,
};
use crate::utils::{
    non_blank, paginate, parse_id, require_date, validate_phone, ApiError, ApiResponse, Created, ListQuery,
};

async fn load_customer(db: &DbConn, customer: &CustomerUser) -> Result<Customer, ApiError> {
    db.collection::<Customer>(db::CUSTOMERS)
        .find_one(doc! { "_id": customer.id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found"))
}

async fn own_booking(db: &DbConn, customer: &CustomerUser, id: &str) -> Result<Booking, ApiError> {
    let id = parse_id(id, "booking")?;
    db.collection::<Booking>(db::BOOKINGS)
        .find_one(doc! { "_id": id, "customer_id": customer.id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))
}

async fn booking_with_parties(db: &DbConn, booking: Booking) -> Result<BookingResponse, ApiError> {
    bookings_with_parties(db, vec![booking])
        .await?
        .pop()
        .ok_or_else(|| ApiError::internal_error("Failed to load booking"))
}

// ============================================================================
// PROFILE
// ============================================================================

#[openapi(tag = "Customers")]
#[get("/customers/profile")]
pub async fn get_profile(customer: CustomerUser, db: &State<DbConn>) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(load_customer(db, &customer).await?.into())))
}

#[openapi(tag = "Customers")]
#[put("/customers/profile", data = "<dto>")]
pub async fn update_profile(
    customer: CustomerUser,
    db: &State<DbConn>,
    dto: Json<UpdateCustomerProfileDto>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    let mut set = doc! { "updated_at": DateTime::now() };
    if let Some(name) = non_blank(&dto.name) {
        set.insert("name", name);
    }
    if let Some(phone) = non_blank(&dto.phone) {
        if !validate_phone(&phone) {
            return Err(ApiError::bad_request("Phone number must be 10 digits"));
        }
        set.insert("phone", phone);
    }
    if let Some(address) = non_blank(&dto.address) {
        set.insert("address", address);
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = db
        .collection::<Customer>(db::CUSTOMERS)
        .find_one_and_update(doc! { "_id": customer.id }, doc! { "$set": set }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Customer profile updated successfully",
        updated.into(),
    )))
}

// ============================================================================
// BROWSING
// ============================================================================

#[openapi(tag = "Customers")]
#[get("/customers/providers?<params..>")]
pub async fn list_providers(
    _customer: CustomerUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &PROVIDER_LIST, doc! { "is_approved": true });
    let (providers, pagination) = paginate(&db.collection::<Provider>(db::PROVIDERS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        providers.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Customers")]
#[get("/customers/providers/<id>")]
pub async fn get_provider(
    _customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    let id = parse_id(&id, "provider")?;
    let provider = db
        .collection::<Provider>(db::PROVIDERS)
        .find_one(doc! { "_id": id, "is_approved": true }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Provider not found"))?;
    Ok(Json(ApiResponse::success(provider.into())))
}

#[openapi(tag = "Customers")]
#[get("/customers/services?<params..>")]
pub async fn list_services(
    _customer: CustomerUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ServiceResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &SERVICE_LIST, doc! { "is_active": true });
    let (services, pagination) = paginate(&db.collection::<Service>(db::SERVICES), &query).await?;
    Ok(Json(ApiResponse::paginated(
        services.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Customers")]
#[get("/customers/services/<id>")]
pub async fn get_service(
    _customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<ServiceResponse>>, ApiError> {
    let service = load_service(db, parse_id(&id, "service")?).await?;
    Ok(Json(ApiResponse::success(service.into())))
}

#[openapi(tag = "Customers")]
#[get("/customers/services/<id>/providers?<params..>")]
pub async fn get_service_providers(
    _customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    let service = load_service(db, parse_id(&id, "service")?).await?;
    let query = ListQuery::paged(
        &params,
        doc! {
            "is_approved": true,
            "skills": { "$in": [service.name, service.category] },
        },
        doc! { "rating": -1 },
    );
    let (providers, pagination) = paginate(&db.collection::<Provider>(db::PROVIDERS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        providers.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

// ============================================================================
// BOOKINGS
// ============================================================================

#[openapi(tag = "Customers")]
#[post("/customers/bookings", data = "<dto>")]
pub async fn create_booking(
    customer: CustomerUser,
    _subscribed: Subscribed,
    db: &State<DbConn>,
    dto: Json<CreateBookingDto>,
) -> Result<Created<Json<ApiResponse<BookingResponse>>>, ApiError> {
    let (Some(provider), Some(scheduled_date), Some(total_amount)) =
        (non_blank(&dto.provider), non_blank(&dto.scheduled_date), dto.total_amount)
    else {
        return Err(ApiError::bad_request(
            "All fields are required: provider, scheduled_date, total_amount",
        ));
    };
    if total_amount < 0.0 {
        return Err(ApiError::bad_request("Total amount cannot be negative"));
    }

    let provider_id = parse_id(&provider, "provider")?;
    let scheduled_date = require_date(&scheduled_date, "scheduled_date")?;

    let approved = db
        .collection::<Provider>(db::PROVIDERS)
        .find_one(doc! { "_id": provider_id, "is_approved": true }, None)
        .await?;
    if approved.is_none() {
        return Err(ApiError::not_found("Provider not found or not approved"));
    }

    let now = DateTime::now();
    let mut booking = Booking {
        id: None,
        customer_id: customer.id,
        provider_id,
        scheduled_date,
        total_amount,
        status: BookingStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    let result = db.collection::<Booking>(db::BOOKINGS).insert_one(&booking, None).await?;
    booking.id = result.inserted_id.as_object_id();

    log::info!("Booking created by customer {} for provider {}", customer.id, provider_id);

    Ok(Created(Json(ApiResponse::success_with_message(
        "Booking created successfully",
        booking_with_parties(db, booking).await?,
    ))))
}

#[openapi(tag = "Customers")]
#[get("/customers/bookings?<params..>")]
pub async fn list_bookings(
    customer: CustomerUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, doc! { "customer_id": customer.id }, doc! { "created_at": -1 });
    let (bookings, pagination) = paginate(&db.collection::<Booking>(db::BOOKINGS), &query).await?;

    let providers = account_summaries(db, Role::Provider, bookings.iter().map(|b| b.provider_id)).await?;
    let data = bookings
        .into_iter()
        .map(|booking| {
            let provider = summary_of(&providers, &booking.provider_id);
            let mut response = BookingResponse::from(booking);
            response.provider = provider;
            response
        })
        .collect();

    Ok(Json(ApiResponse::paginated(data, pagination)))
}

#[openapi(tag = "Customers")]
#[get("/customers/bookings/<id>")]
pub async fn get_booking(
    customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = own_booking(db, &customer, &id).await?;
    Ok(Json(ApiResponse::success(booking_with_parties(db, booking).await?)))
}

#[openapi(tag = "Customers")]
#[put("/customers/bookings/<id>", data = "<dto>")]
pub async fn update_booking(
    customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
    dto: Json<crate::models::UpdateBookingDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let mut booking = own_booking(db, &customer, &id).await?;

    if let Some(date) = non_blank(&dto.scheduled_date) {
        booking.scheduled_date = require_date(&date, "scheduled_date")?;
    }
    if let Some(status) = non_blank(&dto.status) {
        booking.status = BookingStatus::parse(&status).ok_or_else(|| {
            ApiError::bad_request("Invalid status. Must be Pending, Confirmed, Completed, or Cancelled")
        })?;
    }
    booking.updated_at = DateTime::now();

    db.collection::<Booking>(db::BOOKINGS)
        .update_one(
            doc! { "_id": booking.id },
            doc! { "$set": {
                "scheduled_date": booking.scheduled_date,
                "status": mongodb::bson::to_bson(&booking.status)?,
                "updated_at": booking.updated_at,
            } },
            None,
        )
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking updated successfully",
        booking_with_parties(db, booking).await?,
    )))
}

#[openapi(tag = "Customers")]
#[put("/customers/bookings/<id>/cancel")]
pub async fn cancel_booking(
    customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let mut booking = own_booking(db, &customer, &id).await?;
    booking.status = BookingStatus::Cancelled;
    booking.updated_at = DateTime::now();

    db.collection::<Booking>(db::BOOKINGS)
        .update_one(
            doc! { "_id": booking.id },
            doc! { "$set": { "status": "Cancelled", "updated_at": booking.updated_at } },
            None,
        )
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking cancelled successfully",
        booking.into(),
    )))
}

// ============================================================================
// REVIEWS
// ============================================================================

#[openapi(tag = "Customers")]
#[post("/customers/reviews", data = "<dto>")]
pub async fn create_review(
    customer: CustomerUser,
    db: &State<DbConn>,
    dto: Json<CreateReviewDto>,
) -> Result<Created<Json<ApiResponse<ReviewResponse>>>, ApiError> {
    let review = create_review_for(db, customer.id, &dto).await?;
    Ok(Created(Json(ApiResponse::success_with_message(
        "Review created successfully",
        review,
    ))))
}

#[openapi(tag = "Customers")]
#[get("/customers/reviews?<params..>")]
pub async fn list_reviews(
    customer: CustomerUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ReviewResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, doc! { "customer_id": customer.id }, doc! { "created_at": -1 });
    let (reviews, pagination) = paginate(&db.collection::<Review>(db::REVIEWS), &query).await?;
    Ok(Json(ApiResponse::paginated(with_accounts(db, reviews).await?, pagination)))
}
