use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOneOptions, ReturnDocument};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::Serialize;
use std::collections::HashMap;

use super::{account_summaries, summary_of};
use crate::db::{self, DbConn};
use crate::guards::{AdminUser, ApprovedProvider, Subscribed};
use crate::models::{
    Booking, BookingResponse, NotificationKind, ProfileImageDto, Provider, ProviderResponse, RejectProviderDto,
    Review, ReviewResponse, Role, Subscription, SubscriptionResponse, UpdateProviderProfileDto, WorkPost,
    WorkPostResponse,
};
use crate::services::{EmailService, Notifier};
use crate::utils::{
    fmt_date, non_blank, paginate, parse_id, validate_dto, validate_phone, ApiError, ApiResponse, FieldKind,
    ListQuery, ListSpec,
};

pub const PROVIDER_LIST: ListSpec = ListSpec::new(&["name", "email", "phone"])
    .filters(&[
        ("availability_status", FieldKind::Text),
        ("skills", FieldKind::Text),
        ("experience_years", FieldKind::Number),
        ("is_approved", FieldKind::Bool),
    ])
    .rating_range("rating")
    .default_sort("-rating");

#[derive(Debug, Serialize, JsonSchema)]
pub struct ApprovalProvider {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "isApproved")]
    pub is_approved: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ApprovalStatus {
    #[serde(rename = "isApproved")]
    pub is_approved: bool,
    pub status: String,
    pub message: String,
    pub provider: ApprovalProvider,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct RejectionData {
    pub provider: ProviderResponse,
    #[serde(rename = "rejectionReason")]
    pub rejection_reason: Option<String>,
}

async fn list_providers(
    db: &DbConn,
    params: &HashMap<String, String>,
    defaults: Document,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    let query = ListQuery::from_params(params, &PROVIDER_LIST, defaults);
    let (providers, pagination) = paginate(&db.collection::<Provider>(db::PROVIDERS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        providers.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

pub(crate) async fn load_provider(db: &DbConn, id: ObjectId) -> Result<Provider, ApiError> {
    db.collection::<Provider>(db::PROVIDERS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Provider not found"))
}

async fn update_provider(db: &DbConn, id: ObjectId, set: Document) -> Result<Provider, ApiError> {
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    db.collection::<Provider>(db::PROVIDERS)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Provider not found"))
}

/// Approves a pending provider, then emails and notifies them.
pub(crate) async fn approve_provider(db: &DbConn, id: ObjectId) -> Result<ProviderResponse, ApiError> {
    let provider = load_provider(db, id).await?;
    if provider.is_approved {
        return Err(ApiError::bad_request("Provider is already approved"));
    }

    let provider = update_provider(
        db,
        id,
        doc! {
            "is_approved": true,
            "is_active": true,
            "rejection_reason": null,
            "updated_at": DateTime::now(),
        },
    )
    .await?;

    log::info!("Provider approved: {}", provider.email);
    EmailService::send_provider_approval(&provider.email, &provider.name).await;
    Notifier::notify(
        db,
        id,
        Role::Provider,
        NotificationKind::Success,
        "Your provider account has been approved. You can now log in and access all provider features.",
    )
    .await;

    Ok(provider.into())
}

/// Revokes approval, recording the optional reason.
pub(crate) async fn reject_provider(db: &DbConn, id: ObjectId, reason: Option<String>) -> Result<RejectionData, ApiError> {
    load_provider(db, id).await?;

    let provider = update_provider(
        db,
        id,
        doc! {
            "is_approved": false,
            "is_active": false,
            "rejection_reason": reason.clone(),
            "updated_at": DateTime::now(),
        },
    )
    .await?;

    log::info!("Provider rejected: {}", provider.email);
    EmailService::send_provider_rejection(&provider.email, &provider.name, reason.as_deref()).await;

    let message = match &reason {
        Some(reason) => format!("Your provider application was rejected. Reason: {}", reason),
        None => "Your provider application was rejected.".to_string(),
    };
    Notifier::notify(db, id, Role::Provider, NotificationKind::Warning, message).await;

    Ok(RejectionData {
        provider: provider.into(),
        rejection_reason: reason,
    })
}

pub(crate) fn rejection_message(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!("Provider rejected successfully. Reason: {}", reason),
        None => "Provider rejected successfully. The provider can no longer access provider features.".to_string(),
    }
}

pub(crate) async fn delete_provider_account(db: &DbConn, id: ObjectId) -> Result<(), ApiError> {
    let result = db
        .collection::<Provider>(db::PROVIDERS)
        .delete_one(doc! { "_id": id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Provider not found"));
    }
    log::info!("Provider deleted: {}", id);
    Ok(())
}

// ============================================================================
// PUBLIC
// ============================================================================

#[openapi(tag = "Providers")]
#[get("/providers/public?<params..>")]
pub async fn list_public_providers(
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    list_providers(db, &params, doc! { "is_approved": true }).await
}

#[openapi(tag = "Providers")]
#[get("/providers/public/<id>")]
pub async fn get_public_provider(db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    let id = parse_id(&id, "provider")?;
    let provider = db
        .collection::<Provider>(db::PROVIDERS)
        .find_one(doc! { "_id": id, "is_approved": true }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Provider not found"))?;

    Ok(Json(ApiResponse::success(provider.into())))
}

#[openapi(tag = "Providers")]
#[get("/providers/public/<id>/work-posts?<params..>")]
pub async fn get_public_provider_work_posts(
    db: &State<DbConn>,
    id: String,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<WorkPostResponse>>>, ApiError> {
    let id = parse_id(&id, "provider")?;
    let query = ListQuery::paged(
        &params,
        doc! { "provider_id": id, "is_public": true },
        doc! { "created_at": -1 },
    );
    let (posts, pagination) = paginate(&db.collection::<WorkPost>(db::WORK_POSTS), &query).await?;

    Ok(Json(ApiResponse::paginated(
        posts.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Providers")]
#[get("/providers/check-approval/<id>")]
pub async fn check_approval(db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<ApprovalStatus>>, ApiError> {
    let id = parse_id(&id, "provider")?;
    let provider = load_provider(db, id).await?;

    let message = if provider.is_approved {
        "Your account is approved. You can now log in and access all provider features."
    } else {
        "Your account is pending approval. Please wait for admin approval before you can log in."
    };

    Ok(Json(ApiResponse::success(ApprovalStatus {
        is_approved: provider.is_approved,
        status: if provider.is_approved { "Approved" } else { "Pending" }.to_string(),
        message: message.to_string(),
        provider: ApprovalProvider {
            id: id.to_hex(),
            name: provider.name,
            email: provider.email,
            is_approved: provider.is_approved,
            created_at: fmt_date(&provider.created_at),
        },
    })))
}

// ============================================================================
// ADMIN
// ============================================================================

#[openapi(tag = "Providers")]
#[get("/providers/pending?<params..>")]
pub async fn list_pending_providers(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    list_providers(db, &params, doc! { "is_approved": false }).await
}

#[openapi(tag = "Providers")]
#[get("/providers/admin/all?<params..>")]
pub async fn list_all_providers(
    _admin: AdminUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ProviderResponse>>>, ApiError> {
    list_providers(db, &params, Document::new()).await
}

#[openapi(tag = "Providers")]
#[patch("/providers/<id>/approve")]
pub async fn approve(_admin: AdminUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    let provider = approve_provider(db, parse_id(&id, "provider")?).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Provider approved successfully. The provider can now log in and access all provider features.",
        provider,
    )))
}

#[openapi(tag = "Providers")]
#[patch("/providers/<id>/reject", data = "<dto>")]
pub async fn reject(
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

#[openapi(tag = "Providers")]
#[delete("/providers/<id>")]
pub async fn delete_provider(_admin: AdminUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    delete_provider_account(db, parse_id(&id, "provider")?).await?;
    Ok(Json(ApiResponse::message("Provider deleted successfully")))
}

// ============================================================================
// SELF-SERVICE (approved providers)
// ============================================================================

#[openapi(tag = "Providers")]
#[get("/providers/profile")]
pub async fn get_profile(provider: ApprovedProvider, db: &State<DbConn>) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(load_provider(db, provider.id).await?.into())))
}

#[openapi(tag = "Providers")]
#[put("/providers/profile", data = "<dto>")]
pub async fn update_profile(
    provider: ApprovedProvider,
    db: &State<DbConn>,
    dto: Json<UpdateProviderProfileDto>,
) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    validate_dto(&*dto)?;

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
    if let Some(years) = dto.experience_years {
        set.insert("experience_years", years);
    }
    if let Some(skills) = &dto.skills {
        let skills: Vec<String> = skills
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if skills.is_empty() {
            return Err(ApiError::bad_request("At least one skill is required"));
        }
        set.insert("skills", skills);
    }
    if let Some(status) = dto.availability_status {
        set.insert("availability_status", mongodb::bson::to_bson(&status)?);
    }

    let updated = update_provider(db, provider.id, set).await?;
    Ok(Json(ApiResponse::success_with_message("Profile updated successfully", updated.into())))
}

#[openapi(tag = "Providers")]
#[patch("/providers/profile/image", data = "<dto>")]
pub async fn set_profile_image(
    provider: ApprovedProvider,
    db: &State<DbConn>,
    dto: Json<ProfileImageDto>,
) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    let image = non_blank(&dto.profile_image).ok_or_else(|| ApiError::bad_request("Profile image URL is required"))?;
    let updated = update_provider(
        db,
        provider.id,
        doc! { "profile_image": image, "updated_at": DateTime::now() },
    )
    .await?;
    Ok(Json(ApiResponse::success_with_message("Profile image updated successfully", updated.into())))
}

#[openapi(tag = "Providers")]
#[delete("/providers/profile/image")]
pub async fn remove_profile_image(
    provider: ApprovedProvider,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<ProviderResponse>>, ApiError> {
    let updated = update_provider(
        db,
        provider.id,
        doc! { "profile_image": null, "updated_at": DateTime::now() },
    )
    .await?;
    Ok(Json(ApiResponse::success_with_message("Profile image removed successfully", updated.into())))
}

#[openapi(tag = "Providers")]
#[get("/providers/subscription")]
pub async fn get_subscription(
    provider: ApprovedProvider,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<SubscriptionResponse>>, ApiError> {
    let options = FindOneOptions::builder().sort(doc! { "created_at": -1 }).build();
    let subscription = db
        .collection::<Subscription>(db::SUBSCRIPTIONS)
        .find_one(doc! { "user_id": provider.id }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("No subscription found"))?;

    Ok(Json(ApiResponse::success(subscription.into())))
}

#[openapi(tag = "Providers")]
#[get("/providers/bookings?<params..>")]
pub async fn get_bookings(
    provider: ApprovedProvider,
    _subscribed: Subscribed,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, doc! { "provider_id": provider.id }, doc! { "created_at": -1 });
    let (bookings, pagination) = paginate(&db.collection::<Booking>(db::BOOKINGS), &query).await?;

    let customers = account_summaries(db, Role::Customer, bookings.iter().map(|b| b.customer_id)).await?;
    let data = bookings
        .into_iter()
        .map(|booking| {
            let customer = summary_of(&customers, &booking.customer_id);
            let mut response = BookingResponse::from(booking);
            response.customer = customer;
            response
        })
        .collect();

    Ok(Json(ApiResponse::paginated(data, pagination)))
}

#[openapi(tag = "Providers")]
#[get("/providers/reviews?<params..>")]
pub async fn get_reviews(
    provider: ApprovedProvider,
    _subscribed: Subscribed,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ReviewResponse>>>, ApiError> {
    let query = ListQuery::paged(&params, doc! { "provider_id": provider.id }, doc! { "created_at": -1 });
    let (reviews, pagination) = paginate(&db.collection::<Review>(db::REVIEWS), &query).await?;

    let customers = account_summaries(db, Role::Customer, reviews.iter().map(|r| r.customer_id)).await?;
    let data = reviews
        .into_iter()
        .map(|review| {
            let customer = summary_of(&customers, &review.customer_id);
            let mut response = ReviewResponse::from(review);
            response.customer = customer;
            response
        })
        .collect();

    Ok(Json(ApiResponse::paginated(data, pagination)))
}
