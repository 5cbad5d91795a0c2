use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::collections::HashMap;

use super::{account_summaries, summary_of};
use crate::db::{self, DbConn};
use crate::guards::{AuthUser, CustomerUser};
use crate::models::{
    average_rating, Booking, CreateReviewDto, Provider, Review, ReviewResponse, Role, UpdateReviewDto,
};
use crate::utils::{
    is_blank, non_blank, paginate, parse_id, text, validate_dto, ApiError, ApiResponse, Created, FieldKind,
    ListQuery, ListSpec,
};

const REVIEW_LIST: ListSpec = ListSpec::new(&["comment"])
    .filters(&[
        ("provider_id", FieldKind::Id),
        ("customer_id", FieldKind::Id),
        ("booking_id", FieldKind::Id),
    ])
    .rating_range("rating");

/// Embeds customer and provider name/email into each review.
pub(crate) async fn with_accounts(db: &DbConn, reviews: Vec<Review>) -> Result<Vec<ReviewResponse>, ApiError> {
    let customers = account_summaries(db, Role::Customer, reviews.iter().map(|r| r.customer_id)).await?;
    let providers = account_summaries(db, Role::Provider, reviews.iter().map(|r| r.provider_id)).await?;

    Ok(reviews
        .into_iter()
        .map(|review| {
            let customer = summary_of(&customers, &review.customer_id);
            let provider = summary_of(&providers, &review.provider_id);
            let mut response = ReviewResponse::from(review);
            response.customer = customer;
            response.provider = provider;
            response
        })
        .collect())
}

async fn single(db: &DbConn, review: Review) -> Result<ReviewResponse, ApiError> {
    with_accounts(db, vec![review])
        .await?
        .pop()
        .ok_or_else(|| ApiError::internal_error("Failed to load review"))
}

/// Stores the mean of all ratings a provider has received.
async fn refresh_provider_rating(db: &DbConn, provider_id: ObjectId) -> Result<(), ApiError> {
    let reviews: Vec<Review> = db
        .collection::<Review>(db::REVIEWS)
        .find(doc! { "provider_id": provider_id }, None)
        .await?
        .try_collect()
        .await?;
    let ratings: Vec<i32> = reviews.iter().map(|r| r.rating).collect();

    db.collection::<Provider>(db::PROVIDERS)
        .update_one(
            doc! { "_id": provider_id },
            doc! { "$set": { "rating": average_rating(&ratings), "updated_at": DateTime::now() } },
            None,
        )
        .await?;
    Ok(())
}

/// Reviews rate the provider the booking was made with.
fn check_booking_provider(booking: &Booking, provider_id: &ObjectId) -> Result<(), ApiError> {
    if &booking.provider_id == provider_id {
        Ok(())
    } else {
        Err(ApiError::bad_request("This booking was not made with the given provider"))
    }
}

pub(crate) async fn create_review_for(
    db: &DbConn,
    customer_id: ObjectId,
    dto: &CreateReviewDto,
) -> Result<ReviewResponse, ApiError> {
    if is_blank(&dto.booking_id) || is_blank(&dto.provider_id) || dto.rating.is_none() || is_blank(&dto.comment) {
        return Err(ApiError::bad_request(
            "All fields are required: booking_id, provider_id, rating, comment",
        ));
    }
    validate_dto(dto)?;

    let booking_id = parse_id(&text(&dto.booking_id), "booking")?;
    let provider_id = parse_id(&text(&dto.provider_id), "provider")?;

    let booking = db
        .collection::<Booking>(db::BOOKINGS)
        .find_one(doc! { "_id": booking_id, "customer_id": customer_id }, None)
        .await?
        .ok_or_else(|| ApiError::forbidden("Booking not found or does not belong to you"))?;
    check_booking_provider(&booking, &provider_id)?;

    let reviews = db.collection::<Review>(db::REVIEWS);
    if reviews.find_one(doc! { "booking_id": booking_id }, None).await?.is_some() {
        return Err(ApiError::bad_request("Review already exists for this booking"));
    }

    let now = DateTime::now();
    let mut review = Review {
        id: None,
        booking_id,
        customer_id,
        provider_id,
        rating: dto.rating.unwrap_or_default(),
        comment: text(&dto.comment),
        created_at: now,
        updated_at: now,
    };
    let result = reviews
        .insert_one(&review, None)
        .await
        .map_err(|e| ApiError::or_duplicate(e, "Review already exists for this booking"))?;
    review.id = result.inserted_id.as_object_id();

    refresh_provider_rating(db, provider_id).await?;
    log::info!("Review created for booking {}", booking_id);

    single(db, review).await
}

async fn load_review(db: &DbConn, id: &str) -> Result<Review, ApiError> {
    let id = parse_id(id, "review")?;
    db.collection::<Review>(db::REVIEWS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))
}

fn check_author(user: &AuthUser, review: &Review) -> Result<(), ApiError> {
    if user.is_admin() || (user.role == Role::Customer && user.owns(&review.customer_id)) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only modify your own reviews"))
    }
}

#[openapi(tag = "Reviews")]
#[get("/reviews?<params..>")]
pub async fn list_reviews(
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ReviewResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &REVIEW_LIST, Document::new());
    let (reviews, pagination) = paginate(&db.collection::<Review>(db::REVIEWS), &query).await?;
    Ok(Json(ApiResponse::paginated(with_accounts(db, reviews).await?, pagination)))
}

#[openapi(tag = "Reviews")]
#[get("/reviews/<id>")]
pub async fn get_review(db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<ReviewResponse>>, ApiError> {
    let review = load_review(db, &id).await?;
    Ok(Json(ApiResponse::success(single(db, review).await?)))
}

#[openapi(tag = "Reviews")]
#[post("/reviews", data = "<dto>")]
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

#[openapi(tag = "Reviews")]
#[put("/reviews/<id>", data = "<dto>")]
pub async fn update_review(
    user: AuthUser,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateReviewDto>,
) -> Result<Json<ApiResponse<ReviewResponse>>, ApiError> {
    let mut review = load_review(db, &id).await?;
    check_author(&user, &review)?;
    validate_dto(&*dto)?;

    if let Some(rating) = dto.rating {
        review.rating = rating;
    }
    if let Some(comment) = non_blank(&dto.comment) {
        review.comment = comment;
    }
    review.updated_at = DateTime::now();

    db.collection::<Review>(db::REVIEWS)
        .update_one(
            doc! { "_id": review.id },
            doc! { "$set": {
                "rating": review.rating,
                "comment": &review.comment,
                "updated_at": review.updated_at,
            } },
            None,
        )
        .await?;
    refresh_provider_rating(db, review.provider_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Review updated successfully",
        single(db, review).await?,
    )))
}

#[openapi(tag = "Reviews")]
#[delete("/reviews/<id>")]
pub async fn delete_review(user: AuthUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    let review = load_review(db, &id).await?;
    check_author(&user, &review)?;

    db.collection::<Review>(db::REVIEWS)
        .delete_one(doc! { "_id": review.id }, None)
        .await?;
    refresh_provider_rating(db, review.provider_id).await?;

    Ok(Json(ApiResponse::message("Review deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;

    fn review(customer_id: ObjectId) -> Review {
        let now = DateTime::now();
        Review {
            id: Some(ObjectId::new()),
            booking_id: ObjectId::new(),
            customer_id,
            provider_id: ObjectId::new(),
            rating: 4,
            comment: "Tidy work".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn user(id: ObjectId, role: Role) -> AuthUser {
        AuthUser {
            id,
            role,
            email: "someone@example.com".to_string(),
            name: "Someone".to_string(),
            is_approved: None,
            created_at: DateTime::now(),
        }
    }

    #[test]
    fn only_author_or_admin_may_modify() {
        let author = ObjectId::new();
        let r = review(author);

        assert!(check_author(&user(author, Role::Customer), &r).is_ok());
        assert!(check_author(&user(ObjectId::new(), Role::Admin), &r).is_ok());

        let err = check_author(&user(ObjectId::new(), Role::Customer), &r).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::Forbidden);
        // A provider sharing the author's id is still not the author.
        assert!(check_author(&user(author, Role::Provider), &r).is_err());
    }

    #[test]
    fn reviews_must_name_the_booked_provider() {
        let now = DateTime::now();
        let booking = Booking {
            id: Some(ObjectId::new()),
            customer_id: ObjectId::new(),
            provider_id: ObjectId::new(),
            scheduled_date: now,
            total_amount: 80.0,
            status: BookingStatus::Completed,
            created_at: now,
            updated_at: now,
        };

        assert!(check_booking_provider(&booking, &booking.provider_id).is_ok());
        let err = check_booking_provider(&booking, &ObjectId::new()).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
    }
}
