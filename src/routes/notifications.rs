use mongodb::bson::{doc, DateTime};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::{self, DbConn};
use crate::guards::AuthUser;
use crate::models::{Notification, NotificationFeed};
use crate::utils::{parse_id, ApiError, ApiResponse};

const FEED_SIZE: i64 = 50;

#[openapi(tag = "Notifications")]
#[get("/notifications")]
pub async fn list_notifications(
    user: AuthUser,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<NotificationFeed>>, ApiError> {
    let collection = db.collection::<Notification>(db::NOTIFICATIONS);
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .limit(FEED_SIZE)
        .build();

    let notifications: Vec<Notification> = collection
        .find(doc! { "recipient": user.id }, options)
        .await?
        .try_collect()
        .await?;
    let unread_count = collection
        .count_documents(doc! { "recipient": user.id, "is_read": false }, None)
        .await?;

    Ok(Json(ApiResponse::success(NotificationFeed {
        notifications: notifications.into_iter().map(Into::into).collect(),
        unread_count,
    })))
}

#[openapi(tag = "Notifications")]
#[patch("/notifications/<id>/read")]
pub async fn mark_read(user: AuthUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "notification")?;
    let result = db
        .collection::<Notification>(db::NOTIFICATIONS)
        .update_one(
            doc! { "_id": id, "recipient": user.id },
            doc! { "$set": { "is_read": true, "updated_at": DateTime::now() } },
            None,
        )
        .await?;
    if result.matched_count == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(ApiResponse::message("Notification marked as read")))
}

#[openapi(tag = "Notifications")]
#[patch("/notifications/read-all")]
pub async fn mark_all_read(user: AuthUser, db: &State<DbConn>) -> Result<Json<ApiResponse<()>>, ApiError> {
    let result = db
        .collection::<Notification>(db::NOTIFICATIONS)
        .update_many(
            doc! { "recipient": user.id, "is_read": false },
            doc! { "$set": { "is_read": true, "updated_at": DateTime::now() } },
            None,
        )
        .await?;
    log::debug!("Marked {} notifications read for {}", result.modified_count, user.id);
    Ok(Json(ApiResponse::message("All notifications marked as read")))
}
