use mongodb::bson::{doc, DateTime, Document};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::collections::HashMap;

use super::{account_summaries, summary_of};
use crate::db::{self, DbConn};
use crate::guards::{AuthUser, ProviderUser};
use crate::models::{CreateWorkPostDto, JobPost, Role, UpdateWorkPostDto, WorkPost, WorkPostResponse};
use crate::utils::{
    non_blank, paginate, parse_id, require_date, text, validate_dto, ApiError, ApiResponse, Created, FieldKind,
    ListQuery, ListSpec,
};

const WORK_POST_LIST: ListSpec =
    ListSpec::new(&["title", "description", "category"]).filters(&[("category", FieldKind::Text)]);

async fn with_providers(db: &DbConn, posts: Vec<WorkPost>) -> Result<Vec<WorkPostResponse>, ApiError> {
    let providers = account_summaries(db, Role::Provider, posts.iter().map(|p| p.provider_id)).await?;
    Ok(posts
        .into_iter()
        .map(|post| {
            let provider = summary_of(&providers, &post.provider_id);
            let mut response = WorkPostResponse::from(post);
            response.provider = provider;
            response
        })
        .collect())
}

async fn single(db: &DbConn, post: WorkPost) -> Result<WorkPostResponse, ApiError> {
    with_providers(db, vec![post])
        .await?
        .pop()
        .ok_or_else(|| ApiError::internal_error("Failed to load work post"))
}

async fn load_work_post(db: &DbConn, id: &str) -> Result<WorkPost, ApiError> {
    let id = parse_id(id, "work post")?;
    db.collection::<WorkPost>(db::WORK_POSTS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Work post not found"))
}

async fn list_with(
    db: &DbConn,
    params: &HashMap<String, String>,
    defaults: Document,
) -> Result<Json<ApiResponse<Vec<WorkPostResponse>>>, ApiError> {
    let query = ListQuery::from_params(params, &WORK_POST_LIST, defaults);
    let (posts, pagination) = paginate(&db.collection::<WorkPost>(db::WORK_POSTS), &query).await?;
    Ok(Json(ApiResponse::paginated(with_providers(db, posts).await?, pagination)))
}

fn check_author(user: &AuthUser, post: &WorkPost, action: &str) -> Result<(), ApiError> {
    if user.is_admin() || (user.role == Role::Provider && user.owns(&post.provider_id)) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("You can only {} your own work posts", action)))
    }
}

#[openapi(tag = "Work Posts")]
#[get("/workposts?<params..>")]
pub async fn list_work_posts(
    user: AuthUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<WorkPostResponse>>>, ApiError> {
    let defaults = match user.role {
        Role::Provider => doc! { "provider_id": user.id },
        _ => doc! { "is_public": true },
    };
    list_with(db, &params, defaults).await
}

#[openapi(tag = "Work Posts")]
#[get("/workposts/<id>")]
pub async fn get_work_post(
    user: AuthUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<WorkPostResponse>>, ApiError> {
    let post = load_work_post(db, &id).await?;
    if !post.visible_to(&user.id, user.is_admin()) {
        return Err(ApiError::forbidden("You do not have permission to view this work post"));
    }
    Ok(Json(ApiResponse::success(single(db, post).await?)))
}

#[openapi(tag = "Work Posts")]
#[post("/workposts", data = "<dto>")]
pub async fn create_work_post(
    provider: ProviderUser,
    db: &State<DbConn>,
    dto: Json<CreateWorkPostDto>,
) -> Result<Created<Json<ApiResponse<WorkPostResponse>>>, ApiError> {
    let title = non_blank(&dto.title).ok_or_else(|| ApiError::bad_request("Title is required"))?;
    let before_image =
        non_blank(&dto.before_image).ok_or_else(|| ApiError::bad_request("Before image is required"))?;
    let after_image = non_blank(&dto.after_image).ok_or_else(|| ApiError::bad_request("After image is required"))?;
    validate_dto(&*dto)?;

    let mut job_post_id = None;
    let mut service_id = None;
    let mut customer_id = None;
    if let Some(raw) = non_blank(&dto.job_post_id) {
        let id = parse_id(&raw, "job post")?;
        let job = db
            .collection::<JobPost>(db::JOB_POSTS)
            .find_one(doc! { "_id": id }, None)
            .await?
            .ok_or_else(|| ApiError::not_found("Job post not found"))?;
        if !job.completed_by(&provider.id) {
            return Err(ApiError::forbidden(
                "You can only post work for jobs you completed. This job is not completed by you.",
            ));
        }
        job_post_id = Some(id);
        service_id = Some(job.service_id);
        customer_id = Some(job.customer_id);
    }

    let now = DateTime::now();
    let completed_at = match non_blank(&dto.completed_at) {
        Some(raw) => require_date(&raw, "completed_at")?,
        None => now,
    };

    let mut post = WorkPost {
        id: None,
        title,
        description: text(&dto.description),
        before_image,
        after_image,
        category: text(&dto.category),
        provider_id: provider.id,
        job_post_id,
        service_id,
        customer_id,
        completed_at,
        customer_feedback: text(&dto.customer_feedback),
        is_public: dto.is_public.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    let result = db.collection::<WorkPost>(db::WORK_POSTS).insert_one(&post, None).await?;
    post.id = result.inserted_id.as_object_id();
    log::info!("Work post created by provider {}", provider.id);

    Ok(Created(Json(ApiResponse::success_with_message(
        "Work post created successfully",
        single(db, post).await?,
    ))))
}

#[openapi(tag = "Work Posts")]
#[put("/workposts/<id>", data = "<dto>")]
pub async fn update_work_post(
    user: AuthUser,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateWorkPostDto>,
) -> Result<Json<ApiResponse<WorkPostResponse>>, ApiError> {
    let mut post = load_work_post(db, &id).await?;
    check_author(&user, &post, "update")?;
    validate_dto(&*dto)?;

    if let Some(title) = non_blank(&dto.title) {
        post.title = title;
    }
    if let Some(description) = &dto.description {
        post.description = description.trim().to_string();
    }
    if let Some(image) = non_blank(&dto.before_image) {
        post.before_image = image;
    }
    if let Some(image) = non_blank(&dto.after_image) {
        post.after_image = image;
    }
    if let Some(category) = &dto.category {
        post.category = category.trim().to_string();
    }
    if let Some(raw) = non_blank(&dto.completed_at) {
        post.completed_at = require_date(&raw, "completed_at")?;
    }
    if let Some(feedback) = &dto.customer_feedback {
        post.customer_feedback = feedback.trim().to_string();
    }
    if let Some(public) = dto.is_public {
        post.is_public = public;
    }
    post.updated_at = DateTime::now();

    db.collection::<WorkPost>(db::WORK_POSTS)
        .replace_one(doc! { "_id": post.id }, &post, None)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Work post updated successfully",
        single(db, post).await?,
    )))
}

#[openapi(tag = "Work Posts")]
#[delete("/workposts/<id>")]
pub async fn delete_work_post(user: AuthUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    let post = load_work_post(db, &id).await?;
    check_author(&user, &post, "delete")?;

    db.collection::<WorkPost>(db::WORK_POSTS)
        .delete_one(doc! { "_id": post.id }, None)
        .await?;
    Ok(Json(ApiResponse::message("Work post deleted successfully")))
}

#[openapi(tag = "Work Posts")]
#[get("/workposts/provider/<provider_id>?<params..>")]
pub async fn list_by_provider(
    _user: AuthUser,
    db: &State<DbConn>,
    provider_id: String,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<WorkPostResponse>>>, ApiError> {
    let provider_id = parse_id(&provider_id, "provider")?;
    list_with(db, &params, doc! { "provider_id": provider_id, "is_public": true }).await
}

#[openapi(tag = "Work Posts")]
#[get("/workposts/job/<job_post_id>?<params..>")]
pub async fn list_by_job_post(
    _user: AuthUser,
    db: &State<DbConn>,
    job_post_id: String,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<WorkPostResponse>>>, ApiError> {
    let job_post_id = parse_id(&job_post_id, "job post")?;
    list_with(db, &params, doc! { "job_post_id": job_post_id, "is_public": true }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn providers_only_touch_their_own_posts() {
        let owner = ObjectId::new();
        let now = DateTime::now();
        let post = WorkPost {
            id: Some(ObjectId::new()),
            title: "Deck rebuild".into(),
            description: String::new(),
            before_image: "before.jpg".into(),
            after_image: "after.jpg".into(),
            category: String::new(),
            provider_id: owner,
            job_post_id: None,
            service_id: None,
            customer_id: None,
            completed_at: now,
            customer_feedback: String::new(),
            is_public: true,
            created_at: now,
            updated_at: now,
        };
        let user = |id, role| AuthUser {
            id,
            role,
            email: "p@example.com".to_string(),
            name: "P".to_string(),
            is_approved: Some(true),
            created_at: now,
        };

        assert!(check_author(&user(owner, Role::Provider), &post, "update").is_ok());
        assert!(check_author(&user(ObjectId::new(), Role::Admin), &post, "delete").is_ok());
        assert_eq!(
            check_author(&user(ObjectId::new(), Role::Provider), &post, "delete")
                .unwrap_err()
                .message,
            "You can only delete your own work posts"
        );
    }
}
