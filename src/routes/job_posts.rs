use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::Serialize;
use std::collections::HashMap;

use super::services::load_service;
use super::{account_summaries, summary_of};
use crate::db::{self, DbConn};
use crate::guards::{ApprovedProvider, AuthUser, CustomerUser};
use crate::models::{
    ApplicationResponse, CreateJobPostDto, Customer, JobPost, JobPostResponse, JobStatus, NotificationKind, Role,
    UpdateJobPostDto,
};
use crate::services::Notifier;
use crate::utils::{
    is_blank, non_blank, paginate, parse_id, text, ApiError, ApiResponse, Created, FieldKind, ListQuery, ListSpec,
};

const JOB_POST_LIST: ListSpec = ListSpec::new(&["title", "description", "location", "duration"])
    .filters(&[("job_status", FieldKind::Text), ("service_id", FieldKind::Id)]);

#[derive(Debug, Serialize, JsonSchema)]
pub struct JobCompletion {
    pub job_post: JobPostResponse,
    #[serde(rename = "canPostWork")]
    pub can_post_work: bool,
}

async fn load_job_post(db: &DbConn, id: &str) -> Result<JobPost, ApiError> {
    let id = parse_id(id, "job post")?;
    db.collection::<JobPost>(db::JOB_POSTS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Job post not found"))
}

/// Applies a guarded write; a miss means another request changed the job first.
async fn commit(db: &DbConn, (filter, update): (Document, Document)) -> Result<(), ApiError> {
    let result = db
        .collection::<JobPost>(db::JOB_POSTS)
        .update_one(filter, update, None)
        .await?;
    if result.matched_count == 0 {
        return Err(ApiError::conflict(
            "This job post was changed by another request. Please reload and try again.",
        ));
    }
    Ok(())
}

async fn with_customers(db: &DbConn, jobs: Vec<JobPost>) -> Result<Vec<JobPostResponse>, ApiError> {
    let customers = account_summaries(db, Role::Customer, jobs.iter().map(|j| j.customer_id)).await?;
    Ok(jobs
        .into_iter()
        .map(|job| {
            let customer = summary_of(&customers, &job.customer_id);
            let mut response = JobPostResponse::from(job);
            response.customer = customer;
            response
        })
        .collect())
}

async fn single(db: &DbConn, job: JobPost) -> Result<JobPostResponse, ApiError> {
    with_customers(db, vec![job])
        .await?
        .pop()
        .ok_or_else(|| ApiError::internal_error("Failed to load job post"))
}

fn check_manager(user: &AuthUser, job: &JobPost, action: &str) -> Result<(), ApiError> {
    if user.is_admin() || (user.role == Role::Customer && user.owns(&job.customer_id)) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("You can only {} your own job posts", action)))
    }
}

fn check_owner(customer: &AuthUser, job: &JobPost) -> Result<(), ApiError> {
    if customer.owns(&job.customer_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only manage applications on your own job posts"))
    }
}

#[openapi(tag = "Job Posts")]
#[get("/jobposts?<params..>")]
pub async fn list_job_posts(
    user: AuthUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<JobPostResponse>>>, ApiError> {
    let defaults = match user.role {
        Role::Customer => doc! { "customer_id": user.id },
        _ => Document::new(),
    };
    let query = ListQuery::from_params(&params, &JOB_POST_LIST, defaults);
    let (jobs, pagination) = paginate(&db.collection::<JobPost>(db::JOB_POSTS), &query).await?;
    Ok(Json(ApiResponse::paginated(with_customers(db, jobs).await?, pagination)))
}

#[openapi(tag = "Job Posts")]
#[get("/jobposts/<id>")]
pub async fn get_job_post(
    user: AuthUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<JobPostResponse>>, ApiError> {
    let job = load_job_post(db, &id).await?;
    if user.role == Role::Customer && !user.owns(&job.customer_id) {
        return Err(ApiError::forbidden("You can only view your own job posts"));
    }
    Ok(Json(ApiResponse::success(single(db, job).await?)))
}

#[openapi(tag = "Job Posts")]
#[post("/jobposts", data = "<dto>")]
pub async fn create_job_post(
    customer: CustomerUser,
    db: &State<DbConn>,
    dto: Json<CreateJobPostDto>,
) -> Result<Created<Json<ApiResponse<JobPostResponse>>>, ApiError> {
    if is_blank(&dto.title) || is_blank(&dto.description) || is_blank(&dto.duration) || is_blank(&dto.service_id) {
        return Err(ApiError::bad_request(
            "All fields are required: title, description, duration, service_id",
        ));
    }

    let has_phone = db
        .collection::<Customer>(db::CUSTOMERS)
        .find_one(doc! { "_id": customer.id }, None)
        .await?
        .is_some_and(|c| !c.phone.trim().is_empty());
    if !has_phone {
        return Err(ApiError::bad_request(
            "Please add a phone number to your profile before posting a job",
        ));
    }

    let service_id = parse_id(&text(&dto.service_id), "service")?;
    load_service(db, service_id).await?;

    let now = DateTime::now();
    let mut job = JobPost {
        id: None,
        title: text(&dto.title),
        description: text(&dto.description),
        duration: text(&dto.duration),
        service_id,
        location: non_blank(&dto.location),
        customer_id: customer.id,
        job_status: JobStatus::Open,
        assigned_provider_id: None,
        applications: Vec::new(),
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    let result = db.collection::<JobPost>(db::JOB_POSTS).insert_one(&job, None).await?;
    job.id = result.inserted_id.as_object_id();
    log::info!("Job post created by {}: {}", customer.email, job.title);

    Ok(Created(Json(ApiResponse::success_with_message(
        "Job post created successfully. It is now visible to providers.",
        single(db, job).await?,
    ))))
}

#[openapi(tag = "Job Posts")]
#[put("/jobposts/<id>", data = "<dto>")]
pub async fn update_job_post(
    user: AuthUser,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateJobPostDto>,
) -> Result<Json<ApiResponse<JobPostResponse>>, ApiError> {
    let job = load_job_post(db, &id).await?;
    check_manager(&user, &job, "update")?;

    let mut changes = doc! { "updated_at": DateTime::now() };
    if let Some(service_id) = non_blank(&dto.service_id) {
        let service_id = parse_id(&service_id, "service")?;
        load_service(db, service_id).await?;
        changes.insert("service_id", service_id);
    }
    if let Some(title) = non_blank(&dto.title) {
        changes.insert("title", title);
    }
    if let Some(description) = non_blank(&dto.description) {
        changes.insert("description", description);
    }
    if let Some(duration) = non_blank(&dto.duration) {
        changes.insert("duration", duration);
    }
    if let Some(location) = &dto.location {
        changes.insert("location", non_blank(&Some(location.clone())));
    }
    if let Some(status) = dto.job_status {
        changes.insert("job_status", to_bson(&status)?);
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let job = db
        .collection::<JobPost>(db::JOB_POSTS)
        .find_one_and_update(doc! { "_id": job.id }, doc! { "$set": changes }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Job post not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Job post updated successfully",
        single(db, job).await?,
    )))
}

#[openapi(tag = "Job Posts")]
#[delete("/jobposts/<id>")]
pub async fn delete_job_post(user: AuthUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    let job = load_job_post(db, &id).await?;
    check_manager(&user, &job, "delete")?;

    db.collection::<JobPost>(db::JOB_POSTS)
        .delete_one(doc! { "_id": job.id }, None)
        .await?;
    Ok(Json(ApiResponse::message("Job post deleted successfully")))
}

#[openapi(tag = "Job Posts")]
#[post("/jobposts/<id>/apply")]
pub async fn apply_to_job_post(
    provider: ApprovedProvider,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<ApplicationResponse>>, ApiError> {
    let mut job = load_job_post(db, &id).await?;
    let application = job.apply(provider.id, DateTime::now())?.clone();
    commit(db, job.application_push(&application)?).await?;

    Notifier::notify(
        db,
        job.customer_id,
        Role::Customer,
        NotificationKind::Info,
        format!("{} applied to your job post \"{}\"", provider.name, job.title),
    )
    .await;

    Ok(Json(ApiResponse::success_with_message(
        "Application submitted successfully",
        application.into(),
    )))
}

async fn decide_application(
    customer: &AuthUser,
    db: &DbConn,
    id: &str,
    application_id: &str,
    approve: bool,
) -> Result<JobPost, ApiError> {
    let mut job = load_job_post(db, id).await?;
    check_owner(customer, &job)?;
    let application_id: ObjectId = parse_id(application_id, "application")?;

    let before = job.clone();
    let now = DateTime::now();
    let provider_id = if approve {
        job.approve_application(&application_id, now)?
    } else {
        job.reject_application(&application_id, now)?
    };
    commit(db, job.decision_write(&before, &application_id)?).await?;

    let (kind, message) = if approve {
        (
            NotificationKind::Success,
            format!("Your application for \"{}\" has been approved", job.title),
        )
    } else {
        (
            NotificationKind::Warning,
            format!("Your application for \"{}\" was not selected", job.title),
        )
    };
    Notifier::notify(db, provider_id, Role::Provider, kind, message).await;

    Ok(job)
}

#[openapi(tag = "Job Posts")]
#[put("/jobposts/<id>/applications/<application_id>/approve")]
pub async fn approve_application(
    customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
    application_id: String,
) -> Result<Json<ApiResponse<JobPostResponse>>, ApiError> {
    let job = decide_application(&customer, db, &id, &application_id, true).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Application approved successfully",
        single(db, job).await?,
    )))
}

#[openapi(tag = "Job Posts")]
#[put("/jobposts/<id>/applications/<application_id>/reject")]
pub async fn reject_application(
    customer: CustomerUser,
    db: &State<DbConn>,
    id: String,
    application_id: String,
) -> Result<Json<ApiResponse<JobPostResponse>>, ApiError> {
    let job = decide_application(&customer, db, &id, &application_id, false).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Application rejected successfully",
        single(db, job).await?,
    )))
}

#[openapi(tag = "Job Posts")]
#[put("/jobposts/<id>/complete")]
pub async fn complete_job_post(
    provider: ApprovedProvider,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<JobCompletion>>, ApiError> {
    let mut job = load_job_post(db, &id).await?;
    let before = job.clone();
    job.complete(&provider.id, DateTime::now())?;
    commit(db, job.completion_write(&before, &provider.id)?).await?;

    Notifier::notify(
        db,
        job.customer_id,
        Role::Customer,
        NotificationKind::Success,
        format!("{} marked your job \"{}\" as completed", provider.name, job.title),
    )
    .await;

    Ok(Json(ApiResponse::success_with_message(
        "Job marked as completed. You can now share it as a work post.",
        JobCompletion {
            job_post: single(db, job).await?,
            can_post_work: true,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: ObjectId, role: Role) -> AuthUser {
        AuthUser {
            id,
            role,
            email: "user@example.com".to_string(),
            name: "User".to_string(),
            is_approved: None,
            created_at: DateTime::now(),
        }
    }

    fn job(customer_id: ObjectId) -> JobPost {
        let now = DateTime::now();
        JobPost {
            id: Some(ObjectId::new()),
            title: "Paint fence".into(),
            description: "Two coats".into(),
            duration: "1 day".into(),
            service_id: ObjectId::new(),
            location: None,
            customer_id,
            job_status: JobStatus::Open,
            assigned_provider_id: None,
            applications: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_and_admin_manage_posts() {
        let owner = ObjectId::new();
        let post = job(owner);

        assert!(check_manager(&user(owner, Role::Customer), &post, "update").is_ok());
        assert!(check_manager(&user(ObjectId::new(), Role::Admin), &post, "delete").is_ok());

        let err = check_manager(&user(ObjectId::new(), Role::Customer), &post, "delete").unwrap_err();
        assert_eq!(err.message, "You can only delete your own job posts");
        assert!(check_manager(&user(ObjectId::new(), Role::Provider), &post, "update").is_err());
    }

    #[test]
    fn only_owner_decides_applications() {
        let owner = ObjectId::new();
        let post = job(owner);
        assert!(check_owner(&user(owner, Role::Customer), &post).is_ok());
        assert!(check_owner(&user(ObjectId::new(), Role::Customer), &post).is_err());
    }
}
