use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::collections::HashMap;

use crate::db::{self, DbConn};
use crate::guards::AdminUser;
use crate::models::{CreateServiceDto, PriceList, Service, ServiceResponse, UpdateServiceDto};
use crate::utils::{
    non_blank, paginate, parse_id, validate_dto, ApiError, ApiResponse, Created, FieldKind, ListQuery, ListSpec,
};

pub const SERVICE_LIST: ListSpec = ListSpec::new(&["name", "description", "category"])
    .filters(&[("category", FieldKind::Text), ("is_active", FieldKind::Bool)])
    .price_range("base_price");

pub(crate) async fn load_service(db: &DbConn, id: ObjectId) -> Result<Service, ApiError> {
    db.collection::<Service>(db::SERVICES)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))
}

#[openapi(tag = "Services")]
#[get("/services?<params..>")]
pub async fn list_services(
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<ServiceResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &SERVICE_LIST, Document::new());
    let (services, pagination) = paginate(&db.collection::<Service>(db::SERVICES), &query).await?;
    Ok(Json(ApiResponse::paginated(
        services.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Services")]
#[get("/services/<id>")]
pub async fn get_service(db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<ServiceResponse>>, ApiError> {
    let service = load_service(db, parse_id(&id, "service")?).await?;
    Ok(Json(ApiResponse::success(service.into())))
}

#[openapi(tag = "Services")]
#[post("/services", data = "<dto>")]
pub async fn create_service(
    _admin: AdminUser,
    db: &State<DbConn>,
    dto: Json<CreateServiceDto>,
) -> Result<Created<Json<ApiResponse<ServiceResponse>>>, ApiError> {
    validate_dto(&*dto)?;

    let now = DateTime::now();
    let mut service = Service {
        id: None,
        name: dto.name.trim().to_string(),
        description: non_blank(&dto.description).unwrap_or_default(),
        category: dto.category.trim().to_string(),
        base_price: dto.base_price,
        duration: non_blank(&dto.duration),
        image: non_blank(&dto.image),
        is_active: dto.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    if service.name.is_empty() || service.category.is_empty() {
        return Err(ApiError::bad_request("Service name and category are required"));
    }

    let result = db.collection::<Service>(db::SERVICES).insert_one(&service, None).await?;
    service.id = result.inserted_id.as_object_id();
    log::info!("Service created: {}", service.name);

    Ok(Created(Json(ApiResponse::success_with_message(
        "Service created successfully",
        service.into(),
    ))))
}

#[openapi(tag = "Services")]
#[put("/services/<id>", data = "<dto>")]
pub async fn update_service(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateServiceDto>,
) -> Result<Json<ApiResponse<ServiceResponse>>, ApiError> {
    let id = parse_id(&id, "service")?;
    validate_dto(&*dto)?;

    let mut set = doc! { "updated_at": DateTime::now() };
    if let Some(name) = non_blank(&dto.name) {
        set.insert("name", name);
    }
    if let Some(description) = &dto.description {
        set.insert("description", description.trim());
    }
    if let Some(category) = non_blank(&dto.category) {
        set.insert("category", category);
    }
    if let Some(price) = dto.base_price {
        set.insert("base_price", price);
    }
    if let Some(duration) = non_blank(&dto.duration) {
        set.insert("duration", duration);
    }
    if let Some(image) = non_blank(&dto.image) {
        set.insert("image", image);
    }
    if let Some(active) = dto.is_active {
        set.insert("is_active", active);
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let service = db
        .collection::<Service>(db::SERVICES)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Service updated successfully",
        service.into(),
    )))
}

#[openapi(tag = "Services")]
#[delete("/services/<id>")]
pub async fn delete_service(_admin: AdminUser, db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "service")?;
    let result = db
        .collection::<Service>(db::SERVICES)
        .delete_one(doc! { "_id": id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Service not found"));
    }

    // Price lists are meaningless without their service.
    db.collection::<PriceList>(db::PRICE_LISTS)
        .delete_many(doc! { "service_id": id }, None)
        .await?;

    Ok(Json(ApiResponse::message("Service deleted successfully")))
}
