use mongodb::bson::{doc, DateTime, Document};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::collections::HashMap;

use super::services::load_service;
use crate::db::{self, DbConn};
use crate::guards::AdminUser;
use crate::models::{CreatePriceListDto, PriceList, PriceListResponse, UpdatePriceListDto};
use crate::utils::{non_blank, paginate, parse_id, ApiError, ApiResponse, Created, FieldKind, ListQuery, ListSpec};

const PRICE_LIST: ListSpec = ListSpec::new(&["description"]).filters(&[
    ("service_id", FieldKind::Id),
    ("price_type", FieldKind::Text),
    ("unit", FieldKind::Text),
    ("is_active", FieldKind::Bool),
]);

async fn load_price_list(db: &DbConn, id: &str) -> Result<PriceList, ApiError> {
    let id = parse_id(id, "price list")?;
    db.collection::<PriceList>(db::PRICE_LISTS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Price list not found"))
}

#[openapi(tag = "Price Lists")]
#[get("/price-lists?<params..>")]
pub async fn list_price_lists(
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<PriceListResponse>>>, ApiError> {
    let query = ListQuery::from_params(&params, &PRICE_LIST, Document::new());
    let (entries, pagination) = paginate(&db.collection::<PriceList>(db::PRICE_LISTS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        entries.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Price Lists")]
#[get("/price-lists/service/<service_id>?<params..>")]
pub async fn list_for_service(
    db: &State<DbConn>,
    service_id: String,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<PriceListResponse>>>, ApiError> {
    let service_id = parse_id(&service_id, "service")?;
    load_service(db, service_id).await?;

    let query = ListQuery::from_params(&params, &PRICE_LIST, doc! { "service_id": service_id, "is_active": true });
    let (entries, pagination) = paginate(&db.collection::<PriceList>(db::PRICE_LISTS), &query).await?;
    Ok(Json(ApiResponse::paginated(
        entries.into_iter().map(Into::into).collect(),
        pagination,
    )))
}

#[openapi(tag = "Price Lists")]
#[get("/price-lists/<id>")]
pub async fn get_price_list(db: &State<DbConn>, id: String) -> Result<Json<ApiResponse<PriceListResponse>>, ApiError> {
    Ok(Json(ApiResponse::success(load_price_list(db, &id).await?.into())))
}

#[openapi(tag = "Price Lists")]
#[post("/price-lists", data = "<dto>")]
pub async fn create_price_list(
    _admin: AdminUser,
    db: &State<DbConn>,
    dto: Json<CreatePriceListDto>,
) -> Result<Created<Json<ApiResponse<PriceListResponse>>>, ApiError> {
    let service_id = parse_id(&dto.service_id, "service")?;
    load_service(db, service_id).await?;

    let now = DateTime::now();
    let mut entry = PriceList {
        id: None,
        service_id,
        price_type: dto.price_type,
        fixed_price: dto.fixed_price,
        unit_price: dto.unit_price,
        unit: dto.unit.unwrap_or_default(),
        min_price: dto.min_price,
        max_price: dto.max_price,
        description: non_blank(&dto.description),
        is_active: dto.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    entry.validate()?;

    let result = db.collection::<PriceList>(db::PRICE_LISTS).insert_one(&entry, None).await?;
    entry.id = result.inserted_id.as_object_id();

    Ok(Created(Json(ApiResponse::success_with_message(
        "Price list created successfully",
        entry.into(),
    ))))
}

#[openapi(tag = "Price Lists")]
#[put("/price-lists/<id>", data = "<dto>")]
pub async fn update_price_list(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdatePriceListDto>,
) -> Result<Json<ApiResponse<PriceListResponse>>, ApiError> {
    let mut entry = load_price_list(db, &id).await?;

    if let Some(service_id) = non_blank(&dto.service_id) {
        let service_id = parse_id(&service_id, "service")?;
        load_service(db, service_id).await?;
        entry.service_id = service_id;
    }
    if let Some(price_type) = dto.price_type {
        entry.price_type = price_type;
    }
    if dto.fixed_price.is_some() {
        entry.fixed_price = dto.fixed_price;
    }
    if dto.unit_price.is_some() {
        entry.unit_price = dto.unit_price;
    }
    if let Some(unit) = dto.unit {
        entry.unit = unit;
    }
    if dto.min_price.is_some() {
        entry.min_price = dto.min_price;
    }
    if dto.max_price.is_some() {
        entry.max_price = dto.max_price;
    }
    if let Some(description) = &dto.description {
        entry.description = Some(description.trim().to_string());
    }
    if let Some(active) = dto.is_active {
        entry.is_active = active;
    }
    entry.validate()?;
    entry.updated_at = DateTime::now();

    db.collection::<PriceList>(db::PRICE_LISTS)
        .replace_one(doc! { "_id": entry.id }, &entry, None)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Price list updated successfully",
        entry.into(),
    )))
}

#[openapi(tag = "Price Lists")]
#[delete("/price-lists/<id>")]
pub async fn delete_price_list(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "price list")?;
    let result = db
        .collection::<PriceList>(db::PRICE_LISTS)
        .delete_one(doc! { "_id": id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Price list not found"));
    }
    Ok(Json(ApiResponse::message("Price list deleted successfully")))
}
