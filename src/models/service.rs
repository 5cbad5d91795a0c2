use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::fmt_date;

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Service {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub base_price: f64,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ServiceResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub base_price: f64,
    pub duration: Option<String>,
    pub image: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Service> for ServiceResponse {
    fn from(s: Service) -> Self {
        ServiceResponse {
            id: s.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: s.name,
            description: s.description,
            category: s.category,
            base_price: s.base_price,
            duration: s.duration,
            image: s.image,
            is_active: s.is_active,
            created_at: fmt_date(&s.created_at),
            updated_at: fmt_date(&s.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateServiceDto {
    #[validate(length(min = 1, message = "Service name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub base_price: f64,
    pub duration: Option<String>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateServiceDto {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub base_price: Option<f64>,
    pub duration: Option<String>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
}
