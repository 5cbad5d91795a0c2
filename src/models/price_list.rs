use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::utils::{fmt_date, ApiError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Fixed,
    PerUnit,
    Range,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    #[default]
    Hour,
    Day,
    Project,
    Item,
    SquareFeet,
    SquareMeter,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PriceList {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub service_id: ObjectId,
    pub price_type: PriceType,
    #[serde(default)]
    pub fixed_price: Option<f64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub unit: PriceUnit,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl PriceList {
    /// Each price type needs its own amount fields; amounts are never negative.
    pub fn validate(&self) -> Result<(), ApiError> {
        let prices = [self.fixed_price, self.unit_price, self.min_price, self.max_price];
        if prices.iter().flatten().any(|p| *p < 0.0) {
            return Err(ApiError::bad_request("Price cannot be negative"));
        }

        match self.price_type {
            PriceType::Fixed if self.fixed_price.is_none() => {
                Err(ApiError::bad_request("Fixed price is required for fixed price type"))
            }
            PriceType::PerUnit if self.unit_price.is_none() => {
                Err(ApiError::bad_request("Unit price is required for per_unit price type"))
            }
            PriceType::Range => match (self.min_price, self.max_price) {
                (Some(min), Some(max)) if min > max => {
                    Err(ApiError::bad_request("Min price cannot be greater than max price"))
                }
                (Some(_), Some(_)) => Ok(()),
                _ => Err(ApiError::bad_request("Min and max prices are required for range price type")),
            },
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PriceListResponse {
    pub id: String,
    pub service_id: String,
    pub price_type: PriceType,
    pub fixed_price: Option<f64>,
    pub unit_price: Option<f64>,
    pub unit: PriceUnit,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PriceList> for PriceListResponse {
    fn from(p: PriceList) -> Self {
        PriceListResponse {
            id: p.id.map(|id| id.to_hex()).unwrap_or_default(),
            service_id: p.service_id.to_hex(),
            price_type: p.price_type,
            fixed_price: p.fixed_price,
            unit_price: p.unit_price,
            unit: p.unit,
            min_price: p.min_price,
            max_price: p.max_price,
            description: p.description,
            is_active: p.is_active,
            created_at: fmt_date(&p.created_at),
            updated_at: fmt_date(&p.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePriceListDto {
    pub service_id: String,
    pub price_type: PriceType,
    pub fixed_price: Option<f64>,
    pub unit_price: Option<f64>,
    pub unit: Option<PriceUnit>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdatePriceListDto {
    pub service_id: Option<String>,
    pub price_type: Option<PriceType>,
    pub fixed_price: Option<f64>,
    pub unit_price: Option<f64>,
    pub unit: Option<PriceUnit>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(price_type: PriceType) -> PriceList {
        let now = DateTime::now();
        PriceList {
            id: None,
            service_id: ObjectId::new(),
            price_type,
            fixed_price: None,
            unit_price: None,
            unit: PriceUnit::default(),
            min_price: None,
            max_price: None,
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fixed_needs_fixed_price() {
        let mut p = entry(PriceType::Fixed);
        assert_eq!(p.validate().unwrap_err().message, "Fixed price is required for fixed price type");
        p.fixed_price = Some(50.0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn per_unit_needs_unit_price_and_defaults_to_hour() {
        let mut p = entry(PriceType::PerUnit);
        assert!(p.validate().is_err());
        p.unit_price = Some(12.5);
        assert!(p.validate().is_ok());
        assert_eq!(p.unit, PriceUnit::Hour);
    }

    #[test]
    fn range_needs_ordered_bounds() {
        let mut p = entry(PriceType::Range);
        p.min_price = Some(10.0);
        assert_eq!(p.validate().unwrap_err().message, "Min and max prices are required for range price type");
        p.max_price = Some(5.0);
        assert_eq!(p.validate().unwrap_err().message, "Min price cannot be greater than max price");
        p.max_price = Some(10.0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn negative_prices_are_rejected() {
        let mut p = entry(PriceType::Fixed);
        p.fixed_price = Some(-1.0);
        assert_eq!(p.validate().unwrap_err().message, "Price cannot be negative");
    }

    #[test]
    fn enums_use_snake_case() {
        assert_eq!(serde_json::to_value(PriceType::PerUnit).unwrap(), "per_unit");
        assert_eq!(serde_json::to_value(PriceUnit::SquareMeter).unwrap(), "square_meter");
    }
}
