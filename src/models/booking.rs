use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::AccountSummary;
use crate::utils::fmt_date;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn parse(raw: &str) -> Option<BookingStatus> {
        match raw.trim() {
            "Pending" => Some(BookingStatus::Pending),
            "Confirmed" => Some(BookingStatus::Confirmed),
            "Completed" => Some(BookingStatus::Completed),
            "Cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub customer_id: ObjectId,
    pub provider_id: ObjectId,
    pub scheduled_date: DateTime,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BookingResponse {
    pub id: String,
    pub customer_id: String,
    pub provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<AccountSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AccountSummary>,
    pub scheduled_date: String,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        BookingResponse {
            id: b.id.map(|id| id.to_hex()).unwrap_or_default(),
            customer_id: b.customer_id.to_hex(),
            provider_id: b.provider_id.to_hex(),
            customer: None,
            provider: None,
            scheduled_date: fmt_date(&b.scheduled_date),
            total_amount: b.total_amount,
            status: b.status,
            created_at: fmt_date(&b.created_at),
            updated_at: fmt_date(&b.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateBookingDto {
    pub provider: Option<String>,
    pub scheduled_date: Option<String>,
    pub total_amount: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateBookingDto {
    pub scheduled_date: Option<String>,
    pub status: Option<String>,
}
