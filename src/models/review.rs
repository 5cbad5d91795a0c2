use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::AccountSummary;
use crate::utils::fmt_date;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub booking_id: ObjectId,
    pub customer_id: ObjectId,
    pub provider_id: ObjectId,
    pub rating: i32, // 1-5
    pub comment: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Mean rating rounded to one decimal; zero without reviews.
pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let mean = ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReviewResponse {
    pub id: String,
    pub booking_id: String,
    pub customer_id: String,
    pub provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<AccountSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AccountSummary>,
    pub rating: i32,
    pub comment: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        ReviewResponse {
            id: r.id.map(|id| id.to_hex()).unwrap_or_default(),
            booking_id: r.booking_id.to_hex(),
            customer_id: r.customer_id.to_hex(),
            provider_id: r.provider_id.to_hex(),
            customer: None,
            provider: None,
            rating: r.rating,
            comment: r.comment,
            created_at: fmt_date(&r.created_at),
            updated_at: fmt_date(&r.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateReviewDto {
    pub booking_id: Option<String>,
    pub provider_id: Option<String>,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateReviewDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_rounds_to_one_decimal() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[5]), 5.0);
        assert_eq!(average_rating(&[4, 5, 5]), 4.7);
        assert_eq!(average_rating(&[1, 2]), 1.5);
    }
}
