use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::AccountSummary;
use crate::utils::fmt_date;

fn default_true() -> bool {
    true
}

/// A finished piece of work a provider showcases with before/after images.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkPost {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub before_image: String,
    pub after_image: String,
    #[serde(default)]
    pub category: String,
    pub provider_id: ObjectId,
    #[serde(default)]
    pub job_post_id: Option<ObjectId>,
    #[serde(default)]
    pub service_id: Option<ObjectId>,
    #[serde(default)]
    pub customer_id: Option<ObjectId>,
    pub completed_at: DateTime,
    #[serde(default)]
    pub customer_feedback: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl WorkPost {
    pub fn visible_to(&self, viewer: &ObjectId, is_admin: bool) -> bool {
        self.is_public || is_admin || &self.provider_id == viewer
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct WorkPostResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub before_image: String,
    pub after_image: String,
    pub category: String,
    pub provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AccountSummary>,
    pub job_post_id: Option<String>,
    pub service_id: Option<String>,
    pub customer_id: Option<String>,
    pub completed_at: String,
    pub customer_feedback: String,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<WorkPost> for WorkPostResponse {
    fn from(w: WorkPost) -> Self {
        WorkPostResponse {
            id: w.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: w.title,
            description: w.description,
            before_image: w.before_image,
            after_image: w.after_image,
            category: w.category,
            provider_id: w.provider_id.to_hex(),
            provider: None,
            job_post_id: w.job_post_id.map(|id| id.to_hex()),
            service_id: w.service_id.map(|id| id.to_hex()),
            customer_id: w.customer_id.map(|id| id.to_hex()),
            completed_at: fmt_date(&w.completed_at),
            customer_feedback: w.customer_feedback,
            is_public: w.is_public,
            created_at: fmt_date(&w.created_at),
            updated_at: fmt_date(&w.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateWorkPostDto {
    pub title: Option<String>,
    pub description: Option<String>,
    pub before_image: Option<String>,
    pub after_image: Option<String>,
    pub category: Option<String>,
    pub job_post_id: Option<String>,
    pub completed_at: Option<String>,
    #[validate(length(max = 1000, message = "Customer feedback is too long"))]
    pub customer_feedback: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateWorkPostDto {
    pub title: Option<String>,
    pub description: Option<String>,
    pub before_image: Option<String>,
    pub after_image: Option<String>,
    pub category: Option<String>,
    pub completed_at: Option<String>,
    #[validate(length(max = 1000, message = "Customer feedback is too long"))]
    pub customer_feedback: Option<String>,
    pub is_public: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_posts_are_owner_or_admin_only() {
        let now = DateTime::now();
        let owner = ObjectId::new();
        let post = WorkPost {
            id: None,
            title: "Kitchen retile".into(),
            description: String::new(),
            before_image: "/uploads/images/a.jpg".into(),
            after_image: "/uploads/images/b.jpg".into(),
            category: "Tiling".into(),
            provider_id: owner,
            job_post_id: None,
            service_id: None,
            customer_id: None,
            completed_at: now,
            customer_feedback: String::new(),
            is_public: false,
            created_at: now,
            updated_at: now,
        };
        let stranger = ObjectId::new();
        assert!(post.visible_to(&owner, false));
        assert!(post.visible_to(&stranger, true));
        assert!(!post.visible_to(&stranger, false));
    }
}
