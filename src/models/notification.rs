use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Role;
use crate::utils::fmt_date;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub recipient: ObjectId,
    pub recipient_role: Role,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Notification {
    pub fn new(recipient: ObjectId, recipient_role: Role, kind: NotificationKind, message: impl Into<String>) -> Self {
        let now = DateTime::now();
        Notification {
            id: None,
            recipient,
            recipient_role,
            kind,
            message: message.into(),
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        NotificationResponse {
            id: n.id.map(|id| id.to_hex()).unwrap_or_default(),
            kind: n.kind,
            message: n.message,
            is_read: n.is_read,
            created_at: fmt_date(&n.created_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct NotificationFeed {
    pub notifications: Vec<NotificationResponse>,
    #[serde(rename = "unreadCount")]
    pub unread_count: u64,
}
