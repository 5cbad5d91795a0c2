use mongodb::bson::oid::ObjectId;
use mongodb::Database;

use crate::db;
use crate::models::{Notification, NotificationKind, Role};

pub struct Notifier;

impl Notifier {
    /// Stores an in-app notification; failures are logged and swallowed.
    pub async fn notify(
        db: &Database,
        recipient: ObjectId,
        role: Role,
        kind: NotificationKind,
        message: impl Into<String>,
    ) {
        let notification = Notification::new(recipient, role, kind, message);

        if let Err(e) = db
            .collection::<Notification>(db::NOTIFICATIONS)
            .insert_one(&notification, None)
            .await
        {
            log::warn!("Failed to store notification for {}: {}", recipient, e);
        }
    }
}
