use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use rocket::fairing::AdHoc;
use std::time::Duration;

pub const PROVIDERS: &str = "providers";
pub const CUSTOMERS: &str = "customers";
pub const ADMINS: &str = "admins";
pub const SERVICES: &str = "services";
pub const PRICE_LISTS: &str = "price_lists";
pub const BOOKINGS: &str = "bookings";
pub const REVIEWS: &str = "reviews";
pub const JOB_POSTS: &str = "job_posts";
pub const WORK_POSTS: &str = "work_posts";
pub const SUBSCRIPTIONS: &str = "subscriptions";
pub const NOTIFICATIONS: &str = "notifications";

pub fn init() -> AdHoc {
    AdHoc::on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok(database) => {
                log::info!("✓ MongoDB connected successfully");
                rocket.manage(database)
            }
            Err(e) => {
                log::error!("✗ Failed to connect to MongoDB: {}", e);
                rocket
            }
        }
    })
}

async fn connect() -> Result<Database, mongodb::error::Error> {
    let uri = crate::config::Config::mongodb_uri();
    let mut options = ClientOptions::parse(&uri).await?;
    options.server_selection_timeout = Some(Duration::from_secs(5));
    options.app_name = Some(crate::config::Config::app_name());

    let client = Client::with_options(options)?;

    client
        .database("admin")
        .run_command(mongodb::bson::doc! {"ping": 1}, None)
        .await?;

    let database = client.database(&crate::config::Config::database_name());
    if let Err(e) = ensure_indexes(&database).await {
        log::warn!("Failed to create indexes: {}", e);
    }
    Ok(database)
}

fn unique(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn plain(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

/// Indexes per collection. Unique ones back the duplicate checks in handlers.
pub fn index_plan() -> Vec<(&'static str, IndexModel)> {
    vec![
        (PROVIDERS, unique(doc! { "email": 1 })),
        (CUSTOMERS, unique(doc! { "email": 1 })),
        (ADMINS, unique(doc! { "email": 1 })),
        (REVIEWS, unique(doc! { "booking_id": 1 })),
        (REVIEWS, plain(doc! { "provider_id": 1 })),
        (BOOKINGS, plain(doc! { "customer_id": 1, "created_at": -1 })),
        (BOOKINGS, plain(doc! { "provider_id": 1, "created_at": -1 })),
        (PRICE_LISTS, plain(doc! { "service_id": 1 })),
        (JOB_POSTS, plain(doc! { "service_id": 1 })),
        (JOB_POSTS, plain(doc! { "customer_id": 1 })),
        (WORK_POSTS, plain(doc! { "provider_id": 1 })),
        (WORK_POSTS, plain(doc! { "job_post_id": 1 })),
        (SUBSCRIPTIONS, plain(doc! { "user_id": 1 })),
        (NOTIFICATIONS, plain(doc! { "recipient": 1, "created_at": -1 })),
    ]
}

async fn ensure_indexes(database: &Database) -> Result<(), mongodb::error::Error> {
    for (collection, model) in index_plan() {
        database
            .collection::<Document>(collection)
            .create_index(model, None)
            .await?;
    }
    log::info!("✓ MongoDB indexes ensured");
    Ok(())
}

pub type DbConn = Database;

#[cfg(test)]
mod tests {
    use super::*;

    fn is_unique(model: &IndexModel) -> bool {
        model.options.as_ref().and_then(|o| o.unique).unwrap_or(false)
    }

    #[test]
    fn account_emails_and_review_bookings_are_unique() {
        let plan = index_plan();
        let unique_keys: Vec<(&str, &Document)> = plan
            .iter()
            .filter(|(_, model)| is_unique(model))
            .map(|(collection, model)| (*collection, &model.keys))
            .collect();

        for collection in [PROVIDERS, CUSTOMERS, ADMINS] {
            assert!(unique_keys.contains(&(collection, &doc! { "email": 1 })));
        }
        assert!(unique_keys.contains(&(REVIEWS, &doc! { "booking_id": 1 })));
        assert_eq!(unique_keys.len(), 4);
    }

    #[test]
    fn lookup_fields_are_indexed() {
        let plan = index_plan();
        let indexed = |collection: &str, field: &str| {
            plan.iter()
                .any(|(c, model)| *c == collection && model.keys.keys().next().map(String::as_str) == Some(field))
        };
        assert!(indexed(SUBSCRIPTIONS, "user_id"));
        assert!(indexed(JOB_POSTS, "service_id"));
        assert!(indexed(WORK_POSTS, "provider_id"));
        assert!(indexed(PRICE_LISTS, "service_id"));
    }
}
