pub mod admin;
pub mod auth;
pub mod customers;
pub mod file_upload;
pub mod job_posts;
pub mod notifications;
pub mod payments;
pub mod price_lists;
pub mod providers;
pub mod reviews;
pub mod services;
pub mod subscriptions;
pub mod work_posts;

use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use rocket::futures::TryStreamExt;
use std::collections::HashMap;

use crate::models::{AccountRecord, AccountSummary, Booking, BookingResponse, Role};
use crate::utils::ApiError;

pub(crate) async fn find_account(db: &Database, role: Role, id: ObjectId) -> Result<Option<AccountRecord>, ApiError> {
    Ok(db
        .collection::<AccountRecord>(role.collection())
        .find_one(doc! { "_id": id }, None)
        .await?)
}

/// Batch lookup used to embed name/email of referenced accounts.
pub(crate) async fn account_summaries(
    db: &Database,
    role: Role,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<HashMap<ObjectId, AccountRecord>, ApiError> {
    let mut ids: Vec<ObjectId> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let records: Vec<AccountRecord> = db
        .collection::<AccountRecord>(role.collection())
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?
        .try_collect()
        .await?;

    Ok(records.into_iter().map(|r| (r.id, r)).collect())
}

pub(crate) fn summary_of(records: &HashMap<ObjectId, AccountRecord>, id: &ObjectId) -> Option<AccountSummary> {
    records.get(id).cloned().map(AccountSummary::from)
}

/// Bookings with both parties' name/email embedded.
pub(crate) async fn bookings_with_parties(db: &Database, bookings: Vec<Booking>) -> Result<Vec<BookingResponse>, ApiError> {
    let customers = account_summaries(db, Role::Customer, bookings.iter().map(|b| b.customer_id)).await?;
    let providers = account_summaries(db, Role::Provider, bookings.iter().map(|b| b.provider_id)).await?;

    Ok(bookings
        .into_iter()
        .map(|booking| {
            let customer = summary_of(&customers, &booking.customer_id);
            let provider = summary_of(&providers, &booking.provider_id);
            let mut response = BookingResponse::from(booking);
            response.customer = customer;
            response.provider = provider;
            response
        })
        .collect())
}
