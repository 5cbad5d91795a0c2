use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::collections::HashMap;

use super::{account_summaries, find_account, summary_of};
use crate::db::{self, DbConn};
use crate::guards::{AdminUser, AuthUser, SubscriberUser};
use crate::models::{
    standing, trial_expires_at, AccountRecord, CreateSubscriptionDto, CurrentPlan, PaymentStatus, PlanName, Role,
    SubscribeDto, Subscription, SubscriptionResponse, SubscriptionStatus, SubscriptionSummaryEntry,
    UpdateSubscriptionDto, UserType,
};
use crate::utils::{
    fmt_date, non_blank, paginate, parse_id, require_date, ApiError, ApiResponse, Created, FieldKind, ListQuery,
    ListSpec,
};

const SUBSCRIPTION_LIST: ListSpec = ListSpec::new(&["plan_name"]).filters(&[
    ("status", FieldKind::Text),
    ("payment_status", FieldKind::Text),
    ("plan_name", FieldKind::Text),
    ("user_type", FieldKind::Text),
    ("user_id", FieldKind::Id),
]);

pub(crate) async fn load_subscription(db: &DbConn, id: ObjectId) -> Result<Subscription, ApiError> {
    db.collection::<Subscription>(db::SUBSCRIPTIONS)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Subscription not found"))
}

/// Points the account's `current_subscription_id` at the given plan.
pub(crate) async fn set_current_subscription(
    db: &DbConn,
    user_type: UserType,
    user_id: ObjectId,
    subscription_id: ObjectId,
) -> Result<(), ApiError> {
    db.collection::<Document>(user_type.collection())
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "current_subscription_id": subscription_id, "updated_at": DateTime::now() } },
            None,
        )
        .await?;
    Ok(())
}

/// Embeds the subscriber's name/email, looking in the right collection per user type.
pub(crate) async fn with_users(
    db: &DbConn,
    subscriptions: Vec<Subscription>,
) -> Result<Vec<SubscriptionResponse>, ApiError> {
    let ids_of = |kind: UserType| {
        subscriptions
            .iter()
            .filter(move |s| s.user_type == kind)
            .map(|s| s.user_id)
            .collect::<Vec<_>>()
    };
    let providers = account_summaries(db, Role::Provider, ids_of(UserType::Provider)).await?;
    let customers = account_summaries(db, Role::Customer, ids_of(UserType::Customer)).await?;

    Ok(subscriptions
        .into_iter()
        .map(|sub| {
            let accounts = match sub.user_type {
                UserType::Provider => &providers,
                UserType::Customer => &customers,
            };
            let user = summary_of(accounts, &sub.user_id);
            SubscriptionResponse::from(sub).with_user(user)
        })
        .collect())
}

async fn single(db: &DbConn, subscription: Subscription) -> Result<SubscriptionResponse, ApiError> {
    with_users(db, vec![subscription])
        .await?
        .pop()
        .ok_or_else(|| ApiError::internal_error("Failed to load subscription"))
}

#[derive(Debug)]
struct NewPlan {
    plan_name: PlanName,
    start_date: DateTime,
    end_date: DateTime,
    amount: f64,
}

fn parse_plan(
    plan_name: &Option<String>,
    start_date: &Option<String>,
    end_date: &Option<String>,
    amount: Option<f64>,
) -> Result<NewPlan, ApiError> {
    let (Some(plan_name), Some(end_date)) = (non_blank(plan_name), non_blank(end_date)) else {
        return Err(ApiError::bad_request("Plan name and end date are required"));
    };
    let amount = amount.ok_or_else(|| ApiError::bad_request("Amount is required"))?;
    if amount < 0.0 {
        return Err(ApiError::bad_request("Amount cannot be negative"));
    }

    Ok(NewPlan {
        plan_name: PlanName::parse(&plan_name).ok_or_else(|| {
            ApiError::bad_request("Invalid plan name. Must be Free, Standard, Premium, Business, or Individual")
        })?,
        start_date: match non_blank(start_date) {
            Some(raw) => require_date(&raw, "start_date")?,
            None => DateTime::now(),
        },
        end_date: require_date(&end_date, "end_date")?,
        amount,
    })
}

/// Stores a new plan; free plans immediately become the account's current one.
async fn create_for(db: &DbConn, user_type: UserType, user_id: ObjectId, mut subscription: Subscription) -> Result<Subscription, ApiError> {
    let result = db
        .collection::<Subscription>(db::SUBSCRIPTIONS)
        .insert_one(&subscription, None)
        .await?;
    let id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal_error("Invalid subscription ID"))?;
    subscription.id = Some(id);

    if subscription.is_paid() {
        set_current_subscription(db, user_type, user_id, id).await?;
    }
    log::info!(
        "Subscription {} ({}) created for {} {}",
        id,
        subscription.plan_name.as_str(),
        user_type.as_str(),
        user_id
    );
    Ok(subscription)
}

#[openapi(tag = "Subscriptions")]
#[get("/subscriptions/admin-summary")]
pub async fn admin_summary(
    _admin: AdminUser,
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<Vec<SubscriptionSummaryEntry>>>, ApiError> {
    let mut accounts: Vec<(UserType, AccountRecord)> = Vec::new();
    for kind in [UserType::Provider, UserType::Customer] {
        let records: Vec<AccountRecord> = db
            .collection::<AccountRecord>(kind.collection())
            .find(doc! {}, None)
            .await?
            .try_collect()
            .await?;
        accounts.extend(records.into_iter().map(|r| (kind, r)));
    }

    let current_ids: Vec<ObjectId> = accounts
        .iter()
        .filter_map(|(_, r)| r.current_subscription_id)
        .collect();
    let current: HashMap<ObjectId, Subscription> = if current_ids.is_empty() {
        HashMap::new()
    } else {
        let subs: Vec<Subscription> = db
            .collection::<Subscription>(db::SUBSCRIPTIONS)
            .find(doc! { "_id": { "$in": current_ids } }, None)
            .await?
            .try_collect()
            .await?;
        subs.into_iter().filter_map(|s| s.id.map(|id| (id, s))).collect()
    };

    let now = DateTime::now();
    let summary = accounts
        .into_iter()
        .map(|(kind, record)| {
            let sub = record.current_subscription_id.and_then(|id| current.get(&id));
            SubscriptionSummaryEntry {
                id: record.id.to_hex(),
                name: record.name,
                email: record.email,
                role: kind.role().as_str().to_string(),
                user_type: kind,
                created_at: fmt_date(&record.created_at),
                trial_expires_at: fmt_date(&trial_expires_at(record.created_at)),
                subscription: sub.map(CurrentPlan::from),
                status: standing(sub, record.created_at, now),
            }
        })
        .collect();

    Ok(Json(ApiResponse::success(summary)))
}

#[openapi(tag = "Subscriptions")]
#[get("/subscriptions?<params..>")]
pub async fn list_subscriptions(
    user: AuthUser,
    db: &State<DbConn>,
    params: HashMap<String, String>,
) -> Result<Json<ApiResponse<Vec<SubscriptionResponse>>>, ApiError> {
    let defaults = if user.is_admin() {
        Document::new()
    } else {
        doc! { "user_id": user.id }
    };
    let query = ListQuery::from_params(&params, &SUBSCRIPTION_LIST, defaults);
    let (subs, pagination) = paginate(&db.collection::<Subscription>(db::SUBSCRIPTIONS), &query).await?;
    Ok(Json(ApiResponse::paginated(with_users(db, subs).await?, pagination)))
}

#[openapi(tag = "Subscriptions")]
#[get("/subscriptions/<id>")]
pub async fn get_subscription(
    user: AuthUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<SubscriptionResponse>>, ApiError> {
    let subscription = load_subscription(db, parse_id(&id, "subscription")?).await?;
    if !user.is_admin() && !user.owns(&subscription.user_id) {
        return Err(ApiError::forbidden(
            "Access denied. You can only view your own subscription.",
        ));
    }
    Ok(Json(ApiResponse::success(single(db, subscription).await?)))
}

#[openapi(tag = "Subscriptions")]
#[post("/subscriptions", data = "<dto>")]
pub async fn create_subscription(
    _admin: AdminUser,
    db: &State<DbConn>,
    dto: Json<CreateSubscriptionDto>,
) -> Result<Created<Json<ApiResponse<SubscriptionResponse>>>, ApiError> {
    let (Some(user_id), Some(user_type)) = (non_blank(&dto.user_id), non_blank(&dto.user_type)) else {
        return Err(ApiError::bad_request("User ID and User Type are required"));
    };
    let plan = parse_plan(&dto.plan_name, &dto.start_date, &dto.end_date, dto.amount)?;
    let user_type = UserType::parse(&user_type)
        .ok_or_else(|| ApiError::bad_request("Invalid user type. Must be Provider or Customer"))?;
    let user_id = parse_id(&user_id, "user")?;

    if find_account(db, user_type.role(), user_id).await?.is_none() {
        return Err(ApiError::not_found(format!("{} not found", user_type.as_str())));
    }

    let mut subscription = Subscription::new(
        user_id,
        user_type,
        plan.plan_name,
        plan.start_date,
        plan.end_date,
        plan.amount,
    );
    if let Some(status) = non_blank(&dto.status) {
        subscription.status = SubscriptionStatus::parse(&status)
            .ok_or_else(|| ApiError::bad_request("Invalid status. Must be Active, Cancelled, or Expired"))?;
    }
    if let Some(raw) = non_blank(&dto.renewal_date) {
        subscription.renewal_date = Some(require_date(&raw, "renewal_date")?);
    }

    let subscription = create_for(db, user_type, user_id, subscription).await?;
    let message = if subscription.is_paid() {
        "Free subscription created and activated successfully."
    } else {
        "Subscription created successfully. User needs to complete payment."
    };

    Ok(Created(Json(ApiResponse::success_with_message(
        message,
        single(db, subscription).await?,
    ))))
}

#[openapi(tag = "Subscriptions")]
#[post("/subscriptions/subscribe", data = "<dto>")]
pub async fn subscribe(
    user: SubscriberUser,
    db: &State<DbConn>,
    dto: Json<SubscribeDto>,
) -> Result<Created<Json<ApiResponse<SubscriptionResponse>>>, ApiError> {
    let plan = parse_plan(&dto.plan_name, &dto.start_date, &dto.end_date, dto.amount)?;
    let user_type = user
        .role
        .user_type()
        .ok_or_else(|| ApiError::forbidden("Only providers and customers can subscribe"))?;

    if find_account(db, user.role, user.id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let subscription = Subscription::new(
        user.id,
        user_type,
        plan.plan_name,
        plan.start_date,
        plan.end_date,
        plan.amount,
    );
    let subscription = create_for(db, user_type, user.id, subscription).await?;
    let message = if subscription.is_paid() {
        "Free subscription created and activated successfully."
    } else {
        "Subscription created successfully. Please complete payment to activate."
    };

    Ok(Created(Json(ApiResponse::success_with_message(
        message,
        single(db, subscription).await?,
    ))))
}

#[openapi(tag = "Subscriptions")]
#[put("/subscriptions/<id>", data = "<dto>")]
pub async fn update_subscription(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
    dto: Json<UpdateSubscriptionDto>,
) -> Result<Json<ApiResponse<SubscriptionResponse>>, ApiError> {
    let mut subscription = load_subscription(db, parse_id(&id, "subscription")?).await?;

    if let Some(status) = non_blank(&dto.status) {
        subscription.status = SubscriptionStatus::parse(&status)
            .ok_or_else(|| ApiError::bad_request("Invalid status. Must be Active, Cancelled, or Expired"))?;
    }
    if let Some(plan) = non_blank(&dto.plan_name) {
        subscription.plan_name = PlanName::parse(&plan).ok_or_else(|| {
            ApiError::bad_request("Invalid plan name. Must be Free, Standard, Premium, Business, or Individual")
        })?;
    }
    if let Some(raw) = non_blank(&dto.end_date) {
        subscription.end_date = require_date(&raw, "end_date")?;
    }
    if let Some(amount) = dto.amount {
        if amount < 0.0 {
            return Err(ApiError::bad_request("Amount cannot be negative"));
        }
        subscription.amount = amount;
    }
    if let Some(raw) = non_blank(&dto.payment_status) {
        let status = PaymentStatus::parse(&raw).ok_or_else(|| {
            ApiError::bad_request("Invalid payment status. Must be pending, paid, failed, or refunded")
        })?;
        if status == PaymentStatus::Paid && subscription.paid_at.is_none() {
            subscription.paid_at = Some(DateTime::now());
        }
        subscription.payment_status = status;
    }
    let loaded_at = subscription.updated_at;
    subscription.updated_at = DateTime::now();

    // The payment webhook may have settled this subscription since it was loaded.
    let result = db
        .collection::<Subscription>(db::SUBSCRIPTIONS)
        .replace_one(doc! { "_id": subscription.id, "updated_at": loaded_at }, &subscription, None)
        .await?;
    if result.matched_count == 0 {
        return Err(ApiError::conflict(
            "This subscription was changed by another request. Please reload and try again.",
        ));
    }

    Ok(Json(ApiResponse::success_with_message(
        "Subscription updated successfully",
        single(db, subscription).await?,
    )))
}

#[openapi(tag = "Subscriptions")]
#[delete("/subscriptions/<id>")]
pub async fn delete_subscription(
    _admin: AdminUser,
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "subscription")?;
    let result = db
        .collection::<Subscription>(db::SUBSCRIPTIONS)
        .delete_one(doc! { "_id": id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Subscription not found"));
    }
    Ok(Json(ApiResponse::message("Subscription deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn plan_requires_name_end_date_and_amount() {
        let err = parse_plan(&None, &None, &some("2030-01-01"), Some(10.0)).unwrap_err();
        assert_eq!(err.message, "Plan name and end date are required");

        let err = parse_plan(&some("Premium"), &None, &some("2030-01-01"), None).unwrap_err();
        assert_eq!(err.message, "Amount is required");

        let err = parse_plan(&some("Gold"), &None, &some("2030-01-01"), Some(1.0)).unwrap_err();
        assert!(err.message.starts_with("Invalid plan name"));

        let err = parse_plan(&some("Premium"), &None, &some("soon"), Some(1.0)).unwrap_err();
        assert_eq!(err.message, "Invalid end_date");
    }

    #[test]
    fn plan_defaults_start_to_now() {
        let before = DateTime::now();
        let plan = parse_plan(&some("Free"), &None, &some("2030-01-01"), Some(0.0)).unwrap();
        assert_eq!(plan.plan_name, PlanName::Free);
        assert!(plan.start_date >= before);
        assert_eq!(plan.amount, 0.0);
    }
}
