use mongodb::bson::{doc, DateTime};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::Serialize;

use crate::db::{self, DbConn};
use crate::models::{
    hash_password, verify_password, Admin, AdminResponse, Customer, CustomerResponse, LoginDto, Provider,
    ProviderResponse, RegisterAdminDto, RegisterCustomerDto, RegisterProviderDto, Role,
};
use crate::services::JwtService;
use crate::utils::{
    is_blank, missing_fields, normalize_email, text, validate_dto, validate_phone, ApiError, ApiResponse, Created,
};

#[derive(Debug, Serialize, JsonSchema)]
pub struct CustomerAuthData {
    pub customer: CustomerResponse,
    pub token: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ProviderRegistrationData {
    pub provider: ProviderResponse,
    #[serde(rename = "isApproved")]
    pub is_approved: bool,
    #[serde(rename = "approvalMessage")]
    pub approval_message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AdminAuthData {
    pub admin: AdminResponse,
    pub token: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum LoggedInUser {
    Customer(CustomerResponse),
    Provider(ProviderResponse),
    Admin(AdminResponse),
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct LoginData {
    pub user: LoggedInUser,
    pub token: String,
}

fn issue_token(id: &mongodb::bson::oid::ObjectId, role: Role) -> Result<String, ApiError> {
    JwtService::generate_token(id, role).map_err(|e| {
        log::error!("Failed to sign token: {}", e);
        ApiError::internal_error("Failed to generate token")
    })
}

fn hash(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| {
        log::error!("Password hashing failed: {}", e);
        ApiError::internal_error("Failed to process password")
    })
}

fn check_phone(phone: &str) -> Result<(), ApiError> {
    if validate_phone(phone) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Phone number must be 10 digits"))
    }
}

#[openapi(tag = "Auth")]
#[post("/auth/register/customer", data = "<dto>")]
pub async fn register_customer(
    db: &State<DbConn>,
    dto: Json<RegisterCustomerDto>,
) -> Result<Created<Json<ApiResponse<CustomerAuthData>>>, ApiError> {
    let missing = missing_fields(&[
        ("name", !is_blank(&dto.name)),
        ("email", !is_blank(&dto.email)),
        ("password", dto.password.as_deref().is_some_and(|p| !p.is_empty())),
        ("phone", !is_blank(&dto.phone)),
        ("address", !is_blank(&dto.address)),
    ]);
    if !missing.is_empty() {
        return Err(ApiError::bad_request("All fields are required: name, email, password, phone, address"));
    }
    validate_dto(&*dto)?;

    let email = normalize_email(&text(&dto.email));
    let phone = text(&dto.phone);
    check_phone(&phone)?;

    let customers = db.collection::<Customer>(db::CUSTOMERS);
    if customers.find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(ApiError::bad_request("Customer with this email already exists"));
    }

    let now = DateTime::now();
    let mut customer = Customer {
        id: None,
        name: text(&dto.name),
        email,
        password: hash(dto.password.as_deref().unwrap_or_default())?,
        phone,
        address: text(&dto.address),
        stripe_customer_id: None,
        current_subscription_id: None,
        created_at: now,
        updated_at: now,
    };

    let result = customers
        .insert_one(&customer, None)
        .await
        .map_err(|e| ApiError::or_duplicate(e, "Customer with this email already exists"))?;
    let id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal_error("Invalid customer ID"))?;
    customer.id = Some(id);

    log::info!("Customer registered: {}", customer.email);
    let token = issue_token(&id, Role::Customer)?;

    Ok(Created(Json(ApiResponse::success_with_message(
        "Customer registered successfully",
        CustomerAuthData {
            customer: customer.into(),
            token,
        },
    ))))
}

#[openapi(tag = "Auth")]
#[post("/auth/register/provider", data = "<dto>")]
pub async fn register_provider(
    db: &State<DbConn>,
    dto: Json<RegisterProviderDto>,
) -> Result<Created<Json<ApiResponse<ProviderRegistrationData>>>, ApiError> {
    let skills: Vec<String> = dto
        .skills
        .iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let missing = missing_fields(&[
        ("name", !is_blank(&dto.name)),
        ("email", !is_blank(&dto.email)),
        ("password", dto.password.as_deref().is_some_and(|p| !p.is_empty())),
        ("phone", !is_blank(&dto.phone)),
        ("address", !is_blank(&dto.address)),
        ("experience_years", dto.experience_years.is_some()),
        ("skills", dto.skills.is_some()),
    ]);
    if !missing.is_empty() {
        return Err(ApiError::bad_request(
            "All fields are required: name, email, password, phone, address, experience_years, skills",
        ));
    }
    validate_dto(&*dto)?;
    if skills.is_empty() {
        return Err(ApiError::bad_request("At least one skill is required"));
    }

    let email = normalize_email(&text(&dto.email));
    let phone = text(&dto.phone);
    check_phone(&phone)?;

    let providers = db.collection::<Provider>(db::PROVIDERS);
    if providers.find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(ApiError::bad_request("Provider with this email already exists"));
    }

    let now = DateTime::now();
    let mut provider = Provider {
        id: None,
        name: text(&dto.name),
        email,
        password: hash(dto.password.as_deref().unwrap_or_default())?,
        phone,
        address: text(&dto.address),
        experience_years: dto.experience_years.unwrap_or(1),
        skills,
        availability_status: Default::default(),
        rating: 0.0,
        profile_image: None,
        is_active: false,
        is_approved: false,
        rejection_reason: None,
        stripe_customer_id: None,
        current_subscription_id: None,
        created_at: now,
        updated_at: now,
    };

    let result = providers
        .insert_one(&provider, None)
        .await
        .map_err(|e| ApiError::or_duplicate(e, "Provider with this email already exists"))?;
    provider.id = result.inserted_id.as_object_id();

    log::info!("Provider registered (pending approval): {}", provider.email);

    Ok(Created(Json(ApiResponse::success_with_message(
        "Provider registered successfully. Your account is pending admin approval. You will be able to log in and access provider features once approved.",
        ProviderRegistrationData {
            provider: provider.into(),
            is_approved: false,
            approval_message: "Your account requires admin approval before you can access provider features."
                .to_string(),
        },
    ))))
}

#[openapi(tag = "Auth")]
#[post("/auth/register/admin", data = "<dto>")]
pub async fn register_admin(
    db: &State<DbConn>,
    dto: Json<RegisterAdminDto>,
) -> Result<Created<Json<ApiResponse<AdminAuthData>>>, ApiError> {
    if is_blank(&dto.name) || is_blank(&dto.email) || dto.password.as_deref().is_none_or(str::is_empty) {
        return Err(ApiError::bad_request("All fields are required: name, email, password"));
    }
    validate_dto(&*dto)?;

    let email = normalize_email(&text(&dto.email));
    let admins = db.collection::<Admin>(db::ADMINS);
    if admins.find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(ApiError::bad_request("Admin with this email already exists"));
    }

    let now = DateTime::now();
    let mut admin = Admin {
        id: None,
        name: text(&dto.name),
        email,
        password: hash(dto.password.as_deref().unwrap_or_default())?,
        created_at: now,
        updated_at: now,
    };

    let result = admins
        .insert_one(&admin, None)
        .await
        .map_err(|e| ApiError::or_duplicate(e, "Admin with this email already exists"))?;
    let id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal_error("Invalid admin ID"))?;
    admin.id = Some(id);

    log::info!("Admin registered: {}", admin.email);
    let token = issue_token(&id, Role::Admin)?;

    Ok(Created(Json(ApiResponse::success_with_message(
        "Admin registered successfully",
        AdminAuthData {
            admin: admin.into(),
            token,
        },
    ))))
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("Invalid email or password")
}

/// Checked only after the password matched, so pending accounts are not enumerable.
fn ensure_approved(provider: &Provider) -> Result<(), ApiError> {
    if provider.is_approved {
        return Ok(());
    }
    Err(ApiError::forbidden(
        "Access denied. Your provider account is pending admin approval. Please contact an administrator or wait for approval.",
    )
    .with("isApproved", false))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(db: &State<DbConn>, dto: Json<LoginDto>) -> Result<Json<ApiResponse<LoginData>>, ApiError> {
    if is_blank(&dto.email) || dto.password.as_deref().is_none_or(str::is_empty) || is_blank(&dto.role) {
        return Err(ApiError::bad_request("Email, password, and role are required"));
    }

    let role = Role::parse(&text(&dto.role)).ok_or_else(|| ApiError::bad_request("Invalid role"))?;
    let email = normalize_email(&text(&dto.email));
    let password = dto.password.as_deref().unwrap_or_default();
    let filter = doc! { "email": &email };

    let (id, user) = match role {
        Role::Customer => {
            let customer = db
                .collection::<Customer>(db::CUSTOMERS)
                .find_one(filter, None)
                .await?
                .filter(|c| verify_password(password, &c.password))
                .ok_or_else(invalid_credentials)?;
            (customer.id, LoggedInUser::Customer(customer.into()))
        }
        Role::Provider => {
            let provider = db
                .collection::<Provider>(db::PROVIDERS)
                .find_one(filter, None)
                .await?
                .filter(|p| verify_password(password, &p.password))
                .ok_or_else(invalid_credentials)?;

            ensure_approved(&provider)?;
            (provider.id, LoggedInUser::Provider(provider.into()))
        }
        Role::Admin => {
            let admin = db
                .collection::<Admin>(db::ADMINS)
                .find_one(filter, None)
                .await?
                .filter(|a| verify_password(password, &a.password))
                .ok_or_else(invalid_credentials)?;
            (admin.id, LoggedInUser::Admin(admin.into()))
        }
    };

    let id = id.ok_or_else(|| ApiError::internal_error("Account has no ID"))?;
    let token = issue_token(&id, role)?;
    log::info!("{} logged in: {}", role, email);

    Ok(Json(ApiResponse::success_with_message("Login successful", LoginData { user, token })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Availability;
    use mongodb::bson::oid::ObjectId;

    fn provider(is_approved: bool) -> Provider {
        let now = DateTime::now();
        Provider {
            id: Some(ObjectId::new()),
            name: "Noor".into(),
            email: "noor@example.com".into(),
            password: "$2b$10$secret".into(),
            phone: "0123456789".into(),
            address: "4 Quay Rd".into(),
            experience_years: 2,
            skills: vec!["Tiling".into()],
            availability_status: Availability::Available,
            rating: 0.0,
            profile_image: None,
            is_active: is_approved,
            is_approved,
            rejection_reason: None,
            stripe_customer_id: None,
            current_subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pending_providers_cannot_log_in() {
        let err = ensure_approved(&provider(false)).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::Forbidden);

        let body = err.body();
        assert_eq!(body["success"], false);
        assert_eq!(body["isApproved"], false);
        assert!(body["message"].as_str().unwrap().contains("pending admin approval"));

        assert!(ensure_approved(&provider(true)).is_ok());
    }
}
