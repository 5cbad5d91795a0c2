use mongodb::error::{ErrorKind, WriteFailure};
use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::Request;
use rocket_okapi::okapi::openapi3::{MediaType, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::okapi::Map;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// -----------------------------
/// Pagination block
/// -----------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Pagination {
            page,
            limit,
            total,
            pages,
        }
    }
}

/// -----------------------------
/// Generic API response
/// -----------------------------
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
            pagination: None,
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            pagination: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: None,
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
            pagination: Some(pagination),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            message: Some(message),
            data: None,
            pagination: None,
        }
    }
}

/// -----------------------------
/// API Error
/// -----------------------------
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ApiError {
    #[schemars(skip)]
    #[serde(skip_serializing)]
    pub status: Status,
    pub message: String,
    /// Flags merged into the top level of the error envelope.
    #[schemars(skip)]
    #[serde(skip_serializing)]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ApiError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            extra: None,
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// The JSON envelope this error renders as.
    pub fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "success": false,
            "message": self.message,
        });
        if let (Some(extra), Some(object)) = (&self.extra, body.as_object_mut()) {
            for (key, value) in extra {
                object.insert(key.clone(), value.clone());
            }
        }
        body
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(Status::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(Status::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Status::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Status::Conflict, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(Status::BadGateway, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(Status::InternalServerError, message)
    }
}

impl From<mongodb::error::Error> for ApiError {
    fn from(e: mongodb::error::Error) -> Self {
        log::error!("Database error: {}", e);
        ApiError::internal_error("Database error")
    }
}

const DUPLICATE_KEY: i32 = 11000;

impl ApiError {
    /// A unique-index violation becomes a 400 with `message`; other errors stay 500s.
    pub fn or_duplicate(e: mongodb::error::Error, message: &str) -> Self {
        let duplicate = matches!(
            e.kind.as_ref(),
            ErrorKind::Write(WriteFailure::WriteError(w)) if w.code == DUPLICATE_KEY
        );
        if duplicate {
            ApiError::bad_request(message)
        } else {
            e.into()
        }
    }
}

impl From<mongodb::bson::ser::Error> for ApiError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        log::error!("BSON serialization error: {}", e);
        ApiError::internal_error("Failed to encode document")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// -----------------------------
/// Rocket Responder
/// -----------------------------
impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body = self.body().to_string();

        Response::build()
            .status(self.status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// -----------------------------
/// 201 Created wrapper
/// -----------------------------
#[derive(Debug)]
pub struct Created<R>(pub R);

impl<'r, 'o: 'r, R: Responder<'r, 'o>> Responder<'r, 'o> for Created<R> {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'o> {
        let mut response = self.0.respond_to(request)?;
        response.set_status(Status::Created);
        Ok(response)
    }
}

impl<R: OpenApiResponderInner> OpenApiResponderInner for Created<R> {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = R::responses(generator)?;
        if let Some(ok) = responses.responses.remove("200") {
            responses.responses.insert("201".to_string(), ok);
        }
        Ok(responses)
    }
}

/// -----------------------------
/// OpenAPI integration
/// -----------------------------
impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let schema = generator.json_schema::<ApiResponse<()>>();

        let mut content = Map::new();
        content.insert(
            "application/json".to_owned(),
            MediaType {
                schema: Some(schema),
                ..Default::default()
            },
        );

        let mut responses = Responses::default();

        for (code, description) in [
            ("400", "Bad request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not found"),
            ("409", "Conflict"),
            ("500", "Internal server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                rocket_okapi::okapi::openapi3::RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content: content.clone(),
                    ..Default::default()
                }),
            );
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_error(code: i32) -> mongodb::error::Error {
        let failure: mongodb::error::WriteError =
            mongodb::bson::from_document(mongodb::bson::doc! { "code": code, "errmsg": "E11000" }).unwrap();
        ErrorKind::Write(WriteFailure::WriteError(failure)).into()
    }

    #[test]
    fn duplicate_keys_become_bad_requests() {
        let err = ApiError::or_duplicate(write_error(11000), "Customer with this email already exists");
        assert_eq!(err.status, Status::BadRequest);
        assert_eq!(err.message, "Customer with this email already exists");

        let other = ApiError::or_duplicate(write_error(121), "unused");
        assert_eq!(other.status, Status::InternalServerError);
    }

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Pagination::new(2, 10, 21);
        assert_eq!(p.pages, 3);
        assert_eq!(Pagination::new(1, 10, 0).pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).pages, 1);
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let body = serde_json::to_value(ApiResponse::<()>::error("nope".to_string())).unwrap();
        assert_eq!(body, serde_json::json!({ "success": false, "message": "nope" }));

        let body = serde_json::to_value(ApiResponse::paginated(
            vec![1, 2],
            Pagination::new(1, 2, 5),
        ))
        .unwrap();
        assert_eq!(body["pagination"]["pages"], 3);
        assert!(body.get("message").is_none());
    }

    #[test]
    fn error_body_carries_extra_flags() {
        let err = ApiError::forbidden("pending").with("isApproved", false);
        assert_eq!(
            err.body(),
            serde_json::json!({ "success": false, "message": "pending", "isApproved": false })
        );
        assert_eq!(
            ApiError::not_found("gone").body(),
            serde_json::json!({ "success": false, "message": "gone" })
        );
    }
}
