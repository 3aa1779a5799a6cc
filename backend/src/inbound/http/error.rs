//! HTTP mapping for domain errors.
//!
//! Handlers return [`Error`]; this module picks the status code, redacts
//! internal details and turns Actix extractor failures (malformed JSON,
//! query strings and path segments) into `invalid_request` payloads so
//! every failure shares one response schema.

use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::header::{CACHE_CONTROL, RETRY_AFTER};
use actix_web::{HttpRequest, HttpResponse, ResponseError, http::StatusCode, web};
use serde_json::json;
use tracing::{error, warn};

use crate::domain::{Error, ErrorCode, TRACE_ID_HEADER};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, Error>;

/// Seconds clients should wait before retrying a 503.
const RETRY_AFTER_SECS: &str = "5";

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn redact_if_internal(error: &Error) -> Error {
    if error.code() != ErrorCode::InternalError {
        return error.clone();
    }
    let redacted = Error::internal("Internal server error");
    match error.trace_id() {
        Some(id) => redacted.with_trace_id(id.to_owned()),
        None => redacted,
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        match self.code() {
            ErrorCode::InternalError => {
                error!(message = self.message(), trace_id = self.trace_id(), "request failed")
            }
            ErrorCode::ServiceUnavailable => {
                warn!(message = self.message(), trace_id = self.trace_id(), "dependency unavailable")
            }
            _ => {}
        }

        let mut builder = HttpResponse::build(self.status_code());
        builder.insert_header((CACHE_CONTROL, "no-store"));
        if let Some(id) = self.trace_id() {
            builder.insert_header((TRACE_ID_HEADER, id.to_owned()));
        }
        if self.code() == ErrorCode::ServiceUnavailable {
            builder.insert_header((RETRY_AFTER, RETRY_AFTER_SECS));
        }
        builder.json(redact_if_internal(self))
    }
}

impl From<actix_web::Error> for Error {
    fn from(err: actix_web::Error) -> Self {
        error!(error = %err, "actix error promoted to domain error");
        Error::internal("Internal server error")
    }
}

fn extractor_error(kind: &'static str, detail: String) -> actix_web::Error {
    Error::invalid_request(format!("invalid {kind}"))
        .with_details(json!({ "reason": detail }))
        .into()
}

/// JSON body configuration reporting decode failures as `invalid_request`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            extractor_error("request body", err.to_string())
        })
}

/// Query string configuration reporting decode failures as `invalid_request`.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err: QueryPayloadError, _req: &HttpRequest| {
        extractor_error("query string", err.to_string())
    })
}

/// Path configuration reporting decode failures as `invalid_request`.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err: PathError, _req: &HttpRequest| {
        extractor_error("path", err.to_string())
    })
}
