// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Redfish response envelopes.
//!
//! The service speaks a small, fixed set of payload shapes: a generic
//! success envelope, a generic error envelope, and the standard Redfish
//! extended-info envelopes for 404 and 405. Handlers build free-form
//! [`Response<Body>`] values so they control the status code and (for 405)
//! the `Allow` header.

use crate::error::ApiError;
use dropshot::Body;
use dropshot::HttpError;
use http::header::ALLOW;
use http::header::CONTENT_TYPE;
use http::Response;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;

const CONTENT_TYPE_JSON: &str = "application/json";

/// Serializes `body` as the payload of a JSON response with status `status`.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<Body>, HttpError> {
    let body = serde_json::to_vec(body)
        .map_err(|e| HttpError::for_internal_error(e.to_string()))?;
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
        .body(Body::with_content(body))
        .map_err(|e| HttpError::for_internal_error(e.to_string()))
}

/// `{"code": <status>, "message": <msg>}` — generic success.
pub fn success_response(msg: &str) -> Result<Response<Body>, HttpError> {
    let status = StatusCode::OK;
    json_response(
        status,
        &json!({
            "code": status.as_u16(),
            "message": msg,
        }),
    )
}

/// `{"Status": <status>, "Message": <msg>}` — generic error.
pub fn simple_error_response(
    status: StatusCode,
    msg: &str,
) -> Result<Response<Body>, HttpError> {
    json_response(
        status,
        &json!({
            "Status": status.as_u16(),
            "Message": msg,
        }),
    )
}

/// Standard Redfish `ResourceMissingAtURI` envelope.
pub fn error_404_response(uri: &str) -> Result<Response<Body>, HttpError> {
    let message = format!("The resource at the URI {} was not found.", uri);
    json_response(
        StatusCode::NOT_FOUND,
        &json!({
            "error": {
                "@Message.ExtendedInfo": [
                    {
                        "@odata.type": "#Message.v1_0_5.Message",
                        "Message": message,
                        "MessageArgs": [uri],
                        "MessageId": "Base.1.4.ResourceMissingAtURI",
                        "Resolution": "Place a valid resource at the URI \
                            or correct the URI and resubmit the request.",
                        "Severity": "Critical",
                    }
                ],
                "code": "Base.1.4.ResourceMissingAtURI",
                "message": message,
            }
        }),
    )
}

/// Standard Redfish `MethodNotAllowed` envelope, with an `Allow` header
/// naming the methods the resource does support.
pub fn error_not_allowed_response(
    uri: &str,
    method: &str,
    allow: &str,
) -> Result<Response<Body>, HttpError> {
    let message =
        format!("The method {} is not allowed for the URI {}", method, uri);
    let body = serde_json::to_vec(&json!({
        "error": {
            "@Message.ExtendedInfo": [
                {
                    "@odata.type": "#Message.v1_0_5.Message",
                    "Message": message,
                    "MessageArgs": [method, uri],
                    "MessageId": "HttpStatus.1.0.MethodNotAllowed",
                    "Resolution": "Use a method listed in the Allow header",
                    "Severity": "Critical",
                }
            ],
            "code": "HttpStatus.1.0.MethodNotAllowed",
            "message": message,
        }
    }))
    .map_err(|e| HttpError::for_internal_error(e.to_string()))?;
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
        .header(ALLOW, allow)
        .body(Body::with_content(body))
        .map_err(|e| HttpError::for_internal_error(e.to_string()))
}

impl ApiError {
    /// Renders this error as its wire response.
    pub fn into_response(self) -> Result<Response<Body>, HttpError> {
        match &self {
            ApiError::NotFound { uri } => error_404_response(uri),
            ApiError::MethodNotAllowed { uri, method, allow } => {
                error_not_allowed_response(uri, method, allow)
            }
            _ => simple_error_response(self.status_code(), &self.to_string()),
        }
    }
}
