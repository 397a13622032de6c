// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy for the simulated Redfish service.
//!
//! Every validation failure the two engines can produce is a variant here,
//! carrying enough context to render the wire message. Conversion into the
//! Redfish response envelopes lives in [`crate::redfish`].

use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced to clients of the simulated service.
///
/// The `Display` strings are the exact message texts clients see in the
/// response envelope, so tests against this simulator can match on them.
#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error("The resource at the URI {uri} was not found.")]
    NotFound { uri: String },

    #[error("The method {method} is not allowed for the URI {uri}")]
    MethodNotAllowed {
        uri: String,
        method: &'static str,
        /// Value for the `Allow` response header.
        allow: &'static str,
    },

    #[error("SetPoint out of bounds for {path}")]
    SetPointOutOfBounds { path: String },

    #[error("Invalid setting {field} for {path}")]
    InvalidField { field: String, path: String },

    #[error("Control is disabled for {path}")]
    ControlDisabled { path: String },

    #[error("Invalid control for PATCH, {odata_id}")]
    InvalidControlRef { odata_id: String },

    #[error("Invalid target, {target}")]
    UnknownTarget { target: String },

    #[error("Invalid target, {target}. Not Updateable.")]
    TargetNotUpdateable { target: String },

    #[error("Invalid target, {target}. Target is updating.")]
    TargetUpdating { target: String },

    #[error("Invalid target for Fail, {target}")]
    InvalidFailTarget { target: String },

    #[error("Invalid value for {setting}, {value}. Must be {expected}.")]
    InvalidType { setting: String, value: String, expected: &'static str },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Hung")]
    Hung,

    #[error("Server encountered an unexpected Error")]
    ServerError,
}

impl ApiError {
    pub fn invalid_type(
        setting: &str,
        value: &Value,
        expected: &'static str,
    ) -> Self {
        ApiError::InvalidType {
            setting: setting.to_string(),
            value: display_value(value),
            expected,
        }
    }

    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Hung | ApiError::ServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::SetPointOutOfBounds { .. }
            | ApiError::InvalidField { .. }
            | ApiError::ControlDisabled { .. }
            | ApiError::InvalidControlRef { .. }
            | ApiError::UnknownTarget { .. }
            | ApiError::TargetNotUpdateable { .. }
            | ApiError::TargetUpdating { .. }
            | ApiError::InvalidFailTarget { .. }
            | ApiError::InvalidType { .. }
            | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Renders a JSON value the way it should read inside an error message:
/// strings without their quotes, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
