// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP entrypoint functions for the simulated Redfish service
//!
//! Handlers return free-form [`Response<Body>`] values: the Redfish error
//! envelopes, the 405 `Allow` header, and the echo-the-document GETs all
//! need direct control over status and payload. Method filtering follows
//! the emulated service's contract — a resource's unsupported methods
//! answer 405 with an `Allow` header when the resource exists and 404
//! otherwise.

use crate::context::ServerContext;
use crate::error::ApiError;
use crate::power::control_uri;
use crate::redfish::error_404_response;
use crate::redfish::json_response;
use crate::redfish::success_response;
use crate::update::target_uri;
use dropshot::endpoint;
use dropshot::ApiDescription;
use dropshot::Body;
use dropshot::HttpError;
use dropshot::Path;
use dropshot::RequestContext;
use dropshot::UntypedBody;
use http::Response;
use http::StatusCode;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use std::sync::Arc;

const CONTROL_ALLOW: &str = "GET, PATCH";
const CONTROLS_DEEP_ALLOW: &str = "PATCH";
const TARGET_ALLOW: &str = "GET";
const CONFIG_ALLOW: &str = "GET, PATCH";
const SIMPLE_UPDATE_ALLOW: &str = "POST";

/// The identifier under `FirmwareInventory/` that addresses the update
/// config rather than a firmware target. The router matches a single
/// variable segment there (it cannot mix a literal and a variable at the
/// same position), so the handlers dispatch on this value.
const CONFIG_IDENT: &str = "Config";

type RedfishApiDescription = ApiDescription<Arc<ServerContext>>;

/// Returns a description of the simulated Redfish API
pub fn api() -> RedfishApiDescription {
    fn register_endpoints(
        api: &mut RedfishApiDescription,
    ) -> Result<(), dropshot::ApiDescriptionRegisterError> {
        api.register(control_get)?;
        api.register(control_patch)?;
        api.register(control_put)?;
        api.register(control_post)?;
        api.register(control_delete)?;
        api.register(controls_deep_patch)?;
        api.register(controls_deep_get)?;
        api.register(controls_deep_put)?;
        api.register(controls_deep_post)?;
        api.register(controls_deep_delete)?;
        api.register(firmware_inventory_get)?;
        api.register(firmware_inventory_patch)?;
        api.register(firmware_inventory_put)?;
        api.register(firmware_inventory_post)?;
        api.register(firmware_inventory_delete)?;
        api.register(simple_update_post)?;
        api.register(simple_update_get)?;
        api.register(simple_update_put)?;
        api.register(simple_update_patch)?;
        api.register(simple_update_delete)?;
        Ok(())
    }

    let mut api = RedfishApiDescription::new();
    if let Err(err) = register_endpoints(&mut api) {
        panic!("failed to register entrypoints: {}", err);
    }
    api
}

#[derive(Deserialize, JsonSchema)]
struct ControlPathParams {
    chassis_id: String,
    control_id: String,
}

#[derive(Deserialize, JsonSchema)]
struct ChassisPathParams {
    chassis_id: String,
}

#[derive(Deserialize, JsonSchema)]
struct FirmwareInventoryPathParams {
    ident: String,
}

/// Parses a request body as a JSON object, the only body shape any of the
/// PATCH/POST operations accepts.
fn parse_object(body: &UntypedBody) -> Result<Map<String, Value>, ApiError> {
    serde_json::from_slice::<Value>(body.as_bytes())
        .ok()
        .and_then(|v| v.as_object().cloned())
        .ok_or_else(|| {
            ApiError::InvalidRequest(
                "Request body must be a JSON object".to_string(),
            )
        })
}

fn controls_deep_uri(chassis_id: &str) -> String {
    format!("/redfish/v1/Chassis/{}/Controls.Deep", chassis_id)
}

const SIMPLE_UPDATE_URI: &str = "/redfish/v1/UpdateService/SimpleUpdate";

// Power control resources

/// Get a power control
#[endpoint {
    method = GET,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls/{control_id}",
}]
async fn control_get(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ControlPathParams>,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let path = path.into_inner();
    match apictx.controls.control(&path.chassis_id, &path.control_id) {
        Some(control) => json_response(StatusCode::OK, &control),
        None => {
            error_404_response(&control_uri(&path.chassis_id, &path.control_id))
        }
    }
}

/// Apply a power limit to a control
#[endpoint {
    method = PATCH,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls/{control_id}",
}]
async fn control_patch(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ControlPathParams>,
    body: UntypedBody,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let path = path.into_inner();
    let fields = match parse_object(&body) {
        Ok(fields) => fields,
        Err(err) => return err.into_response(),
    };
    match apictx.controls.apply_control_patch(
        &path.chassis_id,
        &path.control_id,
        &fields,
    ) {
        Ok(control) => json_response(StatusCode::OK, &control),
        Err(err) => err.into_response(),
    }
}

async fn control_not_allowed(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ControlPathParams>,
    method: &'static str,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let path = path.into_inner();
    let uri = control_uri(&path.chassis_id, &path.control_id);
    if apictx.controls.control(&path.chassis_id, &path.control_id).is_some() {
        ApiError::MethodNotAllowed { uri, method, allow: CONTROL_ALLOW }
            .into_response()
    } else {
        error_404_response(&uri)
    }
}

#[endpoint {
    method = PUT,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls/{control_id}",
}]
async fn control_put(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ControlPathParams>,
) -> Result<Response<Body>, HttpError> {
    control_not_allowed(rqctx, path, "PUT").await
}

#[endpoint {
    method = POST,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls/{control_id}",
}]
async fn control_post(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ControlPathParams>,
) -> Result<Response<Body>, HttpError> {
    control_not_allowed(rqctx, path, "POST").await
}

#[endpoint {
    method = DELETE,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls/{control_id}",
}]
async fn control_delete(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ControlPathParams>,
) -> Result<Response<Body>, HttpError> {
    control_not_allowed(rqctx, path, "DELETE").await
}

// Deep (bulk) control patch

/// Apply power limits to several of a chassis's controls at once
#[endpoint {
    method = PATCH,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls.Deep",
}]
async fn controls_deep_patch(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ChassisPathParams>,
    body: UntypedBody,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let path = path.into_inner();
    if !apictx.controls.chassis_exists(&path.chassis_id) {
        return error_404_response(&controls_deep_uri(&path.chassis_id));
    }
    let fields = match parse_object(&body) {
        Ok(fields) => fields,
        Err(err) => return err.into_response(),
    };
    let members = match fields.get("Members").and_then(Value::as_array) {
        Some(members) => members,
        None => {
            return ApiError::InvalidRequest("Members is required".to_string())
                .into_response();
        }
    };
    match apictx.controls.apply_deep_patch(&path.chassis_id, members) {
        Ok(()) => success_response("PATCH was successful"),
        Err(err) => err.into_response(),
    }
}

async fn controls_deep_not_allowed(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ChassisPathParams>,
    method: &'static str,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let path = path.into_inner();
    let uri = controls_deep_uri(&path.chassis_id);
    if apictx.controls.chassis_exists(&path.chassis_id) {
        ApiError::MethodNotAllowed { uri, method, allow: CONTROLS_DEEP_ALLOW }
            .into_response()
    } else {
        error_404_response(&uri)
    }
}

#[endpoint {
    method = GET,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls.Deep",
}]
async fn controls_deep_get(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ChassisPathParams>,
) -> Result<Response<Body>, HttpError> {
    controls_deep_not_allowed(rqctx, path, "GET").await
}

#[endpoint {
    method = PUT,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls.Deep",
}]
async fn controls_deep_put(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ChassisPathParams>,
) -> Result<Response<Body>, HttpError> {
    controls_deep_not_allowed(rqctx, path, "PUT").await
}

#[endpoint {
    method = POST,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls.Deep",
}]
async fn controls_deep_post(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ChassisPathParams>,
) -> Result<Response<Body>, HttpError> {
    controls_deep_not_allowed(rqctx, path, "POST").await
}

#[endpoint {
    method = DELETE,
    path = "/redfish/v1/Chassis/{chassis_id}/Controls.Deep",
}]
async fn controls_deep_delete(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<ChassisPathParams>,
) -> Result<Response<Body>, HttpError> {
    controls_deep_not_allowed(rqctx, path, "DELETE").await
}

// Firmware inventory resources (targets and the Config document)

/// Get a firmware target, or the update-behavior config when the
/// identifier is `Config`
#[endpoint {
    method = GET,
    path = "/redfish/v1/UpdateService/FirmwareInventory/{ident}",
}]
async fn firmware_inventory_get(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<FirmwareInventoryPathParams>,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let ident = path.into_inner().ident;
    if ident == CONFIG_IDENT {
        return json_response(StatusCode::OK, &apictx.update.config_document());
    }
    match apictx.update.target(&ident) {
        Some(target) => json_response(StatusCode::OK, &target),
        None => error_404_response(&target_uri(&ident)),
    }
}

/// Set the update-behavior config; firmware targets themselves are
/// read-only
#[endpoint {
    method = PATCH,
    path = "/redfish/v1/UpdateService/FirmwareInventory/{ident}",
}]
async fn firmware_inventory_patch(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<FirmwareInventoryPathParams>,
    body: UntypedBody,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let ident = path.into_inner().ident;
    if ident == CONFIG_IDENT {
        let fields = match parse_object(&body) {
            Ok(fields) => fields,
            Err(err) => return err.into_response(),
        };
        return match apictx.update.patch_config(&fields) {
            Ok(values) => json_response(StatusCode::OK, &values),
            Err(err) => err.into_response(),
        };
    }
    let uri = target_uri(&ident);
    if apictx.update.target_exists(&ident) {
        ApiError::MethodNotAllowed { uri, method: "PATCH", allow: TARGET_ALLOW }
            .into_response()
    } else {
        error_404_response(&uri)
    }
}

async fn firmware_inventory_not_allowed(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<FirmwareInventoryPathParams>,
    method: &'static str,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let ident = path.into_inner().ident;
    let uri = target_uri(&ident);
    if ident == CONFIG_IDENT {
        ApiError::MethodNotAllowed { uri, method, allow: CONFIG_ALLOW }
            .into_response()
    } else if apictx.update.target_exists(&ident) {
        ApiError::MethodNotAllowed { uri, method, allow: TARGET_ALLOW }
            .into_response()
    } else {
        error_404_response(&uri)
    }
}

#[endpoint {
    method = PUT,
    path = "/redfish/v1/UpdateService/FirmwareInventory/{ident}",
}]
async fn firmware_inventory_put(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<FirmwareInventoryPathParams>,
) -> Result<Response<Body>, HttpError> {
    firmware_inventory_not_allowed(rqctx, path, "PUT").await
}

#[endpoint {
    method = POST,
    path = "/redfish/v1/UpdateService/FirmwareInventory/{ident}",
}]
async fn firmware_inventory_post(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<FirmwareInventoryPathParams>,
) -> Result<Response<Body>, HttpError> {
    firmware_inventory_not_allowed(rqctx, path, "POST").await
}

#[endpoint {
    method = DELETE,
    path = "/redfish/v1/UpdateService/FirmwareInventory/{ident}",
}]
async fn firmware_inventory_delete(
    rqctx: RequestContext<Arc<ServerContext>>,
    path: Path<FirmwareInventoryPathParams>,
) -> Result<Response<Body>, HttpError> {
    firmware_inventory_not_allowed(rqctx, path, "DELETE").await
}

// SimpleUpdate action

/// Request simulated firmware update(s)
#[endpoint {
    method = POST,
    path = "/redfish/v1/UpdateService/SimpleUpdate",
}]
async fn simple_update_post(
    rqctx: RequestContext<Arc<ServerContext>>,
    body: UntypedBody,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let fields = match parse_object(&body) {
        Ok(fields) => fields,
        Err(err) => return err.into_response(),
    };
    match apictx.update.submit_simple_update(&fields).await {
        Ok(()) => success_response("Request Succeeded"),
        Err(err) => err.into_response(),
    }
}

async fn simple_update_not_allowed(
    method: &'static str,
) -> Result<Response<Body>, HttpError> {
    ApiError::MethodNotAllowed {
        uri: SIMPLE_UPDATE_URI.to_string(),
        method,
        allow: SIMPLE_UPDATE_ALLOW,
    }
    .into_response()
}

#[endpoint {
    method = GET,
    path = "/redfish/v1/UpdateService/SimpleUpdate",
}]
async fn simple_update_get(
    _rqctx: RequestContext<Arc<ServerContext>>,
) -> Result<Response<Body>, HttpError> {
    simple_update_not_allowed("GET").await
}

#[endpoint {
    method = PUT,
    path = "/redfish/v1/UpdateService/SimpleUpdate",
}]
async fn simple_update_put(
    _rqctx: RequestContext<Arc<ServerContext>>,
) -> Result<Response<Body>, HttpError> {
    simple_update_not_allowed("PUT").await
}

#[endpoint {
    method = PATCH,
    path = "/redfish/v1/UpdateService/SimpleUpdate",
}]
async fn simple_update_patch(
    _rqctx: RequestContext<Arc<ServerContext>>,
) -> Result<Response<Body>, HttpError> {
    simple_update_not_allowed("PATCH").await
}

#[endpoint {
    method = DELETE,
    path = "/redfish/v1/UpdateService/SimpleUpdate",
}]
async fn simple_update_delete(
    _rqctx: RequestContext<Arc<ServerContext>>,
) -> Result<Response<Body>, HttpError> {
    simple_update_not_allowed("DELETE").await
}
