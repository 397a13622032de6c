// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated power-capping controls.
//!
//! A chassis exposes named `Control` resources; clients adjust a control's
//! power limit by PATCHing `SetPoint` and `ControlMode`. The patch engine
//! enforces the cross-field rules (a disabled control pins its setpoint to
//! zero; enabling a control without an explicit setpoint raises it to the
//! top of its range) and validates bounds before anything is committed.

use crate::error::ApiError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

/// Operating mode of a power control, per the Redfish `ControlMode` enum.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ControlMode {
    Automatic,
    Override,
    Manual,
    Disabled,
}

/// A power-capping control resource.
///
/// `SetPoint` and `ControlMode` are the mutable pair; the setting range is
/// fixed at registration. Any other fields of the seeded Redfish document
/// (`@odata.id`, `Name`, physical context, ...) ride along in `extra` and
/// are echoed back on GET.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Control {
    #[serde(rename = "SetPoint")]
    pub set_point: f64,
    #[serde(rename = "ControlMode")]
    pub control_mode: ControlMode,
    #[serde(rename = "SettingRangeMin")]
    pub setting_range_min: f64,
    #[serde(rename = "SettingRangeMax")]
    pub setting_range_max: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Registry of all simulated power controls, keyed by chassis id then
/// control id.
///
/// The outer map only changes at registration time; each control carries its
/// own lock so a patch's read-modify-write is atomic per control and
/// independent across controls.
pub struct ControlRegistry {
    chassis: Mutex<BTreeMap<String, BTreeMap<String, Arc<Mutex<Control>>>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self { chassis: Mutex::new(BTreeMap::new()) }
    }

    /// Registers a control, creating the chassis entry if needed. Replaces
    /// any previous control with the same ids.
    pub fn register(&self, chassis_id: &str, control_id: &str, control: Control) {
        let mut chassis = self.chassis.lock().unwrap();
        chassis
            .entry(chassis_id.to_string())
            .or_default()
            .insert(control_id.to_string(), Arc::new(Mutex::new(control)));
    }

    pub fn chassis_exists(&self, chassis_id: &str) -> bool {
        self.chassis.lock().unwrap().contains_key(chassis_id)
    }

    /// Returns a snapshot of the named control's document.
    pub fn control(&self, chassis_id: &str, control_id: &str) -> Option<Control> {
        self.entry(chassis_id, control_id)
            .map(|entry| entry.lock().unwrap().clone())
    }

    fn entry(
        &self,
        chassis_id: &str,
        control_id: &str,
    ) -> Option<Arc<Mutex<Control>>> {
        let chassis = self.chassis.lock().unwrap();
        chassis.get(chassis_id).and_then(|c| c.get(control_id)).cloned()
    }

    /// Applies a PATCH document to a single control.
    ///
    /// Fields are processed in the order they appear in the request body;
    /// that order is part of the contract (a later rule can override the
    /// setpoint staged by an earlier one). All field effects are staged in
    /// local working values and committed together only if every field
    /// validates, so a failing patch leaves the control untouched.
    pub fn apply_control_patch(
        &self,
        chassis_id: &str,
        control_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<Control, ApiError> {
        let entry = self.entry(chassis_id, control_id).ok_or_else(|| {
            ApiError::NotFound { uri: control_uri(chassis_id, control_id) }
        })?;
        let path = format!("{}/Controls/{}", chassis_id, control_id);

        let mut control = entry.lock().unwrap();

        // A disabled control only accepts a patch that re-enables it. Any
        // `ControlMode` value other than "Disabled" counts as an attempt to
        // re-enable; if it's not a real mode the loop below rejects it.
        let patch_enables = fields
            .get("ControlMode")
            .is_some_and(|v| v.as_str() != Some("Disabled"));
        if control.control_mode == ControlMode::Disabled && !patch_enables {
            return Err(ApiError::ControlDisabled { path });
        }

        let patch_disables = fields
            .get("ControlMode")
            .is_some_and(|v| v.as_str() == Some("Disabled"));

        let mut new_set_point = control.set_point;
        let mut new_control_mode = control.control_mode;

        for (field, value) in fields {
            match field.as_str() {
                "SetPoint" => {
                    let requested = value.as_f64().ok_or_else(|| {
                        ApiError::invalid_type("SetPoint", value, "a number")
                    })?;
                    let min = control.setting_range_min;
                    let max = control.setting_range_max;
                    if requested == 0.0
                        || (requested >= min && requested <= max)
                    {
                        // Disabling in the same patch wins over the given
                        // setpoint.
                        new_set_point =
                            if patch_disables { 0.0 } else { requested };
                    } else {
                        return Err(ApiError::SetPointOutOfBounds { path });
                    }
                }
                "ControlMode" => {
                    let mode: ControlMode =
                        serde_json::from_value(value.clone()).map_err(|_| {
                            ApiError::invalid_type(
                                "ControlMode",
                                value,
                                "a valid control mode",
                            )
                        })?;
                    new_control_mode = mode;
                    if mode == ControlMode::Disabled {
                        new_set_point = 0.0;
                    } else if !fields.contains_key("SetPoint") {
                        new_set_point = control.setting_range_max;
                    }
                }
                // The member documents of a deep patch carry their own
                // resource reference; it identifies, it doesn't mutate.
                "@odata.id" => {}
                _ => {
                    return Err(ApiError::InvalidField {
                        field: field.clone(),
                        path,
                    });
                }
            }
        }

        control.set_point = new_set_point;
        control.control_mode = new_control_mode;
        Ok(control.clone())
    }

    /// Applies a bulk ("deep") PATCH to a chassis's controls.
    ///
    /// Members are processed in list order and the operation stops at the
    /// first failure; controls already patched by earlier members stay
    /// patched. Deliberately non-transactional — clients of the real
    /// service can observe partial application, so the simulator must too.
    pub fn apply_deep_patch(
        &self,
        chassis_id: &str,
        members: &[Value],
    ) -> Result<(), ApiError> {
        let member_prefix =
            format!("/redfish/v1/Chassis/{}/Controls/", chassis_id);
        for member in members {
            let fields = member.as_object().ok_or_else(|| {
                ApiError::InvalidRequest(
                    "Members entries must be objects".to_string(),
                )
            })?;
            let odata_id = fields
                .get("@odata.id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ApiError::InvalidRequest(
                        "Members entries require @odata.id".to_string(),
                    )
                })?;
            let control_id =
                odata_id.strip_prefix(&member_prefix).unwrap_or(odata_id);
            if self.entry(chassis_id, control_id).is_none() {
                return Err(ApiError::InvalidControlRef {
                    odata_id: odata_id.to_string(),
                });
            }
            self.apply_control_patch(chassis_id, control_id, fields)?;
        }
        Ok(())
    }
}

pub fn control_uri(chassis_id: &str, control_id: &str) -> String {
    format!("/redfish/v1/Chassis/{}/Controls/{}", chassis_id, control_id)
}
