// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated firmware updates.
//!
//! SimpleUpdate POSTs are validated, snapshotted into tasks, and pushed onto
//! a bounded queue; a single worker task drains the queue, sleeps for the
//! configured "transfer time", and then flips the target's health and
//! version. Failure injection and latency are controlled by a mutable
//! config document (`.../FirmwareInventory/Config`): behavior is captured at
//! enqueue time, so editing the config never affects tasks already queued.

use crate::error::ApiError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use slog::info;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the update work queue. Submitting callers block (async) when
/// this many updates are already pending; this is the backpressure point.
const QUEUE_DEPTH: usize = 10;

/// Target used when a SimpleUpdate names no targets at all.
const DEFAULT_TARGET: &str = "BMC";

const TARGET_URI_PREFIX: &str = "/redfish/v1/UpdateService/FirmwareInventory/";

/// Health of a firmware target, as reported under `Status.Health`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Health {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "UPDATING")]
    Updating,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TargetStatus {
    #[serde(rename = "Health")]
    pub health: Health,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A firmware-bearing component that can be the subject of a simulated
/// update. Extra fields of the seeded document are echoed on GET.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FirmwareTarget {
    #[serde(rename = "Status")]
    pub status: TargetStatus,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Updateable")]
    pub updateable: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `CurrentValues` portion of the update-service config.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CurrentValues {
    /// Targets whose updates are forced to fail.
    #[serde(rename = "Fail")]
    pub fail: Vec<String>,
    /// Seconds every SimpleUpdate call blocks before being rejected; 0
    /// disables hanging.
    #[serde(rename = "Hang")]
    pub hang: u64,
    /// Seconds the worker sleeps before completing a queued update.
    #[serde(rename = "UpdateTime")]
    pub update_time: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ConfigParameter {
    #[serde(rename = "DataType")]
    pub data_type: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(
        rename = "AllowableValues",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowable_values: Option<Vec<String>>,
}

/// The update-behavior config document served at
/// `/redfish/v1/UpdateService/FirmwareInventory/Config`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UpdateServiceConfig {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Parameters")]
    pub parameters: Vec<ConfigParameter>,
    #[serde(rename = "CurrentValues")]
    pub current_values: CurrentValues,
}

impl UpdateServiceConfig {
    fn template() -> Self {
        Self {
            id: "UpdateServiceConfigInfo".to_string(),
            name: "UpdateServiceConfig".to_string(),
            description: "Use PATCH operations to set the below values to \
                affect Update Service actions."
                .to_string(),
            parameters: vec![
                ConfigParameter {
                    data_type: "StringArray".to_string(),
                    name: "Fail".to_string(),
                    description: "List of targets that will fail update \
                        actions."
                        .to_string(),
                    allowable_values: Some(Vec::new()),
                },
                ConfigParameter {
                    data_type: "Int".to_string(),
                    name: "Hang".to_string(),
                    description: "Amount of time in seconds to Hang."
                        .to_string(),
                    allowable_values: None,
                },
                ConfigParameter {
                    data_type: "Int".to_string(),
                    name: "UpdateTime".to_string(),
                    description: "Amount of time in seconds to for updates \
                        to take."
                        .to_string(),
                    allowable_values: None,
                },
            ],
            current_values: CurrentValues {
                fail: Vec::new(),
                hang: 0,
                update_time: 30,
            },
        }
    }

    fn allowable_fail_targets(&self) -> &[String] {
        self.parameters
            .iter()
            .find(|p| p.name == "Fail")
            .and_then(|p| p.allowable_values.as_deref())
            .unwrap_or(&[])
    }

    fn add_allowable_fail_target(&mut self, target_id: &str) {
        if let Some(values) = self
            .parameters
            .iter_mut()
            .find(|p| p.name == "Fail")
            .and_then(|p| p.allowable_values.as_mut())
        {
            if !values.iter().any(|t| t == target_id) {
                values.push(target_id.to_string());
            }
        }
    }
}

/// One queued simulated update. Config-derived behavior (`update_time`,
/// `fail`) is snapshotted when the task is built; the worker never re-reads
/// live config.
#[derive(Debug)]
struct FirmwareUpdateTask {
    image_uri: String,
    target: String,
    update_time: u64,
    fail: bool,
}

/// The update task engine: target registry, behavior config, and the
/// producer side of the work queue.
///
/// The target map is shared with the worker task; it, the config, and the
/// queue sender each have their own lock, and no lock is ever held across an
/// await.
pub struct UpdateService {
    targets: Arc<Mutex<BTreeMap<String, FirmwareTarget>>>,
    config: Mutex<UpdateServiceConfig>,
    tx: Mutex<Option<mpsc::Sender<FirmwareUpdateTask>>>,
    log: Logger,
}

/// Handle to the spawned worker task; owned by the server so shutdown can
/// wait for the queue to drain.
pub struct UpdateWorker {
    handle: JoinHandle<()>,
}

impl UpdateWorker {
    pub async fn wait(self) -> Result<(), String> {
        self.handle
            .await
            .map_err(|e| format!("waiting for update worker: {}", e))
    }
}

impl UpdateService {
    /// Creates the engine and starts its worker task. The worker runs until
    /// [`UpdateService::shutdown`] closes the queue, then drains whatever is
    /// still queued and exits.
    pub fn new(log: &Logger) -> (Self, UpdateWorker) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let targets = Arc::new(Mutex::new(BTreeMap::new()));
        let handle = tokio::spawn(worker_loop(
            rx,
            Arc::clone(&targets),
            log.new(o!("component" => "update-worker")),
        ));
        let service = Self {
            targets,
            config: Mutex::new(UpdateServiceConfig::template()),
            tx: Mutex::new(Some(tx)),
            log: log.new(o!("component" => "update-service")),
        };
        (service, UpdateWorker { handle })
    }

    /// Registers a firmware target. The config document's
    /// `AllowableValues` for `Fail` tracks the registered target ids;
    /// `CurrentValues` is left alone.
    pub fn register_target(&self, target_id: &str, target: FirmwareTarget) {
        self.targets
            .lock()
            .unwrap()
            .insert(target_id.to_string(), target);
        self.config.lock().unwrap().add_allowable_fail_target(target_id);
    }

    /// Returns a snapshot of the named target's document.
    pub fn target(&self, target_id: &str) -> Option<FirmwareTarget> {
        self.targets.lock().unwrap().get(target_id).cloned()
    }

    pub fn target_exists(&self, target_id: &str) -> bool {
        self.targets.lock().unwrap().contains_key(target_id)
    }

    /// Returns the full config document.
    pub fn config_document(&self) -> UpdateServiceConfig {
        self.config.lock().unwrap().clone()
    }

    /// Applies a PATCH to the update-behavior config.
    ///
    /// All provided fields are validated before anything changes; omitted
    /// fields keep their previous values; on success `CurrentValues` is
    /// replaced wholesale. Returns the new values.
    pub fn patch_config(
        &self,
        fields: &Map<String, Value>,
    ) -> Result<CurrentValues, ApiError> {
        let mut config = self.config.lock().unwrap();
        let mut new_values = config.current_values.clone();

        if let Some(value) = fields.get("Fail") {
            let targets = value.as_array().ok_or_else(|| {
                ApiError::invalid_type("Fail", value, "a list of targets")
            })?;
            let mut fail = Vec::with_capacity(targets.len());
            for target in targets {
                let target = target.as_str().ok_or_else(|| {
                    ApiError::InvalidFailTarget {
                        target: target.to_string(),
                    }
                })?;
                if !config
                    .allowable_fail_targets()
                    .iter()
                    .any(|t| t == target)
                {
                    return Err(ApiError::InvalidFailTarget {
                        target: target.to_string(),
                    });
                }
                fail.push(target.to_string());
            }
            new_values.fail = fail;
        }
        for (setting, slot) in [
            ("Hang", &mut new_values.hang),
            ("UpdateTime", &mut new_values.update_time),
        ] {
            if let Some(value) = fields.get(setting) {
                *slot = value.as_u64().ok_or_else(|| {
                    ApiError::invalid_type(setting, value, "int")
                })?;
            }
        }

        config.current_values = new_values.clone();
        Ok(new_values)
    }

    /// Handles a SimpleUpdate POST body.
    ///
    /// Targets are processed strictly in list order, each one validated and
    /// enqueued before the next is looked at; a failure partway through
    /// leaves earlier targets' queue entries and UPDATING health in place.
    pub async fn submit_simple_update(
        &self,
        fields: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        let hang = self.config.lock().unwrap().current_values.hang;
        if hang > 0 {
            info!(self.log, "hanging"; "seconds" => hang);
            tokio::time::sleep(Duration::from_secs(hang)).await;
            info!(self.log, "finished hanging");
            return Err(ApiError::Hung);
        }

        let image_uri = fields
            .get("ImageURI")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ApiError::InvalidRequest("ImageURI is required".to_string())
            })?;

        let mut update_targets = Vec::new();
        if let Some(value) = fields.get("Targets") {
            let refs = value.as_array().ok_or_else(|| {
                ApiError::invalid_type("Targets", value, "a list of targets")
            })?;
            for target_ref in refs {
                let target_url =
                    target_ref.as_str().ok_or_else(|| {
                        ApiError::UnknownTarget {
                            target: target_ref.to_string(),
                        }
                    })?;
                update_targets.push(
                    target_url
                        .strip_prefix(TARGET_URI_PREFIX)
                        .unwrap_or(target_url)
                        .to_string(),
                );
            }
        }
        if update_targets.is_empty() {
            update_targets.push(DEFAULT_TARGET.to_string());
        }

        for target in update_targets {
            // Validate, snapshot config, and flip health to UPDATING in one
            // critical section, then enqueue with no locks held (the send
            // can block on a full queue, and the worker needs the target
            // lock to make progress).
            let task = {
                let mut targets = self.targets.lock().unwrap();
                let entry = targets.get_mut(&target).ok_or_else(|| {
                    ApiError::UnknownTarget { target: target.clone() }
                })?;
                if !entry.updateable {
                    return Err(ApiError::TargetNotUpdateable { target });
                }
                if entry.status.health == Health::Updating {
                    return Err(ApiError::TargetUpdating { target });
                }
                let (update_time, fail) = {
                    let config = self.config.lock().unwrap();
                    (
                        config.current_values.update_time,
                        config.current_values.fail.iter().any(|t| t == &target),
                    )
                };
                entry.status.health = Health::Updating;
                FirmwareUpdateTask {
                    image_uri: image_uri.to_string(),
                    target,
                    update_time,
                    fail,
                }
            };

            let tx = self.tx.lock().unwrap().clone();
            let Some(tx) = tx else {
                return Err(ApiError::ServerError);
            };
            if tx.send(task).await.is_err() {
                // Worker gone; only possible if it panicked.
                return Err(ApiError::ServerError);
            }
        }
        Ok(())
    }

    /// Closes the submit side of the queue. New SimpleUpdates are rejected;
    /// the worker finishes what is queued and exits.
    pub fn shutdown(&self) {
        self.tx.lock().unwrap().take();
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<FirmwareUpdateTask>,
    targets: Arc<Mutex<BTreeMap<String, FirmwareTarget>>>,
    log: Logger,
) {
    info!(log, "starting update worker");
    while let Some(task) = rx.recv().await {
        info!(
            log, "starting update";
            "image_uri" => %task.image_uri,
            "target" => %task.target,
            "update_time" => task.update_time,
            "fail" => task.fail,
        );
        if task.update_time > 0 {
            tokio::time::sleep(Duration::from_secs(task.update_time)).await;
        }
        {
            let mut targets = targets.lock().unwrap();
            if let Some(target) = targets.get_mut(&task.target) {
                if task.fail {
                    target.status.health = Health::Error;
                } else {
                    target.status.health = Health::Ok;
                    target.version = task.image_uri.clone();
                }
            }
        }
        info!(log, "update complete"; "target" => %task.target);
    }
    info!(log, "update queue closed; worker exiting");
}

pub fn target_uri(target_id: &str) -> String {
    format!("{}{}", TARGET_URI_PREFIX, target_id)
}
