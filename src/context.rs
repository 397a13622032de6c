// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::Config;
use crate::power::ControlRegistry;
use crate::update::UpdateService;
use crate::update::UpdateWorker;
use slog::info;
use slog::Logger;
use std::sync::Arc;

/// Shared state used by API request handlers
pub struct ServerContext {
    /// Power-capping controls, per chassis.
    pub controls: ControlRegistry,
    /// Firmware targets, update config, and the work queue.
    pub update: UpdateService,
    pub log: Logger,
}

impl ServerContext {
    /// Builds the registries, seeds them from `config`, and starts the
    /// update worker. The returned [`UpdateWorker`] belongs to the server
    /// so shutdown can wait for queued updates to drain.
    pub fn new(config: &Config, log: &Logger) -> (Arc<Self>, UpdateWorker) {
        let controls = ControlRegistry::new();
        for chassis in &config.chassis {
            for control in &chassis.controls {
                info!(
                    log, "registering control";
                    "chassis_id" => &chassis.id,
                    "control_id" => &control.id,
                );
                controls.register(
                    &chassis.id,
                    &control.id,
                    control.control.clone(),
                );
            }
        }

        let (update, worker) = UpdateService::new(log);
        for target in &config.firmware_targets {
            info!(log, "registering firmware target"; "target_id" => &target.id);
            update.register_target(&target.id, target.target.clone());
        }

        (Arc::new(ServerContext { controls, update, log: log.clone() }), worker)
    }
}
