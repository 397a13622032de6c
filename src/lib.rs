// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated Redfish hardware-management service.
//!
//! redfish-sim emulates the two stateful Redfish subsystems management
//! clients exercise hardest — power-capping controls on chassis and
//! asynchronous firmware updates — so consoles and test harnesses can be
//! developed against realistic Redfish semantics without real hardware.
//! Chassis, controls, and firmware targets are seeded from a TOML config;
//! update behavior (injected failures, hangs, simulated transfer time) is
//! adjusted at runtime through the `FirmwareInventory/Config` resource.

mod config;
mod context;
mod error;
mod http_entrypoints;
mod power;
mod redfish;
mod update;

pub use config::ChassisConfig;
pub use config::Config;
pub use config::ControlConfig;
pub use config::FirmwareTargetConfig;
pub use config::LoadError;
pub use context::ServerContext;
pub use error::ApiError;
pub use power::Control;
pub use power::ControlMode;
pub use power::ControlRegistry;
pub use update::CurrentValues;
pub use update::FirmwareTarget;
pub use update::Health;
pub use update::TargetStatus;
pub use update::UpdateService;
pub use update::UpdateServiceConfig;

use dropshot::HttpServerStarter;
use slog::info;
use slog::o;
use slog::Logger;
use std::net::SocketAddr;
use std::sync::Arc;
use update::UpdateWorker;

type HttpServer = dropshot::HttpServer<Arc<ServerContext>>;

pub struct Server {
    /// shared state used by API request handlers
    apictx: Arc<ServerContext>,
    http_server: HttpServer,
    /// handle to the update worker task, awaited on close so queued
    /// updates drain before we report a clean shutdown
    worker: UpdateWorker,
}

impl Server {
    /// Start a redfish-sim server: seed the registries from `config`,
    /// spawn the update worker, and begin serving the API.
    pub async fn start(config: Config, log: &Logger) -> Result<Server, String> {
        info!(log, "setting up redfish-sim server");
        let (apictx, worker) = ServerContext::new(&config, log);

        let http_server = HttpServerStarter::new(
            &config.dropshot,
            http_entrypoints::api(),
            Arc::clone(&apictx),
            &log.new(o!("component" => "dropshot")),
        )
        .map_err(|error| format!("initializing http server: {}", error))?
        .start();

        info!(log, "server started"; "local_addr" => %http_server.local_addr());
        Ok(Server { apictx, http_server, worker })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.http_server.local_addr()
    }

    /// Shared state backing the API; exposed so tests can seed additional
    /// resources and inspect simulator state directly.
    pub fn apictx(&self) -> &Arc<ServerContext> {
        &self.apictx
    }

    /// Wait for the server to shut down
    ///
    /// Note that this doesn't initiate a graceful shutdown, so if you call
    /// this immediately after calling `start()`, the program will block
    /// indefinitely or until something else initiates a graceful shutdown.
    pub async fn wait_for_finish(self) -> Result<(), String> {
        self.http_server.wait_for_shutdown().await
    }

    /// Gracefully shut down: stop serving requests, close the update
    /// queue, and wait for the worker to drain it.
    pub async fn close(self) -> Result<(), String> {
        self.http_server.close().await?;
        self.apictx.update.shutdown();
        self.worker.wait().await
    }
}

/// Run an instance of the [Server].
pub async fn run_server(config: Config) -> Result<(), String> {
    let log = config
        .log
        .to_logger("redfish-sim")
        .map_err(|message| format!("initializing logger: {}", message))?;
    let server = Server::start(config, &log).await?;
    server.wait_for_finish().await
}
