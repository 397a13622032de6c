// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files and working with a simulated
//! Redfish service configuration

use crate::power::Control;
use crate::update::FirmwareTarget;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigDropshot;
use dropshot::ConfigLogging;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration of one simulated power control. The Redfish-cased fields
/// of the control document (`SetPoint`, `ControlMode`, ...) sit directly in
/// the TOML table.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ControlConfig {
    pub id: String,
    #[serde(flatten)]
    pub control: Control,
}

/// Configuration of one simulated chassis and its power controls.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChassisConfig {
    pub id: String,
    #[serde(default)]
    pub controls: Vec<ControlConfig>,
}

/// Configuration of one simulated firmware target.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FirmwareTargetConfig {
    pub id: String,
    #[serde(flatten)]
    pub target: FirmwareTarget,
}

/// Configuration for a redfish-sim server
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Dropshot server configuration (bind address etc.).
    #[serde(default)]
    pub dropshot: ConfigDropshot,
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
    /// Chassis (and their controls) to seed at startup.
    #[serde(default)]
    pub chassis: Vec<ChassisConfig>,
    /// Firmware targets to seed at startup.
    #[serde(default)]
    pub firmware_targets: Vec<FirmwareTargetConfig>,
}

impl Config {
    /// Load a `Config` from the given TOML file
    ///
    /// This config object can then be used to create a new simulated
    /// Redfish server.
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
