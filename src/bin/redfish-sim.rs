// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to run redfish-sim, a simulated Redfish service

use anyhow::anyhow;
use camino::Utf8PathBuf;
use clap::Parser;
use redfish_sim::{run_server, Config};

#[derive(Debug, Parser)]
#[clap(name = "redfish-sim", about = "See README.adoc for more information")]
struct Args {
    #[clap(name = "CONFIG_FILE_PATH")]
    config_file_path: Utf8PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config_file_path)?;
    run_server(config).await.map_err(|error| anyhow!(error))
}
