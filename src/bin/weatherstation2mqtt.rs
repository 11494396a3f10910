// weatherstation2mqtt - Bridge Weather Underground style station uploads to MQTT
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;
use weatherstation2mqtt::config::ConfigModel;
use weatherstation2mqtt::discovery::DEFAULT_PREFIX;
use weatherstation2mqtt::http::{self, RequestContext};
use weatherstation2mqtt::mqtt::MqttPublisher;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 80);
const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const CLIENT_ID: &str = "weatherstation2mqtt";

#[derive(Debug, Parser)]
#[clap(name = "weatherstation2mqtt", version = clap::crate_version!())]
struct WeatherStationApplication {
    /// Path to the JSON document that broker settings are loaded from and saved to
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for connecting and publishing to the MQTT broker, in seconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Topic prefix used for Home Assistant discovery announcements.
    #[clap(long, default_value_t = DEFAULT_PREFIX.into())]
    discovery_prefix: String,

    /// Address to bind to. By default, weatherstation2mqtt will bind to public address on
    /// port 80 since that is where stations using this protocol send uploads.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = WeatherStationApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = ConfigModel::load(opts.config.clone());
    let publisher = MqttPublisher::new(CLIENT_ID, Duration::from_secs(opts.timeout_secs));
    let context = Arc::new(RequestContext::new(config, publisher, opts.discovery_prefix.clone()));

    // Announce sensors once at startup, afterwards only when settings are saved.
    context.publish_discovery(context.config.get());

    let builder = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    let server = builder.serve(http::app(context.clone()).into_make_service());
    tracing::info!(message = "server started", address = %server.local_addr(), config = %opts.config.display());

    let shutdown = context.clone();
    server
        .with_graceful_shutdown(async move {
            // Wait for SIGTERM, SIGINT, or a restart request from the dashboard
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
                _ = shutdown.restart.wait() => {}
            }
        })
        .await?;

    if context.restart.requested() {
        // Non-zero so that a supervisor restarts us.
        tracing::info!("server stopped for restart");
        process::exit(1);
    }

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
