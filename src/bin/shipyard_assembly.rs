//! shipyard-assembly: Assembly worker
//!
//! Consumes `order.paid`, waits the configured build time and publishes
//! `ship.assembled`.
//!
//! ## Configuration
//! - assembly.build_duration_secs: simulated build time (default: 10)
//! - groups.assembly_order_paid: consumer group (default: assembly.order_paid)
//! - messaging.type: channel or kafka

use tracing::{error, info};

use shipyard::config::Config;
use shipyard::runtime::{run_assembly_service, BoxError};
use shipyard::utils::bootstrap::{init_tracing, parse_config_path};
use shipyard::utils::shutdown::root_token;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!("shipyard-assembly starting");
    run_assembly_service(config, root_token()).await?;
    info!("shipyard-assembly stopped");
    Ok(())
}
