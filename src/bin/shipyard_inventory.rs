//! shipyard-inventory: in-memory parts catalog over gRPC, preloaded with
//! the demo catalog.

use tracing::{error, info};

use shipyard::config::Config;
use shipyard::runtime::{run_inventory_service, BoxError};
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

    info!("shipyard-inventory starting");
    run_inventory_service(config, root_token()).await?;
    Ok(())
}
