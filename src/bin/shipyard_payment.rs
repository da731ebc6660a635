//! shipyard-payment: in-memory payment gateway over gRPC. Every charge
//! succeeds; repeated idempotency keys return the original transaction.

use tracing::{error, info};

use shipyard::config::Config;
use shipyard::runtime::{run_payment_service, BoxError};
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

    info!("shipyard-payment starting");
    run_payment_service(config, root_token()).await?;
    Ok(())
}
