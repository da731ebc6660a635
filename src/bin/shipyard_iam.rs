//! shipyard-iam: in-memory users and sessions over gRPC
//! (`Register`, `Login`, `Whoami`).
//!
//! ## Configuration
//! - server.iam_grpc_port (default: 50053)
//! - iam.session_ttl_secs (default: 86400)

use tracing::{error, info};

use shipyard::config::Config;
use shipyard::runtime::{run_iam_service, BoxError};
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

    info!("shipyard-iam starting");
    run_iam_service(config, root_token()).await?;
    Ok(())
}
