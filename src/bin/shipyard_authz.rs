//! shipyard-authz: Envoy external authorization server
//!
//! Allows requests carrying a live `X-Session-Uuid` cookie and tags them with
//! `X-User-Uuid` / `X-User-Login`. Sessions are resolved through IAM.
//!
//! ## Configuration
//! - server.authz_grpc_port: ext_authz port (default: 50054)
//! - services.iam_address: IAM gRPC address

use tracing::{error, info};

use shipyard::config::Config;
use shipyard::runtime::{run_authz_service, BoxError};
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

    info!("shipyard-authz starting");
    run_authz_service(config, root_token()).await?;
    Ok(())
}
