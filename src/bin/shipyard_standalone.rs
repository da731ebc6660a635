//! shipyard-standalone: every service in one process
//!
//! Runs the Order HTTP API, the Assembly worker, Inventory, Payment, IAM and
//! the ext_authz server together. Order talks to Inventory and Payment
//! in-process; events flow over the in-process channel broker unless
//! `messaging.type` says otherwise.
//!
//! ## Usage
//! ```text
//! SHIPYARD__STORAGE__TYPE=memory SHIPYARD__ASSEMBLY__BUILD_DURATION_SECS=1 shipyard-standalone
//! ```

use tracing::{error, info};

use shipyard::config::Config;
use shipyard::runtime::{run_standalone, BoxError};
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

    run_standalone(config, root_token()).await?;
    info!("shipyard-standalone stopped");
    Ok(())
}
