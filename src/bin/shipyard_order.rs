//! shipyard-order: Order service
//!
//! Serves the Order HTTP API, relays `OrderPaid` from the outbox to the bus
//! and applies `ShipAssembled` events to orders.
//!
//! ## Architecture
//! ```text
//! [gateway] --HTTP--> [shipyard-order] --gRPC--> [inventory], [payment]
//!                          |    ^
//!                 order.paid    ship.assembled
//!                          v    |
//!                        [event bus]
//! ```
//!
//! ## Configuration
//! - server.http_port: HTTP API port (default: 8080)
//! - services.inventory_address / services.payment_address
//! - storage.type: memory, sqlite or postgres
//! - messaging.type: channel or kafka

use tracing::{error, info};

use shipyard::config::Config;
use shipyard::runtime::{run_order_service, BoxError};
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

    info!("shipyard-order starting");
    run_order_service(config, root_token()).await?;
    info!("shipyard-order stopped");
    Ok(())
}
