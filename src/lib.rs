//! Shipyard - order orchestration and event pipeline
//!
//! Order lifecycle state machine, the OrderPaid / ShipAssembled event
//! pipeline between the Order and Assembly services, and the session
//! authorization check consumed by the API gateway.

pub mod api;
pub mod authz;
pub mod bus;
pub mod clients;
pub mod codec;
pub mod config;
pub mod domain;
pub mod events;
pub mod handlers;
pub mod outbox;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod utils;

pub mod proto {
    pub mod events {
        pub mod v1 {
            tonic::include_proto!("events.v1");
        }
    }

    pub mod inventory {
        pub mod v1 {
            tonic::include_proto!("inventory.v1");
        }
    }

    pub mod payment {
        pub mod v1 {
            tonic::include_proto!("payment.v1");
        }
    }

    pub mod iam {
        pub mod v1 {
            tonic::include_proto!("iam.v1");
        }
    }

    pub mod envoy {
        pub mod service {
            pub mod auth {
                pub mod v3 {
                    tonic::include_proto!("envoy.service.auth.v3");
                }
            }
        }
    }
}
