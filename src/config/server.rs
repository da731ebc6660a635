//! Listener configuration.

use std::net::SocketAddr;

use serde::Deserialize;

use super::ConfigError;

/// Bind host and ports for every service the binaries can host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Order HTTP API.
    pub http_port: u16,
    pub inventory_grpc_port: u16,
    pub payment_grpc_port: u16,
    pub iam_grpc_port: u16,
    /// ext_authz `Check` server.
    pub authz_grpc_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            inventory_grpc_port: 50051,
            payment_grpc_port: 50052,
            iam_grpc_port: 50053,
            authz_grpc_port: 50054,
        }
    }
}

impl ServerConfig {
    /// Resolve `host:port` into a bind address.
    pub fn bind_addr(&self, port: u16) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address {}:{port}: {e}", self.host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.http_port, 8080);
        assert_eq!(server.authz_grpc_port, 50054);
    }

    #[test]
    fn test_bind_addr() {
        let server = ServerConfig::default();
        assert_eq!(
            server.bind_addr(9000).unwrap(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_bind_addr_rejects_hostname() {
        let server = ServerConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(matches!(server.bind_addr(1), Err(ConfigError::Invalid(_))));
    }
}
