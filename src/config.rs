use std::net::{IpAddr, Ipv4Addr};

use crate::game::constants::world;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// World width in tiles (bumped to odd by the generator)
    pub world_width: i32,
    /// World height in tiles
    pub world_height: i32,
    /// Fixed RNG seed for reproducible worlds; random when unset
    pub seed: Option<u64>,
    /// Path to TLS certificate file (if not using self-signed)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (if not using self-signed)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            world_width: world::DEFAULT_WIDTH,
            world_height: world::DEFAULT_HEIGHT,
            seed: None,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.port = parsed;
                } else {
                    tracing::warn!("PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid PORT '{}', using default", port);
            }
        }

        if let Ok(width) = std::env::var("WORLD_WIDTH") {
            if let Ok(parsed) = width.parse::<i32>() {
                if (11..=1001).contains(&parsed) {
                    config.world_width = parsed;
                } else {
                    tracing::warn!("WORLD_WIDTH must be 11-1001, using default");
                }
            } else {
                tracing::warn!("Invalid WORLD_WIDTH '{}', using default", width);
            }
        }

        if let Ok(height) = std::env::var("WORLD_HEIGHT") {
            if let Ok(parsed) = height.parse::<i32>() {
                if (11..=1001).contains(&parsed) {
                    config.world_height = parsed;
                } else {
                    tracing::warn!("WORLD_HEIGHT must be 11-1001, using default");
                }
            } else {
                tracing::warn!("Invalid WORLD_HEIGHT '{}', using default", height);
            }
        }

        if let Ok(seed) = std::env::var("WORLD_SEED") {
            if let Ok(parsed) = seed.parse::<u64>() {
                config.seed = Some(parsed);
            } else {
                tracing::warn!("Invalid WORLD_SEED '{}', ignoring", seed);
            }
        }

        if let Ok(cert_path) = std::env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }

        if let Ok(key_path) = std::env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.world_width < 11 || self.world_height < 11 {
            return Err("World must be at least 11x11 tiles".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4433);
        assert_eq!(config.world_width, 101);
        assert_eq!(config.world_height, 101);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tiny_world() {
        let config = ServerConfig {
            world_width: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_half_tls() {
        let config = ServerConfig {
            tls_cert_path: Some("cert.pem".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
