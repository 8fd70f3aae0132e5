use anyhow::{Context, Result};
use std::env;
use tracing::info;
use wtransport::tls::{Certificate, CertificateChain, PrivateKey, Sha256DigestFmt};
use wtransport::Identity;

/// TLS configuration for the WebTransport server
pub struct TlsConfig {
    /// The wtransport Identity containing certificate and key
    pub identity: Identity,
    /// SHA-256 hash of the certificate, for the browser
    /// `serverCertificateHashes` option
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load TLS configuration.
    ///
    /// Production: set TLS_CERT_PATH and TLS_KEY_PATH env vars.
    /// Development: a self-signed certificate is generated on startup.
    pub async fn load() -> Result<Self> {
        if let (Ok(cert_path), Ok(key_path)) =
            (env::var("TLS_CERT_PATH"), env::var("TLS_KEY_PATH"))
        {
            info!("Loading TLS certificate from environment paths");
            return Self::load_from_paths(&cert_path, &key_path).await;
        }

        info!("Generating self-signed TLS certificate");
        Self::generate_self_signed()
    }

    /// Load certificate from PEM file paths
    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;

        let cert_hash = Self::compute_cert_hash(&identity);
        Self::log_cert_info(&cert_hash);

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    /// Generate a self-signed certificate for localhost development
    pub fn generate_self_signed() -> Result<Self> {
        let key = rcgen::KeyPair::generate().context("Failed to generate key pair")?;
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .context("Invalid certificate parameters")?
            .self_signed(&key)
            .context("Failed to self-sign certificate")?;

        let certificate = Certificate::from_der(cert.der().to_vec())
            .context("Generated certificate is not valid DER")?;
        let private_key = PrivateKey::from_der_pkcs8(key.serialize_der());
        let identity = Identity::new(CertificateChain::single(certificate), private_key);

        let cert_hash = Self::compute_cert_hash(&identity);
        Self::log_cert_info(&cert_hash);

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    fn compute_cert_hash(identity: &Identity) -> String {
        identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| cert.hash().fmt(Sha256DigestFmt::DottedHex))
            .unwrap_or_default()
    }

    fn log_cert_info(cert_hash: &str) {
        info!("Certificate hash: {}", cert_hash);
    }

    /// Get the certificate hash for client configuration
    pub fn get_cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_signed_has_hash() {
        let config = TlsConfig::generate_self_signed().unwrap();
        assert!(!config.cert_hash.is_empty());
        // Dotted-hex SHA-256: 32 byte pairs separated by colons.
        assert_eq!(config.cert_hash.split(':').count(), 32);
    }

    #[test]
    fn test_fresh_certs_differ() {
        let a = TlsConfig::generate_self_signed().unwrap();
        let b = TlsConfig::generate_self_signed().unwrap();
        assert_ne!(a.cert_hash, b.cert_hash);
    }
}
