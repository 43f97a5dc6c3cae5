//! TLS configuration for encrypted connections.
//!
//! Used when a `ConnectionConfig` sets `encrypted`. The config is held by the
//! bound client rather than the connection key, so it never affects whether
//! two sessions share a transport.

use crate::{Error, Result};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pemfile::Item;
use std::fs;
use std::sync::Arc;

/// Where trusted root certificates come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RootSource {
    /// Operating system trust store, falling back to bundled roots if it is empty
    #[default]
    Native,
    /// Bundled Mozilla roots only
    Bundled,
    /// A PEM file holding one or more CA certificates
    CaFile(String),
}

/// TLS configuration for encrypted connections.
///
/// # Examples
///
/// ```ignore
/// use mapd_connector::connection::TlsConfig;
///
/// // With system root certificates (production)
/// let tls = TlsConfig::builder().build()?;
///
/// // With custom CA certificate
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/path/to/ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    roots: RootSource,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Root certificate source this config was built from
    pub fn roots(&self) -> &RootSource {
        &self.roots
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("roots", &self.roots)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    roots: RootSource,
}

impl TlsConfigBuilder {
    /// Trust only the CA certificates in a PEM file.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.roots = RootSource::CaFile(path.into());
        self
    }

    /// Trust only the bundled Mozilla root certificates.
    pub fn bundled_roots(mut self) -> Self {
        self.roots = RootSource::Bundled;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA file cannot be read or holds no certificates.
    pub fn build(self) -> Result<TlsConfig> {
        let root_store = match &self.roots {
            RootSource::CaFile(ca_path) => load_custom_ca(ca_path)?,
            RootSource::Bundled => bundled_roots(),
            RootSource::Native => {
                let result = rustls_native_certs::load_native_certs();

                let mut store = RootCertStore::empty();
                for cert in result.certs {
                    let _ = store.add_parsable_certificates(std::iter::once(cert));
                }

                if store.is_empty() {
                    tracing::warn!(
                        errors = result.errors.len(),
                        "no system root certificates found, using bundled roots"
                    );
                    bundled_roots()
                } else {
                    store
                }
            }
        };

        let client_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );

        Ok(TlsConfig {
            roots: self.roots,
            client_config,
        })
    }
}

fn bundled_roots() -> RootCertStore {
    let mut store = RootCertStore::empty();
    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    store
}

/// Load a custom CA certificate from a PEM file.
fn load_custom_ca(ca_path: &str) -> Result<RootCertStore> {
    let ca_cert_data = fs::read(ca_path).map_err(|e| {
        Error::Config(format!(
            "Failed to read CA certificate file '{}': {}",
            ca_path, e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            // Private keys and other items are skipped
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "Failed to parse CA certificate from '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            ca_path
        )));
    }

    Ok(root_store)
}

/// Parse server name from hostname for TLS SNI (Server Name Indication).
///
/// # Errors
///
/// Returns an error if the hostname is empty, too long, or contains
/// characters other than alphanumerics, `-` and `.`.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
