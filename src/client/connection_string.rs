//! Connection string parsing
//!
//! Supports formats:
//! * mapd://[user[:password]@]host[:port][/database][?params]
//! * mapd:///database (Unix socket, default directory)
//! * mapd:///database?host=/path/to/socket/dir (Unix socket, custom directory)
//!
//! Query parameters: `encrypted`, `protocol`, `timeout_ms`, `ca_file`, `roots`.

use crate::connection::{ConnectionConfig, TlsConfig, TransportType, DEFAULT_PORT};
use crate::protocol::Protocol;
use crate::session::ConnectOptions;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database used when the URL names none
pub const DEFAULT_DATABASE: &str = "mapd";

/// Parsed connection info
#[derive(Clone)]
pub struct ConnectionInfo {
    /// Transport type
    pub transport: TransportType,
    /// Host (for TCP)
    pub host: Option<String>,
    /// Port
    pub port: u16,
    /// Unix socket path
    pub unix_socket: Option<PathBuf>,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password
    pub password: Option<String>,
    /// TLS over TCP
    pub encrypted: bool,
    /// Wire encoding
    pub protocol: Protocol,
    /// Per-RPC timeout (from timeout_ms)
    pub timeout: Option<Duration>,
    /// Path to custom CA certificate (from ca_file)
    pub ca_file: Option<String>,
    /// Trust bundled roots instead of the system store (roots=bundled)
    pub bundled_roots: bool,
}

/// Resolve the default Unix socket directory
fn resolve_default_socket_dir() -> Option<String> {
    for dir in &["/run/mapd", "/var/run/mapd", "/tmp"] {
        if Path::new(dir).is_dir() {
            return Some(dir.to_string());
        }
    }
    None
}

/// Extract a query parameter value from a query string
fn parse_query_param(query_string: &str, param: &str) -> Option<String> {
    if query_string.is_empty() {
        return None;
    }

    let query = query_string.trim_start_matches('?');

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == param {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Construct the full Unix socket path
fn construct_socket_path(socket_dir: &str, port: u16) -> PathBuf {
    PathBuf::from(format!("{}/.s.MAPD.{}", socket_dir, port))
}

fn parse_bool(param: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config(format!("invalid {}: {}", param, other))),
    }
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid port: {}", value)))
}

/// Split `s` at the first `?`, keeping the `?` on the query side
fn split_query(s: &str) -> (&str, &str) {
    match s.find('?') {
        Some(pos) => s.split_at(pos),
        None => (s, ""),
    }
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s.strip_prefix("mapd://").ok_or_else(|| {
            Error::Config("connection string must start with mapd://".into())
        })?;

        let mut info = if rest.starts_with('/') {
            Self::parse_unix(rest)?
        } else {
            Self::parse_tcp(rest)?
        };

        let (_, query_string) = split_query(rest);
        info.apply_common_params(query_string)?;
        Ok(info)
    }

    fn parse_unix(rest: &str) -> Result<Self> {
        let (path, query_string) = split_query(rest);
        let path = path.trim_start_matches('/');

        let database = if path.is_empty() {
            DEFAULT_DATABASE.to_string()
        } else {
            path.to_string()
        };

        let port = match parse_query_param(query_string, "port") {
            Some(p) => parse_port(&p)?,
            None => DEFAULT_PORT,
        };

        let socket_dir = match parse_query_param(query_string, "host") {
            Some(custom_dir) => custom_dir,
            None => resolve_default_socket_dir().ok_or_else(|| {
                Error::Config(
                    "could not locate Unix socket directory. Set host query parameter explicitly."
                        .into(),
                )
            })?,
        };

        Ok(Self {
            transport: TransportType::Unix,
            host: None,
            port,
            unix_socket: Some(construct_socket_path(&socket_dir, port)),
            database,
            user: whoami::username(),
            password: None,
            encrypted: false,
            protocol: Protocol::default(),
            timeout: None,
            ca_file: None,
            bundled_roots: false,
        })
    }

    fn parse_tcp(rest: &str) -> Result<Self> {
        let (rest, _) = split_query(rest);

        // Credentials may contain '@' in the password, so split at the last one
        let (auth, rest) = match rest.rfind('@') {
            Some(pos) => (Some(&rest[..pos]), &rest[pos + 1..]),
            None => (None, rest),
        };

        let (user, password) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (user.to_string(), Some(pass.to_string())),
                None => (auth.to_string(), None),
            },
            None => (whoami::username(), None),
        };
        if user.is_empty() {
            return Err(Error::Config("empty user name".into()));
        }

        let (host_port, database) = match rest.split_once('/') {
            Some((hp, db)) if !db.is_empty() => (hp, db.to_string()),
            Some((hp, _)) => (hp, DEFAULT_DATABASE.to_string()),
            None => (rest, DEFAULT_DATABASE.to_string()),
        };

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => (host.to_string(), parse_port(port)?),
            None => (host_port.to_string(), DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(Error::Config("missing host".into()));
        }

        Ok(Self {
            transport: TransportType::Tcp,
            host: Some(host),
            port,
            unix_socket: None,
            database,
            user,
            password,
            encrypted: false,
            protocol: Protocol::default(),
            timeout: None,
            ca_file: None,
            bundled_roots: false,
        })
    }

    fn apply_common_params(&mut self, query_string: &str) -> Result<()> {
        if let Some(protocol) = parse_query_param(query_string, "protocol") {
            self.protocol = protocol.parse()?;
        }
        if let Some(ms) = parse_query_param(query_string, "timeout_ms") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| Error::Config(format!("invalid timeout_ms: {}", ms)))?;
            self.timeout = Some(Duration::from_millis(ms));
        }

        // Unix sockets are never encrypted
        if self.transport == TransportType::Unix {
            return Ok(());
        }

        if let Some(encrypted) = parse_query_param(query_string, "encrypted") {
            self.encrypted = parse_bool("encrypted", &encrypted)?;
        }
        self.ca_file = parse_query_param(query_string, "ca_file");
        match parse_query_param(query_string, "roots").as_deref() {
            None | Some("native") => {}
            Some("bundled") => self.bundled_roots = true,
            Some(other) => return Err(Error::Config(format!("invalid roots: {}", other))),
        }
        Ok(())
    }

    /// Build a `TlsConfig` from parsed connection parameters.
    ///
    /// Returns `None` unless the connection is encrypted.
    pub fn to_tls_config(&self) -> Result<Option<TlsConfig>> {
        if !self.encrypted {
            return Ok(None);
        }

        let mut builder = TlsConfig::builder();
        if self.bundled_roots {
            builder = builder.bundled_roots();
        }
        // A CA file overrides the root selection
        if let Some(ref ca_path) = self.ca_file {
            builder = builder.ca_cert_path(ca_path);
        }

        Ok(Some(builder.build()?))
    }

    /// Convert to ConnectionConfig
    pub fn to_config(&self) -> Result<ConnectionConfig> {
        let host = match (&self.host, &self.unix_socket) {
            (Some(host), _) => host.clone(),
            (None, Some(path)) => path.to_string_lossy().into_owned(),
            (None, None) => return Err(Error::Config("missing host".into())),
        };
        ConnectionConfig::builder(host, self.port)
            .encrypted(self.encrypted)
            .protocol(self.protocol)
            .transport(self.transport)
            .build()
    }

    /// Session options carried by the URL
    pub fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(&self.database, &self.user);
        if let Some(ref password) = self.password {
            options = options.password(password);
        }
        if let Some(timeout) = self.timeout {
            options = options.timeout(timeout);
        }
        options
    }
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("unix_socket", &self.unix_socket)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("encrypted", &self.encrypted)
            .field("protocol", &self.protocol)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
