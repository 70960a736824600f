//! Dialects and their connection descriptors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::DatabaseProfile;
use crate::config::ExecutionConfig;
use crate::credentials::{CredentialCodec, CredentialField, Secret};
use crate::error::{GatewayError, Result};
use crate::query::placeholders::PlaceholderStyle;

/// Supported database dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Oracle,
    SqlServer,
    MySql,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Self::Oracle, Self::SqlServer, Self::MySql];

    /// Parses a stored dialect tag.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "Oracle" => Ok(Self::Oracle),
            "SQL Server" => Ok(Self::SqlServer),
            "MySQL" => Ok(Self::MySql),
            other => Err(GatewayError::unsupported_dialect(other)),
        }
    }

    /// Returns the tag as stored in the metadata store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oracle => "Oracle",
            Self::SqlServer => "SQL Server",
            Self::MySql => "MySQL",
        }
    }

    /// Returns the default port for this dialect.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Oracle => 1521,
            Self::SqlServer => 1433,
            Self::MySql => 3306,
        }
    }

    /// Positional placeholder syntax of the driver.
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::Oracle => PlaceholderStyle::Colon,
            Self::SqlServer => PlaceholderStyle::AtP,
            Self::MySql => PlaceholderStyle::Question,
        }
    }

    /// Profile fields this dialect connects with.
    pub fn required_fields(&self) -> &'static [CredentialField] {
        match self {
            Self::Oracle => &[
                CredentialField::Username,
                CredentialField::Password,
                CredentialField::ConnectString,
            ],
            Self::SqlServer | Self::MySql => &[
                CredentialField::Host,
                CredentialField::Database,
                CredentialField::Username,
                CredentialField::Password,
            ],
        }
    }

    /// Builds the connection descriptor for this dialect.
    pub fn connection_descriptor(
        &self,
        mut fields: DecryptedFields,
        port: Option<u16>,
        options: ConnectionOptions,
    ) -> Result<ConnectionDescriptor> {
        let username = fields.take(CredentialField::Username)?;
        let password = fields.take(CredentialField::Password)?;

        match self {
            Self::Oracle => Ok(ConnectionDescriptor::Oracle(OracleDescriptor {
                username,
                password,
                connect_string: fields.take(CredentialField::ConnectString)?,
                port,
                options,
            })),
            Self::SqlServer | Self::MySql => {
                let network = NetworkDescriptor {
                    host: fields.take(CredentialField::Host)?,
                    database: fields.take(CredentialField::Database)?,
                    username,
                    password,
                    port,
                    options,
                };
                Ok(match self {
                    Self::SqlServer => ConnectionDescriptor::SqlServer(network),
                    _ => ConnectionDescriptor::MySql(network),
                })
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which entry point an execution came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Batch,
    AdHoc,
}

/// Transport options shared by every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Whether the transport is encrypted. Always off; the driver still
    /// trusts the server certificate for the login handshake.
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    /// Bound on each request sent inside the transaction.
    pub request_timeout: Option<Duration>,
}

impl ConnectionOptions {
    pub fn for_path(path: ExecutionPath, execution: &ExecutionConfig) -> Self {
        let request_timeout = match path {
            ExecutionPath::Batch => execution.batch_timeout(),
            ExecutionPath::AdHoc => execution.ad_hoc_timeout(),
        };
        Self {
            encrypt: false,
            trust_server_certificate: true,
            request_timeout,
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            encrypt: false,
            trust_server_certificate: true,
            request_timeout: None,
        }
    }
}

/// Decrypted profile fields, holding only what the dialect asked for.
#[derive(Debug, Default)]
pub struct DecryptedFields {
    host: Option<Secret>,
    database: Option<Secret>,
    username: Option<Secret>,
    password: Option<Secret>,
    connect_string: Option<Secret>,
}

impl DecryptedFields {
    /// Decrypts the fields `dialect` needs from a stored profile.
    pub fn decrypt(
        profile: &DatabaseProfile,
        dialect: Dialect,
        codec: &CredentialCodec,
    ) -> Result<Self> {
        let mut fields = Self::default();
        for &field in dialect.required_fields() {
            let ciphertext = profile.ciphertext(field).ok_or_else(|| {
                GatewayError::metadata(format!(
                    "Database \"{}\" has no {field}, required for {dialect}",
                    profile.name
                ))
            })?;
            fields = fields.with(field, codec.decrypt(field, ciphertext)?);
        }
        Ok(fields)
    }

    pub fn with(mut self, field: CredentialField, value: Secret) -> Self {
        *self.slot(field) = Some(value);
        self
    }

    fn take(&mut self, field: CredentialField) -> Result<Secret> {
        self.slot(field)
            .take()
            .ok_or_else(|| GatewayError::metadata(format!("Missing decrypted {field}")))
    }

    fn slot(&mut self, field: CredentialField) -> &mut Option<Secret> {
        match field {
            CredentialField::Host => &mut self.host,
            CredentialField::Database => &mut self.database,
            CredentialField::Username => &mut self.username,
            CredentialField::Password => &mut self.password,
            CredentialField::ConnectString => &mut self.connect_string,
        }
    }
}

/// Connection parameters for host-addressed dialects.
#[derive(Clone)]
pub struct NetworkDescriptor {
    pub host: Secret,
    pub database: Secret,
    pub username: Secret,
    pub password: Secret,
    pub port: Option<u16>,
    pub options: ConnectionOptions,
}

/// Connection parameters for Oracle. Host and service live in the connect string.
#[derive(Clone)]
pub struct OracleDescriptor {
    pub username: Secret,
    pub password: Secret,
    pub connect_string: Secret,
    pub port: Option<u16>,
    pub options: ConnectionOptions,
}

/// Everything a driver needs to open one connection.
#[derive(Clone)]
pub enum ConnectionDescriptor {
    Oracle(OracleDescriptor),
    SqlServer(NetworkDescriptor),
    MySql(NetworkDescriptor),
}

impl ConnectionDescriptor {
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Oracle(_) => Dialect::Oracle,
            Self::SqlServer(_) => Dialect::SqlServer,
            Self::MySql(_) => Dialect::MySql,
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        match self {
            Self::Oracle(d) => &d.options,
            Self::SqlServer(d) | Self::MySql(d) => &d.options,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Oracle(d) => d.port,
            Self::SqlServer(d) | Self::MySql(d) => d.port,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.options().request_timeout
    }

    /// Returns a display-safe description with no decrypted values.
    pub fn display_string(&self) -> String {
        match self.port() {
            Some(port) => format!("{} connection (port {port})", self.dialect()),
            None => format!("{} connection (default port)", self.dialect()),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("dialect", &self.dialect())
            .field("port", &self.port())
            .field("options", self.options())
            .finish_non_exhaustive()
    }
}
