//! Command-line argument parsing for the query gateway.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::credentials::CredentialField;
use crate::error::{GatewayError, Result};

/// Runs stored SQL query definitions against Oracle, SQL Server and MySQL.
#[derive(Parser, Debug)]
#[command(name = "query-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Metadata store path (overrides the config file)
    #[arg(long, global = true, value_name = "PATH")]
    pub metadata: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute the definitions selected by a batch request body
    Batch(BatchArgs),

    /// Execute raw SQL against a named database
    Run(RunArgs),

    /// Encrypt a value for storage in the metadata store
    Encrypt(EncryptArgs),

    /// Register a database profile, encrypting its credentials
    RegisterDatabase(RegisterDatabaseArgs),

    /// Register a query definition
    RegisterQuery(RegisterQueryArgs),
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// JSON request body file ("-" for stdin). Defaults to an empty body.
    #[arg(long, value_name = "PATH")]
    pub body: Option<String>,

    /// Include metadata, status and timing for every entry
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Database profile name
    #[arg(long, value_name = "NAME")]
    pub database: String,

    /// SQL to execute
    #[arg(long, value_name = "SQL")]
    pub sql: String,
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Field whose key encrypts the value (host, database, username, password, connect_string)
    #[arg(long, value_name = "FIELD", value_parser = parse_field)]
    pub field: CredentialField,

    /// Plaintext to encrypt
    pub value: String,
}

#[derive(Args, Debug)]
pub struct RegisterDatabaseArgs {
    /// Unique profile name
    #[arg(long)]
    pub name: String,

    /// Dialect tag: "Oracle", "SQL Server" or "MySQL"
    #[arg(long = "type", value_name = "TYPE")]
    pub database_type: String,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub database: Option<String>,

    #[arg(long)]
    pub username: String,

    #[arg(long, env = "QUERY_GATEWAY_DB_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Oracle connect string (host:port/service)
    #[arg(long)]
    pub connect_string: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct RegisterQueryArgs {
    /// Query name, the key of its batch result
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub group: Option<String>,

    /// Id of the target database profile
    #[arg(long, value_name = "ID")]
    pub database_id: i64,

    /// SQL template
    #[arg(long)]
    pub sql: String,

    /// Variable map as JSON
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub variable_map: Option<Value>,

    /// Replacement map as JSON
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub replacement_map: Option<Value>,

    /// Store the definition as inactive
    #[arg(long)]
    pub inactive: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(GatewayConfig::default_path)
    }
}

impl BatchArgs {
    /// Reads the request body from the file, stdin, or nothing.
    pub fn read_body(&self) -> Result<Value> {
        let text = match self.body.as_deref() {
            None => return Ok(Value::Object(Default::default())),
            Some("-") => {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .map_err(|e| GatewayError::config(format!("Failed to read stdin: {e}")))?;
                text
            }
            Some(path) => read_file(Path::new(path))?,
        };

        serde_json::from_str(&text)
            .map_err(|e| GatewayError::config(format!("Request body is not valid JSON: {e}")))
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        GatewayError::config(format!("Failed to read {}: {}", path.display(), e))
    })
}

fn parse_field(s: &str) -> std::result::Result<CredentialField, String> {
    CredentialField::parse(s).ok_or_else(|| {
        format!("Invalid field: {s}. Expected: host, database, username, password, or connect_string")
    })
}

fn parse_json(s: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("Invalid JSON: {e}"))
}
