//! query-gateway - runs stored SQL query definitions across Oracle, SQL Server and MySQL.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info};

use query_gateway::catalog::{
    MetadataRepository, NewDatabaseProfile, NewQueryDefinition, SqliteCatalog,
};
use query_gateway::cli::{Cli, Command, RegisterDatabaseArgs, RegisterQueryArgs};
use query_gateway::config::GatewayConfig;
use query_gateway::connection::Dialect;
use query_gateway::credentials::{CredentialCodec, CredentialField, CredentialKeys};
use query_gateway::db::DriverConnector;
use query_gateway::gateway::{Gateway, GatewayResponse};
use query_gateway::logging;

#[tokio::main]
async fn main() {
    // .env may carry RUST_LOG as well as the encryption keys.
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = GatewayConfig::load_from_file(&config_path)?;

    // Metadata path precedence: --metadata, config file, environment, platform default.
    if let Some(path) = &cli.metadata {
        config.metadata.path = Some(path.clone());
    }
    config.metadata.apply_env_defaults();

    let keys = CredentialKeys::from_env().context("Invalid encryption key configuration")?;
    keys.require(&CredentialField::REQUIRED)
        .context("Encryption keys must be set for host, database, username and password")?;
    let codec = Arc::new(CredentialCodec::new(keys, config.credentials.encoding));

    if let Command::Encrypt(args) = &cli.command {
        let ciphertext = codec.encrypt(args.field, &args.value)?;
        println!("{}", String::from_utf8_lossy(&ciphertext));
        return Ok(());
    }

    let metadata_path = config.metadata.resolved_path();
    let catalog = Arc::new(
        SqliteCatalog::open(&metadata_path)
            .await
            .with_context(|| format!("Failed to open {}", metadata_path.display()))?,
    );

    let result = dispatch(cli.command, &config, &catalog, codec).await;
    catalog.close().await;
    result
}

async fn dispatch(
    command: Command,
    config: &GatewayConfig,
    catalog: &Arc<SqliteCatalog>,
    codec: Arc<CredentialCodec>,
) -> Result<()> {
    let repository: Arc<dyn MetadataRepository> = catalog.clone();
    let gateway = Gateway::new(
        repository,
        Arc::clone(&codec),
        Arc::new(DriverConnector),
        config.execution.clone(),
    );

    match command {
        Command::Batch(args) => {
            let body = args.read_body()?;
            let response = if args.detailed {
                gateway.create_query_data_detailed(&body).await
            } else {
                gateway.create_query_data(&body).await
            };
            print_response(&response)
        }
        Command::Run(args) => {
            let body = serde_json::json!({ "databaseName": args.database, "sql": args.sql });
            print_response(&gateway.run_ad_hoc(&body).await)
        }
        Command::RegisterDatabase(args) => {
            let id = catalog
                .insert_database(&encrypt_profile(args, &codec)?)
                .await?;
            println!("{id}");
            Ok(())
        }
        Command::RegisterQuery(args) => {
            let id = catalog.insert_query(&new_query(args)).await?;
            println!("{id}");
            Ok(())
        }
        // Handled before the store is opened.
        Command::Encrypt(_) => Ok(()),
    }
}

fn print_response(response: &GatewayResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        bail!("Request failed with status {}", response.status);
    }
    Ok(())
}

fn encrypt_profile(
    args: RegisterDatabaseArgs,
    codec: &CredentialCodec,
) -> Result<NewDatabaseProfile> {
    let dialect = Dialect::parse(&args.database_type)?;

    let encrypt = |field: CredentialField, value: Option<String>| -> Result<Option<Vec<u8>>> {
        match value {
            Some(v) => Ok(Some(codec.encrypt(field, &v)?)),
            None if dialect.required_fields().contains(&field) => {
                bail!(
                    "--{} is required for {} databases",
                    field.as_str().replace('_', "-"),
                    dialect
                )
            }
            None => Ok(None),
        }
    };

    Ok(NewDatabaseProfile {
        name: args.name,
        database_type: dialect.as_str().to_string(),
        host: encrypt(CredentialField::Host, args.host)?,
        database: encrypt(CredentialField::Database, args.database)?,
        username: codec.encrypt(CredentialField::Username, &args.username)?,
        password: codec.encrypt(CredentialField::Password, &args.password)?,
        connect_string: encrypt(CredentialField::ConnectString, args.connect_string)?,
        port: args.port,
    })
}

fn new_query(args: RegisterQueryArgs) -> NewQueryDefinition {
    NewQueryDefinition {
        name: args.name,
        group_name: args.group,
        database_id: args.database_id,
        sql: args.sql,
        variable_map: args.variable_map.filter(|v| !v.is_null()),
        replacement_map: args.replacement_map.filter(|v| !v.is_null()),
        is_query_active: !args.inactive,
    }
}
