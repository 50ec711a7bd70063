//! DBBridge command-line interface.
//!
//! Runs queries, transactions and introspection against registered
//! connections through the same adapter factory a service would embed.
//!
//! # Security Guarantees
//! - Passwords are read interactively and never written to the registry
//! - Connection targets are redacted in every log line and listing

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use dbbridge_core::{
    AdapterFactory, ColumnDefinition, ConnectionConfig, ConnectionRegistry, DatabaseAdapter,
    EngineType, Statement, dialect_for, logging::init_logging,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

#[derive(Parser)]
#[command(name = "dbbridge")]
#[command(about = "Uniform access to relational and document databases")]
#[command(version)]
#[command(long_about = "
DBBridge - one data-access contract over MySQL and MongoDB

Connections come from a JSON registry file (--registry) selected with
--connection, or directly from --database-url.

SQL-shaped text sent to MongoDB is translated to native operations.
WHERE clauses on SELECT are not translated: results are unfiltered and
the output carries a warning saying so.

SUPPORTED DATABASES:
- MySQL (mysql://)
- MongoDB (mongodb://, mongodb+srv://)

EXAMPLES:
  dbbridge --database-url mysql://app@localhost/shop --password-prompt query 'SELECT * FROM orders'
  dbbridge -c events query 'INSERT INTO events (kind) VALUES (?)' --param '\"login\"'
  dbbridge -c events schema events
  dbbridge create-table-sql users columns.json
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all log output except errors")]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, help = "Emit one JSON object per log event")]
    log_json: bool,

    /// Connection registry file
    #[arg(
        long,
        global = true,
        env = "DBBRIDGE_REGISTRY",
        default_value = "connections.json"
    )]
    registry: PathBuf,

    /// Registered connection id
    #[arg(short, long, global = true, env = "DBBRIDGE_CONNECTION")]
    connection: Option<String>,

    /// Database connection URL
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        conflicts_with = "connection",
        help = "Database connection string (credentials will be redacted in logs)"
    )]
    database_url: Option<String>,

    /// Prompt for the connection password
    #[arg(long, global = true)]
    password_prompt: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the connection registry
    Connections(ConnectionsArgs),
    /// Print every validation problem of the selected connection
    Validate,
    /// Test the selected connection
    Test,
    /// Execute one statement
    Query(QueryArgs),
    /// Execute a JSON array of statements atomically
    Transaction {
        /// File containing `[{"text": "...", "params": [...]}, ...]`
        file: PathBuf,
    },
    /// List databases on the server
    Databases,
    /// List tables or collections in the current database
    Tables,
    /// Describe a table (inferred from sampled documents on MongoDB)
    Schema { table: String },
    /// List indexes of a table or collection
    Indexes { table: String },
    /// List supported engine types and default ports
    Engines,
    /// Render create-table syntax offline
    CreateTableSql(CreateTableArgs),
}

#[derive(Args)]
struct ConnectionsArgs {
    #[command(subcommand)]
    action: Option<ConnectionsAction>,
}

#[derive(Subcommand)]
enum ConnectionsAction {
    /// List registered connections (default)
    List,
    /// Register a connection from a URL without credentials
    Add {
        url: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a registered connection
    Remove { id: String },
}

#[derive(Args)]
struct QueryArgs {
    /// Statement text with `?` placeholders
    text: String,

    /// Positional parameter as JSON; text that is not valid JSON is bound as a string
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<Value>,
}

#[derive(Args)]
struct CreateTableArgs {
    table: String,

    /// JSON file holding an array of column definitions
    columns: PathBuf,

    /// Engine whose dialect renders the definition
    #[arg(long, default_value = "relational")]
    engine: EngineType,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_json)?;

    match cli.command {
        Command::Connections(args) => manage_connections(&cli.global.registry, args),
        Command::Engines => {
            list_engines();
            Ok(ExitCode::SUCCESS)
        }
        Command::CreateTableSql(args) => {
            println!("{}", create_table_sql(&args)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => {
            let config = resolve_config(&cli.global)?;
            validate(&config)
        }
        Command::Test => {
            let config = resolve_config(&cli.global)?;
            test_connection(&config).await
        }
        command => {
            let config = resolve_config(&cli.global)?;
            let factory = AdapterFactory::new();
            let result = run_adapter_command(&factory, &config, command).await;
            factory.remove_all_adapters().await;
            result.map(|()| ExitCode::SUCCESS)
        }
    }
}

/// Builds the config for the selected connection.
fn resolve_config(global: &GlobalArgs) -> Result<ConnectionConfig> {
    let config = if let Some(url) = &global.database_url {
        ConnectionConfig::from_connection_string(url).context("Invalid --database-url")?
    } else if let Some(id) = &global.connection {
        let registry = ConnectionRegistry::load(&global.registry)?;
        registry.get(id).cloned().with_context(|| {
            format!(
                "Connection '{}' not found in {}",
                id,
                global.registry.display()
            )
        })?
    } else {
        bail!("No connection selected: pass --connection <id> or --database-url <url>");
    };

    if global.password_prompt {
        let password =
            rpassword::prompt_password("Password: ").context("Failed to read password")?;
        return apply_password(config, password);
    }
    Ok(config)
}

/// Sets the password on the config, or inside its connection string when it has one.
fn apply_password(mut config: ConnectionConfig, password: String) -> Result<ConnectionConfig> {
    let Some(raw) = config.connection_string.take() else {
        return Ok(config.with_password(password));
    };

    let mut url = Url::parse(&raw).context("Invalid connection string")?;
    url.set_password(Some(&password))
        .map_err(|()| anyhow!("Connection string cannot carry a password"))?;
    config.connection_string = Some(url.to_string());
    Ok(config)
}

fn manage_connections(registry_path: &Path, args: ConnectionsArgs) -> Result<ExitCode> {
    let mut registry = ConnectionRegistry::load(registry_path)?;

    match args.action.unwrap_or(ConnectionsAction::List) {
        ConnectionsAction::List => {
            if registry.connections().is_empty() {
                println!("No connections in {}", registry_path.display());
            }
            for config in registry.connections() {
                println!(
                    "{}\t{}\t{}\t{}",
                    config.id, config.engine_type, config.name, config
                );
            }
        }
        ConnectionsAction::Add { url, id, name } => {
            let config = registered_config(&url, id, name)?;
            info!("Registering connection {} -> {}", config.id, config);
            registry.upsert(config);
            registry.save(registry_path)?;
        }
        ConnectionsAction::Remove { id } => {
            if !registry.remove(&id) {
                bail!("Connection '{}' not found in {}", id, registry_path.display());
            }
            registry.save(registry_path)?;
            info!("Removed connection {}", id);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Config for `connections add`; URLs carrying a password are refused.
fn registered_config(url: &str, id: String, name: Option<String>) -> Result<ConnectionConfig> {
    let parsed = Url::parse(url).context("Invalid connection URL")?;
    if parsed.password().is_some() {
        bail!("Refusing to store a password in the registry; use --password-prompt instead");
    }

    let config = ConnectionConfig::from_connection_string(url)?.with_id(id.clone());
    let config = config.with_name(name.unwrap_or(id));
    config.validate()?;
    Ok(config)
}

fn validate(config: &ConnectionConfig) -> Result<ExitCode> {
    let factory = AdapterFactory::new();
    let errors = factory.validate_connection_config(config);
    if errors.is_empty() {
        println!("Configuration for {} is valid", config);
        return Ok(ExitCode::SUCCESS);
    }

    for error in &errors {
        println!("- {}", error);
    }
    Ok(ExitCode::FAILURE)
}

async fn test_connection(config: &ConnectionConfig) -> Result<ExitCode> {
    info!("Testing connection to {}", config);
    let factory = AdapterFactory::new();

    if factory.test_connection(config).await {
        println!(
            "Connection to {} database successful",
            config.engine_type.engine_name()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Connection to {} failed", config);
        Ok(ExitCode::FAILURE)
    }
}

async fn run_adapter_command(
    factory: &AdapterFactory,
    config: &ConnectionConfig,
    command: Command,
) -> Result<()> {
    let adapter: Arc<dyn DatabaseAdapter> = factory
        .get_adapter(config)
        .await
        .with_context(|| format!("Failed to open {}", config))?;
    debug!("Using {} adapter for {}", adapter.dialect().name(), config);

    match command {
        Command::Query(args) => {
            let result = factory
                .execute_on(adapter.as_ref(), &args.text, &args.params)
                .await?;
            print_json(&result)
        }
        Command::Transaction { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let statements: Vec<Statement> = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON array of statements", file.display()))?;
            let results = adapter.execute_transaction(&statements).await?;
            print_json(&results)
        }
        Command::Databases => print_json(&adapter.get_databases().await?),
        Command::Tables => print_json(&adapter.get_tables().await?),
        Command::Schema { table } => print_json(&adapter.get_table_schema(&table).await?),
        Command::Indexes { table } => print_json(&adapter.get_indexes(&table).await?),
        Command::Connections(_)
        | Command::Validate
        | Command::Test
        | Command::Engines
        | Command::CreateTableSql(_) => Ok(()),
    }
}

fn create_table_sql(args: &CreateTableArgs) -> Result<String> {
    let content = std::fs::read_to_string(&args.columns)
        .with_context(|| format!("Failed to read {}", args.columns.display()))?;
    let columns: Vec<ColumnDefinition> = serde_json::from_str(&content).with_context(|| {
        format!(
            "{} is not a JSON array of column definitions",
            args.columns.display()
        )
    })?;
    if columns.is_empty() {
        bail!("At least one column is required");
    }

    Ok(dialect_for(args.engine).create_table_syntax(&args.table, &columns))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// Parses a `--param` value.
fn parse_param(raw: &str) -> std::result::Result<Value, String> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

/// Lists supported engine types and their connection string formats
fn list_engines() {
    println!("Supported Engine Types:");
    println!();

    for engine in AdapterFactory::new().get_supported_engine_types() {
        println!("{} ({}):", engine.engine_name(), engine);
        println!("  Default port: {}", engine.default_port());
        match engine {
            EngineType::Relational => {
                println!("  Connection:   mysql://user@host:port/database");
                #[cfg(not(feature = "mysql"))]
                println!("  Not compiled in (build with --features mysql)");
            }
            EngineType::Document => {
                println!("  Connection:   mongodb://user@host:port/database");
                #[cfg(not(feature = "mongodb"))]
                println!("  Not compiled in (build with --features mongodb)");
            }
        }
        println!();
    }
}
