//! MongoDB client setup and liveness probing.

use crate::Result;
use crate::adapters::ConnectionConfig;
use crate::error::DbBridgeError;
use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use std::time::Duration;

/// Database used when neither the config nor the URL names one.
pub(super) const DEFAULT_DATABASE: &str = "test";

const APP_NAME: &str = "dbbridge";

/// A connected client plus the database its operations target.
#[derive(Debug, Clone)]
pub(super) struct MongoHandle {
    pub(super) client: Client,
    pub(super) database: String,
}

impl MongoHandle {
    pub(super) fn database(&self) -> mongodb::Database {
        self.client.database(&self.database)
    }
}

/// Parses client options and applies the config's timeouts and pool size.
pub(super) async fn client_options(config: &ConnectionConfig) -> Result<ClientOptions> {
    let url = config.connection_url()?;
    let mut options = ClientOptions::parse(url.as_str())
        .await
        .map_err(|e| connect_error(config, e))?;

    options.connect_timeout = Some(config.connect_timeout);
    options.server_selection_timeout = Some(config.connect_timeout);
    options.max_pool_size = Some(config.max_connections);
    options.app_name = Some(APP_NAME.to_string());

    Ok(options)
}

/// Builds the client and pings the target database.
///
/// On any failure the client is shut down before returning.
///
/// # Errors
/// - `Configuration` for malformed connection strings
/// - `Connection` for DNS, server selection, authentication and timeout failures
pub(super) async fn open_client(config: &ConnectionConfig) -> Result<MongoHandle> {
    let options = client_options(config).await?;
    let database = config
        .database
        .clone()
        .or_else(|| options.default_database.clone())
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

    let client = Client::with_options(options).map_err(|e| connect_error(config, e))?;
    let handle = MongoHandle { client, database };

    if let Err(error) = ping(&handle, config.connect_timeout).await {
        handle.client.shutdown().await;
        return Err(match error {
            PingFailure::Driver(e) => connect_error(config, e),
            PingFailure::Timeout => {
                DbBridgeError::connection_timeout("MongoDB", config.connect_timeout)
            }
        });
    }

    Ok(handle)
}

pub(super) enum PingFailure {
    Driver(mongodb::error::Error),
    Timeout,
}

/// Runs `ping` against the handle's database within `deadline`.
pub(super) async fn ping(
    handle: &MongoHandle,
    deadline: Duration,
) -> std::result::Result<(), PingFailure> {
    let database = handle.database();
    let command = database.run_command(doc! { "ping": 1 });
    match tokio::time::timeout(deadline, command).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(PingFailure::Driver(e)),
        Err(_) => Err(PingFailure::Timeout),
    }
}

/// Every failure while connecting is a connection failure, except a
/// malformed connection string.
fn connect_error(config: &ConnectionConfig, error: mongodb::error::Error) -> DbBridgeError {
    use mongodb::error::ErrorKind;

    if let ErrorKind::InvalidArgument { message, .. } = error.kind.as_ref() {
        return DbBridgeError::configuration(format!(
            "Invalid MongoDB connection settings for {}: {}",
            config, message
        ));
    }

    DbBridgeError::connection_failed(format!("Failed to connect to MongoDB at {}", config), error)
}
