//! Connection handle lifecycle: connect, verify, close
//!
//! A [`ConnectionHandle`] owns one driver `Client`. It is opened by
//! [`ConnectionHandle::connect`] and released by [`ConnectionHandle::close`]
//! (or on drop). Every CRUD operation borrows the handle; closing needs
//! exclusive access, so a handle cannot be closed under a live result stream.

use crate::config::{FacadeConfig, DEFAULT_DATABASE};
use crate::validation::{RecordValidator, ValidatedCollectionName};
use crate::{Record, Result};
use bson::doc;
use docstore_common::DocStoreError;
use futures::future::BoxFuture;
use mongodb::{
    options::{ClientOptions, Credential, ServerAddress},
    Client, Collection, Database,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Open session state; absent once the handle is closed
struct Session {
    client: Client,
    database: Database,
}

/// An open connection to the document database
pub struct ConnectionHandle {
    session: Option<Session>,
    database_name: String,
    validators: HashMap<String, Arc<dyn RecordValidator>>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("database", &self.database_name)
            .field("closed", &self.is_closed())
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConnectionHandle {
    /// Open and verify a connection.
    ///
    /// The server must answer a `ping` within `timeout_ms`. Connection
    /// failures are retried according to `config.retry`; authentication
    /// failures are returned immediately.
    ///
    /// # Errors
    ///
    /// - `DocStoreError::Config` for an invalid configuration
    /// - `DocStoreError::Connection` if the server is unreachable in time
    /// - `DocStoreError::Auth` if the credentials are rejected
    #[instrument(skip(config), fields(
        host = %config.host,
        port = config.port,
        database = %config.database,
        timeout_ms = config.timeout_ms,
        max_retries = config.retry.max_retries
    ))]
    pub async fn connect(config: &FacadeConfig) -> Result<Self> {
        config.validate()?;

        let retry = &config.retry;
        let mut attempt = 0;
        loop {
            match Self::try_connect(config).await {
                Ok(handle) => {
                    if attempt > 0 {
                        info!(attempt = attempt, "Connection established after retry");
                    }
                    info!(database = %handle.database_name, "Connected");
                    return Ok(handle);
                }
                Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Connection failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_connect(config: &FacadeConfig) -> Result<Self> {
        let options = client_options(config).await?;
        let database_name = options
            .default_database
            .clone()
            .filter(|_| config.database == DEFAULT_DATABASE)
            .unwrap_or_else(|| config.database.clone());

        let client = Client::with_options(options)
            .map_err(|e| DocStoreError::Config(format!("Invalid client options: {}", e)))?;
        let database = client.database(&database_name);

        // The driver connects lazily; ping so that unreachable servers and
        // bad credentials surface here rather than on the first operation.
        let ping = tokio::time::timeout(config.timeout(), async {
            database.run_command(doc! { "ping": 1 }).await
        })
        .await;

        let failure = match ping {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(DocStoreError::from(e)),
            Err(_) => Some(DocStoreError::Connection(format!(
                "Server did not respond within {}ms",
                config.timeout_ms
            ))),
        };
        if let Some(err) = failure {
            client.shutdown().await;
            return Err(err);
        }

        Ok(Self {
            session: Some(Session { client, database }),
            database_name,
            validators: HashMap::new(),
        })
    }

    #[cfg(test)]
    pub(crate) fn closed(database_name: &str) -> Self {
        Self {
            session: None,
            database_name: database_name.to_string(),
            validators: HashMap::new(),
        }
    }

    /// True once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// Get the database name
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(DocStoreError::ClosedHandle)
    }

    /// Get a reference to the database
    pub fn database(&self) -> Result<&Database> {
        Ok(&self.session()?.database)
    }

    /// Resolve a collection by (validated) name.
    ///
    /// A closed handle fails with `DocStoreError::ClosedHandle` before the
    /// name is looked at.
    pub fn collection(&self, name: &str) -> Result<Collection<Record>> {
        let database = self.database()?;
        let name = ValidatedCollectionName::new(name)?;
        Ok(database.collection(name.as_str()))
    }

    /// Register the validator applied to inserts and patches of `collection`
    pub fn set_validator(
        &mut self,
        collection: &str,
        validator: impl RecordValidator + 'static,
    ) -> Result<()> {
        self.session()?;
        let name = ValidatedCollectionName::new(collection)?;
        debug!(collection = %name, "Registered record validator");
        self.validators.insert(name.as_str().to_string(), Arc::new(validator));
        Ok(())
    }

    pub(crate) fn validator(&self, collection: &str) -> Option<&Arc<dyn RecordValidator>> {
        self.validators.get(collection)
    }

    /// Check if the server still answers
    pub async fn ping(&self) -> Result<()> {
        self.database()?.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// List all collection names in the current database
    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        let names = self.database()?.list_collection_names().await?;
        Ok(names)
    }

    /// Drop the current database (use with caution!)
    #[instrument(skip(self), fields(database = %self.database_name))]
    pub async fn drop_database(&self) -> Result<()> {
        self.database()?.drop().await?;
        info!("Dropped database");
        Ok(())
    }

    /// Release the connection.
    ///
    /// Idempotent: closing a closed handle is a no-op. Every later operation
    /// fails with `DocStoreError::ClosedHandle`.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            drop(session.database);
            session.client.shutdown().await;
            info!(database = %self.database_name, "Connection closed");
        }
        Ok(())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.session.is_some() {
            debug!(
                database = %self.database_name,
                "Connection handle dropped without close; driver releases it in the background"
            );
        }
    }
}

/// Open a handle, run `f` with it, and close it whatever `f` returned.
///
/// ```ignore
/// let count = with_connection(&config, |handle| Box::pin(async move {
///     handle.count("people", Filter::new()).await
/// })).await?;
/// ```
pub async fn with_connection<T, F>(config: &FacadeConfig, f: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut ConnectionHandle) -> BoxFuture<'a, Result<T>>,
{
    let mut handle = ConnectionHandle::connect(config).await?;
    let outcome = f(&mut handle).await;
    handle.close().await?;
    outcome
}

/// Translate a [`FacadeConfig`] into driver options
pub(crate) async fn client_options(config: &FacadeConfig) -> Result<ClientOptions> {
    let mut options = match &config.uri {
        Some(uri) => ClientOptions::parse(uri).await.map_err(|e| match DocStoreError::from(e) {
            // SRV lookups can fail at parse time
            DocStoreError::Connection(msg) => DocStoreError::Connection(msg),
            other => DocStoreError::Config(format!("Invalid connection string: {}", other)),
        })?,
        None => {
            let mut options = ClientOptions::default();
            options.hosts = vec![ServerAddress::Tcp {
                host: config.host.clone(),
                port: Some(config.port),
            }];
            options
        }
    };

    options.connect_timeout = Some(config.timeout());
    options.server_selection_timeout = Some(config.timeout());

    if let Some(app) = &config.app_name {
        options.app_name = Some(app.clone());
    }

    if let Some(creds) = &config.credentials {
        let mut credential = Credential::default();
        credential.username = Some(creds.username.clone());
        credential.password = Some(creds.password.clone());
        credential.source = creds.source.clone();
        options.credential = Some(credential);
    }

    Ok(options)
}
