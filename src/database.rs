//!
//! gqlgate database connector
//! --------------------------
//! One long-lived MongoDB client per process, wrapped in `DatabaseProvider`.
//!
//! The provider owns the lifecycle explicitly: `connect` at startup (awaited or
//! spawned in the background depending on the fail-open policy), `database` for
//! resolvers, and `shutdown` when the server stops. Connection failures are
//! reported to the log and never retried; with fail-open enabled the server
//! keeps serving and queries fail with `503` until a connection exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid connection string: {0}")]
    InvalidUri(String),
    #[error("connection string does not name a database")]
    NoDefaultDatabase,
    #[error("database ping failed: {0}")]
    Ping(String),
    #[error("index creation on '{collection}' failed: {message}")]
    Index { collection: String, message: String },
    #[error("database provider already shut down")]
    Closed,
}

/// Index applied right after connecting.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub collection: String,
    pub keys: Document,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(collection: impl Into<String>, keys: Document) -> Self {
        Self { collection: collection.into(), keys, unique: false }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug)]
struct Connection {
    client: Client,
    database: Database,
}

/// Process-wide handle to the document store. Cheap to clone.
#[derive(Clone, Debug)]
pub struct DatabaseProvider {
    uri: Arc<String>,
    connect_timeout: Duration,
    indexes: Arc<Vec<IndexSpec>>,
    conn: Arc<RwLock<Option<Connection>>>,
    closed: Arc<AtomicBool>,
}

impl DatabaseProvider {
    pub fn new(uri: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            uri: Arc::new(uri.into()),
            connect_timeout,
            indexes: Arc::new(Vec::new()),
            conn: Arc::new(RwLock::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = Arc::new(indexes);
        self
    }

    /// Establish the connection once. Success and failure are both logged.
    pub async fn connect(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::Closed);
        }
        match self.try_connect().await {
            Ok(conn) => {
                let mut slot = self.conn.write().await;
                // shutdown() may have run while the handshake was in flight
                if self.closed.load(Ordering::SeqCst) {
                    drop(slot);
                    conn.client.shutdown().await;
                    info!(target: "database", "connection completed after shutdown, closed");
                    return Err(DatabaseError::Closed);
                }
                info!(target: "database", database = %conn.database.name(), "database connected");
                *slot = Some(conn);
                Ok(())
            }
            Err(e) => {
                error!(target: "database", error = %e, "database connection error");
                Err(e)
            }
        }
    }

    /// Fail-open variant: connect in the background without blocking startup.
    pub fn spawn_connect(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            // outcome already logged by connect()
            let _ = this.connect().await;
        })
    }

    async fn try_connect(&self) -> Result<Connection, DatabaseError> {
        let mut opts = ClientOptions::parse(self.uri.as_str())
            .await
            .map_err(|e| DatabaseError::InvalidUri(e.to_string()))?;
        opts.server_selection_timeout = Some(self.connect_timeout);
        opts.connect_timeout = Some(self.connect_timeout);
        if opts.app_name.is_none() {
            opts.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        }
        let client = Client::with_options(opts).map_err(|e| DatabaseError::InvalidUri(e.to_string()))?;
        let database = client.default_database().ok_or(DatabaseError::NoDefaultDatabase)?;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DatabaseError::Ping(e.to_string()))?;
        for spec in self.indexes.iter() {
            let model = IndexModel::builder()
                .keys(spec.keys.clone())
                .options(IndexOptions::builder().unique(spec.unique).build())
                .build();
            database
                .collection::<Document>(&spec.collection)
                .create_index(model)
                .await
                .map_err(|e| DatabaseError::Index { collection: spec.collection.clone(), message: e.to_string() })?;
        }
        Ok(Connection { client, database })
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.read().await.is_some()
    }

    /// The connected database, or `503` when startup never connected.
    pub async fn database(&self) -> Result<Database, AppError> {
        self.conn
            .read()
            .await
            .as_ref()
            .map(|c| c.database.clone())
            .ok_or_else(|| AppError::unavailable("db_unavailable", "database not connected"))
    }

    pub async fn collection<T: Send + Sync>(&self, name: &str) -> Result<Collection<T>, AppError> {
        Ok(self.database().await?.collection::<T>(name))
    }

    /// Drop the connection and close the client's pools. Later or in-flight
    /// connects are refused.
    pub async fn shutdown(&self) {
        let taken = {
            let mut slot = self.conn.write().await;
            self.closed.store(true, Ordering::SeqCst);
            slot.take()
        };
        if let Some(conn) = taken {
            conn.client.shutdown().await;
            info!(target: "database", "database connection closed");
        }
    }
}
