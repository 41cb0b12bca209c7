//! SQL statements against a provisioned database.
//!
//! Each call opens its own connection, runs one statement and closes the
//! connection before returning, whatever the outcome. Connections are never
//! shared between calls.

use super::ConnectionString;
use crate::error::{Result, SampleError};
use async_trait::async_trait;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Run one non-query statement; returns the number of rows affected.
    async fn execute(&self, connection: &ConnectionString, statement: &str) -> Result<u64>;

    /// Run a query and return the named column of every row, in order.
    async fn query_column(
        &self,
        connection: &ConnectionString,
        statement: &str,
        column: &str,
    ) -> Result<Vec<String>>;
}

type TdsClient = Client<Compat<TcpStream>>;

/// [`SqlClient`] speaking TDS through `tiberius`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiberiusSqlClient;

#[async_trait]
impl SqlClient for TiberiusSqlClient {
    async fn execute(&self, connection: &ConnectionString, statement: &str) -> Result<u64> {
        let mut client = connect(connection).await?;
        let outcome = client.execute(statement, &[]).await;
        release(client, connection).await;
        let result = outcome?;
        log::debug!("executed on {}: {statement}", connection.server);
        Ok(result.total())
    }

    async fn query_column(
        &self,
        connection: &ConnectionString,
        statement: &str,
        column: &str,
    ) -> Result<Vec<String>> {
        let mut client = connect(connection).await?;
        let outcome = read_column(&mut client, statement, column).await;
        release(client, connection).await;
        outcome
    }
}

async fn read_column(client: &mut TdsClient, statement: &str, column: &str) -> Result<Vec<String>> {
    let rows = client
        .simple_query(statement)
        .await?
        .into_first_result()
        .await?;
    let mut values = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let value: Option<&str> = row.try_get(column)?;
        values.push(value.unwrap_or("NULL").to_string());
    }
    Ok(values)
}

/// Open a connection, bounded by the connection string's timeout.
async fn connect(connection: &ConnectionString) -> Result<TdsClient> {
    let config = Config::from_ado_string(&connection.to_string())?;
    log::debug!("connecting to {} / {}", connection.server, connection.database);
    match tokio::time::timeout(connection.timeout(), open(config)).await {
        Ok(client) => client,
        Err(_) => Err(SampleError::SqlExecution(format!(
            "connection to {} timed out after {}s",
            connection.server, connection.timeout_secs
        ))),
    }
}

async fn open(config: Config) -> Result<TdsClient> {
    let tcp = tcp_connect(&config).await?;
    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways may redirect to the node hosting the database
        Err(tiberius::error::Error::Routing { host, port }) => {
            log::debug!("redirected to {host}:{port}");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = tcp_connect(&config).await?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn tcp_connect(config: &Config) -> Result<TcpStream> {
    let addr = config.get_addr();
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| SampleError::SqlExecution(format!("cannot reach {addr}: {e}")))?;
    tcp.set_nodelay(true)
        .map_err(|e| SampleError::SqlExecution(format!("socket setup for {addr}: {e}")))?;
    Ok(tcp)
}

async fn release(client: TdsClient, connection: &ConnectionString) {
    if let Err(e) = client.close().await {
        log::warn!("closing connection to {} failed: {e}", connection.server);
    }
}
