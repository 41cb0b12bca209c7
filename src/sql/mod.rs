//! Data-plane access to the sample databases.
//!
//! - [`connection`] - ADO connection strings
//! - [`client`] - Scoped statement execution over TDS

mod client;
mod connection;

pub use client::{SqlClient, TiberiusSqlClient};
pub use connection::ConnectionString;
