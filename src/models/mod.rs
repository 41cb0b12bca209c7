//! Domain models for the DNS alias sample.
//!
//! - [`resources`] - resource snapshots handed between workflow steps
//! - [`payload`] - ARM JSON request/response bodies

pub mod payload;
mod resources;

// Re-export public types
pub use resources::{
    resource_group_id, sql_server_id, DnsAlias, FirewallRule, ResourceGroup, SqlDatabase,
    SqlServer,
};
