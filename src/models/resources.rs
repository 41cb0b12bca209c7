//! Cloud resources created by the sample.
//!
//! These are plain snapshots of what the control plane returned. Nothing here
//! mutates a resource; re-pointing the alias produces a new [`DnsAlias`].

use std::fmt;
use std::net::Ipv4Addr;

/// ARM id of a resource group.
pub fn resource_group_id(subscription_id: &str, group: &str) -> String {
    format!("/subscriptions/{subscription_id}/resourceGroups/{group}")
}

/// ARM id of a SQL server inside a resource group.
pub fn sql_server_id(group_id: &str, server: &str) -> String {
    format!("{group_id}/providers/Microsoft.Sql/servers/{server}")
}

/// Resource group that scopes every other resource of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
}

/// Azure SQL logical server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlServer {
    pub id: String,
    pub name: String,
    pub location: String,
    pub admin_login: String,
    /// Assigned by the provider once the server exists.
    pub fqdn: String,
}

/// Inbound IP allow-list entry on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub id: String,
    pub name: String,
    /// Name of the server the rule is attached to.
    pub server: String,
    pub start_ip: Ipv4Addr,
    pub end_ip: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlDatabase {
    pub id: String,
    pub name: String,
    pub server: String,
    pub sku: String,
}

/// Server DNS alias. At most one lives at a time during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAlias {
    pub id: String,
    pub name: String,
    /// Name of the server the alias currently targets.
    pub server: String,
    /// Host name clients connect to, e.g. `<alias>.database.windows.net`.
    pub azure_dns_record: String,
}

impl fmt::Display for SqlServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.location, self.fqdn)
    }
}

impl fmt::Display for DnsAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.azure_dns_record, self.server)
    }
}
