//! Control-plane operations used by the sample workflow.

use super::arm::ArmClient;
use crate::config::{API_VERSION_RESOURCES, API_VERSION_SQL, API_VERSION_SUBSCRIPTIONS};
use crate::error::{Result, SampleError};
use crate::models::payload::{
    ArmResource, DatabaseBody, DnsAliasProperties, FirewallRuleBody, FirewallRuleProperties,
    ProvisioningProperties, ResourceGroupBody, Sku, SqlServerBody, SqlServerBodyProperties,
    SqlServerProperties, Subscription,
};
use crate::models::{
    resource_group_id, sql_server_id, DnsAlias, FirewallRule, ResourceGroup, SqlDatabase,
    SqlServer,
};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use std::net::Ipv4Addr;

/// Create/delete calls against the cloud resource manager.
///
/// Every call waits until the provider reports completion before returning.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Confirm the subscription is reachable; returns its display name.
    async fn verify_subscription(&self) -> Result<String>;

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup>;

    async fn create_sql_server(
        &self,
        group: &ResourceGroup,
        name: &str,
        location: &str,
        admin_login: &str,
        admin_password: &str,
    ) -> Result<SqlServer>;

    async fn create_firewall_rule(
        &self,
        server: &SqlServer,
        name: &str,
        start_ip: Ipv4Addr,
        end_ip: Ipv4Addr,
    ) -> Result<FirewallRule>;

    async fn create_database(
        &self,
        server: &SqlServer,
        name: &str,
        sku: &str,
    ) -> Result<SqlDatabase>;

    /// Bind `name` to the server's DNS record. Fails if the name is taken.
    async fn create_dns_alias(&self, server: &SqlServer, name: &str) -> Result<DnsAlias>;

    async fn delete_dns_alias(&self, alias: &DnsAlias) -> Result<()>;

    async fn delete_server(&self, server: &SqlServer) -> Result<()>;

    /// Delete the group and, by cascade, everything inside it.
    async fn delete_resource_group(&self, group: &ResourceGroup) -> Result<()>;
}

/// [`ControlPlane`] backed by the ARM REST API.
pub struct AzureControlPlane {
    arm: ArmClient,
    subscription_id: String,
}

impl AzureControlPlane {
    pub fn new(arm: ArmClient, subscription_id: impl Into<String>) -> Self {
        AzureControlPlane {
            arm,
            subscription_id: subscription_id.into(),
        }
    }
}

#[async_trait]
impl ControlPlane for AzureControlPlane {
    async fn verify_subscription(&self) -> Result<String> {
        let path = format!("/subscriptions/{}", self.subscription_id);
        let subscription: Subscription = self
            .arm
            .get(&path, API_VERSION_SUBSCRIPTIONS, "get subscription")
            .await?;
        if let Some(state) = subscription.state.as_deref() {
            if !state.eq_ignore_ascii_case("enabled") {
                return Err(SampleError::Authentication(format!(
                    "subscription {} is {state}",
                    subscription.subscription_id
                )));
            }
        }
        Ok(subscription
            .display_name
            .unwrap_or(subscription.subscription_id))
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        let operation = format!("create resource group {name}");
        let path = resource_group_id(&self.subscription_id, name);
        let body = ResourceGroupBody { location };
        let group: ArmResource<ProvisioningProperties> = self
            .arm
            .put_and_wait(&path, API_VERSION_RESOURCES, &body, &operation)
            .await?;
        Ok(ResourceGroup {
            id: group.id,
            name: group.name,
            location: group.location.unwrap_or_else(|| location.to_string()),
        })
    }

    async fn create_sql_server(
        &self,
        group: &ResourceGroup,
        name: &str,
        location: &str,
        admin_login: &str,
        admin_password: &str,
    ) -> Result<SqlServer> {
        let operation = format!("create SQL server {name}");
        let path = sql_server_id(&group.id, name);
        let body = SqlServerBody {
            location,
            properties: SqlServerBodyProperties {
                administrator_login: admin_login,
                administrator_login_password: admin_password,
                version: "12.0",
            },
        };
        let server: ArmResource<SqlServerProperties> = self
            .arm
            .put_and_wait(&path, API_VERSION_SQL, &body, &operation)
            .await?;
        let properties = server.properties.unwrap_or_default();
        let fqdn = properties.fully_qualified_domain_name.ok_or_else(|| {
            SampleError::provisioning(&operation, "no fullyQualifiedDomainName returned")
        })?;
        Ok(SqlServer {
            id: server.id,
            name: server.name,
            location: server.location.unwrap_or_else(|| location.to_string()),
            admin_login: properties
                .administrator_login
                .unwrap_or_else(|| admin_login.to_string()),
            fqdn,
        })
    }

    async fn create_firewall_rule(
        &self,
        server: &SqlServer,
        name: &str,
        start_ip: Ipv4Addr,
        end_ip: Ipv4Addr,
    ) -> Result<FirewallRule> {
        let operation = format!("create firewall rule {name} on {}", server.name);
        let path = format!("{}/firewallRules/{name}", server.id);
        let body = FirewallRuleBody {
            properties: FirewallRuleProperties {
                start_ip_address: start_ip.to_string(),
                end_ip_address: end_ip.to_string(),
            },
        };
        let rule: ArmResource<FirewallRuleProperties> = self
            .arm
            .put_and_wait(&path, API_VERSION_SQL, &body, &operation)
            .await?;
        let (start_ip, end_ip) = match rule.properties {
            Some(p) => (
                parse_ip(&p.start_ip_address, &operation)?,
                parse_ip(&p.end_ip_address, &operation)?,
            ),
            None => (start_ip, end_ip),
        };
        Ok(FirewallRule {
            id: rule.id,
            name: rule.name,
            server: server.name.clone(),
            start_ip,
            end_ip,
        })
    }

    async fn create_database(
        &self,
        server: &SqlServer,
        name: &str,
        sku: &str,
    ) -> Result<SqlDatabase> {
        let operation = format!("create database {name} on {}", server.name);
        let path = format!("{}/databases/{name}", server.id);
        let body = DatabaseBody {
            location: &server.location,
            sku: Sku {
                name: sku.to_string(),
            },
        };
        let database: ArmResource<IgnoredAny> = self
            .arm
            .put_and_wait(&path, API_VERSION_SQL, &body, &operation)
            .await?;
        Ok(SqlDatabase {
            id: database.id,
            name: database.name,
            server: server.name.clone(),
            sku: database
                .sku
                .map(|s| s.name)
                .unwrap_or_else(|| sku.to_string()),
        })
    }

    async fn create_dns_alias(&self, server: &SqlServer, name: &str) -> Result<DnsAlias> {
        let operation = format!("create DNS alias {name} on {}", server.name);
        let path = format!("{}/dnsAliases/{name}", server.id);
        let alias: ArmResource<DnsAliasProperties> = self
            .arm
            .put_and_wait(&path, API_VERSION_SQL, &serde_json::json!({}), &operation)
            .await?;
        let record = alias
            .properties
            .and_then(|p| p.azure_dns_record)
            .ok_or_else(|| SampleError::provisioning(&operation, "no azureDnsRecord returned"))?;
        Ok(DnsAlias {
            id: alias.id,
            name: alias.name,
            server: server.name.clone(),
            azure_dns_record: record,
        })
    }

    async fn delete_dns_alias(&self, alias: &DnsAlias) -> Result<()> {
        let operation = format!("delete DNS alias {}", alias.name);
        self.arm
            .delete_and_wait(&alias.id, API_VERSION_SQL, &operation)
            .await
    }

    async fn delete_server(&self, server: &SqlServer) -> Result<()> {
        let operation = format!("delete SQL server {}", server.name);
        self.arm
            .delete_and_wait(&server.id, API_VERSION_SQL, &operation)
            .await
    }

    async fn delete_resource_group(&self, group: &ResourceGroup) -> Result<()> {
        let operation = format!("delete resource group {}", group.name);
        self.arm
            .delete_and_wait(&group.id, API_VERSION_RESOURCES, &operation)
            .await
    }
}

fn parse_ip(value: &str, operation: &str) -> Result<Ipv4Addr> {
    value.parse().map_err(|e| {
        SampleError::provisioning(operation, format!("invalid IP address '{value}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::StaticToken;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GROUP_ID: &str = "/subscriptions/sub/resourceGroups/rgSQLServer01";
    const SERVER_ID: &str =
        "/subscriptions/sub/resourceGroups/rgSQLServer01/providers/Microsoft.Sql/servers/sqltest01";

    fn control_plane(server: &MockServer) -> AzureControlPlane {
        let arm = ArmClient::new(server.uri(), Arc::new(StaticToken("t".into())))
            .with_polling(Duration::from_millis(1), Duration::from_secs(5));
        AzureControlPlane::new(arm, "sub")
    }

    fn group() -> ResourceGroup {
        ResourceGroup {
            id: GROUP_ID.into(),
            name: "rgSQLServer01".into(),
            location: "eastus".into(),
        }
    }

    fn sql_server() -> SqlServer {
        SqlServer {
            id: SERVER_ID.into(),
            name: "sqltest01".into(),
            location: "eastus".into(),
            admin_login: "sqladmin1234".into(),
            fqdn: "sqltest01.database.windows.net".into(),
        }
    }

    #[tokio::test]
    async fn test_create_sql_server_reads_fqdn() {
        let mock = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(SERVER_ID))
            .and(body_partial_json(json!({
                "location": "eastus",
                "properties": {"administratorLogin": "sqladmin1234"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": SERVER_ID,
                "name": "sqltest01",
                "location": "eastus",
                "properties": {
                    "administratorLogin": "sqladmin1234",
                    "fullyQualifiedDomainName": "sqltest01.database.windows.net",
                    "state": "Ready"
                }
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let server = control_plane(&mock)
            .create_sql_server(&group(), "sqltest01", "eastus", "sqladmin1234", "Pa55word!")
            .await
            .expect("server created");
        assert_eq!(server.fqdn, "sqltest01.database.windows.net");
        assert_eq!(server.id, SERVER_ID);
    }

    #[tokio::test]
    async fn test_create_sql_server_without_fqdn_fails() {
        let mock = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": SERVER_ID,
                "name": "sqltest01",
                "properties": {}
            })))
            .mount(&mock)
            .await;

        let err = control_plane(&mock)
            .create_sql_server(&group(), "sqltest01", "eastus", "sqladmin1234", "Pa55word!")
            .await
            .expect_err("must fail");
        assert!(matches!(err, SampleError::Provisioning { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_create_firewall_rule_sends_range() {
        let mock = MockServer::start().await;
        let rule_path = format!("{SERVER_ID}/firewallRules/allowAll01");
        Mock::given(method("PUT"))
            .and(path(rule_path.as_str()))
            .and(body_partial_json(json!({
                "properties": {"startIpAddress": "0.0.0.1", "endIpAddress": "255.255.255.255"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": rule_path,
                "name": "allowAll01",
                "properties": {"startIpAddress": "0.0.0.1", "endIpAddress": "255.255.255.255"}
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let rule = control_plane(&mock)
            .create_firewall_rule(
                &sql_server(),
                "allowAll01",
                Ipv4Addr::new(0, 0, 0, 1),
                Ipv4Addr::new(255, 255, 255, 255),
            )
            .await
            .expect("rule created");
        assert_eq!(rule.start_ip, Ipv4Addr::new(0, 0, 0, 1));
        assert_eq!(rule.server, "sqltest01");
    }

    #[tokio::test]
    async fn test_create_dns_alias_reads_record() {
        let mock = MockServer::start().await;
        let alias_path = format!("{SERVER_ID}/dnsAliases/sqlserverdns01");
        Mock::given(method("PUT"))
            .and(path(alias_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": alias_path,
                "name": "sqlserverdns01",
                "properties": {"azureDnsRecord": "sqlserverdns01.database.windows.net"}
            })))
            .mount(&mock)
            .await;

        let alias = control_plane(&mock)
            .create_dns_alias(&sql_server(), "sqlserverdns01")
            .await
            .expect("alias created");
        assert_eq!(alias.azure_dns_record, "sqlserverdns01.database.windows.net");
        assert_eq!(alias.server, "sqltest01");
    }

    #[tokio::test]
    async fn test_verify_disabled_subscription() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscriptionId": "sub",
                "displayName": "Sample",
                "state": "Disabled"
            })))
            .mount(&mock)
            .await;

        let err = control_plane(&mock)
            .verify_subscription()
            .await
            .expect_err("disabled subscription");
        assert!(matches!(err, SampleError::Authentication(_)), "got {err:?}");
    }
}
