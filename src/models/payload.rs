//! ARM request and response bodies.
//!
//! Only the fields the sample reads or writes are modelled; unknown fields in
//! responses are ignored by serde.

use serde::{Deserialize, Serialize};

/// Generic ARM resource envelope.
#[derive(Deserialize, Debug, Clone)]
pub struct ArmResource<P> {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub sku: Option<Sku>,
    pub properties: Option<P>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Sku {
    pub name: String,
}

/// `PUT .../resourceGroups/{name}`
#[derive(Serialize, Debug)]
pub struct ResourceGroupBody<'a> {
    pub location: &'a str,
}

/// `PUT .../servers/{name}`
#[derive(Serialize, Debug)]
pub struct SqlServerBody<'a> {
    pub location: &'a str,
    pub properties: SqlServerBodyProperties<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SqlServerBodyProperties<'a> {
    pub administrator_login: &'a str,
    pub administrator_login_password: &'a str,
    pub version: &'a str,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SqlServerProperties {
    #[serde(default)]
    pub administrator_login: Option<String>,
    #[serde(default)]
    pub fully_qualified_domain_name: Option<String>,
}

/// `PUT .../firewallRules/{name}`, also the response properties.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRuleProperties {
    pub start_ip_address: String,
    pub end_ip_address: String,
}

#[derive(Serialize, Debug)]
pub struct FirewallRuleBody {
    pub properties: FirewallRuleProperties,
}

/// `PUT .../databases/{name}`
#[derive(Serialize, Debug)]
pub struct DatabaseBody<'a> {
    pub location: &'a str,
    pub sku: Sku,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DnsAliasProperties {
    #[serde(default)]
    pub azure_dns_record: Option<String>,
}

/// `properties.provisioningState`, reported by resource groups and most other
/// resources while a create is still running.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningProperties {
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

/// Any resource body, read only for its provisioning state.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProvisioningEnvelope {
    #[serde(default)]
    pub properties: Option<ProvisioningProperties>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    /// No state reported, or `Succeeded`.
    Done,
    InProgress(String),
    /// `Failed` or `Canceled`.
    Failed(String),
}

impl ProvisioningEnvelope {
    pub fn state(&self) -> ProvisioningState {
        let Some(state) = self
            .properties
            .as_ref()
            .and_then(|p| p.provisioning_state.as_deref())
        else {
            return ProvisioningState::Done;
        };
        match state.to_ascii_lowercase().as_str() {
            "succeeded" => ProvisioningState::Done,
            "failed" | "canceled" | "cancelled" => ProvisioningState::Failed(state.to_string()),
            _ => ProvisioningState::InProgress(state.to_string()),
        }
    }
}

/// `GET /subscriptions/{id}`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Body returned by an `Azure-AsyncOperation` status URL.
#[derive(Deserialize, Debug, Clone)]
pub struct AsyncOperationStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<ArmErrorDetail>,
}

impl AsyncOperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "succeeded" | "failed" | "canceled" | "cancelled"
        )
    }

    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("succeeded")
    }
}

/// `{"error": {...}}` envelope of a failed ARM call.
#[derive(Deserialize, Debug, Clone)]
pub struct ArmErrorResponse {
    pub error: ArmErrorDetail,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ArmErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for ArmErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.code.as_deref().unwrap_or("Unknown"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}
