//! Runtime settings and fixed sample constants.
//!
//! Credentials come from the environment (a `.env` file is honoured via `dotenv`
//! in `main`). Everything else has a default matching the sample's fixed layout.

use crate::error::{Result, SampleError};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Database name shared by both servers.
pub const DB_NAME: &str = "dbSample";
/// SQL administrator login for both servers.
pub const SQL_ADMIN: &str = "sqladmin1234";
/// Database SKU tier.
pub const DB_SKU: &str = "Basic";

/// Firewall range applied to both servers. Deliberately permissive sample setting.
pub const FIREWALL_START_IP: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 1);
pub const FIREWALL_END_IP: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// Wait after creating the alias against the "test" server.
pub const ALIAS_CREATE_WAIT: Duration = Duration::from_secs(3 * 60);
/// Wait after re-pointing the alias at the "production" server.
pub const ALIAS_RETARGET_WAIT: Duration = Duration::from_secs(10 * 60);

/// `connection timeout` in the ADO connection string, in seconds.
pub const SQL_CONNECTION_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_TEST_REGION: &str = "eastus";
pub const DEFAULT_PROD_REGION: &str = "southcentralus";
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

pub const API_VERSION_RESOURCES: &str = "2021-04-01";
pub const API_VERSION_SUBSCRIPTIONS: &str = "2022-12-01";
pub const API_VERSION_SQL: &str = "2021-11-01";

/// Poll interval for long-running operations when ARM sends no `Retry-After`.
pub const LRO_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Upper bound on a single long-running operation.
pub const LRO_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// How the workflow waits for the DNS alias to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMode {
    /// Sleep the full fixed delay.
    Fixed,
    /// Poll alias resolution with backoff, bounded by the fixed delay.
    Probe,
}

impl PropagationMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(PropagationMode::Fixed),
            "probe" => Ok(PropagationMode::Probe),
            other => Err(SampleError::Configuration(format!(
                "SAMPLE_PROPAGATION must be 'fixed' or 'probe', got '{other}'"
            ))),
        }
    }
}

/// Service principal credentials for the control plane.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub subscription_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

#[derive(Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub test_region: String,
    pub prod_region: String,
    pub propagation: PropagationMode,
    pub arm_endpoint: String,
    pub authority_host: String,
    /// Pre-acquired ARM bearer token, bypassing the client secret flow.
    pub access_token: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("credentials", &self.credentials)
            .field("test_region", &self.test_region)
            .field("prod_region", &self.prod_region)
            .field("propagation", &self.propagation)
            .field("arm_endpoint", &self.arm_endpoint)
            .field("authority_host", &self.authority_host)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Settings {
    /// Build settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    ///
    /// # Returns
    /// * `Err(Authentication)` - naming the first missing or empty credential variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ => Err(SampleError::Authentication(format!(
                    "environment variable {key} is not set"
                ))),
            }
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let credentials = Credentials {
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            tenant_id: required("TENANT_ID")?,
            subscription_id: required("SUBSCRIPTION_ID")?,
        };

        let propagation = match lookup("SAMPLE_PROPAGATION") {
            Some(v) if !v.trim().is_empty() => PropagationMode::parse(&v)?,
            _ => PropagationMode::Probe,
        };

        Ok(Settings {
            credentials,
            test_region: optional("SAMPLE_TEST_REGION", DEFAULT_TEST_REGION),
            prod_region: optional("SAMPLE_PROD_REGION", DEFAULT_PROD_REGION),
            propagation,
            arm_endpoint: optional("ARM_ENDPOINT", DEFAULT_ARM_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            authority_host: optional("AZURE_AUTHORITY_HOST", DEFAULT_AUTHORITY_HOST),
            access_token: lookup("ARM_ACCESS_TOKEN")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}
