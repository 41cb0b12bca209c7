//! Bearer tokens for the Azure Resource Manager.

use crate::config::Credentials;
use crate::error::{Result, SampleError};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::{ClientSecretCredential, TokenCredentialOptions};
use url::Url;

/// Anything that can hand out a bearer token for ARM requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// Service principal login via `azure_identity`'s client secret flow.
pub struct ServicePrincipal {
    credential: ClientSecretCredential,
    scope: String,
}

impl ServicePrincipal {
    /// Build the credential for a tenant/client/secret triple.
    ///
    /// # Arguments
    /// * `credentials` - Service principal read from the environment
    /// * `authority_host` - Entra ID login endpoint
    /// * `arm_endpoint` - Resource Manager endpoint the token is scoped to
    pub fn new(
        credentials: &Credentials,
        authority_host: &str,
        arm_endpoint: &str,
    ) -> Result<Self> {
        let authority = Url::parse(authority_host).map_err(|e| {
            SampleError::Authentication(format!("invalid authority host {authority_host}: {e}"))
        })?;
        let mut options = TokenCredentialOptions::default();
        options.set_authority_host(authority);
        let credential = ClientSecretCredential::new(
            azure_core::new_http_client(),
            credentials.tenant_id.clone(),
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
            options,
        );
        Ok(ServicePrincipal {
            credential,
            scope: arm_scope(arm_endpoint),
        })
    }
}

#[async_trait]
impl TokenSource for ServicePrincipal {
    async fn bearer_token(&self) -> Result<String> {
        let token = self
            .credential
            .get_token(&[self.scope.as_str()])
            .await
            .map_err(|e| {
                SampleError::Authentication(format!(
                    "failed to acquire token for {}: {e}",
                    self.scope
                ))
            })?;
        Ok(token.token.secret().to_string())
    }
}

/// Fixed token, e.g. from `az account get-access-token`.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// `.default` scope for a Resource Manager endpoint.
fn arm_scope(arm_endpoint: &str) -> String {
    format!("{}/.default", arm_endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_scope() {
        assert_eq!(
            arm_scope("https://management.azure.com/"),
            "https://management.azure.com/.default"
        );
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "c".into(),
            client_secret: "s".into(),
            tenant_id: "t".into(),
            subscription_id: "sub".into(),
        }
    }

    #[test]
    fn test_service_principal_with_valid_authority() {
        let principal = ServicePrincipal::new(
            &credentials(),
            "https://login.microsoftonline.com",
            "https://management.azure.com/",
        )
        .expect("valid authority");
        assert_eq!(principal.scope, "https://management.azure.com/.default");
    }

    #[test]
    fn test_invalid_authority_is_authentication_error() {
        let credentials = credentials();
        let err = ServicePrincipal::new(&credentials, "not a url", "https://management.azure.com")
            .err()
            .expect("must fail");
        assert!(matches!(err, SampleError::Authentication(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken("abc".into());
        assert_eq!(source.bearer_token().await.expect("token"), "abc");
    }
}
