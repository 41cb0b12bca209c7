//! Azure Resource Manager REST client.
//!
//! Every mutating call is a long-running operation. ARM reports progress either
//! through an `Azure-AsyncOperation` status document or a `Location` URL that
//! answers `202` until the work is done. Both are followed here until a
//! terminal state; failed calls are never retried.

use super::auth::TokenSource;
use crate::config::{LRO_POLL_INTERVAL, LRO_TIMEOUT};
use crate::error::{Result, SampleError};
use crate::models::payload::{
    ArmErrorResponse, AsyncOperationStatus, ProvisioningEnvelope, ProvisioningState,
};
use colored::Colorize;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const ASYNC_OPERATION: &str = "azure-asyncoperation";

pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
    poll_interval: Duration,
    lro_timeout: Duration,
}

impl ArmClient {
    pub fn new(endpoint: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        ArmClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
            poll_interval: LRO_POLL_INTERVAL,
            lro_timeout: LRO_TIMEOUT,
        }
    }

    /// Override the polling cadence used when ARM sends no `Retry-After`.
    pub fn with_polling(mut self, poll_interval: Duration, lro_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.lro_timeout = lro_timeout;
        self
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{path}?api-version={api_version}", self.endpoint)
    }

    /// `GET` a resource and parse it.
    pub async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
        operation: &str,
    ) -> Result<R> {
        let url = self.url(path, api_version);
        let response = self.send(Method::GET, &url, None::<&()>, operation).await?;
        let response = check_status(response, operation).await?;
        let text = read_body(response, operation).await?;
        parse_json(&text, operation)
    }

    /// `PUT` a resource and wait until ARM reports it provisioned.
    ///
    /// After any operation status has been followed, the resource itself is read
    /// until its `provisioningState` is terminal.
    ///
    /// # Returns
    /// * `Ok(R)` - The resource as ARM describes it after completion
    /// * `Err(Provisioning)` - On any rejected request or failed operation
    pub async fn put_and_wait<B, R>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
        operation: &str,
    ) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path, api_version);
        log::debug!("PUT {url}", url = url.on_blue());
        let response = self.send(Method::PUT, &url, Some(body), operation).await?;
        let response = check_status(response, operation).await?;
        let status = response.status();

        if let Some(status_url) = header_str(response.headers(), ASYNC_OPERATION) {
            let delay = self.retry_after(response.headers());
            self.poll_async_operation(&status_url, delay, operation).await?;
        } else if status == StatusCode::ACCEPTED {
            if let Some(location) = header_str(response.headers(), LOCATION.as_str()) {
                let delay = self.retry_after(response.headers());
                self.poll_location(&location, delay, operation).await?;
            }
        } else {
            let text = read_body(response, operation).await?;
            if !text.trim().is_empty() && provisioning_state(&text) == ProvisioningState::Done {
                return parse_json(&text, operation);
            }
        }

        self.wait_for_provisioning(path, api_version, operation).await
    }

    /// `GET` the resource every poll interval until it leaves its in-progress state.
    async fn wait_for_provisioning<R: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
        operation: &str,
    ) -> Result<R> {
        let url = self.url(path, api_version);
        let started = Instant::now();
        loop {
            let response = self.send(Method::GET, &url, None::<&()>, operation).await?;
            let response = check_status(response, operation).await?;
            let delay = self.retry_after(response.headers());
            let text = read_body(response, operation).await?;
            match provisioning_state(&text) {
                ProvisioningState::Done => return parse_json(&text, operation),
                ProvisioningState::Failed(state) => {
                    return Err(SampleError::provisioning(
                        operation,
                        format!("provisioningState={state}"),
                    ))
                }
                ProvisioningState::InProgress(state) => {
                    log::debug!("{operation}: provisioningState={state}");
                    self.sleep_within_budget(started, delay, operation).await?;
                }
            }
        }
    }

    /// `DELETE` a resource and wait for the deletion to finish.
    ///
    /// A resource that is already gone counts as deleted.
    pub async fn delete_and_wait(
        &self,
        path: &str,
        api_version: &str,
        operation: &str,
    ) -> Result<()> {
        let url = self.url(path, api_version);
        log::debug!("DELETE {url}", url = url.on_blue());
        let response = self.send(Method::DELETE, &url, None::<&()>, operation).await?;
        if response.status() == StatusCode::NOT_FOUND {
            log::info!("{operation}: resource already absent");
            return Ok(());
        }
        let response = check_status(response, operation).await?;

        if let Some(status_url) = header_str(response.headers(), ASYNC_OPERATION) {
            let delay = self.retry_after(response.headers());
            self.poll_async_operation(&status_url, delay, operation).await?;
        } else if response.status() == StatusCode::ACCEPTED {
            if let Some(location) = header_str(response.headers(), LOCATION.as_str()) {
                let delay = self.retry_after(response.headers());
                self.poll_location(&location, delay, operation).await?;
            }
        }
        Ok(())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        operation: &str,
    ) -> Result<Response> {
        let token = self.tokens.bearer_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| SampleError::provisioning(operation, format!("request failed: {e}")))
    }

    /// Follow an `Azure-AsyncOperation` document until it reaches a terminal status.
    async fn poll_async_operation(
        &self,
        status_url: &str,
        first_delay: Duration,
        operation: &str,
    ) -> Result<()> {
        let started = Instant::now();
        let mut delay = first_delay;
        loop {
            self.sleep_within_budget(started, delay, operation).await?;
            let response = self.send(Method::GET, status_url, None::<&()>, operation).await?;
            let response = check_status(response, operation).await?;
            delay = self.retry_after(response.headers());
            let text = read_body(response, operation).await?;
            let status: AsyncOperationStatus = parse_json(&text, operation)?;
            log::debug!("{operation}: status={}", status.status);

            if status.is_success() {
                return Ok(());
            }
            if status.is_terminal() {
                let detail = status
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| status.status.clone());
                return Err(SampleError::provisioning(operation, detail));
            }
        }
    }

    /// Follow a `Location` URL while it keeps answering `202 Accepted`.
    async fn poll_location(
        &self,
        location: &str,
        first_delay: Duration,
        operation: &str,
    ) -> Result<()> {
        let started = Instant::now();
        let mut delay = first_delay;
        loop {
            self.sleep_within_budget(started, delay, operation).await?;
            let response = self.send(Method::GET, location, None::<&()>, operation).await?;
            let response = check_status(response, operation).await?;
            if response.status() != StatusCode::ACCEPTED {
                return Ok(());
            }
            delay = self.retry_after(response.headers());
            log::debug!("{operation}: still in progress");
        }
    }

    async fn sleep_within_budget(
        &self,
        started: Instant,
        delay: Duration,
        operation: &str,
    ) -> Result<()> {
        if started.elapsed() + delay > self.lro_timeout {
            return Err(SampleError::provisioning(
                operation,
                format!("timed out after {}s", self.lro_timeout.as_secs()),
            ));
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn retry_after(&self, headers: &HeaderMap) -> Duration {
        header_str(headers, RETRY_AFTER.as_str())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.poll_interval)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// State reported by a resource body; bodies that are not JSON report none.
fn provisioning_state(text: &str) -> ProvisioningState {
    serde_json::from_str::<ProvisioningEnvelope>(text)
        .map(|envelope| envelope.state())
        .unwrap_or(ProvisioningState::Done)
}

/// Turn a non-success response into the matching error.
async fn check_status(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ArmErrorResponse>(&text)
        .map(|e| e.error.to_string())
        .unwrap_or_else(|_| format!("HTTP {status}: {text}"));
    log::warn!(
        "{failed} {operation}: {detail}",
        failed = "failed".on_red()
    );
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SampleError::Authentication(format!("{operation}: {detail}")));
    }
    Err(SampleError::provisioning(operation, detail))
}

async fn read_body(response: Response, operation: &str) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| SampleError::provisioning(operation, format!("reading response: {e}")))
}

fn parse_json<R: DeserializeOwned>(text: &str, operation: &str) -> Result<R> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        log::error!("OUTPUT START:\n\n{text}\n\nOUTPUT END\n");
        SampleError::provisioning(
            operation,
            format!("Error parsing JSON: path={} error={}", e.path(), e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::StaticToken;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RG_PATH: &str = "/subscriptions/sub/resourceGroups/rgSQLServer01";

    fn client(server: &MockServer) -> ArmClient {
        ArmClient::new(server.uri(), Arc::new(StaticToken("test-token".into())))
            .with_polling(Duration::from_millis(1), Duration::from_secs(5))
    }

    fn group_json() -> serde_json::Value {
        json!({
            "id": RG_PATH,
            "name": "rgSQLServer01",
            "location": "eastus",
            "properties": {"provisioningState": "Succeeded"}
        })
    }

    #[tokio::test]
    async fn test_put_synchronous() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(RG_PATH))
            .and(query_param("api-version", "2021-04-01"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(group_json()))
            .expect(1)
            .mount(&server)
            .await;

        let value: serde_json::Value = client(&server)
            .put_and_wait(RG_PATH, "2021-04-01", &json!({"location": "eastus"}), "create group")
            .await
            .expect("put should succeed");
        assert_eq!(value["name"], "rgSQLServer01");
    }

    #[tokio::test]
    async fn test_put_follows_async_operation() {
        let server = MockServer::start().await;
        let op_url = format!("{}/operations/op1", server.uri());
        Mock::given(method("PUT"))
            .and(path(RG_PATH))
            .respond_with(
                ResponseTemplate::new(202).insert_header("Azure-AsyncOperation", op_url.as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_json()))
            .expect(1)
            .mount(&server)
            .await;

        let value: serde_json::Value = client(&server)
            .put_and_wait(RG_PATH, "2021-04-01", &json!({"location": "eastus"}), "create group")
            .await
            .expect("put should succeed");
        assert_eq!(value["location"], "eastus");
    }

    #[tokio::test]
    async fn test_failed_async_operation_is_provisioning_error() {
        let server = MockServer::start().await;
        let op_url = format!("{}/operations/op2", server.uri());
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", op_url.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": {"code": "ServerQuotaExceeded", "message": "quota reached"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .put_and_wait::<_, serde_json::Value>(RG_PATH, "2021-04-01", &json!({}), "create")
            .await
            .expect_err("must fail");
        assert!(
            matches!(err, SampleError::Provisioning { ref message, .. }
                if message.contains("ServerQuotaExceeded")),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_conflict_is_provisioning_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": "NameAlreadyExists", "message": "The name is in use"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .put_and_wait::<_, serde_json::Value>(RG_PATH, "2021-04-01", &json!({}), "create")
            .await
            .expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Provisioning error during create: NameAlreadyExists: The name is in use"
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "InvalidAuthenticationToken", "message": "expired"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .get::<serde_json::Value>("/subscriptions/sub", "2022-12-01", "get subscription")
            .await
            .expect_err("must fail");
        assert!(matches!(err, SampleError::Authentication(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_delete_missing_resource_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_and_wait(RG_PATH, "2021-04-01", "delete group")
            .await
            .expect("404 counts as deleted");
    }

    #[tokio::test]
    async fn test_delete_follows_location() {
        let server = MockServer::start().await;
        let location = format!("{}/operationresults/del1", server.uri());
        Mock::given(method("DELETE"))
            .and(path(RG_PATH))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Location", location.as_str())
                    .insert_header("Retry-After", "0"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operationresults/del1"))
            .respond_with(ResponseTemplate::new(202).insert_header("Retry-After", "0"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operationresults/del1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_and_wait(RG_PATH, "2021-04-01", "delete group")
            .await
            .expect("delete should finish");
    }

    fn group_in_state(state: &str) -> serde_json::Value {
        json!({
            "id": RG_PATH,
            "name": "rgSQLServer01",
            "location": "eastus",
            "properties": {"provisioningState": state}
        })
    }

    #[tokio::test]
    async fn test_put_polls_resource_until_provisioned() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(group_in_state("Creating")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_in_state("Creating")))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_in_state("Succeeded")))
            .expect(1)
            .mount(&server)
            .await;

        let value: serde_json::Value = client(&server)
            .put_and_wait(RG_PATH, "2021-04-01", &json!({"location": "eastus"}), "create group")
            .await
            .expect("put should succeed");
        assert_eq!(value["properties"]["provisioningState"], "Succeeded");
    }

    #[tokio::test]
    async fn test_put_accepted_without_headers_polls_resource() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_in_state("Accepted")))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_in_state("Succeeded")))
            .mount(&server)
            .await;

        let value: serde_json::Value = client(&server)
            .put_and_wait(RG_PATH, "2021-04-01", &json!({"location": "eastus"}), "create group")
            .await
            .expect("put should succeed");
        assert_eq!(value["properties"]["provisioningState"], "Succeeded");
    }

    #[tokio::test]
    async fn test_put_resource_failed_state_is_provisioning_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201).set_body_json(group_in_state("Creating")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_in_state("Failed")))
            .mount(&server)
            .await;

        let err = client(&server)
            .put_and_wait::<_, serde_json::Value>(RG_PATH, "2021-04-01", &json!({}), "create group")
            .await
            .expect_err("must fail");
        assert!(
            matches!(err, SampleError::Provisioning { ref message, .. }
                if message.contains("Failed")),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_put_resource_never_provisioned_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201).set_body_json(group_in_state("Creating")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(group_in_state("Creating")))
            .mount(&server)
            .await;

        let err = ArmClient::new(server.uri(), Arc::new(StaticToken("test-token".into())))
            .with_polling(Duration::from_millis(5), Duration::from_millis(30))
            .put_and_wait::<_, serde_json::Value>(RG_PATH, "2021-04-01", &json!({}), "create group")
            .await
            .expect_err("must time out");
        assert!(
            matches!(err, SampleError::Provisioning { ref message, .. }
                if message.contains("timed out")),
            "got {err:?}"
        );
    }

    #[test]
    fn test_provisioning_state_of_plain_text() {
        assert_eq!(provisioning_state("not json"), ProvisioningState::Done);
        assert_eq!(
            provisioning_state(r#"{"properties":{"provisioningState":"Creating"}}"#),
            ProvisioningState::InProgress("Creating".into())
        );
    }
}
