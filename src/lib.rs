//! Azure SQL DNS alias sample.
//!
//! Provisions a "test" and a "production" Azure SQL server, seeds one row in
//! each, points a server DNS alias at "test", re-points it at "production",
//! queries through the alias both times, and tears everything down.

pub mod azure;
pub mod config;
pub mod error;
pub mod models;
pub mod sql;
pub mod workflow;

use azure::{ArmClient, AzureControlPlane, ServicePrincipal, StaticToken, TokenSource};
use config::Settings;
use error::Result;
use sql::TiberiusSqlClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use workflow::{DnsProbe, PropagationWaiter, RunReport, SamplePlan, SampleRunner};

pub use error::SampleError;

/// Read settings from the environment and run the sample against Azure.
///
/// The first Ctrl-C stops the run at the current step and cleanup still runs.
/// A second Ctrl-C exits immediately.
pub async fn run() -> Result<RunReport> {
    let settings = Settings::from_env()?;
    log::info!(
        "Regions: test={} production={} propagation={:?}",
        settings.test_region,
        settings.prod_region,
        settings.propagation
    );

    let tokens: Arc<dyn TokenSource> = match &settings.access_token {
        Some(token) => {
            log::info!("Using ARM_ACCESS_TOKEN instead of the client secret flow");
            Arc::new(StaticToken(token.clone()))
        }
        None => Arc::new(ServicePrincipal::new(
            &settings.credentials,
            &settings.authority_host,
            &settings.arm_endpoint,
        )?),
    };
    let arm = ArmClient::new(settings.arm_endpoint.clone(), tokens);
    let control_plane = AzureControlPlane::new(arm, settings.credentials.subscription_id.clone());
    let plan = SamplePlan::generate(&settings)?;
    log::debug!("{plan:?}");

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        log::warn!("Ctrl-C received, stopping after cleanup (press again to exit now)");
        on_ctrl_c.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            log::error!("Second Ctrl-C, exiting without cleanup");
            std::process::exit(130);
        }
    });

    let waiter = PropagationWaiter::new(settings.propagation, cancel);
    let runner = SampleRunner::new(control_plane, TiberiusSqlClient, DnsProbe, waiter);
    runner.run(&plan).await
}
