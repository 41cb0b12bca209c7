//! Waiting for a DNS alias to reach its target server.
//!
//! The alias record is eventually consistent. The workflow never queries through
//! it until either a probe confirms the alias resolves to the intended server or
//! the full fixed delay has elapsed.

use crate::config::PropagationMode;
use crate::error::{Result, SampleError};
use crate::models::{DnsAlias, SqlServer};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Answers whether an alias record currently routes to a given server.
///
/// `previous_fqdn` names the server the alias pointed at before a re-point;
/// routing must have moved away from it.
#[async_trait]
pub trait PropagationProbe: Send + Sync {
    async fn alias_targets(
        &self,
        alias_record: &str,
        server_fqdn: &str,
        previous_fqdn: Option<&str>,
    ) -> bool;
}

/// Probe comparing the addresses the host names resolve to.
///
/// SQL server names resolve to shared regional gateways, so two servers in one
/// region can be indistinguishable by address. Such a probe never confirms and
/// the waiter runs out the full delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsProbe;

impl DnsProbe {
    async fn resolve(host: &str) -> HashSet<IpAddr> {
        match tokio::net::lookup_host((host, 1433)).await {
            Ok(addrs) => addrs.map(|a| a.ip()).collect(),
            Err(e) => {
                log::debug!("lookup {host} failed: {e}");
                HashSet::new()
            }
        }
    }
}

#[async_trait]
impl PropagationProbe for DnsProbe {
    async fn alias_targets(
        &self,
        alias_record: &str,
        server_fqdn: &str,
        previous_fqdn: Option<&str>,
    ) -> bool {
        let alias = Self::resolve(alias_record).await;
        if alias.is_empty() {
            return false;
        }
        let server = Self::resolve(server_fqdn).await;
        let previous = match previous_fqdn {
            Some(host) => Some(Self::resolve(host).await),
            None => None,
        };
        routes_to(&alias, &server, previous.as_ref())
    }
}

/// Address-level check behind [`DnsProbe`].
fn routes_to(
    alias: &HashSet<IpAddr>,
    server: &HashSet<IpAddr>,
    previous: Option<&HashSet<IpAddr>>,
) -> bool {
    if alias.is_disjoint(server) {
        return false;
    }
    match previous {
        // Unresolved or shared addresses cannot prove the alias moved
        Some(previous) => {
            !previous.is_empty() && previous.is_disjoint(server) && previous.is_disjoint(alias)
        }
        None => true,
    }
}

/// Exponential backoff between probe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: u32,
    pub max_step: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            initial: Duration::from_secs(5),
            factor: 2,
            max_step: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    pub fn next(&self, current: Duration) -> Duration {
        (current * self.factor).min(self.max_step)
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The probe saw the alias on the target server.
    Confirmed,
    /// The full delay passed.
    Elapsed,
}

pub struct PropagationWaiter {
    mode: PropagationMode,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl PropagationWaiter {
    pub fn new(mode: PropagationMode, cancel: CancellationToken) -> Self {
        PropagationWaiter {
            mode,
            backoff: Backoff::default(),
            cancel,
        }
    }

    /// Cancelled when the user interrupts the run.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Block until `alias` can be used to reach `server`, or `max_wait` elapses.
    ///
    /// `previous` is the server the alias was moved away from, if any.
    ///
    /// # Returns
    /// * `Ok(WaitOutcome)` - Safe to query through the alias
    /// * `Err(Cancelled)` - The cancellation token fired first
    pub async fn wait_for_alias<P>(
        &self,
        probe: &P,
        alias: &DnsAlias,
        server: &SqlServer,
        previous: Option<&SqlServer>,
        max_wait: Duration,
    ) -> Result<WaitOutcome>
    where
        P: PropagationProbe + ?Sized,
    {
        match self.mode {
            PropagationMode::Fixed => {
                log::info!("Waiting {} to let the alias propagate...", minutes(max_wait));
                self.sleep(max_wait).await?;
                Ok(WaitOutcome::Elapsed)
            }
            PropagationMode::Probe => self.poll(probe, alias, server, previous, max_wait).await,
        }
    }

    async fn poll<P>(
        &self,
        probe: &P,
        alias: &DnsAlias,
        server: &SqlServer,
        previous: Option<&SqlServer>,
        max_wait: Duration,
    ) -> Result<WaitOutcome>
    where
        P: PropagationProbe + ?Sized,
    {
        let previous_fqdn = previous.map(|s| s.fqdn.as_str());
        log::info!(
            "Waiting up to {} for {} to reach {}...",
            minutes(max_wait),
            alias.azure_dns_record,
            server.fqdn
        );
        let deadline = Instant::now() + max_wait;
        let mut delay = self.backoff.initial;
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(cancelled());
            }
            if probe
                .alias_targets(&alias.azure_dns_record, &server.fqdn, previous_fqdn)
                .await
            {
                log::info!(
                    "Alias {} resolves to {} (attempt {attempt})",
                    alias.name,
                    server.name
                );
                return Ok(WaitOutcome::Confirmed);
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "Alias {} not confirmed after {}, proceeding",
                    alias.name,
                    minutes(max_wait)
                );
                return Ok(WaitOutcome::Elapsed);
            }
            self.sleep(delay.min(deadline - now)).await?;
            delay = self.backoff.next(delay);
            attempt += 1;
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(cancelled()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

fn cancelled() -> SampleError {
    SampleError::Cancelled("alias propagation wait".to_string())
}

fn minutes(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{secs} seconds")
    }
}
