//! The sample run, step by step.
//!
//! Steps run strictly in sequence. The first failure ends the happy path, then
//! the resource group (if one was created) is deleted regardless of outcome.

use super::plan::{SamplePlan, ServerPlan, NAME_COLUMN};
use super::propagation::{PropagationProbe, PropagationWaiter};
use crate::azure::ControlPlane;
use crate::config::{ALIAS_CREATE_WAIT, ALIAS_RETARGET_WAIT, FIREWALL_END_IP, FIREWALL_START_IP};
use crate::error::{Result, SampleError};
use crate::models::{DnsAlias, ResourceGroup, SqlDatabase, SqlServer};
use crate::sql::{ConnectionString, SqlClient};
use colored::Colorize;
use std::future::Future;
use std::time::Duration;

/// Rows read through the alias on a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub resource_group: String,
    /// Read while the alias targeted the "test" server.
    pub test_rows: Vec<String>,
    /// Read after the alias was re-pointed at the "production" server.
    pub production_rows: Vec<String>,
}

/// What must be torn down when the run ends, however it ends.
#[derive(Debug, Default)]
pub struct CleanupContext {
    pub resource_group: Option<ResourceGroup>,
}

/// Maximum wait after creating the alias and after re-pointing it.
#[derive(Debug, Clone, Copy)]
pub struct AliasWaits {
    pub after_create: Duration,
    pub after_retarget: Duration,
}

impl Default for AliasWaits {
    fn default() -> Self {
        AliasWaits {
            after_create: ALIAS_CREATE_WAIT,
            after_retarget: ALIAS_RETARGET_WAIT,
        }
    }
}

pub struct SampleRunner<C, S, P> {
    control_plane: C,
    sql: S,
    probe: P,
    waiter: PropagationWaiter,
    waits: AliasWaits,
}

struct ProvisionedServer {
    server: SqlServer,
    database: SqlDatabase,
}

impl<C, S, P> SampleRunner<C, S, P>
where
    C: ControlPlane,
    S: SqlClient,
    P: PropagationProbe,
{
    pub fn new(control_plane: C, sql: S, probe: P, waiter: PropagationWaiter) -> Self {
        SampleRunner {
            control_plane,
            sql,
            probe,
            waiter,
            waits: AliasWaits::default(),
        }
    }

    pub fn with_alias_waits(mut self, waits: AliasWaits) -> Self {
        self.waits = waits;
        self
    }

    /// Run the whole sample, then clean up.
    ///
    /// # Returns
    /// * `Ok(RunReport)` - Both alias queries succeeded
    /// * `Err` - The first failing step's error; cleanup has already been attempted
    pub async fn run(&self, plan: &SamplePlan) -> Result<RunReport> {
        let mut cleanup = CleanupContext::default();
        let outcome = self.provision_and_query(plan, &mut cleanup).await;
        self.cleanup(cleanup).await;
        outcome
    }

    async fn provision_and_query(
        &self,
        plan: &SamplePlan,
        cleanup: &mut CleanupContext,
    ) -> Result<RunReport> {
        let subscription = self
            .step("verify subscription", self.control_plane.verify_subscription())
            .await?;
        log::info!("Using subscription: {}", subscription.green());

        // Checked only before the call so a created group is always recorded for cleanup
        self.ensure_not_cancelled("create resource group")?;
        log::info!("Creating resource group...");
        let group = self
            .control_plane
            .create_resource_group(&plan.resource_group, &plan.location)
            .await?;
        cleanup.resource_group = Some(group.clone());
        log::info!("Created a resource group with name: {}", group.name.green());

        let test = self.provision_server(&group, &plan.test, plan).await?;
        self.step(
            "seed test table",
            self.seed_table(&test.server, &test.database, &plan.test, plan),
        )
        .await?;

        let production = self.provision_server(&group, &plan.production, plan).await?;
        self.step(
            "seed production table",
            self.seed_table(&production.server, &production.database, &plan.production, plan),
        )
        .await?;

        log::info!(
            "Creating a SQL Server DNS alias and use it to query the \"{}\" database...",
            plan.test.label
        );
        let alias = self
            .step(
                "create DNS alias",
                self.control_plane.create_dns_alias(&test.server, &plan.alias_name),
            )
            .await?;
        log::info!("Created a SQL Server DNS alias: {alias}");
        self.waiter
            .wait_for_alias(&self.probe, &alias, &test.server, None, self.waits.after_create)
            .await?;
        let test_rows = self
            .step("query test", self.query_via_alias(&alias, &plan.test, plan))
            .await?;

        log::info!(
            "Using the \"{}\" SQL Server to acquire the SQL Server DNS alias...",
            plan.production.label
        );
        let alias = self
            .step("re-point DNS alias", self.retarget_alias(alias, &production.server))
            .await?;
        self.waiter
            .wait_for_alias(
                &self.probe,
                &alias,
                &production.server,
                Some(&test.server),
                self.waits.after_retarget,
            )
            .await?;
        log::info!("Re-establish the connection");
        let production_rows = self
            .step("query production", self.query_via_alias(&alias, &plan.production, plan))
            .await?;

        log::info!("Deleting the SQL Servers");
        self.step("delete test server", self.control_plane.delete_server(&test.server))
            .await?;
        self.step(
            "delete production server",
            self.control_plane.delete_server(&production.server),
        )
        .await?;

        Ok(RunReport {
            resource_group: group.name,
            test_rows,
            production_rows,
        })
    }

    fn ensure_not_cancelled(&self, step: &str) -> Result<()> {
        if self.waiter.cancellation().is_cancelled() {
            return Err(SampleError::Cancelled(step.to_string()));
        }
        Ok(())
    }

    /// Run one step unless the run is cancelled before or while it executes.
    async fn step<T, F>(&self, name: &str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.ensure_not_cancelled(name)?;
        tokio::select! {
            biased;
            _ = self.waiter.cancellation().cancelled() => {
                log::warn!("{name}: interrupted");
                Err(SampleError::Cancelled(name.to_string()))
            }
            result = work => result,
        }
    }

    /// Server, allow-all firewall rule and database.
    async fn provision_server(
        &self,
        group: &ResourceGroup,
        target: &ServerPlan,
        plan: &SamplePlan,
    ) -> Result<ProvisionedServer> {
        log::info!("Creating a SQL server for {} related activities...", target.label);
        let server = self
            .step(
                "create SQL server",
                self.control_plane.create_sql_server(
                    group,
                    &target.name,
                    &target.location,
                    &plan.admin_login,
                    &plan.admin_password,
                ),
            )
            .await?;
        log::info!("Created a SQL Server: {server}");

        log::info!("Creating a range ipaddress firewall rule...");
        let rule = self
            .step(
                "create firewall rule",
                self.control_plane.create_firewall_rule(
                    &server,
                    &target.firewall_rule,
                    FIREWALL_START_IP,
                    FIREWALL_END_IP,
                ),
            )
            .await?;
        log::info!(
            "Created a range ipaddress firewall rule with name: {} ({} - {})",
            rule.name,
            rule.start_ip,
            rule.end_ip
        );

        log::info!("Creating a database on SQL Server...");
        let database = self
            .step(
                "create database",
                self.control_plane
                    .create_database(&server, &plan.database, &plan.sku),
            )
            .await?;
        log::info!("Created a database with name: {}", database.name);

        Ok(ProvisionedServer { server, database })
    }

    /// Create the sample table on the server itself and insert its one row.
    async fn seed_table(
        &self,
        server: &SqlServer,
        database: &SqlDatabase,
        target: &ServerPlan,
        plan: &SamplePlan,
    ) -> Result<()> {
        log::info!(
            "Creating a new table into the \"{}\" SQL Server database and insert one value...",
            target.label
        );
        let connection = ConnectionString::new(
            &plan.admin_login,
            &plan.admin_password,
            &server.fqdn,
            &database.name,
        );
        self.sql.execute(&connection, &target.create_table_sql()).await?;
        self.sql.execute(&connection, &target.insert_sql()).await?;
        Ok(())
    }

    /// Delete the alias, then create it again on `server`. Never both alive.
    async fn retarget_alias(&self, alias: DnsAlias, server: &SqlServer) -> Result<DnsAlias> {
        self.control_plane.delete_dns_alias(&alias).await?;
        log::info!("Deleted SQL Server DNS alias {} from {}", alias.name, alias.server);
        let alias = self
            .control_plane
            .create_dns_alias(server, &alias.name)
            .await?;
        log::info!("Created a SQL Server DNS alias: {alias}");
        Ok(alias)
    }

    async fn query_via_alias(
        &self,
        alias: &DnsAlias,
        target: &ServerPlan,
        plan: &SamplePlan,
    ) -> Result<Vec<String>> {
        let connection = ConnectionString::new(
            &plan.admin_login,
            &plan.admin_password,
            &alias.azure_dns_record,
            &plan.database,
        );
        let rows = self
            .sql
            .query_column(&connection, &target.select_sql(), NAME_COLUMN)
            .await?;
        for row in &rows {
            log::info!(
                "Query \"{}\" database with result: {}",
                target.label,
                row.bold()
            );
        }
        Ok(rows)
    }

    /// Delete the resource group if one was created. Errors are logged, never returned.
    async fn cleanup(&self, cleanup: CleanupContext) {
        let Some(group) = cleanup.resource_group else {
            log::debug!("No resource group to delete");
            return;
        };
        log::info!("Deleting Resource Group...");
        match self.control_plane.delete_resource_group(&group).await {
            Ok(()) => log::info!("Deleted Resource Group: {}", group.name),
            Err(e) => {
                let err = SampleError::Cleanup(format!("{}: {e}", group.name));
                log::error!("{failed} {err}", failed = "failed".on_red());
            }
        }
    }
}
