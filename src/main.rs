use colored::Colorize;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Do as little as possible in main.rs as it can't contain any tests
    log4rs::init_file("log4rs.yml", Default::default())
        .map_err(|e| format!("Error initializing log4rs: {e}"))?;
    dotenv::dotenv().ok();
    //
    log::info!("#Start main()");

    match azure_sql_dns_alias::run().await {
        Ok(report) => log::info!(
            "Sample finished: resource group {} queried {} + {} rows",
            report.resource_group,
            report.test_rows.len(),
            report.production_rows.len()
        ),
        // Failure is logged only; the process exit code does not distinguish it.
        Err(e) => log::error!("{} {e}", "Sample failed:".on_red()),
    }

    Ok(())
}
