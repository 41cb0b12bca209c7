//! Names, credentials and SQL for one sample run.

use crate::config::{Settings, DB_NAME, DB_SKU, SQL_ADMIN};
use crate::error::{Result, SampleError};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Column queried through the alias.
pub const NAME_COLUMN: &str = "Name";

/// Azure SQL server names: lowercase letters, digits and hyphens, 3-63 chars.
static SERVER_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn server_name_regex() -> &'static Regex {
    SERVER_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").expect("Invalid Regex")
    })
}

/// Prefix plus a random lowercase alphanumeric suffix.
pub fn random_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{prefix}{suffix}")
}

/// Password meeting Azure SQL complexity rules (upper, lower, digit, symbol).
pub fn random_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"23456789";
    const SYMBOLS: &[u8] = b"!#%*+-_";
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();

    let mut chars: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS]
        .iter()
        .map(|set| set[rng.gen_range(0..set.len())])
        .collect();
    chars.extend((0..12).map(|_| all[rng.gen_range(0..all.len())]));
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

/// One of the two servers ("test" or "production") and its sample table.
#[derive(Debug, Clone)]
pub struct ServerPlan {
    /// Log label, `test` or `production`.
    pub label: &'static str,
    pub name: String,
    pub location: String,
    pub firewall_rule: String,
    pub table: String,
    /// Single value inserted into `table`.
    pub value: String,
}

impl ServerPlan {
    pub fn create_table_sql(&self) -> String {
        format!("CREATE TABLE [{}] ([Name] [varchar](30) NOT NULL)", self.table)
    }

    pub fn insert_sql(&self) -> String {
        format!("INSERT INTO {} VALUES ('{}')", self.table, self.value.replace('\'', "''"))
    }

    pub fn select_sql(&self) -> String {
        format!("SELECT * FROM {};", self.table)
    }
}

#[derive(Clone)]
pub struct SamplePlan {
    pub resource_group: String,
    /// Region of the resource group itself.
    pub location: String,
    pub test: ServerPlan,
    pub production: ServerPlan,
    pub alias_name: String,
    pub admin_login: String,
    pub admin_password: String,
    pub database: String,
    pub sku: String,
}

impl SamplePlan {
    /// Fresh random names for every resource of a run.
    pub fn generate(settings: &Settings) -> Result<Self> {
        let plan = SamplePlan {
            resource_group: random_name("rgSQLServer"),
            location: settings.test_region.clone(),
            test: ServerPlan {
                label: "test",
                name: random_name("sqltest"),
                location: settings.test_region.clone(),
                firewall_rule: random_name("allowAll"),
                table: "Dns_Alias_Sample_Test".to_string(),
                value: "Test".to_string(),
            },
            production: ServerPlan {
                label: "production",
                name: random_name("sqlprod"),
                location: settings.prod_region.clone(),
                firewall_rule: random_name("allowAll"),
                table: "Dns_Alias_Sample_Prod".to_string(),
                value: "Production".to_string(),
            },
            alias_name: random_name("sqlserverdns"),
            admin_login: SQL_ADMIN.to_string(),
            admin_password: random_password(),
            database: DB_NAME.to_string(),
            sku: DB_SKU.to_string(),
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Reject names Azure would refuse before anything is created.
    pub fn validate(&self) -> Result<()> {
        for name in [&self.test.name, &self.production.name, &self.alias_name] {
            if !server_name_regex().is_match(name) {
                return Err(SampleError::Configuration(format!(
                    "'{name}' is not a valid SQL server or alias name"
                )));
            }
        }
        if self.test.name == self.production.name {
            return Err(SampleError::Configuration(
                "test and production servers need distinct names".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SamplePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplePlan")
            .field("resource_group", &self.resource_group)
            .field("location", &self.location)
            .field("test", &self.test)
            .field("production", &self.production)
            .field("alias_name", &self.alias_name)
            .field("admin_login", &self.admin_login)
            .field("admin_password", &"***")
            .field("database", &self.database)
            .field("sku", &self.sku)
            .finish()
    }
}
