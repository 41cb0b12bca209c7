//! ADO-style connection strings for Azure SQL.

use crate::config::SQL_CONNECTION_TIMEOUT_SECS;
use std::fmt;
use std::time::Duration;

/// Connection target for one database, addressed by server FQDN or DNS alias record.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub user: String,
    password: String,
    /// Server FQDN or alias DNS record.
    pub server: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl ConnectionString {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        server: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        ConnectionString {
            user: user.into(),
            password: password.into(),
            server: server.into(),
            database: database.into(),
            timeout_secs: SQL_CONNECTION_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user id={};password={};server={};database={};Trusted_Connection=False;Encrypt=True;connection timeout={}",
            self.user, self.password, self.server, self.database, self.timeout_secs
        )
    }
}

// Never print the password
impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("user", &self.user)
            .field("password", &"***")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
