use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;

/// Connection settings for one MySQL source database.
///
/// Does not implement [`serde::Serialize`] so that the password cannot leak into serialized
/// forms. The password is redacted in debug output.
#[derive(Debug, Clone, Deserialize)]
pub struct MySqlConnectionConfig {
    /// Hostname or IP address of the MySQL server.
    pub host: String,
    /// Port on which the MySQL server listens.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the database holding the tables to back up.
    pub name: String,
    /// User to authenticate as.
    pub username: String,
    /// Password of the user, if any.
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl MySqlConnectionConfig {
    /// Default MySQL port.
    pub const DEFAULT_PORT: u16 = 3306;

    /// Creates [`MySqlConnectOptions`] for the configured database.
    pub fn with_db(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.name);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }
}

fn default_port() -> u16 {
    MySqlConnectionConfig::DEFAULT_PORT
}
