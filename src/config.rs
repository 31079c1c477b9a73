//! CLI-side configuration: an optional toml file under the platform config
//! directory, plus credential resolution from environment variables, a
//! local `.auth` file or the config file itself.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const USERNAME_ENV: &str = "PATS_USERNAME";
pub const PASSWORD_ENV: &str = "PATS_PASSWORD";
pub const SERVER_ENV: &str = "PATS_SERVER";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// "production", "beta", "local" or a full http(s) URL
    pub server: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Path to a two-line credentials file (username, then password)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server: "production".to_string(),
            timeout_secs: 45,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            auth_file: None,
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults when
    /// no file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("pats-client").join("config.toml"))
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# pats-client configuration file
# Location: ~/.config/pats-client/config.toml (Linux/macOS)
#           %APPDATA%\pats-client\config.toml (Windows)

[connection]
# Which deployment to talk to: "production", "beta", "local",
# or a full http(s):// URL
server = "production"

# Request timeout in seconds. Video downloads render on demand and can
# take the better part of a minute.
timeout_secs = 45

[credentials]
# Credentials are resolved in this order:
#   1. PATS_USERNAME / PATS_PASSWORD environment variables
#   2. a two-line .auth file (username, then password)
#   3. this section
# username = "user@example.com"
# password = "secret"
# auth_file = "/path/to/.auth"
"#
        .to_string()
    }
}

/// A resolved username/password pair.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Resolve credentials: an explicitly passed `.auth` file, then env
    /// vars, then the configured (or `./`) `.auth` file, then the config
    /// file itself.
    pub fn resolve(config: &Config, auth_file_override: Option<&Path>) -> Result<Self> {
        // An explicit flag beats ambient environment; a missing file is an
        // error rather than a silent fallthrough.
        if let Some(path) = auth_file_override {
            return Self::from_auth_file(path);
        }

        if let (Ok(username), Ok(password)) =
            (std::env::var(USERNAME_ENV), std::env::var(PASSWORD_ENV))
        {
            return Ok(Self { username, password });
        }

        let auth_path = config
            .credentials
            .auth_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(".auth"));
        if auth_path.exists() {
            return Self::from_auth_file(&auth_path);
        }

        if let (Some(username), Some(password)) = (
            config.credentials.username.clone(),
            config.credentials.password.clone(),
        ) {
            return Ok(Self { username, password });
        }

        anyhow::bail!(
            "no credentials found: set {USERNAME_ENV}/{PASSWORD_ENV}, create a .auth file, \
             or fill the [credentials] section of the config file"
        )
    }

    /// Read a two-line credentials file: username on the first line,
    /// password on the second.
    pub fn from_auth_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let mut lines = contents.lines();
        let username = lines.next().unwrap_or_default().trim().to_string();
        let password = lines.next().unwrap_or_default().trim().to_string();
        if username.is_empty() || password.is_empty() {
            anyhow::bail!(
                "{} must contain a username on the first line and a password on the second",
                path.display()
            );
        }
        Ok(Self { username, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.server, "production");
        assert_eq!(config.connection.timeout_secs, 45);
        assert!(config.credentials.username.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.connection.server, parsed.connection.server);
        assert_eq!(config.connection.timeout_secs, parsed.connection.timeout_secs);
    }

    #[test]
    fn test_default_with_comments_parses() {
        let parsed: Config = toml::from_str(&Config::create_default_with_comments()).unwrap();
        assert_eq!(parsed.connection.server, "production");
    }

    #[test]
    fn test_auth_file_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user@example.com").unwrap();
        writeln!(file, "hunter2").unwrap();

        let creds = Credentials::from_auth_file(file.path()).unwrap();
        assert_eq!(creds.username, "user@example.com");
        assert_eq!(creds.password, "hunter2");
    }

    // Sole test touching the PATS_* env vars, so no parallel-test races.
    #[test]
    fn test_explicit_auth_file_beats_env_vars() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();
        writeln!(file, "file-pass").unwrap();

        std::env::set_var(USERNAME_ENV, "from-env");
        std::env::set_var(PASSWORD_ENV, "env-pass");

        let explicit = Credentials::resolve(&Config::default(), Some(file.path())).unwrap();
        let ambient = Credentials::resolve(&Config::default(), None).unwrap();

        std::env::remove_var(USERNAME_ENV);
        std::env::remove_var(PASSWORD_ENV);

        assert_eq!(explicit.username, "from-file");
        assert_eq!(explicit.password, "file-pass");
        assert_eq!(ambient.username, "from-env");
    }

    #[test]
    fn test_explicit_auth_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-auth");
        assert!(Credentials::resolve(&Config::default(), Some(&missing)).is_err());
    }

    #[test]
    fn test_auth_file_missing_password() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user@example.com").unwrap();

        assert!(Credentials::from_auth_file(file.path()).is_err());
    }
}
