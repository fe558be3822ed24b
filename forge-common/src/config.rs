use crate::safe_display::SafeDisplay;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Layered config loader: built-in `Default`, overridden by a TOML file (if
/// present), overridden again by `APP__section__key`-style environment
/// variables. Mirrors the teacher's `golem_common::config::ConfigLoader`
/// usage in `cloud-service/src/config.rs`, reimplemented directly against
/// `figment` since that type's own source isn't in the retrieved corpus.
pub struct ConfigLoader<T> {
    config_file_name: PathBuf,
    env_prefix: &'static str,
    _marker: std::marker::PhantomData<T>,
}

impl<T> ConfigLoader<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    pub fn new(config_file_name: &Path, env_prefix: &'static str) -> Self {
        Self {
            config_file_name: config_file_name.to_path_buf(),
            env_prefix,
            _marker: std::marker::PhantomData,
        }
    }

    fn figment(&self) -> Figment {
        Figment::from(Serialized::defaults(T::default()))
            .merge(Toml::file(&self.config_file_name))
            .merge(Env::prefixed(self.env_prefix).split("__"))
    }

    pub fn load(&self) -> figment::Result<T> {
        self.figment().extract()
    }

    /// Loads the config, or if invoked with `--dump-config`, prints the
    /// effective config (with secrets redacted, when `T: SafeDisplay`) and
    /// returns `None` so the caller can exit without starting the service.
    pub fn load_or_dump_config(&self) -> Option<T>
    where
        T: SafeDisplay,
    {
        if std::env::args().any(|arg| arg == "--dump-config") {
            match self.load() {
                Ok(config) => {
                    println!("{}", config.to_safe_string());
                    None
                }
                Err(err) => {
                    eprintln!("Failed to load config: {err}");
                    std::process::exit(1);
                }
            }
        } else {
            match self.load() {
                Ok(config) => Some(config),
                Err(err) => {
                    eprintln!("Failed to load config: {err}");
                    std::process::exit(1);
                }
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DbConfig {
    Postgres(DbPostgresConfig),
    Sqlite(DbSqliteConfig),
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig::Sqlite(DbSqliteConfig::default())
    }
}

impl SafeDisplay for DbConfig {
    fn to_safe_string(&self) -> String {
        match self {
            DbConfig::Postgres(c) => format!("postgres:\n{}", c.to_safe_string_indented()),
            DbConfig::Sqlite(c) => format!("sqlite:\n{}", c.to_safe_string_indented()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbPostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
}

impl Default for DbPostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "forge".to_string(),
            username: "forge".to_string(),
            password: "forge".to_string(),
            max_connections: 10,
        }
    }
}

impl SafeDisplay for DbPostgresConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "host: {}", self.host);
        let _ = writeln!(&mut result, "port: {}", self.port);
        let _ = writeln!(&mut result, "database: {}", self.database);
        let _ = writeln!(&mut result, "username: {}", self.username);
        let _ = writeln!(&mut result, "password: ****");
        let _ = writeln!(&mut result, "max connections: {}", self.max_connections);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbSqliteConfig {
    pub database: String,
    pub max_connections: u32,
}

impl Default for DbSqliteConfig {
    fn default() -> Self {
        Self {
            database: "forge.db".to_string(),
            max_connections: 10,
        }
    }
}

impl SafeDisplay for DbSqliteConfig {
    fn to_safe_string(&self) -> String {
        format!(
            "database: {}\nmax connections: {}",
            self.database, self.max_connections
        )
    }
}

/// Retry policy for outbound calls to worker nodes. Grounded on the shape of
/// `golem_common::model::RetryConfig` as used by
/// `cloud-common/src/clients/limit.rs`, paired with `tryhard` instead of the
/// teacher's own retry loop (`with_retries`), since that helper's source
/// isn't available either.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct ExampleConfig {
        port: u16,
    }

    impl SafeDisplay for ExampleConfig {
        fn to_safe_string(&self) -> String {
            format!("port: {}", self.port)
        }
    }

    #[test]
    fn loads_defaults_when_no_file_or_env_present() {
        let loader: ConfigLoader<ExampleConfig> =
            ConfigLoader::new(Path::new("/nonexistent/forge.toml"), "FORGE_TEST_UNSET");
        let config = loader.load().expect("default config should load");
        assert_eq!(config.port, 0);
    }
}
