use {
    std::path::PathBuf,
    tokio::fs,
    serde::Deserialize,
    tracing::Level,
    crate::{
        error::ConfigError,
        kv::{BoxedStore, MemoryStore, NamespacedStore, SqliteStore},
    },
};

const DEFAULT_SQLITE_PATH: &str = "tally.sqlite";

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RuntimeConfig {
    #[serde(skip_deserializing)]
    pub config_path: Option<PathBuf>,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub kv: KvConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct KvConfig {
    pub driver: KvDriver,
    /// Sqlite database file, relative to the config file. In-memory database if not set.
    pub path: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvDriver {
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "memory")]
    Memory,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            driver: KvDriver::Sqlite,
            path: Some(DEFAULT_SQLITE_PATH.to_owned()),
            namespace: None,
        }
    }
}

impl RuntimeConfig {
    pub async fn load(file_path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read(&file_path).await.map_err(ConfigError::FailedToRead)?;
        let mut config = Self::parse(&content)?;
        config.config_path = Some(file_path);
        Ok(config)
    }

    pub fn parse(content: &[u8]) -> Result<Self, ConfigError> {
        serde_yml::from_slice(content)
            .map_err(|err| ConfigError::FailedToParse { reason: err.to_string() })
    }

    /// Resolves paths in the config relative to the directory the config was loaded from.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            return path;
        }

        match self.config_path.as_ref().and_then(|v| v.parent()) {
            Some(parent) => parent.join(path),
            None => path,
        }
    }

    pub fn store(&self) -> Result<BoxedStore, ConfigError> {
        let kv = &self.kv;
        let store = match kv.driver {
            KvDriver::Sqlite => match kv.path.as_ref() {
                Some(path) => BoxedStore::new(SqliteStore::new(self.resolve_path(path))?),
                None => BoxedStore::new(SqliteStore::in_memory()?),
            },
            KvDriver::Memory => BoxedStore::new(MemoryStore::new()),
        };

        Ok(match kv.namespace.as_ref() {
            Some(namespace) => BoxedStore::new(NamespacedStore::new(format!("{namespace}:"), store)),
            None => store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = RuntimeConfig::parse(br#"
log_level: debug
kv:
  driver: sqlite
  path: data/tally.sqlite
  namespace: demo
"#).unwrap();

        assert_eq!(LogLevel::Debug, config.log_level);
        assert_eq!(
            KvConfig {
                driver: KvDriver::Sqlite,
                path: Some("data/tally.sqlite".to_owned()),
                namespace: Some("demo".to_owned()),
            },
            config.kv,
        );
    }

    #[test]
    fn defaults() {
        let config = RuntimeConfig::parse(b"kv:\n  driver: memory\n").unwrap();
        assert_eq!(LogLevel::Info, config.log_level);
        assert_eq!(KvDriver::Memory, config.kv.driver);
        assert_eq!(None, config.kv.path);

        assert_eq!(KvDriver::Sqlite, RuntimeConfig::default().kv.driver);
    }

    #[test]
    fn unknown_driver() {
        match RuntimeConfig::parse(b"kv:\n  driver: redis\n") {
            Err(ConfigError::FailedToParse { .. }) => {}
            other => panic!("expected parse error, got: {other:?}"),
        }
    }

    #[test]
    fn paths_are_relative_to_config_file() {
        let mut config = RuntimeConfig::default();
        assert_eq!(PathBuf::from("data/kv.sqlite"), config.resolve_path("data/kv.sqlite"));

        config.config_path = Some(PathBuf::from("/etc/tally/config.yaml"));
        assert_eq!(PathBuf::from("/etc/tally/data/kv.sqlite"), config.resolve_path("data/kv.sqlite"));
        assert_eq!(PathBuf::from("/var/kv.sqlite"), config.resolve_path("/var/kv.sqlite"));
    }
}
