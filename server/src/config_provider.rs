use crate::server_error::ServerError;
use async_trait::async_trait;
use broker::BrokerConfig;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use tracing::{info, warn};

const ENV_PREFIX: &str = "STOPOVER_";

#[async_trait]
pub trait ConfigProvider {
    async fn load_config(&self) -> Result<BrokerConfig, ServerError>;
}

/// Loads the broker configuration from a YAML file, with `STOPOVER_`
/// environment variables layered on top (`__` separates nested keys, e.g.
/// `STOPOVER_GLOBAL__PARTITIONS=4`).
#[derive(Debug)]
pub struct FileConfigProvider {
    path: String,
}

impl FileConfigProvider {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load_config(&self) -> Result<BrokerConfig, ServerError> {
        info!("Loading config from path: '{}'...", self.path);
        let config = Figment::new()
            .merge(Yaml::file(&self.path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        info!("Config loaded from path: '{}'", self.path);
        Ok(config)
    }
}

/// Logs the effective configuration as dotted key=value lines, hiding the
/// contents of any `auth` subtree.
pub fn log_config(config: &BrokerConfig) {
    match serde_json::to_value(config) {
        Ok(value) => log_value("config: ", "", &value),
        Err(error) => warn!("cannot render config: {error}"),
    }
}

fn log_value(prefix: &str, key_prefix: &str, value: &serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        for (key, child) in map {
            if key == "auth" {
                info!("{prefix}{key_prefix}{key}=<hidden>");
                continue;
            }
            match child {
                serde_json::Value::Object(_) => {
                    log_value(prefix, &format!("{key_prefix}{key}."), child)
                }
                _ => info!("{prefix}{key_prefix}{key}={child}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_the_defaults() {
        let config: BrokerConfig = Figment::new()
            .merge(Yaml::string(
                r#"
                global:
                  partitions: 4
                  receiver_timeout: 5
                streams:
                  clicks:
                    partitions: 8
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.global.partitions, 4);
        assert_eq!(config.global.receiver_timeout, 5);
        assert_eq!(config.global.rebalance_interval, 10);
        assert_eq!(config.partitions_for("clicks"), 8);
        assert_eq!(config.partitions_for("views"), 4);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config: BrokerConfig = Figment::new()
            .merge(Yaml::file("does-not-exist.yaml"))
            .extract()
            .unwrap();
        assert_eq!(config.global.partitions, 1);
        assert!(config.streams.is_empty());
    }
}
