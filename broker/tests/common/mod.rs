use broker::config::{BrokerConfig, GlobalConfig, StreamConfig};
use broker::Broker;
use std::collections::HashMap;
use tempfile::TempDir;

pub struct TestSetup {
    pub broker: Broker,
    pub config: BrokerConfig,
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestSetup {
    pub async fn init(partitions: u32) -> TestSetup {
        Self::init_with(partitions, 30, HashMap::new()).await
    }

    pub async fn init_with(
        partitions: u32,
        receiver_timeout: u64,
        streams: HashMap<String, StreamConfig>,
    ) -> TestSetup {
        let dir = tempfile::tempdir().unwrap();
        let config = BrokerConfig {
            global: GlobalConfig {
                data_dir: dir.path().to_path_buf(),
                partitions,
                receiver_timeout,
                ..Default::default()
            },
            streams,
        };
        tokio::fs::create_dir_all(config.streams_path())
            .await
            .unwrap();
        tokio::fs::write(config.streams_path().join(".active"), b"")
            .await
            .unwrap();
        TestSetup {
            broker: Broker::new(config.clone()),
            config,
            _dir: dir,
        }
    }
}
