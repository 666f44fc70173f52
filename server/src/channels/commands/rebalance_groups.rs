use crate::channels::server_command::ServerCommand;
use crate::channels::SharedBroker;
use async_trait::async_trait;
use broker::BrokerConfig;
use flume::Sender;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};

/// Periodically reassigns stream partitions across the live receivers of
/// every receiver group, kicking the ones that stopped knocking.
pub struct GroupsRebalancer {
    interval: u64,
    sender: Sender<RebalanceGroupsCommand>,
}

#[derive(Debug, Default, Clone)]
pub struct RebalanceGroupsCommand;

#[derive(Debug, Default, Clone)]
pub struct RebalanceGroupsExecutor;

impl GroupsRebalancer {
    pub fn new(interval: u64, sender: Sender<RebalanceGroupsCommand>) -> Self {
        Self { interval, sender }
    }

    pub fn start(&self) {
        let interval = self.interval.max(1);
        let sender = self.sender.clone();
        info!("Receiver groups will be rebalanced every {interval} seconds.");
        tokio::spawn(async move {
            let mut interval_timer = time::interval(Duration::from_secs(interval));
            loop {
                // The first tick fires immediately, so a rebalance runs at
                // startup rather than a full interval later.
                interval_timer.tick().await;
                sender.send(RebalanceGroupsCommand).unwrap_or_else(|error| {
                    error!("Failed to send RebalanceGroupsCommand. Error: {error}");
                });
            }
        });
    }
}

#[async_trait]
impl ServerCommand<RebalanceGroupsCommand> for RebalanceGroupsExecutor {
    async fn execute(&mut self, broker: &SharedBroker, _command: RebalanceGroupsCommand) {
        debug!("Rebalancing receiver groups...");
        if let Err(error) = broker.rebalance().await {
            error!("Failed to rebalance receiver groups. Error: {error}");
        }
    }

    fn start_command_sender(
        &mut self,
        _broker: SharedBroker,
        config: &BrokerConfig,
        sender: Sender<RebalanceGroupsCommand>,
    ) {
        let rebalancer = GroupsRebalancer::new(config.global.rebalance_interval, sender);
        rebalancer.start();
    }

    fn start_command_consumer(
        mut self,
        broker: SharedBroker,
        _config: &BrokerConfig,
        receiver: flume::Receiver<RebalanceGroupsCommand>,
    ) {
        tokio::spawn(async move {
            while let Ok(command) = receiver.recv_async().await {
                self.execute(&broker, command).await;
            }
            info!("Groups rebalancer receiver stopped.");
        });
    }
}
