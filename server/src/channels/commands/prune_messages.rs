use crate::channels::server_command::ServerCommand;
use crate::channels::SharedBroker;
use async_trait::async_trait;
use broker::BrokerConfig;
use flume::Sender;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};

/// Periodically walks every stream directory and deletes messages older
/// than the stream's retention.
pub struct MessagesPruner {
    interval: u64,
    sender: Sender<PruneMessagesCommand>,
}

#[derive(Debug, Default, Clone)]
pub struct PruneMessagesCommand;

#[derive(Debug, Default, Clone)]
pub struct PruneMessagesExecutor;

impl MessagesPruner {
    pub fn new(interval: u64, sender: Sender<PruneMessagesCommand>) -> Self {
        Self { interval, sender }
    }

    pub fn start(&self) {
        let interval = self.interval.max(1);
        let sender = self.sender.clone();
        info!("Messages will be pruned every {interval} seconds.");
        tokio::spawn(async move {
            let mut interval_timer = time::interval(Duration::from_secs(interval));
            // Swallow the immediate first tick; pruning waits a full
            // interval after startup.
            interval_timer.tick().await;
            loop {
                interval_timer.tick().await;
                sender.send(PruneMessagesCommand).unwrap_or_else(|error| {
                    error!("Failed to send PruneMessagesCommand. Error: {error}");
                });
            }
        });
    }
}

#[async_trait]
impl ServerCommand<PruneMessagesCommand> for PruneMessagesExecutor {
    async fn execute(&mut self, broker: &SharedBroker, _command: PruneMessagesCommand) {
        debug!("Pruning messages...");
        if let Err(error) = broker.prune_all().await {
            error!("Failed to prune messages. Error: {error}");
        }
    }

    fn start_command_sender(
        &mut self,
        _broker: SharedBroker,
        config: &BrokerConfig,
        sender: Sender<PruneMessagesCommand>,
    ) {
        let pruner = MessagesPruner::new(config.global.prune_interval, sender);
        pruner.start();
    }

    fn start_command_consumer(
        mut self,
        broker: SharedBroker,
        _config: &BrokerConfig,
        receiver: flume::Receiver<PruneMessagesCommand>,
    ) {
        tokio::spawn(async move {
            while let Ok(command) = receiver.recv_async().await {
                self.execute(&broker, command).await;
            }
            info!("Messages pruner receiver stopped.");
        });
    }
}
