pub mod commands;
pub mod server_command;

use crate::channels::commands::prune_messages::{PruneMessagesCommand, PruneMessagesExecutor};
use crate::channels::commands::rebalance_groups::{
    RebalanceGroupsCommand, RebalanceGroupsExecutor,
};
use crate::channels::server_command::ServerCommand;
use broker::{Broker, BrokerConfig};
use std::sync::Arc;

pub type SharedBroker = Arc<Broker>;

/// Starts the background command pairs: periodic receiver-group rebalancing
/// and message pruning. Each pair is a ticking sender task plus a consumer
/// task executing against the shared broker.
pub fn start(broker: SharedBroker, config: &BrokerConfig) {
    start_channel::<RebalanceGroupsCommand, _>(RebalanceGroupsExecutor, broker.clone(), config);
    start_channel::<PruneMessagesCommand, _>(PruneMessagesExecutor, broker, config);
}

fn start_channel<C, E>(mut executor: E, broker: SharedBroker, config: &BrokerConfig)
where
    C: Send + Sync + 'static,
    E: ServerCommand<C>,
{
    let (sender, receiver) = flume::unbounded::<C>();
    executor.start_command_sender(broker.clone(), config, sender);
    executor.start_command_consumer(broker, config, receiver);
}
