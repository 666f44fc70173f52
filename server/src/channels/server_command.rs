use crate::channels::SharedBroker;
use async_trait::async_trait;
use broker::BrokerConfig;
use flume::{Receiver, Sender};

#[async_trait]
pub trait ServerCommand<C> {
    async fn execute(&mut self, broker: &SharedBroker, command: C);

    fn start_command_sender(
        &mut self,
        broker: SharedBroker,
        config: &BrokerConfig,
        sender: Sender<C>,
    );

    fn start_command_consumer(
        self,
        broker: SharedBroker,
        config: &BrokerConfig,
        receiver: Receiver<C>,
    );
}
