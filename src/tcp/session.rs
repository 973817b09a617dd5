use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::{
    codec::MessageCodec,
    core::message::MessageKind,
    tcp::node::{Node, NodeError},
};

impl Node {
    /// Serves one inbound request: a single message is read, answered if it calls for an answer,
    /// and the connection is closed.
    pub(crate) async fn handle_connection(&self, stream: TcpStream) -> Result<(), NodeError> {
        timeout(self.config.session_timeout, self.serve(stream)).await?
    }

    async fn serve(&self, stream: TcpStream) -> Result<(), NodeError> {
        let mut framed = Framed::new(stream, MessageCodec::new(self.protocol));

        let message = match framed.next().await {
            Some(message) => message?,
            None => return Err(NodeError::Closed),
        };

        debug!(kind = message.variant_as_str(), sender = %message.sender, "processing message");

        if let Some(response) = self.routing_table.process_message(message) {
            framed.send(self.protocol.respond(&self.local, response)).await?;
        }

        // Flushes and shuts down the write half.
        framed.close().await?;

        Ok(())
    }

    /// Introduces this node to `target` and merges the peers it replies with. There is a single
    /// attempt, a failure leaves the node running on its own.
    pub async fn bootstrap(&self, target: SocketAddr) -> Result<(), NodeError> {
        let result = timeout(self.config.session_timeout, self.hello(target))
            .await
            .map_err(NodeError::from)
            .and_then(|result| result);

        match &result {
            Ok(()) => info!(%target, at = %OffsetDateTime::now_utc(), "bootstrap complete"),
            Err(e) => warn!(%target, "bootstrap failed: {e}"),
        }

        result
    }

    async fn hello(&self, target: SocketAddr) -> Result<(), NodeError> {
        let stream = TcpStream::connect(target).await?;
        info!(%target, at = %OffsetDateTime::now_utc(), "connected to bootstrap peer");

        let mut framed = Framed::new(stream, MessageCodec::new(self.protocol));
        let hello = self.protocol.message(
            MessageKind::Hello,
            &self.local,
            self.routing_table.get_peers(),
        );
        framed.send(hello).await?;

        // The peer closes the connection once it has replied.
        let mut welcomed = false;
        while let Some(message) = framed.next().await {
            let message = message?;

            if message.kind == MessageKind::Welcome {
                self.routing_table.process_welcome(message);
                welcomed = true;
            } else {
                debug!(kind = message.variant_as_str(), "ignoring unexpected message");
            }
        }

        info!(%target, at = %OffsetDateTime::now_utc(), "connection closed");

        if welcomed {
            Ok(())
        } else {
            Err(NodeError::Closed)
        }
    }
}
