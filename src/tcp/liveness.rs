use std::time::Duration;

use futures::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::{
    net::TcpStream,
    task::JoinSet,
    time::{interval, timeout, MissedTickBehavior},
};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::{
    codec::MessageCodec,
    core::{
        message::{MessageKind, Protocol},
        peer::PeerRecord,
        routing_table::MissOutcome,
    },
    tcp::{node::NodeError, sync::SyncRoutingTable},
};

/// The result of probing one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The heartbeat was sent and answered.
    Confirmed,
    /// The heartbeat was sent, no answer arrived in time.
    Sent,
    /// Connecting or sending failed.
    Failed,
}

/// A summary of one round of heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub started_at: OffsetDateTime,
    pub probed: usize,
    pub confirmed: usize,
    pub missed: usize,
    pub evicted: usize,
}

/// Periodically probes every known peer with a heartbeat and evicts the ones that repeatedly
/// can't be reached.
#[derive(Debug, Clone)]
pub struct Liveness {
    local: PeerRecord,
    routing_table: SyncRoutingTable,
    protocol: Protocol,
    interval: Duration,
    probe_timeout: Duration,
}

impl Liveness {
    pub fn new(
        local: PeerRecord,
        routing_table: SyncRoutingTable,
        protocol: Protocol,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            local,
            routing_table,
            protocol,
            interval,
            probe_timeout,
        }
    }

    /// Probes the peers every interval, forever. The first round starts one interval from now.
    pub async fn run(self) {
        let mut ticks = interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticks.tick().await;

        loop {
            ticks.tick().await;
            let report = self.tick().await;

            if report.probed > 0 {
                debug!(
                    probed = report.probed,
                    confirmed = report.confirmed,
                    missed = report.missed,
                    evicted = report.evicted,
                    "heartbeat round complete"
                );
            }
        }
    }

    /// Runs a single round of heartbeats against the peers known when the round starts.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport {
            started_at: OffsetDateTime::now_utc(),
            probed: 0,
            confirmed: 0,
            missed: 0,
            evicted: 0,
        };

        let mut probes = JoinSet::new();
        for peer in self.routing_table.get_peers() {
            let liveness = self.clone();
            probes.spawn(async move {
                let outcome = liveness.probe(&peer).await;
                (peer, outcome)
            });
        }

        while let Some(joined) = probes.join_next().await {
            let Ok((peer, outcome)) = joined else {
                continue;
            };

            report.probed += 1;
            match outcome {
                ProbeOutcome::Confirmed => {
                    self.routing_table.record_success(peer.id());
                    report.confirmed += 1;
                }
                ProbeOutcome::Sent => {}
                ProbeOutcome::Failed => match self.routing_table.record_miss(peer.id()) {
                    MissOutcome::Missed(_) => report.missed += 1,
                    MissOutcome::Evicted => {
                        report.missed += 1;
                        report.evicted += 1;
                    }
                    // Left its slot while the probe was in flight.
                    MissOutcome::Untracked => {}
                },
            }
        }

        report
    }

    /// Sends a heartbeat to the peer. Connecting and sending must both complete within the probe
    /// timeout; the reply is waited for up to the probe timeout again.
    pub async fn probe(&self, peer: &PeerRecord) -> ProbeOutcome {
        let mut framed = match timeout(self.probe_timeout, self.send_heartbeat(peer)).await {
            Ok(Ok(framed)) => framed,
            Ok(Err(e)) => {
                debug!(%peer, "heartbeat failed: {e}");
                return ProbeOutcome::Failed;
            }
            Err(_) => {
                debug!(%peer, "heartbeat timed out");
                return ProbeOutcome::Failed;
            }
        };

        match timeout(self.probe_timeout, framed.next()).await {
            Ok(Some(Ok(reply))) if reply.kind == MessageKind::Heartbeat => {
                trace!(%peer, "heartbeat answered");
                ProbeOutcome::Confirmed
            }
            _ => ProbeOutcome::Sent,
        }
    }

    async fn send_heartbeat(
        &self,
        peer: &PeerRecord,
    ) -> Result<Framed<TcpStream, MessageCodec>, NodeError> {
        let stream = TcpStream::connect((peer.address(), peer.port())).await?;
        let mut framed = Framed::new(stream, MessageCodec::new(self.protocol));

        framed
            .send(self.protocol.message(MessageKind::Heartbeat, &self.local, vec![]))
            .await?;
        // Half-close, the peer may still answer.
        framed.close().await?;

        Ok(framed)
    }
}
