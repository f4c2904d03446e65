use std::{
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use backoff::backoff::Backoff;
use mhist::{
    knobs::REPLICATION_QUEUE_SIZE,
    Measurement,
    Pools,
    Subscriber,
    SubscriptionMessage,
};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::mpsc,
};

use crate::metrics;

const MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(60);

/// Outbound fanout to one replication peer. Accepted writes are queued as
/// encoded lines; a connection task dials the peer, identifies itself as a
/// replicating publisher and streams the queue, reconnecting with backoff
/// when the peer goes away. Replication is best-effort: a full queue drops
/// measurements rather than stalling the fanout.
pub struct Replication {
    address: String,
    pools: Arc<Pools>,
    sender: mpsc::Sender<Vec<u8>>,
}

impl Replication {
    pub fn connect(address: String, pools: Arc<Pools>) -> Arc<Self> {
        let (replication, receiver) = Self::new(address, pools);
        tokio::spawn(run_connection(replication.address.clone(), receiver));
        replication
    }

    fn new(address: String, pools: Arc<Pools>) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(*REPLICATION_QUEUE_SIZE);
        let replication = Arc::new(Self {
            address,
            pools,
            sender,
        });
        (replication, receiver)
    }
}

#[async_trait]
impl Subscriber for Replication {
    async fn notify(&self, name: &str, measurement: &Measurement) {
        let mut message = self.pools.get_message();
        message.reset();
        message.name.push_str(name);
        message.value = measurement.value_json();
        message.timestamp = measurement.timestamp();
        let encoded = serde_json::to_vec(&message);
        self.pools.put_message(message);

        let mut line = match encoded {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Couldn't encode replication message for {name}: {e}");
                return;
            },
        };
        line.push(b'\n');
        if self.sender.try_send(line).is_err() {
            metrics::log_replication_dropped();
            tracing::debug!("Replication queue for {} is full, dropping", self.address);
        }
    }
}

fn handshake_line() -> Vec<u8> {
    let subscription = SubscriptionMessage {
        publisher: true,
        replication: true,
        filter_definition: Default::default(),
    };
    let mut line = serde_json::to_vec(&subscription).unwrap_or_default();
    line.push(b'\n');
    line
}

async fn run_connection(address: String, mut receiver: mpsc::Receiver<Vec<u8>>) {
    let handshake = handshake_line();
    let mut backoff = backoff::ExponentialBackoff {
        max_interval: MAX_RECONNECT_INTERVAL,
        max_elapsed_time: None,
        ..Default::default()
    };
    loop {
        let mut stream = match TcpStream::connect(&address).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Couldn't reach replication peer {address}: {e}");
                let wait = backoff.next_backoff().unwrap_or(MAX_RECONNECT_INTERVAL);
                tokio::time::sleep(wait).await;
                continue;
            },
        };
        if let Err(e) = stream.write_all(&handshake).await {
            tracing::warn!("Handshake with replication peer {address} failed: {e}");
            let wait = backoff.next_backoff().unwrap_or(MAX_RECONNECT_INTERVAL);
            tokio::time::sleep(wait).await;
            continue;
        }
        backoff.reset();
        tracing::info!("Replicating to {address}");

        loop {
            match receiver.recv().await {
                // A failed write loses this line; the stream reconnects for
                // the next one.
                Some(line) => {
                    if let Err(e) = stream.write_all(&line).await {
                        tracing::warn!("Replication write to {address} failed: {e}");
                        break;
                    }
                },
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mhist::{
        Measurement,
        Pools,
        Subscriber,
        SubscriptionMessage,
    };

    use super::{
        handshake_line,
        Replication,
    };

    #[tokio::test]
    async fn test_notify_queues_encoded_lines() {
        let (replication, mut receiver) =
            Replication::new("peer:6666".to_owned(), Arc::new(Pools::new()));
        replication
            .notify("temp", &Measurement::numerical(1000, 42.))
            .await;

        let line = receiver.recv().await.unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let decoded: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(decoded["name"], "temp");
        assert_eq!(decoded["value"], 42.);
        assert_eq!(decoded["timestamp"], 1000);
    }

    #[test]
    fn test_handshake_marks_replication() {
        let line = handshake_line();
        let subscription: SubscriptionMessage =
            serde_json::from_slice(line.strip_suffix(b"\n").unwrap()).unwrap();
        assert!(subscription.publisher);
        assert!(subscription.replication);
    }
}
