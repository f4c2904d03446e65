use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
};

use anyhow::Context;
use async_trait::async_trait;
use mhist::{
    FilterCollection,
    FilterDefinition,
    Measurement,
    Pools,
    Store,
    Subscriber,
    SubscriptionMessage,
};
use parking_lot::{
    Mutex,
    RwLock,
};
use tokio::{
    io::{
        AsyncBufReadExt,
        AsyncWriteExt,
        BufReader,
        Lines,
    },
    net::{
        tcp::{
            OwnedReadHalf,
            OwnedWriteHalf,
        },
        TcpListener,
        TcpStream,
    },
    sync::mpsc,
};

use crate::{
    ingest,
    metrics,
};

/// Connection lifecycle for publishers and subscribers, plus the fanout
/// [`Subscriber`] feeding every outbound connection through its filter.
pub struct TcpHandler {
    pools: Arc<Pools>,
    outbound: RwLock<HashMap<u64, OutboundConnection>>,
    next_connection_id: AtomicU64,
}

/// Filter and queue of one subscriber connection. Living in one map entry,
/// the fanout can never see a connection without its filter.
struct OutboundConnection {
    filter: Mutex<FilterCollection>,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl TcpHandler {
    pub fn new(pools: Arc<Pools>) -> Arc<Self> {
        Arc::new(Self {
            pools,
            outbound: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(0),
        })
    }

    pub async fn run(self: Arc<Self>, store: Arc<Store>, port: u16) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Couldn't listen on port {port}"))?;
        tracing::info!("Listening for connections on {}", listener.local_addr()?);
        self.serve(store, listener).await
    }

    pub async fn serve(
        self: Arc<Self>,
        store: Arc<Store>,
        listener: TcpListener,
    ) -> anyhow::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = self.clone();
                    let store = store.clone();
                    tokio::spawn(handler.handle_connection(store, stream, peer));
                },
                Err(e) => tracing::warn!("Couldn't accept connection: {e}"),
            }
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        store: Arc<Store>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let subscription = match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<SubscriptionMessage>(&line) {
                Ok(subscription) => subscription,
                Err(e) => {
                    tracing::warn!("Closing connection from {peer}: bad subscription line: {e}");
                    return;
                },
            },
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Closing connection from {peer}: {e}");
                return;
            },
        };

        if subscription.publisher {
            tracing::info!(
                "Publisher connected from {peer} (replication: {})",
                subscription.replication,
            );
            self.handle_publisher(store, lines, subscription.replication)
                .await;
            tracing::info!("Publisher from {peer} disconnected");
        } else {
            tracing::info!("Subscriber connected from {peer}");
            self.handle_subscriber(write_half, lines, subscription.filter_definition)
                .await;
            tracing::info!("Subscriber from {peer} disconnected");
        }
    }

    async fn handle_publisher(
        &self,
        store: Arc<Store>,
        mut lines: Lines<BufReader<OwnedReadHalf>>,
        is_replication: bool,
    ) {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(e) =
                        ingest::handle_published_line(&self.pools, &store, &line, is_replication)
                            .await
                    {
                        // A bad line costs itself, not the connection.
                        metrics::log_rejected_line();
                        tracing::warn!("Dropping published line: {e}");
                    }
                },
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!("Publisher connection failed: {e}");
                    return;
                },
            }
        }
    }

    async fn handle_subscriber(
        &self,
        write_half: OwnedWriteHalf,
        mut lines: Lines<BufReader<OwnedReadHalf>>,
        definition: FilterDefinition,
    ) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.add_outbound(definition, sender);
        let writer = tokio::spawn(write_outbound(write_half, receiver));

        // Subscribers don't speak after the handshake; reading just notices
        // the disconnect.
        loop {
            match lines.next_line().await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
        self.remove_outbound(id);
        writer.abort();
    }

    fn add_outbound(&self, definition: FilterDefinition, sender: mpsc::UnboundedSender<Vec<u8>>) -> u64 {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = OutboundConnection {
            filter: Mutex::new(FilterCollection::new(definition)),
            sender,
        };
        let mut outbound = self.outbound.write();
        outbound.insert(id, connection);
        metrics::log_subscriber_count(outbound.len());
        id
    }

    fn remove_outbound(&self, id: u64) {
        let mut outbound = self.outbound.write();
        outbound.remove(&id);
        metrics::log_subscriber_count(outbound.len());
    }
}

async fn write_outbound(
    mut write_half: OwnedWriteHalf,
    mut receiver: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(line) = receiver.recv().await {
        if let Err(e) = write_half.write_all(&line).await {
            tracing::warn!("Subscriber write failed: {e}");
            return;
        }
    }
}

#[async_trait]
impl Subscriber for TcpHandler {
    /// Encode one pooled message per fanout and queue the line on every
    /// connection whose filter admits it.
    async fn notify(&self, name: &str, measurement: &Measurement) {
        let outbound = self.outbound.read();
        if outbound.is_empty() {
            return;
        }
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
                tracing::warn!("Couldn't encode fanout message for {name}: {e}");
                return;
            },
        };
        line.push(b'\n');

        for connection in outbound.values() {
            if connection.filter.lock().passes(name, measurement) {
                let _ = connection.sender.send(line.clone());
                metrics::log_fanout_line();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use mhist::{
        FilterDefinition,
        Measurement,
        Pools,
        Store,
        Subscriber,
    };
    use tokio::{
        io::{
            AsyncBufReadExt,
            AsyncWriteExt,
            BufReader,
        },
        net::{
            TcpListener,
            TcpStream,
        },
        sync::mpsc,
        time::timeout,
    };

    use super::TcpHandler;

    fn name_filter(names: &[&str]) -> FilterDefinition {
        FilterDefinition {
            granularity: Duration::ZERO,
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_fanout_respects_filters() {
        let handler = TcpHandler::new(Arc::new(Pools::new()));
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        handler.add_outbound(name_filter(&["a"]), a_tx);
        handler.add_outbound(name_filter(&["b"]), b_tx);

        handler.notify("a", &Measurement::numerical(1000, 1.5)).await;
        handler.notify("b", &Measurement::categorical(2000, "on")).await;

        let line = a_rx.try_recv().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(decoded["name"], "a");
        assert_eq!(decoded["value"], 1.5);
        assert_eq!(decoded["timestamp"], 1000);
        assert!(a_rx.try_recv().is_err());

        let line = b_rx.try_recv().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(decoded["name"], "b");
        assert_eq!(decoded["value"], "on");
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removed_connections_stop_receiving() {
        let handler = TcpHandler::new(Arc::new(Pools::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = handler.add_outbound(FilterDefinition::default(), tx);
        handler.remove_outbound(id);

        handler.notify("a", &Measurement::numerical(1, 1.)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_subscribe_over_tcp() {
        let pools = Arc::new(Pools::new());
        let handler = TcpHandler::new(pools.clone());
        let mut store = Store::new();
        store.add_subscriber(handler.clone());
        let store = Arc::new(store);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(handler.clone().serve(store, listener));

        let mut subscriber_a = TcpStream::connect(address).await.unwrap();
        subscriber_a
            .write_all(b"{\"publisher\":false,\"filterDefinition\":{\"names\":[\"a\"]}}\n")
            .await
            .unwrap();
        let mut subscriber_b = TcpStream::connect(address).await.unwrap();
        subscriber_b
            .write_all(b"{\"publisher\":false,\"filterDefinition\":{\"names\":[\"b\"]}}\n")
            .await
            .unwrap();

        // Handshakes are processed asynchronously.
        for _ in 0..100 {
            if handler.outbound.read().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.outbound.read().len(), 2);

        let mut publisher = TcpStream::connect(address).await.unwrap();
        publisher.write_all(b"{\"publisher\":true}\n").await.unwrap();
        publisher
            .write_all(b"{\"name\":\"a\",\"value\":1.5,\"timestamp\":1000}\n")
            .await
            .unwrap();
        publisher
            .write_all(b"{\"name\":\"b\",\"value\":\"on\",\"timestamp\":2000}\n")
            .await
            .unwrap();

        let mut a_lines = BufReader::new(subscriber_a).lines();
        let line = timeout(Duration::from_secs(5), a_lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded["name"], "a");

        let mut b_lines = BufReader::new(subscriber_b).lines();
        let line = timeout(Duration::from_secs(5), b_lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded["name"], "b");

        // Nothing else was queued for either subscriber.
        assert!(timeout(Duration::from_millis(200), a_lines.next_line())
            .await
            .is_err());
        assert!(timeout(Duration::from_millis(200), b_lines.next_line())
            .await
            .is_err());
    }
}
