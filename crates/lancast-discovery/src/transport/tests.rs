use super::*;
use crate::correlation::CorrelationTable;
use crate::dispatcher::{handler_fn, HandlerRegistry};
use crate::envelope::AnnouncePayload;
use crate::registry::DeviceRegistry;
use std::time::Duration;
use tokio::sync::mpsc;

struct TestNode {
    transport: Arc<Transport>,
    registry: Arc<DeviceRegistry>,
    correlations: Arc<CorrelationTable>,
    handlers: Arc<HandlerRegistry>,
    shutdown: watch::Sender<bool>,
    port: u16,
}

async fn spawn_node(id: &str) -> TestNode {
    let transport = Arc::new(Transport::bind_unicast_only(id.to_string()).await.unwrap());
    let registry = Arc::new(DeviceRegistry::new());
    let correlations = Arc::new(CorrelationTable::new());
    let handlers = Arc::new(HandlerRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        correlations.clone(),
        handlers.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    transport.spawn_receive_loops(dispatcher, shutdown_rx);
    let port = transport.local_port().unwrap();
    TestNode {
        transport,
        registry,
        correlations,
        handlers,
        shutdown: shutdown_tx,
        port,
    }
}

fn directed_to(node: &TestNode, from_id: &str, command: &str, task_id: &str) -> Envelope {
    let mut envelope = Envelope::directed(format!("127.0.0.1:{}", node.port), command, None);
    envelope.from_id = from_id.to_string();
    envelope.task_id = task_id.to_string();
    envelope
}

#[tokio::test]
async fn test_directed_envelope_reaches_remote_handler() {
    let alpha = spawn_node("node-a").await;
    let beta = spawn_node("node-b").await;
    let (seen_tx, mut seen_rx) = mpsc::channel::<Envelope>(1);
    beta.handlers.register(
        "ping",
        handler_fn(move |_source, envelope| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(envelope).await;
            }
        }),
    );

    alpha
        .transport
        .send_directed(&directed_to(&beta, "node-a", "ping", "task-1"))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.command, "ping");
    assert_eq!(received.from_id, "node-a");

    let _ = alpha.shutdown.send(true);
    let _ = beta.shutdown.send(true);
}

#[tokio::test]
async fn test_send_directed_without_destination_fails() {
    let alpha = spawn_node("node-a").await;
    let mut envelope = Envelope::directed("unused", "ping", None);
    envelope.destination = None;

    assert!(matches!(
        alpha.transport.send_directed(&envelope).await,
        Err(DiscoveryError::MissingDestination)
    ));

    let _ = alpha.shutdown.send(true);
}

#[tokio::test]
async fn test_send_announce_with_no_multicast_sockets_is_a_quiet_noop() {
    // The unicast-only transport has zero multicast sockets; best-effort
    // fan-out over an empty set reports success.
    let alpha = spawn_node("node-a").await;
    let envelope = Envelope::announce(&AnnouncePayload {
        id: "node-a".to_string(),
        name: "alpha".to_string(),
        ip: "127.0.0.1".to_string(),
        port: alpha.port,
        version: "1.0.0".to_string(),
    });

    alpha.transport.send_announce(&envelope).await.unwrap();

    let _ = alpha.shutdown.send(true);
}

#[tokio::test]
async fn test_malformed_datagram_does_not_kill_the_receive_loop() {
    let beta = spawn_node("node-b").await;
    let (seen_tx, mut seen_rx) = mpsc::channel::<Envelope>(1);
    beta.handlers.register(
        "ping",
        handler_fn(move |_source, envelope| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(envelope).await;
            }
        }),
    );

    let probe = tokio::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let target = format!("127.0.0.1:{}", beta.port);
    probe.send_to(b"\x00\x01not json at all", &target).await.unwrap();
    probe.send_to(b"{\"intent\": \"directed\"", &target).await.unwrap();

    // A valid envelope sent after the garbage is still processed.
    let valid = {
        let mut envelope = Envelope::directed(target.clone(), "ping", None);
        envelope.from_id = "prober".to_string();
        envelope.task_id = "task-1".to_string();
        envelope.encode().unwrap()
    };
    probe.send_to(&valid, &target).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.command, "ping");

    let _ = beta.shutdown.send(true);
}

#[tokio::test]
async fn test_own_datagrams_are_suppressed() {
    let beta = spawn_node("node-b").await;
    let (seen_tx, mut seen_rx) = mpsc::channel::<Envelope>(2);
    beta.handlers.register(
        "ping",
        handler_fn(move |_source, envelope| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(envelope).await;
            }
        }),
    );

    let probe = tokio::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let target = format!("127.0.0.1:{}", beta.port);

    // First datagram claims to be from node-b itself: dropped unseen.
    let own = directed_to(&beta, "node-b", "ping", "task-own").encode().unwrap();
    probe.send_to(&own, &target).await.unwrap();
    // Second is from a foreign node: processed.
    let foreign = directed_to(&beta, "node-a", "ping", "task-foreign")
        .encode()
        .unwrap();
    probe.send_to(&foreign, &target).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.task_id, "task-foreign");
    assert!(
        tokio::time::timeout(Duration::from_millis(100), seen_rx.recv())
            .await
            .is_err()
    );

    let _ = beta.shutdown.send(true);
}

#[tokio::test]
async fn test_self_announce_never_enters_registry() {
    let beta = spawn_node("node-b").await;
    let probe = tokio::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let target = format!("127.0.0.1:{}", beta.port);

    let own_announce = Envelope::announce(&AnnouncePayload {
        id: "node-b".to_string(),
        name: "beta".to_string(),
        ip: "127.0.0.1".to_string(),
        port: beta.port,
        version: "1.0.0".to_string(),
    });
    probe
        .send_to(&own_announce.encode().unwrap(), &target)
        .await
        .unwrap();

    // A foreign announce afterwards proves the loop processed past the
    // suppressed datagram.
    let foreign_announce = Envelope::announce(&AnnouncePayload {
        id: "node-a".to_string(),
        name: "alpha".to_string(),
        ip: "127.0.0.1".to_string(),
        port: 9000,
        version: "1.0.0".to_string(),
    });
    probe
        .send_to(&foreign_announce.encode().unwrap(), &target)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while beta.registry.get("node-a").is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(beta.registry.get("node-b").is_none());
    assert_eq!(beta.registry.len(), 1);

    let _ = beta.shutdown.send(true);
}

#[tokio::test]
async fn test_shutdown_stops_receive_loop() {
    let beta = spawn_node("node-b").await;
    let (seen_tx, mut seen_rx) = mpsc::channel::<Envelope>(1);
    beta.handlers.register(
        "ping",
        handler_fn(move |_source, envelope| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(envelope).await;
            }
        }),
    );

    let _ = beta.shutdown.send(true);
    // Give the loop a moment to observe the signal.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let probe = tokio::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let target = format!("127.0.0.1:{}", beta.port);
    let envelope = directed_to(&beta, "node-a", "ping", "task-1").encode().unwrap();
    probe.send_to(&envelope, &target).await.unwrap();

    assert!(
        tokio::time::timeout(Duration::from_millis(200), seen_rx.recv())
            .await
            .is_err()
    );

    // The correlation table is untouched throughout.
    assert!(beta.correlations.is_empty());
}
