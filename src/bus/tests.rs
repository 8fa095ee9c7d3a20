use super::*;
use crate::config::BusConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// MQTT 3.1.1 fixed-header bytes seen by the local broker
const CONNECT: u8 = 0x10;
const SUBSCRIBE: u8 = 0x82;
const PUBLISH_QOS1_RETAINED: u8 = 0x33;
const DISCONNECT: u8 = 0xE0;
const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

// ── Helpers ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingHandler {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
    }
}

fn local_config(port: u16) -> BusConfig {
    BusConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..BusConfig::device()
    }
}

async fn next_event(reports: &mut mpsc::Receiver<LinkReport>) -> LinkEvent {
    timeout(WAIT, reports.recv())
        .await
        .expect("no link event")
        .expect("driver dropped the report channel")
        .event
}

/// Read one MQTT packet: (fixed header byte, body)
async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let header = stream.read_u8().await.unwrap();

    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await.unwrap();
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; len];
    stream.read_exact(&mut body).await.unwrap();
    (header, body)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// QoS 0 PUBLISH from the broker to the client
fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x30, (2 + topic.len() + payload.len()) as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Broker that accepts connections and immediately drops them
async fn dropping_broker() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    (port, accepted)
}

// ── Connection setup ──────────────────────────────────────────────────────────

#[test]
fn test_missing_ca_file_fails_connect() {
    let config = BusConfig {
        tls: true,
        ca_file: Some(PathBuf::from("/nonexistent/tool-relay/ca.pem")),
        ..BusConfig::device()
    };

    let err = BusClient::connect(BusRole::Device, &config, BusOptions::default())
        .err()
        .expect("connect must fail without the CA file");
    assert!(err.to_string().contains("Failed to read CA file"));
}

#[test]
fn test_role_display() {
    assert_eq!(BusRole::Backend.to_string(), "backend");
    assert_eq!(BusRole::Device.to_string(), "device");
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_lifecycle_against_local_broker() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (bus, driver) = BusClient::connect(
        BusRole::Device,
        &local_config(port),
        BusOptions {
            subscriptions: vec!["tools/#".to_string()],
            presence_topic: Some("tool-relay/status".to_string()),
        },
    )
    .unwrap();
    assert_eq!(bus.endpoint(), format!("127.0.0.1:{}", port));

    let handler = Arc::new(RecordingHandler::default());
    let dyn_handler: Arc<dyn MessageHandler> = handler.clone();
    let (report_tx, mut reports) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver_handle = tokio::spawn(driver.run(Some(dyn_handler), report_tx, shutdown_rx));

    assert_eq!(next_event(&mut reports).await, LinkEvent::Connecting);

    // CONNECT carries the last will
    let (mut broker, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let (kind, connect) = read_packet(&mut broker).await;
    assert_eq!(kind, CONNECT);
    assert!(contains(&connect, b"tool-relay/status"));
    assert!(contains(&connect, OFFLINE.as_bytes()));
    assert!(!bus.is_connected());

    broker.write_all(&CONNACK_ACCEPTED).await.unwrap();
    assert_eq!(next_event(&mut reports).await, LinkEvent::Connected);
    assert!(bus.is_connected());

    // Subscribe, then announce presence (retained, QoS 1)
    let (kind, subscribe) = read_packet(&mut broker).await;
    assert_eq!(kind, SUBSCRIBE);
    assert!(contains(&subscribe, b"tools/#"));

    let (kind, online) = read_packet(&mut broker).await;
    assert_eq!(kind, PUBLISH_QOS1_RETAINED);
    assert!(contains(&online, b"tool-relay/status"));
    assert!(online.ends_with(ONLINE.as_bytes()));

    // Inbound publishes reach the handler
    broker
        .write_all(&publish_packet("tools/woollam/start", b"{}"))
        .await
        .unwrap();
    timeout(WAIT, async {
        while handler.messages.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("handler never called");
    assert_eq!(
        handler.messages.lock().unwrap()[0],
        ("tools/woollam/start".to_string(), b"{}".to_vec())
    );

    // Orderly shutdown: offline status, then disconnect
    shutdown_tx.send(true).unwrap();
    bus.shutdown().await.unwrap();

    let (kind, offline) = read_packet(&mut broker).await;
    assert_eq!(kind, PUBLISH_QOS1_RETAINED);
    assert!(contains(&offline, b"tool-relay/status"));
    assert!(offline.ends_with(OFFLINE.as_bytes()));

    let (kind, _) = read_packet(&mut broker).await;
    assert_eq!(kind, DISCONNECT);

    assert!(matches!(
        next_event(&mut reports).await,
        LinkEvent::Disconnected { expected: true, .. }
    ));
    timeout(WAIT, driver_handle).await.unwrap().unwrap();
    assert!(!bus.is_connected());
}

#[tokio::test]
async fn test_driver_parks_until_reconnect_requested() {
    let (port, accepted) = dropping_broker().await;

    let (bus, driver) =
        BusClient::connect(BusRole::Backend, &local_config(port), BusOptions::default()).unwrap();
    let (report_tx, mut reports) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver_handle = tokio::spawn(driver.run(None, report_tx, shutdown_rx));

    assert_eq!(next_event(&mut reports).await, LinkEvent::Connecting);
    assert!(matches!(
        next_event(&mut reports).await,
        LinkEvent::Disconnected { expected: false, .. }
    ));
    assert!(!bus.is_connected());

    // Nothing happens until the supervisor asks
    assert!(timeout(Duration::from_millis(300), reports.recv()).await.is_err());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    bus.request_reconnect();
    assert_eq!(next_event(&mut reports).await, LinkEvent::Connecting);
    assert!(matches!(
        next_event(&mut reports).await,
        LinkEvent::Disconnected { expected: false, .. }
    ));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);

    // A parked driver stops on shutdown
    shutdown_tx.send(true).unwrap();
    timeout(WAIT, driver_handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_loss_after_shutdown_is_expected() {
    let (port, _accepted) = dropping_broker().await;

    let (_bus, driver) =
        BusClient::connect(BusRole::Device, &local_config(port), BusOptions::default()).unwrap();
    let (report_tx, mut reports) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(true);
    let driver_handle = tokio::spawn(driver.run(None, report_tx, shutdown_rx));

    assert_eq!(next_event(&mut reports).await, LinkEvent::Connecting);
    assert!(matches!(
        next_event(&mut reports).await,
        LinkEvent::Disconnected { expected: true, .. }
    ));

    // No parking: the driver exits on its own
    timeout(WAIT, driver_handle).await.unwrap().unwrap();
}
