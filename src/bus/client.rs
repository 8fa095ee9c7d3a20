use super::{BusRole, LinkEvent, LinkReport, MessageHandler};
use crate::config::BusConfig;
use anyhow::{Context, Result};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS, TlsConfiguration, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};

/// Payload published on the liveness topic while connected
pub const ONLINE: &str = "online";
/// Payload left behind on the liveness topic (last will or orderly shutdown)
pub const OFFLINE: &str = "offline";

/// Per-connection behavior on top of the broker settings
#[derive(Clone, Debug, Default)]
pub struct BusOptions {
    /// Topic filters (re)subscribed after every connection acknowledgment
    pub subscriptions: Vec<String>,
    /// Retained liveness topic; registers the last will when set
    pub presence_topic: Option<String>,
}

/// MQTT client handle for one broker.
///
/// Cheap to clone. The connection itself is driven by the paired
/// [`BusDriver`] on its own task.
#[derive(Clone)]
pub struct BusClient {
    role: BusRole,
    endpoint: String,
    client: AsyncClient,
    presence_topic: Option<String>,
    /// Signalled by the supervisor to re-poll after a disconnect
    reconnect: Arc<Notify>,
    /// Self-reported connection flag (set on ConnAck, cleared on error)
    connected: Arc<AtomicBool>,
}

/// Owns the event loop of a [`BusClient`]
pub struct BusDriver {
    role: BusRole,
    client: AsyncClient,
    eventloop: EventLoop,
    options: BusOptions,
    reconnect: Arc<Notify>,
    connected: Arc<AtomicBool>,
}

impl BusClient {
    /// Build the client/driver pair for a broker.
    ///
    /// Nothing touches the network until the driver is run.
    pub fn connect(role: BusRole, config: &BusConfig, options: BusOptions) -> Result<(Self, BusDriver)> {
        let client_id = config.client_id_for(role);
        info!(
            role = %role,
            endpoint = %config.endpoint(),
            client_id = %client_id,
            tls = config.tls,
            "Configuring broker connection"
        );

        let mut mqtt_options = MqttOptions::new(client_id, config.host.clone(), config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        mqtt_options.set_clean_session(true);

        if let Some(username) = &config.username {
            mqtt_options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        if let Some(topic) = &options.presence_topic {
            mqtt_options.set_last_will(LastWill::new(topic.clone(), OFFLINE, QoS::AtLeastOnce, true));
        }

        if config.tls {
            mqtt_options.set_transport(tls_transport(config)?);
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, config.queue_capacity);
        let reconnect = Arc::new(Notify::new());
        let connected = Arc::new(AtomicBool::new(false));

        let bus = Self {
            role,
            endpoint: config.endpoint(),
            client: client.clone(),
            presence_topic: options.presence_topic.clone(),
            reconnect: Arc::clone(&reconnect),
            connected: Arc::clone(&connected),
        };

        let driver = BusDriver {
            role,
            client,
            eventloop,
            options,
            reconnect,
            connected,
        };

        Ok((bus, driver))
    }

    pub fn role(&self) -> BusRole {
        self.role
    }

    /// `host:port` of the broker
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// What the client believes; may lag a silently closed socket
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Let a driver parked after a disconnect poll again (reconnects)
    pub fn request_reconnect(&self) {
        self.reconnect.notify_one();
    }

    pub(super) fn client(&self) -> &AsyncClient {
        &self.client
    }

    /// Publish "offline" (if this bus carries presence) and disconnect.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(topic) = &self.presence_topic {
            if let Err(e) = self.client.try_publish(topic.clone(), QoS::AtLeastOnce, true, OFFLINE) {
                warn!(role = %self.role, error = %e, "Failed to queue offline status");
            }
        }

        self.client
            .disconnect()
            .await
            .with_context(|| format!("Failed to disconnect from {} broker", self.role))?;

        info!(role = %self.role, "Disconnect requested");
        Ok(())
    }
}

fn tls_transport(config: &BusConfig) -> Result<Transport> {
    match &config.ca_file {
        Some(path) => {
            let ca = std::fs::read(path)
                .with_context(|| format!("Failed to read CA file '{}'", path.display()))?;
            Ok(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }))
        }
        None => Ok(Transport::tls_with_default_config()),
    }
}

impl BusDriver {
    /// Drive the event loop until an orderly disconnect.
    ///
    /// Inbound publishes are handed to `handler` inline. After an
    /// unexpected disconnect the driver reports it and waits for
    /// [`BusClient::request_reconnect`] (or shutdown) before polling again.
    pub async fn run(
        mut self,
        handler: Option<Arc<dyn MessageHandler>>,
        reports: mpsc::Sender<LinkReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(role = %self.role, "Starting bus driver");
        self.report(&reports, LinkEvent::Connecting).await;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.on_connected();
                        self.report(&reports, LinkEvent::Connected).await;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        role = %self.role,
                        topic = %publish.topic,
                        bytes = publish.payload.len(),
                        "Message received"
                    );
                    if let Some(handler) = &handler {
                        handler.on_message(&publish.topic, &publish.payload).await;
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    // Queued publishes (offline status) went out ahead of it
                    info!(role = %self.role, "Connection closed");
                    self.report(
                        &reports,
                        LinkEvent::Disconnected {
                            reason: "disconnect requested".to_string(),
                            expected: true,
                        },
                    )
                    .await;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    let expected = *shutdown.borrow();

                    if expected {
                        info!(role = %self.role, "Connection closed");
                    } else {
                        error!(role = %self.role, error = %e, "Connection lost");
                    }
                    self.report(
                        &reports,
                        LinkEvent::Disconnected {
                            reason: e.to_string(),
                            expected,
                        },
                    )
                    .await;

                    if expected {
                        break;
                    }

                    // Parked until the supervisor asks for a reconnect
                    tokio::select! {
                        _ = self.reconnect.notified() => {}
                        _ = shutdown.changed() => break,
                    }
                    self.report(&reports, LinkEvent::Connecting).await;
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!(role = %self.role, "Bus driver stopped");
    }

    fn on_connected(&mut self) {
        self.connected.store(true, Ordering::SeqCst);
        info!(role = %self.role, "Broker connection established");

        for filter in &self.options.subscriptions {
            match self.client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                Ok(()) => info!(role = %self.role, filter = %filter, "Subscribed"),
                Err(e) => error!(role = %self.role, filter = %filter, error = %e, "Failed to subscribe"),
            }
        }

        if let Some(topic) = &self.options.presence_topic {
            if let Err(e) = self.client.try_publish(topic.clone(), QoS::AtLeastOnce, true, ONLINE) {
                warn!(role = %self.role, error = %e, "Failed to publish online status");
            }
        }
    }

    async fn report(&mut self, reports: &mpsc::Sender<LinkReport>, event: LinkEvent) {
        let report = LinkReport {
            role: self.role,
            event,
        };
        if reports.send(report).await.is_err() {
            debug!(role = %self.role, "Supervisor gone, link event dropped");
        }
    }
}
