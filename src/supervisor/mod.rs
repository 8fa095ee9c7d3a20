//! Connection supervisor.
//!
//! Owns the per-bus state machines, turns driver link events into
//! reconnect requests, and periodically probes each broker endpoint
//! independently of the client's own connected flag. When the device
//! broker disappears it can ask the host to restart it.

mod probe;
mod state;

pub use probe::{BrokerRestarter, CommandRestarter, EndpointProbe, TcpProbe};
pub use state::{Action, ConnectionState, LinkMonitor, Signal};

use crate::bus::{BusClient, BusRole, LinkReport};
use crate::config::SupervisorConfig;
use crate::state::RelayMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// The parts of a bus client the supervisor drives
pub trait Link: Send + Sync {
    fn role(&self) -> BusRole;
    fn endpoint(&self) -> &str;
    fn is_connected(&self) -> bool;
    fn request_reconnect(&self);
}

impl Link for BusClient {
    fn role(&self) -> BusRole {
        BusClient::role(self)
    }

    fn endpoint(&self) -> &str {
        BusClient::endpoint(self)
    }

    fn is_connected(&self) -> bool {
        BusClient::is_connected(self)
    }

    fn request_reconnect(&self) {
        BusClient::request_reconnect(self)
    }
}

struct Supervised {
    link: Arc<dyn Link>,
    monitor: LinkMonitor,
}

/// Health-checks both bus connections for the process lifetime
pub struct Supervisor {
    config: SupervisorConfig,
    links: Vec<Supervised>,
    probe: Arc<dyn EndpointProbe>,
    restarter: Option<Arc<dyn BrokerRestarter>>,
    metrics: Option<RelayMetrics>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, probe: Arc<dyn EndpointProbe>) -> Self {
        Self {
            config,
            links: Vec::new(),
            probe,
            restarter: None,
            metrics: None,
        }
    }

    /// Restarter used when the device broker is unreachable
    pub fn with_restarter(mut self, restarter: Arc<dyn BrokerRestarter>) -> Self {
        self.restarter = Some(restarter);
        for supervised in &mut self.links {
            if supervised.monitor.role() == BusRole::Device {
                supervised.monitor.set_can_restart(true);
            }
        }
        self
    }

    /// Metrics logged on every health tick
    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start supervising a link
    pub fn watch(&mut self, link: Arc<dyn Link>) {
        let role = link.role();
        let can_restart = role == BusRole::Device && self.restarter.is_some();
        self.links.push(Supervised {
            link,
            monitor: LinkMonitor::new(role, can_restart),
        });
    }

    /// Current state of the link serving `role`
    pub fn state(&self, role: BusRole) -> Option<ConnectionState> {
        self.links
            .iter()
            .find(|s| s.monitor.role() == role)
            .map(|s| s.monitor.state())
    }

    /// Run until the stop signal flips (or its sender is dropped).
    pub async fn run(
        mut self,
        mut reports: mpsc::Receiver<LinkReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            links = self.links.len(),
            interval_secs = self.config.health_interval_secs,
            "Starting connection supervisor"
        );

        let mut ticker = interval(Duration::from_secs(self.config.health_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // first tick is immediate; give connections one interval

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(report) = reports.recv() => self.handle_report(report),
                _ = ticker.tick() => {
                    self.check_links(&mut shutdown, Some(&mut reports)).await;
                    // A restart grace period may have consumed the change
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Connection supervisor stopped");
    }

    /// Feed a driver link event into the matching state machine.
    pub fn handle_report(&mut self, report: LinkReport) {
        let Some(index) = self.index_of(report.role) else {
            debug!(role = %report.role, "Link event for unsupervised bus");
            return;
        };

        let before = self.links[index].monitor.state();
        let action = self.links[index]
            .monitor
            .on_signal(&Signal::Link(report.event.clone()));
        let after = self.links[index].monitor.state();

        if before != after {
            info!(role = %report.role, from = %before, to = %after, "Connection state changed");
        }

        self.perform(index, action);
    }

    /// Probe every link once and act on the result.
    pub async fn health_check(&mut self, shutdown: &mut watch::Receiver<bool>) {
        self.check_links(shutdown, None).await;
    }

    /// Health check that keeps handling link reports while a broker
    /// restart waits out its grace period.
    async fn check_links(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        mut reports: Option<&mut mpsc::Receiver<LinkReport>>,
    ) {
        if let Some(metrics) = &self.metrics {
            let snapshot = metrics.snapshot();
            debug!(
                received = snapshot.received,
                relayed = snapshot.relayed,
                ignored = snapshot.ignored,
                dropped = snapshot.dropped,
                publish_failures = snapshot.publish_failures,
                relay_rate = snapshot.relay_rate,
                "Relay metrics"
            );
        }

        for index in 0..self.links.len() {
            if *shutdown.borrow() {
                return;
            }
            let link = Arc::clone(&self.links[index].link);
            let reachable = self.probe.is_reachable(link.endpoint()).await;

            if !reachable {
                if link.is_connected() {
                    warn!(
                        role = %link.role(),
                        endpoint = %link.endpoint(),
                        "Client reports connected but broker endpoint is unreachable"
                    );
                } else {
                    warn!(role = %link.role(), endpoint = %link.endpoint(), "Broker endpoint unreachable");
                }
            }

            let signal = if reachable { Signal::ProbeOk } else { Signal::ProbeFailed };
            let action = self.links[index].monitor.on_signal(&signal);

            if action == Action::RestartBroker {
                self.restart_broker(index, shutdown, reports.as_deref_mut()).await;
            } else {
                self.perform(index, action);
            }
        }
    }

    fn perform(&self, index: usize, action: Action) {
        match action {
            Action::None => {}
            Action::Reconnect => {
                let link = Arc::clone(&self.links[index].link);
                let delay = Duration::from_millis(self.config.reconnect_delay_ms);
                info!(role = %link.role(), delay_ms = self.config.reconnect_delay_ms, "Scheduling reconnect");
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    link.request_reconnect();
                });
            }
            Action::RestartBroker => {
                // Restarts run inline from health_check only
                debug!("Broker restart outside health check ignored");
            }
        }
    }

    async fn restart_broker(
        &mut self,
        index: usize,
        shutdown: &mut watch::Receiver<bool>,
        mut reports: Option<&mut mpsc::Receiver<LinkReport>>,
    ) {
        let Some(restarter) = self.restarter.clone() else {
            return;
        };
        let link = Arc::clone(&self.links[index].link);

        warn!(role = %link.role(), endpoint = %link.endpoint(), "Requesting broker restart");
        if let Err(e) = restarter.restart().await {
            error!(role = %link.role(), error = %e, "Broker restart failed");
            return;
        }

        let grace = tokio::time::sleep(Duration::from_millis(self.config.restart_grace_ms));
        tokio::pin!(grace);
        loop {
            tokio::select! {
                _ = &mut grace => break,
                _ = shutdown.changed() => return,
                Some(report) = next_report(&mut reports) => self.handle_report(report),
            }
        }

        let reachable = self.probe.is_reachable(link.endpoint()).await;
        if reachable {
            info!(role = %link.role(), "Broker reachable after restart");
            self.links[index].monitor.on_signal(&Signal::ProbeOk);
        } else {
            error!(role = %link.role(), "Broker still unreachable after restart");
        }
    }

    fn index_of(&self, role: BusRole) -> Option<usize> {
        self.links.iter().position(|s| s.monitor.role() == role)
    }
}

/// Next link report, or never when there is no channel to drain
async fn next_report(reports: &mut Option<&mut mpsc::Receiver<LinkReport>>) -> Option<LinkReport> {
    match reports {
        Some(reports) => reports.recv().await,
        None => std::future::pending().await,
    }
}
