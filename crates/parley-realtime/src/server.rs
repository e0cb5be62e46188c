//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use parley_auth::jwt::JwtDecoder;
use parley_core::config::AppConfig;
use parley_database::store::Stores;

use crate::bridge::publisher::EventPublisher;
use crate::connection::authenticator::WsAuthenticator;
use crate::connection::manager::ConnectionManager;
use crate::delivery::tracker::{DeliveryStats, DeliveryTracker};
use crate::dispatch::handler::MessageDispatcher;
use crate::gateway::Gateway;
use crate::message::types::OutboundEvent;
use crate::metrics::{MetricsSnapshot, RealtimeMetrics};
use crate::presence::tracker::PresenceTracker;

/// Operational snapshot of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Counters.
    pub metrics: MetricsSnapshot,
    /// Delivery tracker state.
    pub delivery: DeliveryStats,
    /// Users with a presence record.
    pub online_users: usize,
    /// Live connections.
    pub connections: usize,
    /// Non-empty rooms.
    pub rooms: usize,
}

/// Central real-time engine that coordinates all chat subsystems.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Handshake authenticator.
    pub authenticator: Arc<WsAuthenticator>,
    /// Connection lifecycle and event routing.
    pub gateway: Arc<Gateway>,
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Presence tracker.
    pub presence: Arc<PresenceTracker>,
    /// Delivery tracker.
    pub delivery: Arc<DeliveryTracker>,
    /// Message dispatcher.
    pub dispatcher: Arc<MessageDispatcher>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    config: Arc<AppConfig>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Creates a new real-time engine with all subsystems.
    pub fn new(
        config: &AppConfig,
        stores: Stores,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let metrics = Arc::new(RealtimeMetrics::new());
        let connections = Arc::new(ConnectionManager::new(
            config.realtime.clone(),
            metrics.clone(),
        ));
        let presence = Arc::new(PresenceTracker::with_last_seen_limit(
            config.presence.last_seen_capacity,
            config.presence.last_seen_low_watermark,
        ));
        let delivery = Arc::new(DeliveryTracker::new(
            &config.delivery,
            stores.messages.clone(),
            connections.clone(),
            metrics.clone(),
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            config.messaging.clone(),
            &config.broker,
            stores.membership.clone(),
            stores.messages.clone(),
            connections.clone(),
            delivery.clone(),
            metrics.clone(),
            publisher,
        ));
        let gateway = Arc::new(Gateway::new(
            config.realtime.clone(),
            connections.clone(),
            presence.clone(),
            delivery.clone(),
            dispatcher.clone(),
            stores.membership.clone(),
            stores.messages.clone(),
            metrics.clone(),
        ));
        let authenticator = Arc::new(WsAuthenticator::new(
            JwtDecoder::new(&config.auth),
            stores.users.clone(),
        ));

        info!("Real-time engine initialized");

        Self {
            authenticator,
            gateway,
            connections,
            presence,
            delivery,
            dispatcher,
            metrics,
            config: Arc::new(config.clone()),
            shutdown_tx,
        }
    }

    /// Spawn the presence and delivery sweepers.
    ///
    /// Both stop when [`Self::shutdown`] is called.
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let presence = self.presence.clone().spawn_sweeper(
            self.config.presence.sweep_interval(),
            self.config.presence.stale_after(),
            self.shutdown_tx.subscribe(),
        );
        let delivery = self
            .delivery
            .clone()
            .spawn_sweeper(self.config.delivery.sweep_interval(), self.shutdown_tx.subscribe());
        info!("Real-time background tasks started");
        vec![presence, delivery]
    }

    /// Returns a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates a graceful shutdown of the real-time engine.
    ///
    /// Stops the sweepers, tells every client, then closes all connections.
    pub fn shutdown(&self, reason: &str) -> usize {
        info!(reason, "Shutting down real-time engine");

        // No receivers means the sweepers never started.
        let _ = self.shutdown_tx.send(());

        self.connections.broadcast_all(&OutboundEvent::ServerShutdown {
            reason: reason.to_string(),
            grace_seconds: self.config.server.shutdown_grace_seconds,
        });
        let closed = self.connections.close_all();

        info!(closed, "Real-time engine shut down");
        closed
    }

    /// Operational snapshot.
    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            metrics: self.metrics.snapshot(),
            delivery: self.delivery.stats().await,
            online_users: self.presence.online_count(),
            connections: self.connections.connection_count(),
            rooms: self.connections.room_count(),
        }
    }
}
