//! Connection gateway: connection lifecycle and inbound event routing.
//!
//! Every inbound frame passes the rate limiter and frame validation before
//! it reaches a handler. Handler results are resolved through a
//! [`ReplyHandle`], which answers `ack` requests and reports failures.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use parley_core::config::RealtimeConfig;
use parley_core::error::AppError;
use parley_core::result::AppResult;
use parley_core::types::{ConnectionId, GroupId, MessageId};
use parley_database::store::{MembershipStore, MessageStore};
use parley_entity::UserIdentity;

use crate::connection::handle::ConnectionHandle;
use crate::connection::manager::ConnectionManager;
use crate::connection::rate_limit::RateLimiter;
use crate::delivery::tracker::DeliveryTracker;
use crate::dispatch::handler::MessageDispatcher;
use crate::message::types::{AckReply, InboundEvent, OutboundEvent};
use crate::message::validator::{parse_frame, validate_frame, validate_message_ids};
use crate::metrics::RealtimeMetrics;
use crate::presence::broadcast::PresenceBroadcaster;
use crate::presence::tracker::PresenceTracker;

/// Where the outcome of one inbound request goes.
#[derive(Debug)]
pub struct ReplyHandle {
    conn: Arc<ConnectionHandle>,
    ack: Option<u64>,
    temp_id: Option<String>,
}

impl ReplyHandle {
    fn new(conn: Arc<ConnectionHandle>, ack: Option<u64>) -> Self {
        Self {
            conn,
            ack,
            temp_id: None,
        }
    }

    fn with_temp_id(mut self, temp_id: Option<String>) -> Self {
        self.temp_id = temp_id;
        self
    }

    /// Answer the request.
    ///
    /// With an `ack`, success and failure both produce an `ack` frame.
    /// Without one, only failures are reported, as an `error` event.
    pub fn resolve(self, result: AppResult<serde_json::Value>) {
        if let Err(e) = &result {
            log_failure(&self.conn, e);
        }
        let event = match (self.ack, result) {
            (Some(ack), Ok(data)) => OutboundEvent::Ack(AckReply::success(ack, data, self.temp_id)),
            (Some(ack), Err(e)) => OutboundEvent::Ack(AckReply::failure(ack, &e, self.temp_id)),
            (None, Ok(_)) => return,
            (None, Err(e)) => OutboundEvent::from_error(&e),
        };
        self.conn.send(event);
    }
}

fn log_failure(conn: &ConnectionHandle, err: &AppError) {
    if err.is_client_error() {
        debug!(conn_id = %conn.id, error = %err, "Request rejected");
    } else {
        error!(conn_id = %conn.id, user_id = %conn.user_id(), error = %err, "Request failed");
    }
}

/// Binds authenticated connections to users and routes their events.
pub struct Gateway {
    config: RealtimeConfig,
    connections: Arc<ConnectionManager>,
    presence: Arc<PresenceTracker>,
    broadcaster: PresenceBroadcaster,
    delivery: Arc<DeliveryTracker>,
    dispatcher: Arc<MessageDispatcher>,
    membership: Arc<dyn MembershipStore>,
    messages: Arc<dyn MessageStore>,
    rate_limiter: RateLimiter,
    metrics: Arc<RealtimeMetrics>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("connections", &self.connections.connection_count())
            .finish()
    }
}

impl Gateway {
    /// Create a new gateway.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RealtimeConfig,
        connections: Arc<ConnectionManager>,
        presence: Arc<PresenceTracker>,
        delivery: Arc<DeliveryTracker>,
        dispatcher: Arc<MessageDispatcher>,
        membership: Arc<dyn MembershipStore>,
        messages: Arc<dyn MessageStore>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        let broadcaster =
            PresenceBroadcaster::new(membership.clone(), presence.clone(), connections.clone());
        let rate_limiter = RateLimiter::new(&config.rate_limit);
        Self {
            config,
            connections,
            presence,
            broadcaster,
            delivery,
            dispatcher,
            membership,
            messages,
            rate_limiter,
            metrics,
        }
    }

    /// Register a connection for an authenticated user.
    ///
    /// The caller must start draining the receiver before [`Self::on_connect`].
    pub fn open(
        &self,
        user: UserIdentity,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundEvent>) {
        self.connections.register(user)
    }

    /// Bring a freshly opened connection up to date.
    ///
    /// Joins one room per active membership, marks the user online, pushes
    /// messages still waiting for the user, acknowledges the connection,
    /// and tells direct-chat counterparts.
    pub async fn on_connect(&self, handle: &Arc<ConnectionHandle>) -> AppResult<Vec<GroupId>> {
        let user_id = handle.user_id();

        let memberships = match self.membership.active_memberships(user_id).await {
            Ok(memberships) => memberships,
            Err(e) => {
                self.connections.unregister(&handle.id);
                return Err(e);
            }
        };
        let groups: Vec<GroupId> = memberships.iter().map(|m| m.group_id).collect();
        for group_id in &groups {
            self.connections.join_room(handle.id, *group_id);
        }

        self.presence.set_online(user_id, handle.id);

        match self.messages.find_undelivered(&groups, user_id).await {
            Ok(pending) if !pending.is_empty() => {
                let mut ids = Vec::with_capacity(pending.len());
                for message in pending {
                    let id = message.id;
                    if !handle.send_wait(OutboundEvent::NewMessage { message }).await {
                        break;
                    }
                    ids.push(id);
                }
                if ids.is_empty() {
                    debug!(user_id = %user_id, "Connection closed before queued messages went out");
                } else if let Err(e) = self.delivery.mark_delivered(user_id, &ids).await {
                    warn!(user_id = %user_id, error = %e, "Failed to confirm queued messages");
                } else {
                    debug!(user_id = %user_id, count = ids.len(), "Queued messages delivered");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "Failed to load queued messages"),
        }

        handle
            .send_wait(OutboundEvent::Connected {
                user_id,
                connection_id: handle.id,
                groups: groups.clone(),
                server_time: Utc::now(),
            })
            .await;

        self.broadcaster.broadcast(user_id).await;

        info!(
            conn_id = %handle.id,
            user_id = %user_id,
            groups = groups.len(),
            "Connection ready"
        );
        Ok(groups)
    }

    /// Register and bring up a connection in one step.
    ///
    /// Queued messages are pushed before the receiver is returned, so they
    /// must fit in the connection buffer.
    pub async fn connect(
        &self,
        user: UserIdentity,
    ) -> AppResult<(Arc<ConnectionHandle>, mpsc::Receiver<OutboundEvent>)> {
        let (handle, rx) = self.open(user);
        self.on_connect(&handle).await?;
        Ok((handle, rx))
    }

    /// Tear down a connection. Safe to call more than once.
    ///
    /// The user goes offline only when their last connection closes.
    pub async fn on_disconnect(&self, conn_id: &ConnectionId, reason: &str) {
        let Some(gone) = self.connections.unregister(conn_id) else {
            return;
        };
        let user_id = gone.handle.user_id();
        info!(conn_id = %conn_id, user_id = %user_id, reason, "Connection closed");

        match gone.remaining.first() {
            Some(next) => {
                self.presence.set_online(user_id, next.id);
            }
            None => {
                self.presence.set_offline(user_id);
                self.rate_limiter.reset(user_id);
                self.broadcaster.broadcast(user_id).await;
            }
        }
    }

    /// Record transport-level activity (ping/pong) on a live connection.
    pub async fn on_activity(&self, conn_id: &ConnectionId) {
        if let Some(conn) = self.connections.get(conn_id) {
            self.refresh_presence(&conn).await;
        }
    }

    /// Touch the user's presence record, restoring it if the stale sweep
    /// evicted it while this connection stayed open.
    async fn refresh_presence(&self, conn: &ConnectionHandle) {
        let user_id = conn.user_id();
        if self.presence.touch(user_id) {
            return;
        }
        self.presence.set_online(user_id, conn.id);
        debug!(conn_id = %conn.id, user_id = %user_id, "Presence restored by activity");
        self.broadcaster.broadcast(user_id).await;
    }

    /// Handle one raw inbound frame.
    pub async fn handle_inbound(&self, conn_id: &ConnectionId, raw: &str) {
        let Some(conn) = self.connections.get(conn_id) else {
            return;
        };
        self.metrics.event_received();

        if let Err(e) = self.rate_limiter.check(conn.user_id()) {
            self.metrics.event_rate_limited();
            conn.send(OutboundEvent::from_error(&e));
            return;
        }

        let parsed =
            validate_frame(raw, self.config.max_frame_bytes).and_then(|()| parse_frame(raw));
        let frame = match parsed {
            Ok(frame) => frame,
            Err(e) => {
                conn.send(OutboundEvent::from_error(&e));
                return;
            }
        };

        self.refresh_presence(&conn).await;
        debug!(conn_id = %conn_id, event = frame.event.name(), "Inbound event");

        let reply = ReplyHandle::new(conn.clone(), frame.ack);
        self.route(conn, frame.event, reply).await;
    }

    async fn route(&self, conn: Arc<ConnectionHandle>, event: InboundEvent, reply: ReplyHandle) {
        let user_id = conn.user_id();
        let result = match event {
            InboundEvent::SendMessage(draft) => {
                let reply = reply.with_temp_id(draft.temp_id.clone());
                match self.dispatcher.send_message(user_id, draft).await {
                    Ok(message) => reply.resolve(Ok(json!({ "message": message }))),
                    Err(e) => {
                        conn.send(OutboundEvent::MessageError {
                            temp_id: reply.temp_id.clone(),
                            code: e.kind.code().to_string(),
                            reason: e.client_message(),
                        });
                        if reply.ack.is_some() {
                            reply.resolve(Err(e));
                        } else {
                            log_failure(&conn, &e);
                        }
                    }
                }
                return;
            }
            InboundEvent::EditMessage {
                message_id,
                content,
            } => self
                .dispatcher
                .edit_message(user_id, message_id, &content)
                .await
                .and_then(|m| serde_json::to_value(m).map_err(AppError::from)),
            InboundEvent::DeleteMessage { message_id } => self
                .dispatcher
                .delete_message(user_id, message_id)
                .await
                .map(|()| json!({ "message_id": message_id })),
            InboundEvent::RecallMessage { message_id } => self
                .dispatcher
                .recall_message(user_id, message_id)
                .await
                .map(|()| json!({ "message_id": message_id })),
            InboundEvent::JoinGroup { group_id } => self.join_group(&conn, group_id).await,
            InboundEvent::LeaveGroup { group_id } => Ok(self.leave_group(&conn, group_id)),
            InboundEvent::TypingStart { group_id } => self.typing(&conn, group_id, true),
            InboundEvent::TypingStop { group_id } => self.typing(&conn, group_id, false),
            InboundEvent::UpdateStatus { status } => self.update_status(&conn, &status).await,
            InboundEvent::MessageDelivered { message_ids } => {
                self.confirm(&conn, &message_ids, None, false).await
            }
            InboundEvent::MessageRead {
                message_ids,
                group_id,
            } => self.confirm(&conn, &message_ids, group_id, true).await,
            InboundEvent::GetOnlineUsers { group_id } => self.online_users(&conn, group_id).await,
        };
        reply.resolve(result);
    }

    async fn join_group(
        &self,
        conn: &ConnectionHandle,
        group_id: GroupId,
    ) -> AppResult<serde_json::Value> {
        let user_id = conn.user_id();
        let group = self
            .membership
            .find_group(group_id)
            .await?
            .ok_or_else(|| AppError::not_found("Group not found"))?;
        if !group.is_active {
            return Err(AppError::forbidden("Group is no longer active"));
        }
        let is_member = self
            .membership
            .find_membership(group_id, user_id)
            .await?
            .is_some_and(|m| m.is_active);
        if !is_member {
            return Err(AppError::forbidden("You are not a member of this group"));
        }

        if self.connections.join_room(conn.id, group_id) {
            self.connections.broadcast_to_group(
                &group_id,
                &OutboundEvent::UserJoinedGroup {
                    group_id,
                    user_id,
                    name: conn.user.name.clone(),
                },
                Some(user_id),
            );
        }
        Ok(json!({ "group_id": group_id }))
    }

    fn leave_group(&self, conn: &ConnectionHandle, group_id: GroupId) -> serde_json::Value {
        let user_id = conn.user_id();
        if self.connections.leave_room(conn.id, group_id) {
            self.connections.broadcast_to_group(
                &group_id,
                &OutboundEvent::UserLeftGroup { group_id, user_id },
                Some(user_id),
            );
        }
        json!({ "group_id": group_id })
    }

    fn typing(
        &self,
        conn: &ConnectionHandle,
        group_id: GroupId,
        started: bool,
    ) -> AppResult<serde_json::Value> {
        if !self.connections.is_subscribed(conn.id, &group_id) {
            return Err(AppError::forbidden("You have not joined this group"));
        }
        let user_id = conn.user_id();
        let event = if started {
            OutboundEvent::UserTyping {
                group_id,
                user_id,
                name: conn.user.name.clone(),
            }
        } else {
            OutboundEvent::UserStoppedTyping { group_id, user_id }
        };
        self.connections
            .broadcast_to_group(&group_id, &event, Some(user_id));
        Ok(serde_json::Value::Null)
    }

    async fn update_status(
        &self,
        conn: &ConnectionHandle,
        status: &str,
    ) -> AppResult<serde_json::Value> {
        let record = self.presence.update_status(conn.user_id(), status)?;
        self.broadcaster.broadcast(conn.user_id()).await;
        Ok(json!({ "status": record.status }))
    }

    async fn confirm(
        &self,
        conn: &ConnectionHandle,
        message_ids: &[MessageId],
        group_id: Option<GroupId>,
        read: bool,
    ) -> AppResult<serde_json::Value> {
        validate_message_ids(message_ids)?;
        let user_id = conn.user_id();
        let visible = self.dispatcher.visible_message_ids(user_id, message_ids).await?;
        let confirmed = if read {
            self.delivery.mark_read(user_id, &visible, group_id).await?
        } else {
            self.delivery.mark_delivered(user_id, &visible).await?
        };
        Ok(json!({ "confirmed": confirmed }))
    }

    async fn online_users(
        &self,
        conn: &ConnectionHandle,
        group_id: GroupId,
    ) -> AppResult<serde_json::Value> {
        let is_member = self
            .membership
            .find_membership(group_id, conn.user_id())
            .await?
            .is_some_and(|m| m.is_active);
        if !is_member {
            return Err(AppError::forbidden("You are not a member of this group"));
        }

        let users: Vec<serde_json::Value> = self
            .membership
            .active_members(group_id)
            .await?
            .into_iter()
            .filter(|m| self.presence.is_online(m.user_id))
            .map(|m| {
                json!({
                    "user_id": m.user_id,
                    "status": self.presence.get_status(m.user_id),
                })
            })
            .collect();
        Ok(json!({ "group_id": group_id, "users": users }))
    }

    /// Connection manager backing this gateway.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Users currently tracked by the rate limiter.
    pub fn rate_limited_users(&self) -> usize {
        self.rate_limiter.tracked_users()
    }
}
