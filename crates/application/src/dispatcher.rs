//! 广播分发器
//!
//! 对房间成员快照中的每条连接独立、并发地投递事件。
//! 单个成员投递失败只记录日志，不影响其他成员。
//! 出站缓冲持续写满而超时的连接会被注销并移出所有房间，避免拖慢之后的每次广播。

use std::sync::Arc;

use domain::{ConnectionId, RoomId};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::events::ServerEvent;
use crate::membership::RoomMembershipTable;
use crate::registry::{ConnectionRegistry, DeliveryError};

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub connection_id: ConnectionId,
    pub result: Result<(), DeliveryError>,
}

/// 一次广播中每条连接的投递结果
#[derive(Debug, Clone)]
pub struct BroadcastReport {
    pub room_id: RoomId,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> Vec<&DeliveryOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err()).collect()
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.connection_id == connection_id)
    }
}

pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
    membership: Arc<RoomMembershipTable>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, membership: Arc<RoomMembershipTable>) -> Self {
        Self {
            registry,
            membership,
        }
    }

    pub async fn broadcast(&self, room_id: RoomId, event: ServerEvent) -> BroadcastReport {
        let report = self.deliver(room_id, event).await;

        for outcome in &report.outcomes {
            if let Err(DeliveryError::Timeout(connection_id)) = outcome.result {
                self.evict(connection_id).await;
            }
        }
        report
    }

    async fn deliver(&self, room_id: RoomId, event: ServerEvent) -> BroadcastReport {
        let members = self.membership.members_of(room_id);
        let kind = event.name();

        let sends = members.into_iter().map(|connection_id| {
            let event = event.clone();
            async move {
                let result = self.registry.send(connection_id, event).await;
                DeliveryOutcome {
                    connection_id,
                    result,
                }
            }
        });
        let outcomes = join_all(sends).await;

        for outcome in &outcomes {
            if let Err(err) = &outcome.result {
                warn!(%room_id, connection_id = %outcome.connection_id, event = kind, error = %err, "delivery dropped");
            }
        }

        let report = BroadcastReport { room_id, outcomes };
        debug!(
            %room_id,
            event = kind,
            attempted = report.attempted(),
            delivered = report.delivered(),
            "broadcast finished"
        );
        report
    }

    // 注销后发送端被丢弃，连接的写任务随之结束
    async fn evict(&self, connection_id: ConnectionId) {
        let Some(username) = self.registry.unregister(connection_id).await else {
            return;
        };
        let rooms = self.membership.on_disconnect(connection_id);
        warn!(%connection_id, %username, rooms = rooms.len(), "stalled connection evicted");

        for room_id in rooms {
            self.deliver(room_id, ServerEvent::left(username.clone(), room_id))
                .await;
        }
    }
}
