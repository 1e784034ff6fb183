//! 消息流水线：校验 → 情感标注 → 持久化 → 广播，以及历史分页读取。
//!
//! 每个房间有一条独立的串行通道（lane），同一房间的持久化与广播在通道内
//! 依次完成，保证成员收到的实时消息一定已经能从历史中读到，且顺序与序列号一致。
//! 不同房间的通道互不影响。

use std::sync::Arc;

use dashmap::DashMap;
use domain::{Message, MessageStore, MessageText, NewMessage, RoomId, Username};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use crate::clock::Clock;
use crate::dispatcher::BroadcastDispatcher;
use crate::error::ApplicationError;
use crate::events::ServerEvent;
use crate::sentiment::SentimentAnnotator;

/// 历史分页默认每页条数
pub const DEFAULT_PAGE_SIZE: u32 = 20;

pub struct MessagePipelineDependencies {
    pub store: Arc<dyn MessageStore>,
    pub annotator: SentimentAnnotator,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub page_size: u32,
}

pub struct MessagePipeline {
    deps: MessagePipelineDependencies,
    room_lanes: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl MessagePipeline {
    pub fn new(mut deps: MessagePipelineDependencies) -> Self {
        if deps.page_size == 0 {
            deps.page_size = DEFAULT_PAGE_SIZE;
        }
        Self {
            deps,
            room_lanes: DashMap::new(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.deps.page_size
    }

    fn lane(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        self.room_lanes.entry(room_id).or_default().clone()
    }

    // 没有其他提交在等待时回收该房间的通道，调用方必须先释放自己的 Arc
    fn release_lane(&self, room_id: RoomId) {
        self.room_lanes
            .remove_if(&room_id, |_, lane| Arc::strong_count(lane) == 1);
    }

    /// 提交一条消息。存储失败时直接返回错误，不会广播。
    #[instrument(skip_all, fields(room_id = %room_id, sender = %sender))]
    pub async fn submit(
        &self,
        room_id: RoomId,
        sender: Username,
        text: impl Into<String>,
    ) -> Result<Message, ApplicationError> {
        let text = MessageText::new(text)?;
        let sentiment = self.deps.annotator.annotate(text.as_str()).await;

        let new_message = NewMessage {
            room_id,
            sender,
            text,
            sentiment,
            created_at: self.deps.clock.now(),
        };

        let lane = self.lane(room_id);
        let result = {
            let _guard = lane.lock().await;
            self.persist_and_broadcast(new_message).await
        };
        drop(lane);
        self.release_lane(room_id);
        result
    }

    async fn persist_and_broadcast(&self, new_message: NewMessage) -> Result<Message, ApplicationError> {
        let room_id = new_message.room_id;
        let stored = self.deps.store.append(new_message).await.map_err(|err| {
            error!(error = %err, "message append failed, broadcast skipped");
            ApplicationError::Store(err)
        })?;

        let report = self
            .deps
            .dispatcher
            .broadcast(room_id, ServerEvent::receive_message(&stored))
            .await;
        debug!(
            sequence_key = %stored.sequence_key,
            sentiment = %stored.sentiment,
            delivered = report.delivered(),
            "message submitted"
        );
        Ok(stored)
    }

    /// 第 `page` 页历史消息（0 为最新一页），按序列号倒序。
    pub async fn history(&self, room_id: RoomId, page: u32) -> Result<Vec<Message>, ApplicationError> {
        let limit = self.deps.page_size;
        let offset = u64::from(page) * u64::from(limit);
        self.deps
            .store
            .query_page(room_id, offset, limit)
            .await
            .map_err(ApplicationError::Store)
    }
}
