//! 房间成员表
//!
//! 只记录当前在线连接订阅了哪些房间，与房间目录里的持久成员关系无关。
//! 调用方负责在 `join` 之前完成授权检查。
//!
//! 两张索引互为镜像：`connections` 为每条连接记录所在房间，`rooms` 为每个房间
//! 记录在线连接。加锁顺序固定为先 `connections` 后 `rooms`，同一连接的
//! join/leave/on_disconnect 因此在该连接的条目上串行化。

use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{ConnectionId, RoomId};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RoomMembershipTable {
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    connections: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomMembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入房间，已在房间中时不做任何事。返回是否为新加入。
    pub fn join(&self, room_id: RoomId, connection_id: ConnectionId) -> bool {
        let mut joined = self.connections.entry(connection_id).or_default();
        if !joined.insert(room_id) {
            return false;
        }
        self.rooms.entry(room_id).or_default().insert(connection_id);
        debug!(%room_id, %connection_id, "connection joined room");
        true
    }

    /// 离开房间，不在房间中时不做任何事。返回是否确实离开。
    pub fn leave(&self, room_id: RoomId, connection_id: ConnectionId) -> bool {
        let Entry::Occupied(mut joined) = self.connections.entry(connection_id) else {
            return false;
        };
        if !joined.get_mut().remove(&room_id) {
            return false;
        }
        self.remove_from_room(room_id, connection_id);
        if joined.get().is_empty() {
            joined.remove();
        }
        debug!(%room_id, %connection_id, "connection left room");
        true
    }

    /// 连接断开：一次性从所有房间移除，返回它之前所在的房间。
    pub fn on_disconnect(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        let Entry::Occupied(joined) = self.connections.entry(connection_id) else {
            return Vec::new();
        };
        let rooms: Vec<RoomId> = joined.get().iter().copied().collect();
        for room_id in &rooms {
            self.remove_from_room(*room_id, connection_id);
        }
        joined.remove();
        debug!(%connection_id, rooms = rooms.len(), "connection removed from all rooms");
        rooms
    }

    /// 房间当前成员的快照，返回后成员可能立刻变化。
    pub fn members_of(&self, room_id: RoomId) -> HashSet<ConnectionId> {
        self.rooms
            .get(&room_id)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, connection_id: ConnectionId) -> HashSet<RoomId> {
        self.connections
            .get(&connection_id)
            .map(|rooms| rooms.clone())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room_id: RoomId, connection_id: ConnectionId) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|rooms| rooms.contains(&room_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn remove_from_room(&self, room_id: RoomId, connection_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(&room_id) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(&room_id, |_, members| members.is_empty());
    }
}
