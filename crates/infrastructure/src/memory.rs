//! 内存存储实现
//!
//! 与 PostgreSQL 实现满足相同的接口约定，用于开发模式和测试。
//! 数据随进程退出丢失。

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{
    IdentityStore, Message, MessageStore, NewMessage, RepositoryError, RepositoryResult, Room,
    RoomDirectory, RoomId, RoomMember, SequenceKey, UserRecord, Username,
};

/// 每个房间一段只追加的消息列表，序列号为列表长度加一
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    rooms: DashMap<RoomId, Vec<Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: NewMessage) -> RepositoryResult<Message> {
        let mut log = self.rooms.entry(message.room_id).or_default();
        let sequence_key = log
            .last()
            .map(|last| last.sequence_key.next())
            .unwrap_or(SequenceKey(1));
        let stored = message.into_message(sequence_key);
        log.push(stored.clone());
        Ok(stored)
    }

    async fn query_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        let Some(log) = self.rooms.get(&room_id) else {
            return Ok(Vec::new());
        };
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(log
            .iter()
            .rev()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRoomDirectory {
    rooms: DashMap<RoomId, Room>,
    members: DashMap<RoomId, Vec<RoomMember>>,
}

impl InMemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn create_room(&self, room: Room, members: Vec<RoomMember>) -> RepositoryResult<Room> {
        match self.rooms.entry(room.id) {
            Entry::Occupied(_) => return Err(RepositoryError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(room.clone());
            }
        }
        let mut list: Vec<RoomMember> = Vec::with_capacity(members.len());
        for member in members {
            if !list.iter().any(|m| m.username == member.username) {
                list.push(member);
            }
        }
        self.members.insert(room.id, list);
        Ok(room)
    }

    async fn find_room(&self, room_id: RoomId) -> RepositoryResult<Option<Room>> {
        Ok(self.rooms.get(&room_id).map(|room| room.clone()))
    }

    async fn rename_room(&self, room_id: RoomId, name: String) -> RepositoryResult<()> {
        let mut room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RepositoryError::NotFound)?;
        room.rename(name)?;
        Ok(())
    }

    async fn add_members(&self, members: Vec<RoomMember>) -> RepositoryResult<()> {
        for member in members {
            if !self.rooms.contains_key(&member.room_id) {
                return Err(RepositoryError::NotFound);
            }
            let mut list = self.members.entry(member.room_id).or_default();
            if !list.iter().any(|m| m.username == member.username) {
                list.push(member);
            }
        }
        Ok(())
    }

    async fn remove_members(
        &self,
        room_id: RoomId,
        usernames: Vec<Username>,
    ) -> RepositoryResult<()> {
        if let Some(mut list) = self.members.get_mut(&room_id) {
            list.retain(|m| !usernames.contains(&m.username));
        }
        Ok(())
    }

    async fn find_member(
        &self,
        room_id: RoomId,
        username: Username,
    ) -> RepositoryResult<Option<RoomMember>> {
        Ok(self
            .members
            .get(&room_id)
            .and_then(|list| list.iter().find(|m| m.username == username).cloned()))
    }

    async fn list_members(&self, room_id: RoomId) -> RepositoryResult<Vec<RoomMember>> {
        Ok(self
            .members
            .get(&room_id)
            .map(|list| list.clone())
            .unwrap_or_default())
    }

    async fn rooms_for_user(&self, username: Username) -> RepositoryResult<Vec<Room>> {
        let room_ids: Vec<RoomId> = self
            .members
            .iter()
            .filter(|entry| entry.value().iter().any(|m| m.username == username))
            .map(|entry| *entry.key())
            .collect();
        let mut rooms: Vec<Room> = room_ids
            .into_iter()
            .filter_map(|id| self.rooms.get(&id).map(|room| room.clone()))
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: DashMap<Username, UserRecord>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create(&self, user: UserRecord) -> RepositoryResult<UserRecord> {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn find_by_username(&self, username: Username) -> RepositoryResult<Option<UserRecord>> {
        Ok(self.users.get(&username).map(|user| user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{DisplayMode, MessageText, PasswordHash, SentimentCode, UserEmail};

    fn name(value: &str) -> Username {
        Username::parse(value).unwrap()
    }

    fn new_message(room_id: RoomId, text: &str) -> NewMessage {
        NewMessage {
            room_id,
            sender: name("alice"),
            text: MessageText::new(text).unwrap(),
            sentiment: SentimentCode::Neutral,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sequence_keys_are_per_room() {
        let store = InMemoryMessageStore::new();
        let r1 = RoomId::generate();
        let r2 = RoomId::generate();

        let a = store.append(new_message(r1, "a")).await.unwrap();
        let b = store.append(new_message(r1, "b")).await.unwrap();
        let c = store.append(new_message(r2, "c")).await.unwrap();

        assert_eq!(a.sequence_key, SequenceKey(1));
        assert_eq!(b.sequence_key, SequenceKey(2));
        assert_eq!(c.sequence_key, SequenceKey(1));
    }

    #[tokio::test]
    async fn query_page_is_newest_first() {
        let store = InMemoryMessageStore::new();
        let room = RoomId::generate();
        for i in 0..5 {
            store
                .append(new_message(room, &format!("m{i}")))
                .await
                .unwrap();
        }

        let first = store.query_page(room, 0, 2).await.unwrap();
        let texts: Vec<&str> = first.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m4", "m3"]);

        let last = store.query_page(room, 4, 2).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].text.as_str(), "m0");

        assert!(store.query_page(room, 10, 2).await.unwrap().is_empty());
        assert!(store
            .query_page(RoomId::generate(), 0, 2)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn directory_tracks_members_and_rooms() {
        let directory = InMemoryRoomDirectory::new();
        let now = Utc::now();
        let room = Room::new(RoomId::generate(), "general", name("alice"), now).unwrap();
        directory
            .create_room(
                room.clone(),
                vec![
                    RoomMember::admin(room.id, name("alice"), now),
                    RoomMember::member(room.id, name("bob"), name("alice"), now),
                ],
            )
            .await
            .unwrap();

        assert!(directory
            .find_member(room.id, name("bob"))
            .await
            .unwrap()
            .is_some());
        assert_eq!(directory.rooms_for_user(name("bob")).await.unwrap().len(), 1);

        directory
            .remove_members(room.id, vec![name("bob")])
            .await
            .unwrap();
        assert!(directory
            .find_member(room.id, name("bob"))
            .await
            .unwrap()
            .is_none());
        assert!(directory.rooms_for_user(name("bob")).await.unwrap().is_empty());

        directory
            .rename_room(room.id, "lobby".into())
            .await
            .unwrap();
        let renamed = directory.find_room(room.id).await.unwrap().unwrap();
        assert_eq!(renamed.name, "lobby");
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = InMemoryIdentityStore::new();
        let user = UserRecord::register(
            name("alice"),
            UserEmail::parse("alice@example.com").unwrap(),
            PasswordHash::new("hash").unwrap(),
            DisplayMode::Dark,
            Utc::now(),
        );
        store.create(user.clone()).await.unwrap();
        assert!(matches!(
            store.create(user).await,
            Err(RepositoryError::Conflict)
        ));
        let found = store.find_by_username(name("alice")).await.unwrap().unwrap();
        assert_eq!(found.display_mode, DisplayMode::Dark);
    }
}
