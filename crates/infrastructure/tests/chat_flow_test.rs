//! 内存存储上的端到端聊天流程：加入、发消息、历史分页、断开。

use std::sync::Arc;
use std::time::Duration;

use application::{
    ApplicationError, BroadcastDispatcher, ChatService, ChatServiceDependencies, ClassifierError,
    ClientEvent,
    ConnectionRegistry, CreateRoomRequest, MessagePipeline, MessagePipelineDependencies,
    RoomMembershipTable, RoomService, RoomServiceDependencies, SentimentAnnotator,
    SentimentClassifier, ServerEvent, SystemClock, DEFAULT_PAGE_SIZE,
};
use async_trait::async_trait;
use domain::{
    ConnectionId, Message, MessageStore, NewMessage, RepositoryError, RepositoryResult, Room,
    RoomDirectory, RoomId, RoomMember, SentimentCode, Username,
};
use infrastructure::{
    InMemoryIdentityStore, InMemoryMessageStore, InMemoryRoomDirectory, LexiconClassifier,
};
use tokio::sync::mpsc;

/// 文本包含 "slow" 时卡住，其余交给内置词典
struct SlowOnMarker {
    inner: LexiconClassifier,
}

impl SentimentClassifier for SlowOnMarker {
    fn classify(&self, text: &str) -> Result<SentimentCode, ClassifierError> {
        if text.contains("slow") {
            std::thread::sleep(Duration::from_millis(400));
        }
        self.inner.classify(text)
    }
}

struct FailingStore;

#[async_trait]
impl MessageStore for FailingStore {
    async fn append(&self, _message: NewMessage) -> RepositoryResult<Message> {
        Err(RepositoryError::storage("disk unavailable"))
    }

    async fn query_page(
        &self,
        _room_id: RoomId,
        _offset: u64,
        _limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        Ok(Vec::new())
    }
}

/// 文本包含 "stall" 的追加卡住 500ms
#[derive(Default)]
struct StallingStore {
    inner: InMemoryMessageStore,
}

#[async_trait]
impl MessageStore for StallingStore {
    async fn append(&self, message: NewMessage) -> RepositoryResult<Message> {
        if message.text.as_str().contains("stall") {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        self.inner.append(message).await
    }

    async fn query_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        self.inner.query_page(room_id, offset, limit).await
    }
}

/// 成员查询先读结果，再拖延 100ms 才返回
#[derive(Default)]
struct SlowDirectory {
    inner: InMemoryRoomDirectory,
}

#[async_trait]
impl RoomDirectory for SlowDirectory {
    async fn create_room(&self, room: Room, members: Vec<RoomMember>) -> RepositoryResult<Room> {
        self.inner.create_room(room, members).await
    }

    async fn find_room(&self, room_id: RoomId) -> RepositoryResult<Option<Room>> {
        self.inner.find_room(room_id).await
    }

    async fn rename_room(&self, room_id: RoomId, name: String) -> RepositoryResult<()> {
        self.inner.rename_room(room_id, name).await
    }

    async fn add_members(&self, members: Vec<RoomMember>) -> RepositoryResult<()> {
        self.inner.add_members(members).await
    }

    async fn remove_members(
        &self,
        room_id: RoomId,
        usernames: Vec<Username>,
    ) -> RepositoryResult<()> {
        self.inner.remove_members(room_id, usernames).await
    }

    async fn find_member(
        &self,
        room_id: RoomId,
        username: Username,
    ) -> RepositoryResult<Option<RoomMember>> {
        let found = self.inner.find_member(room_id, username).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        found
    }

    async fn list_members(&self, room_id: RoomId) -> RepositoryResult<Vec<RoomMember>> {
        self.inner.list_members(room_id).await
    }

    async fn rooms_for_user(&self, username: Username) -> RepositoryResult<Vec<Room>> {
        self.inner.rooms_for_user(username).await
    }
}

struct Harness {
    chat: Arc<ChatService>,
    rooms: RoomService,
    dispatcher: Arc<BroadcastDispatcher>,
    membership: Arc<RoomMembershipTable>,
}

fn build_harness(store: Arc<dyn MessageStore>, directory: Arc<dyn RoomDirectory>) -> Harness {
    let registry = Arc::new(ConnectionRegistry::new(Duration::from_millis(200)));
    let membership = Arc::new(RoomMembershipTable::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(
        registry.clone(),
        membership.clone(),
    ));
    let classifier = Arc::new(SlowOnMarker {
        inner: LexiconClassifier::builtin(),
    });
    let pipeline = Arc::new(MessagePipeline::new(MessagePipelineDependencies {
        store,
        annotator: SentimentAnnotator::new(classifier, Duration::from_millis(50)),
        dispatcher: dispatcher.clone(),
        clock: Arc::new(SystemClock),
        page_size: DEFAULT_PAGE_SIZE,
    }));
    let chat = Arc::new(ChatService::new(ChatServiceDependencies {
        registry,
        membership: membership.clone(),
        dispatcher: dispatcher.clone(),
        pipeline,
        directory: directory.clone(),
    }));
    let rooms = RoomService::new(RoomServiceDependencies {
        directory,
        identities: Arc::new(InMemoryIdentityStore::new()),
        clock: Arc::new(SystemClock),
    });
    Harness {
        chat,
        rooms,
        dispatcher,
        membership,
    }
}

fn harness_with_store(store: Arc<dyn MessageStore>) -> Harness {
    build_harness(store, Arc::new(InMemoryRoomDirectory::new()))
}

fn harness() -> Harness {
    harness_with_store(Arc::new(InMemoryMessageStore::new()))
}

fn name(value: &str) -> Username {
    Username::parse(value).unwrap()
}

impl Harness {
    async fn room(&self, owner: &str, members: &[&str]) -> RoomId {
        self.rooms
            .create_room(CreateRoomRequest {
                creator: name(owner),
                name: format!("{owner}'s room"),
                members: members.iter().map(|m| m.to_string()).collect(),
            })
            .await
            .unwrap()
            .room
            .id
    }

    async fn connect(&self, user: &str) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let id = self.chat.connect(name(user), tx).await;
        (id, rx)
    }
}

fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn texts(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}

#[tokio::test]
async fn history_returns_most_recent_first() {
    let h = harness();
    let r1 = h.room("alice", &["bob"]).await;
    let (alice, _rx) = h.connect("alice").await;
    h.chat.join_room(alice, r1).await.unwrap();

    h.chat.send_message(alice, r1, "hi".into()).await.unwrap();
    h.chat
        .send_message(alice, r1, "great job!".into())
        .await
        .unwrap();

    let page = h.chat.history(&name("alice"), r1, 0).await.unwrap();
    assert_eq!(texts(&page), vec!["great job!", "hi"]);
    assert_eq!(page[0].sentiment, SentimentCode::VeryPositive);
    assert_eq!(page[1].sentiment, SentimentCode::Neutral);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_get_strictly_increasing_keys_in_delivery_order() {
    let h = harness();
    let room = h.room("alice", &["bob"]).await;
    let (alice, _rx_a) = h.connect("alice").await;
    let (bob, mut rx_b) = h.connect("bob").await;
    h.chat.join_room(alice, room).await.unwrap();
    h.chat.join_room(bob, room).await.unwrap();
    drain(&mut rx_b);

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let chat = h.chat.clone();
            tokio::spawn(async move {
                chat.send_message(alice, room, format!("message {i}"))
                    .await
                    .unwrap()
            })
        })
        .collect();
    let mut keys = Vec::new();
    for task in tasks {
        keys.push(task.await.unwrap().sequence_key.value());
    }
    keys.sort_unstable();
    assert_eq!(keys, (1..=40).collect::<Vec<i64>>());

    let delivered: Vec<i64> = drain(&mut rx_b)
        .into_iter()
        .filter_map(|event| match event {
            ServerEvent::ReceiveMessage(m) => Some(m.sequence_key.value()),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, (1..=40).collect::<Vec<i64>>());
}

#[tokio::test]
async fn pages_are_bounded_and_room_scoped() {
    let h = harness();
    let r1 = h.room("alice", &[]).await;
    let r2 = h.room("alice", &[]).await;
    let (alice, _rx) = h.connect("alice").await;

    for i in 0..25 {
        h.chat
            .send_message(alice, r1, format!("r1-{i}"))
            .await
            .unwrap();
    }
    for i in 0..3 {
        h.chat
            .send_message(alice, r2, format!("r2-{i}"))
            .await
            .unwrap();
    }

    let first = h.chat.history(&name("alice"), r1, 0).await.unwrap();
    let second = h.chat.history(&name("alice"), r1, 1).await.unwrap();
    let third = h.chat.history(&name("alice"), r1, 2).await.unwrap();
    assert_eq!(first.len(), DEFAULT_PAGE_SIZE as usize);
    assert_eq!(second.len(), 5);
    assert!(third.is_empty());
    assert!(first.iter().chain(second.iter()).all(|m| m.room_id == r1));
    assert_eq!(first[0].text.as_str(), "r1-24");
    assert_eq!(second.last().unwrap().text.as_str(), "r1-0");
    assert!(first
        .windows(2)
        .all(|pair| pair[0].sequence_key > pair[1].sequence_key));
}

#[tokio::test]
async fn classifier_timeout_still_delivers_with_fallback() {
    let h = harness();
    let r2 = h.room("alice", &["bob"]).await;
    let (alice, _rx_a) = h.connect("alice").await;
    let (bob, mut rx_b) = h.connect("bob").await;
    h.chat.join_room(alice, r2).await.unwrap();
    h.chat.join_room(bob, r2).await.unwrap();
    drain(&mut rx_b);

    let stored = h
        .chat
        .send_message(alice, r2, "this is slow".into())
        .await
        .unwrap();
    assert_eq!(stored.sentiment, SentimentCode::Unknown);

    let events = drain(&mut rx_b);
    assert!(events.iter().any(|event| matches!(
        event,
        ServerEvent::ReceiveMessage(m) if m.sentiment == SentimentCode::Unknown && m.glyph == "\u{2754}"
    )));

    let page = h.chat.history(&name("bob"), r2, 0).await.unwrap();
    assert_eq!(page[0].sequence_key, stored.sequence_key);
}

#[tokio::test]
async fn disconnected_connection_is_excluded_from_broadcast() {
    let h = harness();
    let r1 = h.room("carol", &["dave"]).await;
    let r2 = h.room("carol", &[]).await;
    let (c, _rx_c) = h.connect("carol").await;
    let (d, mut rx_d) = h.connect("dave").await;
    h.chat.join_room(c, r1).await.unwrap();
    h.chat.join_room(c, r2).await.unwrap();
    h.chat.join_room(d, r1).await.unwrap();
    drain(&mut rx_d);

    h.chat.disconnect(c).await;
    assert!(!h.membership.members_of(r1).contains(&c));
    assert!(!h.membership.members_of(r2).contains(&c));

    let events = drain(&mut rx_d);
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::LeaveRoomAnnouncement(a)] if a.username == name("carol") && a.room == r1
    ));

    let report = h
        .dispatcher
        .broadcast(r1, ServerEvent::joined(name("dave"), r1))
        .await;
    assert!(!report.contains(c));
    assert!(report.failed().is_empty());
    assert_eq!(report.delivered(), 1);
}

#[tokio::test]
async fn non_member_cannot_join_or_send() {
    let h = harness();
    let room = h.room("alice", &[]).await;
    let (mallory, mut rx) = h.connect("mallory").await;

    let join = ClientEvent::JoinRoom {
        username: Some("alice".into()),
        room,
    };
    let err = h.chat.handle_event(mallory, join).await.unwrap_err();
    assert_eq!(err.code(), "AUTHORIZATION_ERROR");
    assert!(h.membership.members_of(room).is_empty());

    let send = ClientEvent::SendMessage {
        username: Some("alice".into()),
        room,
        message: "let me in".into(),
    };
    assert!(h.chat.handle_event(mallory, send).await.is_err());
    assert!(h
        .chat
        .history(&name("alice"), room, 0)
        .await
        .unwrap()
        .is_empty());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|event| matches!(event, ServerEvent::Error(_))));
}

#[tokio::test]
async fn client_supplied_username_is_ignored() {
    let h = harness();
    let room = h.room("alice", &["bob"]).await;
    let (bob, mut rx) = h.connect("bob").await;
    h.chat.join_room(bob, room).await.unwrap();
    drain(&mut rx);

    let send = ClientEvent::SendMessage {
        username: Some("alice".into()),
        room,
        message: "hello".into(),
    };
    h.chat.handle_event(bob, send).await.unwrap();

    match drain(&mut rx).as_slice() {
        [ServerEvent::ReceiveMessage(m)] => assert_eq!(m.username, name("bob")),
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn store_failure_never_reaches_room_members() {
    let h = harness_with_store(Arc::new(FailingStore));
    let room = h.room("alice", &["bob"]).await;
    let (alice, mut rx_a) = h.connect("alice").await;
    let (bob, mut rx_b) = h.connect("bob").await;
    h.chat.join_room(alice, room).await.unwrap();
    h.chat.join_room(bob, room).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    let send = ClientEvent::SendMessage {
        username: None,
        room,
        message: "will not persist".into(),
    };
    assert!(h.chat.handle_event(alice, send).await.is_err());

    assert!(drain(&mut rx_b).is_empty());
    assert!(matches!(
        drain(&mut rx_a).as_slice(),
        [ServerEvent::Error(notice)] if notice.code == "STORE_ERROR"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_room_does_not_hold_up_other_rooms() {
    let h = harness_with_store(Arc::new(StallingStore::default()));
    let stalled_room = h.room("alice", &[]).await;
    let busy_room = h.room("alice", &["bob"]).await;
    let (alice, _rx_a) = h.connect("alice").await;
    let (bob, mut rx_b) = h.connect("bob").await;
    h.chat.join_room(bob, busy_room).await.unwrap();
    drain(&mut rx_b);

    let stalled = {
        let chat = h.chat.clone();
        tokio::spawn(async move {
            chat.send_message(alice, stalled_room, "stall please".into())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let submits: Vec<_> = (0..5)
        .map(|i| {
            let chat = h.chat.clone();
            tokio::spawn(async move {
                chat.send_message(alice, busy_room, format!("busy {i}"))
                    .await
            })
        })
        .collect();
    let results = tokio::time::timeout(
        Duration::from_millis(250),
        futures::future::join_all(submits),
    )
    .await
    .expect("busy room waited on the stalled room");
    for result in results {
        result.unwrap().unwrap();
    }
    assert!(!stalled.is_finished());

    let page = h.chat.history(&name("bob"), busy_room, 0).await.unwrap();
    assert_eq!(page.len(), 5);
    assert!(page.iter().all(|m| m.room_id == busy_room));
    let delivered = drain(&mut rx_b)
        .into_iter()
        .filter(|event| matches!(event, ServerEvent::ReceiveMessage(_)))
        .count();
    assert_eq!(delivered, 5);

    let slow = stalled.await.unwrap().unwrap();
    assert_eq!(slow.room_id, stalled_room);
}

#[tokio::test]
async fn revocation_during_pending_join_removes_access() {
    let directory = Arc::new(SlowDirectory::default());
    let h = build_harness(Arc::new(InMemoryMessageStore::new()), directory.clone());
    let room = h.room("alice", &["bob"]).await;
    let (bob, _rx_b) = h.connect("bob").await;

    let join = {
        let chat = h.chat.clone();
        tokio::spawn(async move { chat.join_room(bob, room).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    directory
        .remove_members(room, vec![name("bob")])
        .await
        .unwrap();
    let revoked = h.chat.revoke(room, &[name("bob")]).await;

    // 成员查询在移除之前已经返回，加入先完成，随后被撤销
    assert!(join.await.unwrap().unwrap());
    assert_eq!(revoked, 1);
    assert!(!h.membership.is_member(room, bob));
    assert!(h.membership.members_of(room).is_empty());
}

#[tokio::test]
async fn disconnect_during_pending_join_leaves_no_member_entry() {
    let h = build_harness(
        Arc::new(InMemoryMessageStore::new()),
        Arc::new(SlowDirectory::default()),
    );
    let room = h.room("alice", &["bob"]).await;
    let (bob, _rx_b) = h.connect("bob").await;

    let join = {
        let chat = h.chat.clone();
        tokio::spawn(async move { chat.join_room(bob, room).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.chat.disconnect(bob).await;

    let result = join.await.unwrap();
    assert!(matches!(result, Err(ApplicationError::NotConnected(id)) if id == bob));
    assert!(h.membership.members_of(room).is_empty());
    assert!(h.membership.rooms_of(bob).is_empty());
}
