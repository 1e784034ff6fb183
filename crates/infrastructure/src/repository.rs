use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    DisplayMode, IdentityStore, Message, MessageStore, MessageText, NewMessage, PasswordHash,
    RepositoryError, RepositoryResult, Room, RoomDirectory, RoomId, RoomMember, SentimentCode,
    SequenceKey, UserEmail, UserRecord, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn parse_username(value: String) -> Result<Username, RepositoryError> {
    Username::parse(value).map_err(|err| invalid_data(err.to_string()))
}

#[derive(Debug, FromRow)]
struct UserRow {
    username: String,
    email: String,
    password_hash: String,
    display_mode: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = RepositoryError;

    fn try_from(value: UserRow) -> Result<Self, Self::Error> {
        Ok(UserRecord {
            username: parse_username(value.username)?,
            email: UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?,
            password: PasswordHash::new(value.password_hash)
                .map_err(|err| invalid_data(err.to_string()))?,
            display_mode: value.display_mode.parse::<DisplayMode>()?,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRow {
    id: Uuid,
    name: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = RepositoryError;

    fn try_from(value: RoomRow) -> Result<Self, Self::Error> {
        Ok(Room {
            id: RoomId::from(value.id),
            name: value.name,
            created_by: parse_username(value.created_by)?,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    room_id: Uuid,
    username: String,
    is_admin: bool,
    added_by: String,
    added_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for RoomMember {
    type Error = RepositoryError;

    fn try_from(value: MemberRow) -> Result<Self, Self::Error> {
        Ok(RoomMember {
            room_id: RoomId::from(value.room_id),
            username: parse_username(value.username)?,
            is_admin: value.is_admin,
            added_by: parse_username(value.added_by)?,
            added_at: value.added_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    room_id: Uuid,
    seq: i64,
    sender: String,
    text: String,
    sentiment: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            sequence_key: SequenceKey(value.seq),
            room_id: RoomId::from(value.room_id),
            sender: parse_username(value.sender)?,
            text: MessageText::new(value.text).map_err(|err| invalid_data(err.to_string()))?,
            created_at: value.created_at,
            sentiment: value.sentiment.parse::<SentimentCode>()?,
        })
    }
}

/// 追加写入的消息存储。序列号在事务内通过 `room_sequences` 行锁分配，
/// 提交成功后消息即可被分页查询读到。
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: NewMessage) -> RepositoryResult<Message> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO room_sequences (room_id, last_seq)
            VALUES ($1, 1)
            ON CONFLICT (room_id) DO UPDATE SET last_seq = room_sequences.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(Uuid::from(message.room_id))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (room_id, seq, sender, text, sentiment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING room_id, seq, sender, text, sentiment, created_at
            "#,
        )
        .bind(Uuid::from(message.room_id))
        .bind(seq)
        .bind(message.sender.as_str())
        .bind(message.text.as_str())
        .bind(message.sentiment.as_str())
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Message::try_from(row)
    }

    async fn query_page(
        &self,
        room_id: RoomId,
        offset: u64,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT room_id, seq, sender, text, sentiment, created_at
            FROM messages
            WHERE room_id = $1
            ORDER BY seq DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(offset)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgRoomDirectory {
    pool: PgPool,
}

impl PgRoomDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomDirectory for PgRoomDirectory {
    async fn create_room(&self, room: Room, members: Vec<RoomMember>) -> RepositoryResult<Room> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            INSERT INTO rooms (id, name, created_by, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, created_by, created_at
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(&room.name)
        .bind(room.created_by.as_str())
        .bind(room.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        for member in &members {
            sqlx::query(
                r#"
                INSERT INTO room_members (room_id, username, is_admin, added_by, added_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (room_id, username) DO NOTHING
                "#,
            )
            .bind(Uuid::from(member.room_id))
            .bind(member.username.as_str())
            .bind(member.is_admin)
            .bind(member.added_by.as_str())
            .bind(member.added_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Room::try_from(row)
    }

    async fn find_room(&self, room_id: RoomId) -> RepositoryResult<Option<Room>> {
        let row = sqlx::query_as::<_, RoomRow>(
            "SELECT id, name, created_by, created_at FROM rooms WHERE id = $1",
        )
        .bind(Uuid::from(room_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(Room::try_from).transpose()
    }

    async fn rename_room(&self, room_id: RoomId, name: String) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE rooms SET name = $2 WHERE id = $1")
            .bind(Uuid::from(room_id))
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn add_members(&self, members: Vec<RoomMember>) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        for member in &members {
            sqlx::query(
                r#"
                INSERT INTO room_members (room_id, username, is_admin, added_by, added_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (room_id, username) DO NOTHING
                "#,
            )
            .bind(Uuid::from(member.room_id))
            .bind(member.username.as_str())
            .bind(member.is_admin)
            .bind(member.added_by.as_str())
            .bind(member.added_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn remove_members(
        &self,
        room_id: RoomId,
        usernames: Vec<Username>,
    ) -> RepositoryResult<()> {
        let names: Vec<String> = usernames
            .into_iter()
            .map(|name| name.as_str().to_owned())
            .collect();
        sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND username = ANY($2)")
            .bind(Uuid::from(room_id))
            .bind(names)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_member(
        &self,
        room_id: RoomId,
        username: Username,
    ) -> RepositoryResult<Option<RoomMember>> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT room_id, username, is_admin, added_by, added_at
            FROM room_members
            WHERE room_id = $1 AND username = $2
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(RoomMember::try_from).transpose()
    }

    async fn list_members(&self, room_id: RoomId) -> RepositoryResult<Vec<RoomMember>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT room_id, username, is_admin, added_by, added_at
            FROM room_members
            WHERE room_id = $1
            ORDER BY is_admin DESC, added_at ASC, username ASC
            "#,
        )
        .bind(Uuid::from(room_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows.into_iter().map(RoomMember::try_from).collect()
    }

    async fn rooms_for_user(&self, username: Username) -> RepositoryResult<Vec<Room>> {
        let rows = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT r.id, r.name, r.created_by, r.created_at
            FROM rooms r
            JOIN room_members m ON m.room_id = r.id
            WHERE m.username = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(username.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows.into_iter().map(Room::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create(&self, user: UserRecord) -> RepositoryResult<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, email, password_hash, display_mode, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING username, email, password_hash, display_mode, created_at
            "#,
        )
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(user.password.as_str())
        .bind(user.display_mode.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        UserRecord::try_from(row)
    }

    async fn find_by_username(&self, username: Username) -> RepositoryResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT username, email, password_hash, display_mode, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(UserRecord::try_from).transpose()
    }
}

/// 共享同一连接池的三个存储
#[derive(Clone)]
pub struct PgStorage {
    pub message_store: PgMessageStore,
    pub room_directory: PgRoomDirectory,
    pub identity_store: PgIdentityStore,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            message_store: PgMessageStore::new(pool.clone()),
            room_directory: PgRoomDirectory::new(pool.clone()),
            identity_store: PgIdentityStore::new(pool),
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
