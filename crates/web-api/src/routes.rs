use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{CreateRoomRequest, EditRoomRequest, RoomDetails, SignupRequest};
use domain::{DisplayMode, Message, Room, RoomId, UserRecord, Username};

use crate::{auth::LoginResponse, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct SignupPayload {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

/// 成员列表既可以是数组，也可以是逗号分隔的字符串
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MemberList {
    List(Vec<String>),
    Csv(String),
}

impl Default for MemberList {
    fn default() -> Self {
        MemberList::List(Vec::new())
    }
}

impl MemberList {
    fn into_vec(self) -> Vec<String> {
        match self {
            MemberList::List(items) => items,
            MemberList::Csv(raw) => raw.split(',').map(str::to_owned).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoomPayload {
    name: String,
    #[serde(default)]
    members: MemberList,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    page: u32,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct Profile {
    username: Username,
    display_mode: DisplayMode,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/users/me", get(current_user))
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room_id}", get(get_room).put(edit_room))
        .route("/rooms/{room_id}/messages", get(get_history))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupPayload>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    let user = state
        .user_service
        .signup(SignupRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            mode: payload.mode,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .user_service
        .authenticate(&payload.username, &payload.password)
        .await?;
    let token = state.jwt_service.generate_token(&user.username)?;

    Ok(Json(LoginResponse { user, token }))
}

async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ApiError> {
    let username = state.jwt_service.extract_user_from_headers(&headers)?;
    let display_mode = state.user_service.display_mode(&username).await?;

    Ok(Json(Profile {
        username,
        display_mode,
    }))
}

async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Room>>, ApiError> {
    let username = state.jwt_service.extract_user_from_headers(&headers)?;
    let rooms = state.room_service.rooms_for_user(&username).await?;
    Ok(Json(rooms))
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RoomPayload>,
) -> Result<(StatusCode, Json<RoomDetails>), ApiError> {
    let creator = state.jwt_service.extract_user_from_headers(&headers)?;
    let details = state
        .room_service
        .create_room(CreateRoomRequest {
            creator,
            name: payload.name,
            members: payload.members.into_vec(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(details)))
}

async fn get_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomDetails>, ApiError> {
    let username = state.jwt_service.extract_user_from_headers(&headers)?;
    let details = state
        .room_service
        .room_details(&username, RoomId::from(room_id))
        .await?;
    Ok(Json(details))
}

async fn edit_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<RoomPayload>,
) -> Result<Json<RoomDetails>, ApiError> {
    let editor = state.jwt_service.extract_user_from_headers(&headers)?;
    let room_id = RoomId::from(room_id);

    let removed = state
        .room_service
        .edit_room(EditRoomRequest {
            room_id,
            editor: editor.clone(),
            name: payload.name,
            members: payload.members.into_vec(),
        })
        .await?;

    // 被移出目录的用户同时失去实时通道上的房间订阅
    if !removed.is_empty() {
        let revoked = state.chat_service.revoke(room_id, &removed).await;
        tracing::info!(%room_id, removed = removed.len(), revoked, "room members revoked");
    }

    let details = state.room_service.room_details(&editor, room_id).await?;
    Ok(Json(details))
}

/// 按序列号倒序返回一页历史消息
async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let username = state.jwt_service.extract_user_from_headers(&headers)?;
    let messages = state
        .chat_service
        .history(&username, RoomId::from(room_id), query.page)
        .await?;
    Ok(Json(messages))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // query 中的 token 优先，其次是 Authorization 头
    let username = match query.token.as_deref() {
        Some(token) => state.jwt_service.verify_token(token)?,
        None => state.jwt_service.extract_user_from_headers(&headers)?,
    };

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(state, username).run(socket).await;
    }))
}
