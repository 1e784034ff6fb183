mod chat_service;
mod room_service;
mod user_service;

pub use chat_service::{ChatService, ChatServiceDependencies};
pub use room_service::{
    CreateRoomRequest, EditRoomRequest, RoomDetails, RoomService, RoomServiceDependencies,
};
pub use user_service::{SignupRequest, UserService, UserServiceDependencies};
