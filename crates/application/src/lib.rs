//! 应用层实现。
//!
//! 房间成员与消息广播引擎：连接注册表、房间成员表、广播分发器、
//! 情感标注步骤和消息流水线，以及围绕它们的用例服务。

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod membership;
pub mod password;
pub mod pipeline;
pub mod registry;
pub mod sentiment;
pub mod services;

pub use clock::{Clock, SteppingClock, SystemClock};
pub use dispatcher::{BroadcastDispatcher, BroadcastReport, DeliveryOutcome};
pub use error::ApplicationError;
pub use events::{Announcement, ClientEvent, ErrorNotice, ReceivedMessage, ServerEvent};
pub use membership::RoomMembershipTable;
pub use password::{PasswordHasher, PasswordHasherError};
pub use pipeline::{MessagePipeline, MessagePipelineDependencies, DEFAULT_PAGE_SIZE};
pub use registry::{ConnectionRegistry, DeliveryError, OutboundSender};
pub use sentiment::{ClassifierError, SentimentAnnotator, SentimentClassifier};
pub use services::{
    ChatService, ChatServiceDependencies, CreateRoomRequest, EditRoomRequest, RoomDetails,
    RoomService, RoomServiceDependencies, SignupRequest, UserService, UserServiceDependencies,
};
