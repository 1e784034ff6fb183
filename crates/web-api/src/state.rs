use std::sync::Arc;

use application::{
    BroadcastDispatcher, ChatService, ChatServiceDependencies, Clock, ConnectionRegistry,
    MessagePipeline, MessagePipelineDependencies, RoomMembershipTable, RoomService,
    RoomServiceDependencies, SentimentAnnotator, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub room_service: Arc<RoomService>,
    pub user_service: Arc<UserService>,
    pub jwt_service: Arc<JwtService>,
    /// 每条连接出站队列容量
    pub outbound_buffer: usize,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        room_service: Arc<RoomService>,
        user_service: Arc<UserService>,
        jwt_service: Arc<JwtService>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            chat_service,
            room_service,
            user_service,
            jwt_service,
            outbound_buffer,
        }
    }

    /// 按配置把引擎各部件和外部协作方装配到一起
    pub fn build(config: &AppConfig, infra: Infrastructure) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let registry = Arc::new(ConnectionRegistry::new(config.chat.delivery_timeout()));
        let membership = Arc::new(RoomMembershipTable::default());
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            registry.clone(),
            membership.clone(),
        ));
        let pipeline = Arc::new(MessagePipeline::new(MessagePipelineDependencies {
            store: infra.message_store.clone(),
            annotator: SentimentAnnotator::new(
                infra.classifier.clone(),
                config.chat.classifier_timeout(),
            ),
            dispatcher: dispatcher.clone(),
            clock: clock.clone(),
            page_size: config.chat.history_page_size,
        }));

        let chat_service = ChatService::new(ChatServiceDependencies {
            registry,
            membership,
            dispatcher,
            pipeline,
            directory: infra.room_directory.clone(),
        });
        let room_service = RoomService::new(RoomServiceDependencies {
            directory: infra.room_directory.clone(),
            identities: infra.identity_store.clone(),
            clock: clock.clone(),
        });
        let user_service = UserService::new(UserServiceDependencies {
            identities: infra.identity_store,
            password_hasher: infra.password_hasher,
            clock,
        });

        Self::new(
            Arc::new(chat_service),
            Arc::new(room_service),
            Arc::new(user_service),
            Arc::new(JwtService::new(config.jwt.clone())),
            config.chat.outbound_buffer,
        )
    }
}
