use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{
    DisplayMode, IdentityStore, Room, RoomDirectory, RoomId, RoomMember, Username,
};
use serde::Serialize;
use tracing::info;

use crate::{clock::Clock, error::ApplicationError};

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub creator: Username,
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EditRoomRequest {
    pub room_id: RoomId,
    pub editor: Username, // 操作者（从JWT获取）
    pub name: String,
    pub members: Vec<String>,
}

/// 房间详情视图
#[derive(Debug, Clone, Serialize)]
pub struct RoomDetails {
    pub room: Room,
    pub members: Vec<RoomMember>,
    pub display_mode: DisplayMode,
}

pub struct RoomServiceDependencies {
    pub directory: Arc<dyn RoomDirectory>,
    pub identities: Arc<dyn IdentityStore>,
    pub clock: Arc<dyn Clock>,
}

/// 房间目录上的增删改查
pub struct RoomService {
    deps: RoomServiceDependencies,
}

impl RoomService {
    pub fn new(deps: RoomServiceDependencies) -> Self {
        Self { deps }
    }

    // 去空白、去重，并排除操作者本人
    fn parse_members(raw: Vec<String>, exclude: &Username) -> Result<Vec<Username>, ApplicationError> {
        let mut seen = BTreeSet::new();
        for value in raw {
            if value.trim().is_empty() {
                continue;
            }
            let username = Username::parse(value)?;
            if &username != exclude {
                seen.insert(username);
            }
        }
        Ok(seen.into_iter().collect())
    }

    async fn display_mode(&self, username: &Username) -> Result<DisplayMode, ApplicationError> {
        Ok(self
            .deps
            .identities
            .find_by_username(username.clone())
            .await?
            .map(|user| user.display_mode)
            .unwrap_or_default())
    }

    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<RoomDetails, ApplicationError> {
        let now = self.deps.clock.now();
        let room = Room::new(RoomId::generate(), request.name, request.creator.clone(), now)?;
        let invited = Self::parse_members(request.members, &request.creator)?;

        let mut members = Vec::with_capacity(invited.len() + 1);
        members.push(RoomMember::admin(room.id, request.creator.clone(), now));
        members.extend(
            invited
                .into_iter()
                .map(|username| RoomMember::member(room.id, username, request.creator.clone(), now)),
        );

        let room = self
            .deps
            .directory
            .create_room(room, members.clone())
            .await?;
        info!(room_id = %room.id, creator = %request.creator, members = members.len(), "room created");

        let display_mode = self.display_mode(&request.creator).await?;
        Ok(RoomDetails {
            room,
            members,
            display_mode,
        })
    }

    /// 重命名并按差集增删成员，只有管理员可以操作，操作者本人不会被移除。
    /// 返回被移除的用户名。
    pub async fn edit_room(&self, request: EditRoomRequest) -> Result<Vec<Username>, ApplicationError> {
        let room_id = request.room_id;
        self.deps
            .directory
            .find_room(room_id)
            .await?
            .ok_or(ApplicationError::RoomNotFound(room_id))?;

        let editor = self
            .deps
            .directory
            .find_member(room_id, request.editor.clone())
            .await?;
        if !editor.is_some_and(|member| member.is_admin) {
            return Err(ApplicationError::authorization(room_id));
        }

        let name = Room::validate_name(request.name)?;
        let desired: BTreeSet<Username> = Self::parse_members(request.members, &request.editor)?
            .into_iter()
            .collect();
        let existing: BTreeSet<Username> = self
            .deps
            .directory
            .list_members(room_id)
            .await?
            .into_iter()
            .map(|member| member.username)
            .filter(|username| username != &request.editor)
            .collect();

        self.deps.directory.rename_room(room_id, name).await?;

        let now = self.deps.clock.now();
        let to_add: Vec<RoomMember> = desired
            .difference(&existing)
            .cloned()
            .map(|username| RoomMember::member(room_id, username, request.editor.clone(), now))
            .collect();
        let to_remove: Vec<Username> = existing.difference(&desired).cloned().collect();

        if !to_add.is_empty() {
            self.deps.directory.add_members(to_add).await?;
        }
        if !to_remove.is_empty() {
            self.deps
                .directory
                .remove_members(room_id, to_remove.clone())
                .await?;
        }
        info!(%room_id, editor = %request.editor, removed = to_remove.len(), "room edited");
        Ok(to_remove)
    }

    pub async fn rooms_for_user(&self, username: &Username) -> Result<Vec<Room>, ApplicationError> {
        Ok(self.deps.directory.rooms_for_user(username.clone()).await?)
    }

    /// 非成员看到的是“房间不存在”
    pub async fn room_details(
        &self,
        username: &Username,
        room_id: RoomId,
    ) -> Result<RoomDetails, ApplicationError> {
        let room = self
            .deps
            .directory
            .find_room(room_id)
            .await?
            .ok_or(ApplicationError::RoomNotFound(room_id))?;
        if self
            .deps
            .directory
            .find_member(room_id, username.clone())
            .await?
            .is_none()
        {
            return Err(ApplicationError::RoomNotFound(room_id));
        }

        let members = self.deps.directory.list_members(room_id).await?;
        let display_mode = self.display_mode(username).await?;
        Ok(RoomDetails {
            room,
            members,
            display_mode,
        })
    }
}
