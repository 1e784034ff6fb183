use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{RoomId, Timestamp, Username};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub created_by: Username,
    pub created_at: Timestamp,
}

impl Room {
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        created_by: Username,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let name = Self::validate_name(name.into())?;
        Ok(Self {
            id,
            name,
            created_by,
            created_at,
        })
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), DomainError> {
        self.name = Self::validate_name(name.into())?;
        Ok(())
    }

    pub fn validate_name(name: String) -> Result<String, DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation_error("room_name", "cannot be empty"));
        }
        if trimmed.chars().count() > 60 {
            return Err(DomainError::validation_error("room_name", "too long"));
        }
        Ok(trimmed.to_owned())
    }
}

/// 房间目录中的持久成员关系（与实时连接无关）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub room_id: RoomId,
    pub username: Username,
    pub is_admin: bool,
    pub added_by: Username,
    pub added_at: Timestamp,
}

impl RoomMember {
    pub fn admin(room_id: RoomId, username: Username, added_at: Timestamp) -> Self {
        Self {
            room_id,
            added_by: username.clone(),
            username,
            is_admin: true,
            added_at,
        }
    }

    pub fn member(
        room_id: RoomId,
        username: Username,
        added_by: Username,
        added_at: Timestamp,
    ) -> Self {
        Self {
            room_id,
            username,
            is_admin: false,
            added_by,
            added_at,
        }
    }
}
