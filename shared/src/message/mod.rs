//! 消息总线消息类型定义
//!
//! 这些类型在 salon-server 和 clients 之间共享，用于
//! 进程内（内存）和网络（TCP）通信。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use uuid::Uuid;

pub mod payload;
pub use payload::*;

/// 协议版本号
pub const PROTOCOL_VERSION: u16 = 1;

/// 消息总线事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 握手消息
    Handshake = 0,
    /// 系统通知
    Notification = 1,
    /// 聊天新消息推送
    NewMessage = 2,
    /// 客户端请求
    RequestCommand = 3,
    /// 同步信号
    Sync = 4,
    /// 请求响应
    Response = 5,
    /// 输入状态（正在输入/停止输入）
    Typing = 6,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::Handshake),
            1 => Ok(EventType::Notification),
            2 => Ok(EventType::NewMessage),
            3 => Ok(EventType::RequestCommand),
            4 => Ok(EventType::Sync),
            5 => Ok(EventType::Response),
            6 => Ok(EventType::Typing),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Handshake => write!(f, "handshake"),
            EventType::Notification => write!(f, "notification"),
            EventType::NewMessage => write!(f, "new_message"),
            EventType::RequestCommand => write!(f, "request_command"),
            EventType::Sync => write!(f, "sync"),
            EventType::Response => write!(f, "response"),
            EventType::Typing => write!(f, "typing"),
        }
    }
}

/// 消息总线消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub request_id: Uuid,
    pub event_type: EventType,
    pub source: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub target: Option<String>,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            source: None,
            correlation_id: None,
            target: None,
            payload,
        }
    }

    /// 设置目标客户端
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// 设置关联 ID (用于 RPC 响应)
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// 创建握手消息
    pub fn handshake(payload: &HandshakePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::Handshake, serde_json::to_vec(payload)?))
    }

    /// 创建通知消息
    pub fn notification(payload: &NotificationPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            EventType::Notification,
            serde_json::to_vec(payload)?,
        ))
    }

    /// 创建聊天消息推送
    pub fn new_message(payload: &NewMessagePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            EventType::NewMessage,
            serde_json::to_vec(payload)?,
        ))
    }

    /// 创建请求指令消息
    pub fn request_command(payload: &RequestCommandPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            EventType::RequestCommand,
            serde_json::to_vec(payload)?,
        ))
    }

    /// 创建同步信号消息
    pub fn sync(payload: &SyncPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::Sync, serde_json::to_vec(payload)?))
    }

    /// 创建响应消息
    pub fn response(payload: &ResponsePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::Response, serde_json::to_vec(payload)?))
    }

    /// 创建输入状态消息
    pub fn typing(payload: &TypingPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::Typing, serde_json::to_vec(payload)?))
    }

    /// 解析载荷为指定类型
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}
