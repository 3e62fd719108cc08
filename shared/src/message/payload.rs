use serde::{Deserialize, Serialize};
use std::fmt;

// ==================== Notification Level ====================

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// 普通信息
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// 通知分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// 系统级通知
    System,
    /// 网络相关
    Network,
    /// 业务相关（预约、聊天）
    Business,
}

// ==================== Payloads ====================

/// 握手载荷 (客户端 -> 服务端)
///
/// 包含客户端的协议版本信息，用于服务端进行版本校验。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// 协议版本
    pub version: u16,
    /// 客户端名称/标识
    pub client_name: Option<String>,
    /// 客户端版本
    pub client_version: Option<String>,
    /// 客户端唯一标识 (UUID)
    pub client_id: Option<String>,
}

/// 通知载荷 (服务端 -> 客户端)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// 标题
    pub title: String,
    /// 消息内容
    pub message: String,
    /// 通知级别
    pub level: NotificationLevel,
    /// 通知分类
    pub category: NotificationCategory,
    /// 附加数据 (JSON)
    pub data: Option<serde_json::Value>,
}

/// 请求指令载荷 (客户端 -> 服务端)
///
/// 表示客户端发起的业务操作请求，通常需要服务端处理并返回结果。
///
/// # 示例
/// - `action`: "submit_decision"
/// - `params`: `{ "command_id": "...", "payload": { "type": "SUBMIT_DECISION", ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCommandPayload {
    /// 操作标识 (例如: "create_appointment", "send_message", "catalog.chairs")
    pub action: String,
    /// 操作参数 (可选的 JSON 对象)
    pub params: Option<serde_json::Value>,
}

/// 同步信号载荷 (服务端 -> 所有客户端)
///
/// 当某个资源发生变更时（由某个客户端请求触发，或服务端后台触发），
/// 服务端广播此信号，通知所有感兴趣的客户端刷新数据。
///
/// # 示例
/// - `resource`: "appointment"
/// - `version`: 42
/// - `action`: "status_changed"
/// - `id`: "appt_123"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    /// 资源类型 (例如: "appointment", "thread", "chair")
    pub resource: String,
    /// 版本号 (用于客户端判断是否需要全量刷新)
    pub version: u64,
    /// 变更类型 (例如: "created", "status_changed", "expired")
    pub action: String,
    /// 资源 ID (必填)
    pub id: String,
    /// 资源数据 (可选)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// 通用响应载荷 (服务端 -> 客户端)
///
/// 用于响应 RequestCommand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// 是否成功
    pub success: bool,
    /// 响应消息/错误描述
    pub message: String,
    /// 响应数据 (可选)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// 错误代码 (可选, 仅在失败时有用)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// 聊天新消息载荷 (服务端 -> 客户端)
///
/// 客户端必须先按 `thread_id` 过滤，再应用到会话状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    pub thread_id: String,
    pub sender_user_id: String,
    pub message_id: String,
    pub text: String,
    /// 服务端时间戳 (Unix 毫秒)，消息排序的唯一依据
    pub created_at: i64,
}

/// 输入状态载荷 (双向)
///
/// 客户端上报本地输入状态；服务端转发给同一会话的其他客户端。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub thread_id: String,
    pub typing_user_id: String,
    pub typing_user_name: String,
    pub is_typing: bool,
}

// ==================== Convenience Constructors ====================

impl NotificationPayload {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Info,
            category: NotificationCategory::System,
            data: None,
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Warning,
            category: NotificationCategory::System,
            data: None,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Error,
            category: NotificationCategory::System,
            data: None,
        }
    }
}

impl ResponsePayload {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error_code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: code,
        }
    }
}
