//! Chairbook Salon Server - 理发椅预约协调服务
//!
//! # 架构概述
//!
//! 本模块是 Salon Server 的主入口，提供以下核心功能：
//!
//! - **预约事件溯源** (`appointments`): 命令 → 事件 → 快照，双方确认生命周期
//! - **目录** (`catalog`): 椅子、营业时间、服务项目
//! - **时段投影** (`scheduling`): 7 天滚动日历 + 60 分钟槽可用性
//! - **定价** (`pricing`): 租金/抽成两种计价模式
//! - **聊天** (`chat`): 与预约状态联动的会话
//! - **消息总线** (`message`): 支持 TCP/TLS/Memory 传输的实时消息系统
//!
//! # 模块结构
//!
//! ```text
//! salon-server/src/
//! ├── core/          # 配置、状态、生命周期
//! ├── appointments/  # 预约事件溯源
//! ├── catalog/       # 椅子、营业时间、服务项目
//! ├── scheduling/    # 日历与时段投影
//! ├── pricing/       # 预约计价
//! ├── chat/          # 会话与消息
//! ├── message/       # 消息总线
//! └── utils/         # 错误、日志、时间工具
//! ```

pub mod appointments;
pub mod catalog;
pub mod chat;
pub mod core;
pub mod message;
pub mod pricing;
pub mod scheduling;
pub mod utils;

// Re-export 公共类型
pub use appointments::{AppointmentStorage, AppointmentsManager};
pub use catalog::CatalogService;
pub use chat::{ChatService, ChatStorage};
pub use core::{Config, Server, ServerState};
pub use message::{BusMessage, EventType, MessageBus};
pub use pricing::compute_total;
pub use scheduling::SlotAvailabilityResolver;
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
   ________          _      __                __
  / ____/ /_  ____ _(_)____/ /_  ____  ____  / /__
 / /   / __ \/ __ `/ / ___/ __ \/ __ \/ __ \/ //_/
/ /___/ / / / /_/ / / /  / /_/ / /_/ / /_/ / ,<
\____/_/ /_/\__,_/_/_/  /_.___/\____/\____/_/|_|
    "#
    );
}
