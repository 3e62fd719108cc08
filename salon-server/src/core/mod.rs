//! 核心模块 - 服务器配置、状态和生命周期
//!
//! # 模块结构
//!
//! - [`Config`] - 服务器配置
//! - [`ServerState`] - 服务器状态 (服务组合根)
//! - [`Server`] - 服务器生命周期
//! - [`BackgroundTasks`] - 后台任务注册表

pub mod config;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use server::Server;
pub use state::{ResourceVersions, ServerState};
pub use tasks::{BackgroundTasks, TaskKind};
