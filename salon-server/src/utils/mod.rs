//! 工具模块 - 通用工具函数和类型
//!
//! # 内容
//!
//! - [`AppError`] / [`AppResult`] - 应用错误类型
//! - 日志初始化
//! - 业务时区时间函数

pub mod error;
pub mod logger;
pub mod time;

pub use error::{AppError, AppResult};
