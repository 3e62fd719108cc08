//! 后台任务管理
//!
//! Every long-running task the server spawns is registered here by name,
//! wrapped to capture panics, and cancelled through one shared token.
//!
//! # 任务类型
//!
//! - [`TaskKind::Worker`] - 长期后台工作者 (message handler)
//! - [`TaskKind::Listener`] - 事件监听器 (appointment / chat relays)
//! - [`TaskKind::Periodic`] - 定时任务 (pending expiry sweep)

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// 长期后台工作者
    Worker,
    /// 事件监听器
    Listener,
    /// 定时任务
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Worker => "Worker",
            TaskKind::Listener => "Listener",
            TaskKind::Periodic => "Periodic",
        })
    }
}

/// 已注册的后台任务
struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Registry over the server's background tasks
///
/// Registered tasks are expected to run until the shutdown token fires; an
/// early return or a panic is logged as an error instead of silently
/// shrinking the server.
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    /// Build a registry whose tasks all follow `shutdown`
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            shutdown,
        }
    }

    /// Token registered tasks should select on
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 注册并启动一个后台任务
    ///
    /// The future is wrapped to capture panics, so a panicking task is
    /// logged instead of being lost inside the runtime. A task that returns
    /// while the shutdown token is still live gets a warning too.
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let wrapped = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) => {
                    if !shutdown.is_cancelled() {
                        tracing::warn!(
                            task = %name,
                            kind = %kind,
                            "Background task exited before shutdown"
                        );
                    }
                }
                Err(panic) => {
                    tracing::error!(
                        task = %name,
                        kind = %kind,
                        panic = panic_text(&*panic),
                        "Background task panicked"
                    );
                }
            }
        };

        let handle = tokio::spawn(wrapped);
        tracing::debug!(task = %name, kind = %kind, "Registered background task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task counts as (worker, listener, periodic)
    pub fn count_by_kind(&self) -> (usize, usize, usize) {
        let count = |kind| self.tasks.iter().filter(|t| t.kind == kind).count();
        (
            count(TaskKind::Worker),
            count(TaskKind::Listener),
            count(TaskKind::Periodic),
        )
    }

    /// 打印任务摘要
    pub fn log_summary(&self) {
        let (worker, listener, periodic) = self.count_by_kind();
        tracing::info!(
            "Background tasks running: {} total (Worker: {}, Listener: {}, Periodic: {})",
            self.tasks.len(),
            worker,
            listener,
            periodic
        );
    }

    /// Graceful shutdown: cancel every task and wait for them to stop
    pub async fn shutdown(self) {
        tracing::info!("Stopping {} background tasks...", self.tasks.len());
        self.shutdown.cancel();

        for task in self.tasks {
            match task.handle.await {
                Ok(()) => {
                    tracing::debug!(task = %task.name, "Task stopped");
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(task = %task.name, "Task cancelled");
                }
                Err(e) => {
                    tracing::error!(task = %task.name, error = ?e, "Task failed during shutdown");
                }
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

/// Best-effort text from a panic payload
fn panic_text(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
