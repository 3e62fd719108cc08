use chrono_tz::Tz;

/// 服务器配置 - 所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/chairbook | 工作目录 (存储、日志) |
/// | MESSAGE_TCP_PORT | 8081 | TCP 消息总线端口 |
/// | TIMEZONE | Europe/Madrid | 业务时区 |
/// | PENDING_TTL_MINUTES | 1320 | 预约等待确认时限 (分钟) |
/// | EXPIRY_SWEEP_SECONDS | 60 | 过期扫描间隔 (秒) |
/// | TYPING_EXPIRY_SECONDS | 5 | 远端输入状态自愈过期 (秒) |
/// | TYPING_QUIET_SECONDS | 3 | 本地输入静默期 (秒) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 日志目录，设置后启用滚动文件日志 |
/// | TLS_CERT_PATH / TLS_KEY_PATH | (无) | 设置后消息总线启用 TLS |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/chairbook MESSAGE_TCP_PORT=9000 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// TCP 消息总线端口 (用于客户端直连)
    pub message_tcp_port: u16,
    /// 业务时区
    pub timezone: Tz,
    /// 预约创建后等待双方确认的时限 (分钟)
    pub pending_ttl_minutes: i64,
    /// 过期扫描间隔 (秒)
    pub expiry_sweep_seconds: u64,
    /// 远端"正在输入"状态的自愈过期时间 (秒)
    pub typing_expiry_seconds: u64,
    /// 本地输入停止判定的静默期 (秒)
    pub typing_quiet_seconds: u64,
    /// 日志级别: trace | debug | info | warn | error
    pub log_level: String,
    /// 日志目录 (可选，设置后写滚动文件)
    pub log_dir: Option<String>,
    /// TLS 证书路径 (可选；与 key 同时设置才启用 TLS)
    pub tls_cert_path: Option<String>,
    /// TLS 私钥路径 (可选)
    pub tls_key_path: Option<String>,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/chairbook".into()),
            message_tcp_port: std::env::var("MESSAGE_TCP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8081),
            timezone: std::env::var("TIMEZONE")
                .ok()
                .and_then(|tz| tz.parse().ok())
                .unwrap_or(chrono_tz::Europe::Madrid),
            pending_ttl_minutes: std::env::var("PENDING_TTL_MINUTES")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(22 * 60),
            expiry_sweep_seconds: std::env::var("EXPIRY_SWEEP_SECONDS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60),
            typing_expiry_seconds: std::env::var("TYPING_EXPIRY_SECONDS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5),
            typing_quiet_seconds: std::env::var("TYPING_QUIET_SECONDS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok(),
            tls_cert_path: std::env::var("TLS_CERT_PATH").ok(),
            tls_key_path: std::env::var("TLS_KEY_PATH").ok(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, message_tcp_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.message_tcp_port = message_tcp_port;
        config
    }

    /// 预约等待确认时限 (毫秒)
    pub fn pending_ttl_millis(&self) -> i64 {
        self.pending_ttl_minutes * 60 * 1000
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
