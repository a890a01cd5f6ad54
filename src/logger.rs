use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt};

/// 日志详细程度，只影响日志量，不影响任何执行行为
///
/// - `debug`: 全部输出，包括响应 body
/// - `info`: 基本信息，包括请求参数和表达式求值结果
/// - `quiet`: 最少信息，只有文件名和测试名
/// - `error`: 只记录错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Debug,
    Info,
    Quiet,
    Error,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Quiet
    }
}

impl Verbosity {
    /// 对应的 tracing 过滤指令
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Quiet => "warn",
            Verbosity::Error => "error",
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Verbosity::Debug),
            "info" => Ok(Verbosity::Info),
            "quiet" => Ok(Verbosity::Quiet),
            "error" => Ok(Verbosity::Error),
            _ => Err(format!(
                "verbosity must be 'debug', 'info', 'quiet', or 'error', got '{}'",
                s
            )),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Quiet => "quiet",
            Verbosity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// 初始化日志系统
///
/// RUST_LOG 环境变量优先于配置的 verbosity
pub fn init_logger(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    subscriber_fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Logger initialized");
}
