use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::HttpError;
use crate::parser::ParseError;
use crate::variable::{CaptureError, ExprError};

/// 一组按序执行的 `.webtest` 文件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestGroup {
    /// 组内文件名，按执行顺序
    pub members: Vec<String>,

    /// weighted 调度下的相对权重
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl TestGroup {
    /// 单文件组，权重 1.0
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            members: vec![filename.into()],
            weight: 1.0,
        }
    }

    /// 多文件组，权重 1.0
    pub fn from_members(members: Vec<String>) -> Self {
        Self {
            members,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// 组的调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sequence {
    /// 每次调用按序执行所有组
    #[default]
    Sequential,

    /// 每次调用等概率抽取一个组
    Random,

    /// 每次调用按权重抽取一个组
    Weighted,

    /// 每个 worker 固定执行 `index % 组数` 的那个组
    Thread,
}

impl FromStr for Sequence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            "weighted" => Ok(Self::Weighted),
            "thread" => Ok(Self::Thread),
            other => Err(format!(
                "sequence must be sequential/random/weighted/thread, got '{}'",
                other
            )),
        }
    }
}

/// 一次 `call()` 的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationStats {
    /// 发出的请求数
    pub requests: usize,

    /// 其中失败（状态 >= 400 或捕获未命中）的请求数
    pub failed: usize,
}

impl InvocationStats {
    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// 单个 worker 的汇总报告
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    /// worker 编号
    pub index: usize,

    /// 完成的调用次数
    pub invocations: usize,

    /// 失败的调用次数
    pub failed: usize,

    /// 累计请求数
    pub requests: usize,

    /// 致命错误（导致 worker 提前停止）
    pub fatal: Option<String>,
}

/// 执行阶段错误
#[derive(Debug, Error)]
pub enum RunError {
    /// 配置错误（构建注册表时检出）
    #[error("配置错误: {0}")]
    Config(String),

    /// 只支持 GET 和 POST
    #[error("Unsupported HTTP method '{method}' (request at line {line})")]
    UnsupportedMethod { method: String, line: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl RunError {
    /// 可恢复错误：worker 记入失败统计后继续下一次调用
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RunError::Capture(CaptureError::NotFound { .. }))
    }
}
