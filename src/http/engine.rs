use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// HTTP 传输层错误
#[derive(Debug, Error)]
pub enum HttpError {
    /// 网络/协议错误
    #[error("请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL 无法解析
    #[error("URL 无效: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// 其他错误
    #[error("{0}")]
    Other(String),
}

/// 一次请求的结果：状态码、响应体、耗时
#[derive(Debug, Clone)]
pub struct EngineResponse {
    status: u16,
    body: String,
    duration: Duration,
}

impl EngineResponse {
    pub fn new(status: u16, body: impl Into<String>, duration: Duration) -> Self {
        Self {
            status,
            body: body.into(),
            duration,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// 状态码 >= 400 视为失败（不终止执行，只计入统计）
    pub fn is_failure(&self) -> bool {
        self.status >= 400
    }
}

/// POST 载荷：原始文本体或表单参数，二选一
#[derive(Debug, Clone, Copy)]
pub enum PostPayload<'a> {
    Body(&'a str),
    Params(&'a [(String, String)]),
}

/// HTTP 执行引擎抽象
///
/// 生产路径用 [`ReqwestEngine`](crate::http::ReqwestEngine)；
/// 测试中可以换成脚本化的假引擎。
#[async_trait]
pub trait HttpEngine: Send + Sync {
    /// GET 请求；`parameters` 追加为查询串
    async fn get(
        &self,
        url: &str,
        parameters: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<EngineResponse, HttpError>;

    /// POST 请求
    async fn post(
        &self,
        url: &str,
        payload: PostPayload<'_>,
        headers: &[(String, String)],
    ) -> Result<EngineResponse, HttpError>;
}
