use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuloadError {
    #[error("解析错误: {0}")]
    Parse(#[from] crate::parser::ParseError),

    #[error("表达式错误: {0}")]
    Expr(#[from] crate::variable::ExprError),

    #[error("捕获错误: {0}")]
    Capture(#[from] crate::variable::CaptureError),

    #[error("宏错误: {0}")]
    Macro(#[from] crate::macros::MacroError),

    #[error("执行错误: {0}")]
    Run(#[from] crate::runner::RunError),

    #[error("HTTP 请求失败: {0}")]
    Http(#[from] crate::http::HttpError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type for ruload crate
pub type Result<T> = std::result::Result<T, RuloadError>;
