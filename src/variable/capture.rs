use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::parser::types::Request;
use crate::variable::resolver::{ExprError, ExpressionResolver};
use crate::variable::types::VariableStore;

/// 捕获求值错误
#[derive(Debug, Error)]
pub enum CaptureError {
    /// 捕获行不符合 `{NAME = pattern}` 形式
    #[error("Invalid capture expression: {0}")]
    BadLine(String),

    /// 展开后的模式不是合法正则
    #[error("Invalid capture pattern '{pattern}': {message}")]
    BadPattern { pattern: String, message: String },

    /// 模式在响应体中没有匹配
    #[error("Pattern '{pattern}' not found in response body")]
    NotFound { pattern: String },

    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// 捕获行: `{NAME = pattern}`，等号两侧最多各一个空格，整行锚定
fn capture_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{([A-Z0-9_]+) ?= ?(.+)\}$").unwrap())
}

impl ExpressionResolver {
    /// 对请求的每个捕获表达式在响应体中求值
    ///
    /// 每行形如 `{NAME = pattern}`。pattern 先做 lookup-only 展开
    /// （其中的 `{VAR}` 换成当前值），再编译为正则在 `body` 中搜索。
    /// 命中时 NAME 取第 1 个捕获组，没有分组则取整个匹配。
    /// 任何一行未命中立即返回 NotFound，已赋的变量保留。
    /// 返回成功赋值的变量个数。
    pub fn eval_capture(
        &self,
        request: &Request,
        body: &str,
        variables: &mut VariableStore,
    ) -> Result<usize, CaptureError> {
        let mut count = 0;

        for line in request.captures() {
            let caps = capture_line_regex()
                .captures(line)
                .ok_or_else(|| CaptureError::BadLine(line.to_string()))?;
            let name = &caps[1];
            let raw_pattern = &caps[2];

            let pattern = self.expand_lookup_only(raw_pattern, variables)?;
            let regex = Regex::new(&pattern).map_err(|e| CaptureError::BadPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;

            let Some(found) = regex.captures(body) else {
                tracing::warn!("capture '{}' 未命中: {}", name, pattern);
                return Err(CaptureError::NotFound { pattern });
            };
            let value = match found.get(1) {
                Some(group) => group.as_str(),
                None => &found[0],
            };

            tracing::debug!("capture {} = '{}'", name, value);
            variables.set(name, value);
            count += 1;
        }

        Ok(count)
    }
}
