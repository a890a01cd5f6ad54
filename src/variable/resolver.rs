use std::sync::Arc;

use thiserror::Error;

use crate::macros::{MacroError, MacroRegistry};
use crate::variable::types::VariableStore;

/// 表达式求值错误
#[derive(Debug, Error)]
pub enum ExprError {
    /// 表达式块不匹配任何语法规则
    #[error("Syntax error '{expression}' in value '{text}'")]
    Syntax { expression: String, text: String },

    /// 引用了从未赋值的变量
    #[error("Variable '{0}' is not initialized")]
    UndefinedVariable(String),

    #[error(transparent)]
    Macro(#[from] MacroError),
}

/// `{...}` 表达式求值器
///
/// 支持的表达式形式（按优先级，整块匹配）:
///
/// - `{NAME = macro(args)}` — 调用宏，结果赋给 NAME 并展开为结果
/// - `{NAME = literal}` — 把字面量原样赋给 NAME 并展开为它
/// - `{macro(args)}` — 调用宏并展开为结果（不赋值）
/// - `{NAME}` — 展开为 NAME 的当前值；未赋值则报 UndefinedVariable
///
/// NAME 限于大写字母、数字、下划线；宏名限于小写字母和下划线。
/// `\{` 和 `\}` 原样输出，不作为表达式定界符。表达式不允许嵌套。
/// 每次替换后从新字符串头部重新扫描，直到没有 `{...}` 块为止。
pub struct ExpressionResolver {
    macros: Arc<dyn MacroRegistry>,
}

/// 一个未转义的 `{...}` 块，按字节偏移记录两侧花括号
struct Block {
    open: usize,
    close: usize,
}

impl ExpressionResolver {
    pub fn new(macros: Arc<dyn MacroRegistry>) -> Self {
        Self { macros }
    }

    /// 展开 `text` 中的所有表达式，赋值表达式会修改 `variables`
    pub fn expand(&self, text: &str, variables: &mut VariableStore) -> Result<String, ExprError> {
        self.expand_inner(text, variables, false)
    }

    /// 只做变量查找的展开，用于捕获模式：每个块都当作变量引用，
    /// 赋值形式也只解析其左侧 NAME，不修改 `variables`，不调用宏
    pub fn expand_lookup_only(
        &self,
        text: &str,
        variables: &VariableStore,
    ) -> Result<String, ExprError> {
        // lookup-only 不会写入，但复用同一条扫描路径
        let mut scratch = variables.clone();
        self.expand_inner(text, &mut scratch, true)
    }

    fn expand_inner(
        &self,
        text: &str,
        variables: &mut VariableStore,
        lookup_only: bool,
    ) -> Result<String, ExprError> {
        let mut value = text.to_string();
        // 每轮替换必须严格减少块数；替换结果引入新块会耗尽预算
        let mut budget = count_blocks(&value);

        while let Some(block) = find_block(&value) {
            let expression = &value[block.open + 1..block.close];
            if budget == 0 {
                return Err(ExprError::Syntax {
                    expression: expression.to_string(),
                    text: text.to_string(),
                });
            }
            budget -= 1;

            let expanded = if lookup_only {
                self.eval_lookup(expression, text, variables)?
            } else {
                self.eval_block(expression, text, variables)?
            };
            tracing::debug!("{} => '{}'", expression, expanded);

            let mut next = String::with_capacity(value.len() + expanded.len());
            next.push_str(&value[..block.open]);
            next.push_str(&expanded);
            next.push_str(&value[block.close + 1..]);
            value = next;
        }

        Ok(value)
    }

    /// 按优先级尝试五种语法规则
    fn eval_block(
        &self,
        expression: &str,
        text: &str,
        variables: &mut VariableStore,
    ) -> Result<String, ExprError> {
        // NAME = macro(args) 或 NAME = literal
        if let Some((name, rhs)) = split_assignment(expression) {
            let expanded = match parse_macro_call(rhs) {
                Some((macro_name, args)) => self.macros.invoke(macro_name, args)?,
                None => rhs.to_string(),
            };
            variables.set(name, expanded.clone());
            return Ok(expanded);
        }

        // macro(args)
        if let Some((macro_name, args)) = parse_macro_call(expression) {
            return Ok(self.macros.invoke(macro_name, args)?);
        }

        // NAME
        if is_name(expression) {
            return variables
                .get(expression)
                .map(str::to_string)
                .ok_or_else(|| ExprError::UndefinedVariable(expression.to_string()));
        }

        Err(ExprError::Syntax {
            expression: expression.to_string(),
            text: text.to_string(),
        })
    }

    /// lookup-only 模式：`NAME` 和 `NAME = ...` 都只查 NAME
    fn eval_lookup(
        &self,
        expression: &str,
        text: &str,
        variables: &VariableStore,
    ) -> Result<String, ExprError> {
        let name = leading_name(expression);
        let valid = !name.is_empty()
            && (name.len() == expression.len() || split_assignment(expression).is_some());
        if !valid {
            return Err(ExprError::Syntax {
                expression: expression.to_string(),
                text: text.to_string(),
            });
        }
        variables
            .get(name)
            .map(str::to_string)
            .ok_or_else(|| ExprError::UndefinedVariable(name.to_string()))
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'
}

fn is_macro_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b == b'_'
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_name_byte)
}

/// 开头连续的 NAME 字符
fn leading_name(s: &str) -> &str {
    let end = s
        .bytes()
        .position(|b| !is_name_byte(b))
        .unwrap_or(s.len());
    &s[..end]
}

/// `NAME = rhs` 形式，等号两侧最多各一个空格，rhs 非空
fn split_assignment(expression: &str) -> Option<(&str, &str)> {
    let name = leading_name(expression);
    if name.is_empty() || name.len() == expression.len() {
        return None;
    }
    let rest = &expression[name.len()..];
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let rest = rest.strip_prefix('=')?;
    let rhs = rest.strip_prefix(' ').unwrap_or(rest);
    if rhs.is_empty() {
        return None;
    }
    Some((name, rhs))
}

/// `macro_name(args)` 形式，args 中不允许出现 `)`
fn parse_macro_call(expression: &str) -> Option<(&str, &str)> {
    let end = expression
        .bytes()
        .position(|b| !is_macro_byte(b))
        .unwrap_or(expression.len());
    if end == 0 {
        return None;
    }
    let args = expression[end..].strip_prefix('(')?.strip_suffix(')')?;
    if args.contains(')') {
        return None;
    }
    Some((&expression[..end], args))
}

/// 找出第一个未转义的 `{...}` 块；`\{`/`\}` 按字面跳过
///
/// 块内容必须非空：`{}` 之后不再继续找（与逐块替换的语义一致，
/// 空块使整个剩余文本原样保留）。
fn find_block(s: &str) -> Option<Block> {
    let bytes = s.as_bytes();
    let mut open: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() && (bytes[i + 1] == b'{' || bytes[i + 1] == b'}') => {
                i += 1;
            }
            b'{' if open.is_none() => open = Some(i),
            b'}' => {
                if let Some(start) = open {
                    if i == start + 1 {
                        // 空块，按原样保留
                        return None;
                    }
                    return Some(Block {
                        open: start,
                        close: i,
                    });
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// 完整块的个数（用作展开预算）
fn count_blocks(s: &str) -> usize {
    let mut count = 0;
    let mut rest = s;
    while let Some(block) = find_block(rest) {
        count += 1;
        rest = &rest[block.close + 1..];
    }
    count
}
