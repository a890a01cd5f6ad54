use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeDelta, Utc};
use rand::Rng;
use thiserror::Error;

/// 宏调用错误
#[derive(Debug, Error)]
pub enum MacroError {
    /// 未注册的宏名称
    #[error("Macro function '{0}' is undefined")]
    Undefined(String),

    /// 参数无法解析
    #[error("Invalid arguments '{args}' for macro '{name}': {message}")]
    BadArgs {
        name: String,
        args: String,
        message: String,
    },
}

/// 可以从 webtest 表达式中调用的宏函数注册表
///
/// 每个宏接受单个字符串参数并返回字符串；需要多个参数的宏
/// 自行约定逗号分隔并自行拆包。调用方可以注入自定义实现来
/// 新增或覆盖宏。
pub trait MacroRegistry: Send + Sync {
    /// 调用名为 `name` 的宏，传入 `args`，返回展开结果
    fn invoke(&self, name: &str, args: &str) -> Result<String, MacroError>;
}

/// 内置宏集合
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinMacros;

impl MacroRegistry for BuiltinMacros {
    fn invoke(&self, name: &str, args: &str) -> Result<String, MacroError> {
        match name {
            "random_digits" => Ok(random_from(DIGITS, parse_length(name, args)?)),
            "random_letters" => Ok(random_from(LETTERS, parse_length(name, args)?)),
            "random_alphanumeric" => Ok(random_from(ALPHANUMERIC, parse_length(name, args)?)),
            "today" => strftime(name, Local::now(), args.trim()),
            "today_plus" => today_plus(name, args),
            "timestamp" => Ok(Utc::now().timestamp().to_string()),
            _ => Err(MacroError::Undefined(name.to_string())),
        }
    }
}

const DIGITS: &[u8] = b"0123456789";
const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHANUMERIC: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn random_from(choices: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| choices[rng.random_range(0..choices.len())] as char)
        .collect()
}

fn parse_length(name: &str, args: &str) -> Result<usize, MacroError> {
    args.trim().parse().map_err(|_| MacroError::BadArgs {
        name: name.to_string(),
        args: args.to_string(),
        message: "expected an integer length".to_string(),
    })
}

/// 按 strftime 格式串格式化；无效的格式指示符报 BadArgs 而不是 panic
fn strftime(name: &str, when: DateTime<Local>, format: &str) -> Result<String, MacroError> {
    let items: Vec<Item> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(MacroError::BadArgs {
            name: name.to_string(),
            args: format.to_string(),
            message: "invalid date format".to_string(),
        });
    }
    Ok(when.format_with_items(items.into_iter()).to_string())
}

/// `today_plus(days, format)`: 今天加 days 天，按 format 格式化
fn today_plus(name: &str, args: &str) -> Result<String, MacroError> {
    let bad = |message: &str| MacroError::BadArgs {
        name: name.to_string(),
        args: args.to_string(),
        message: message.to_string(),
    };

    let (days, format) = args
        .split_once(',')
        .ok_or_else(|| bad("expected 'days, format'"))?;
    let days: i64 = days
        .trim()
        .parse()
        .map_err(|_| bad("expected an integer day count"))?;
    let delta = TimeDelta::try_days(days).ok_or_else(|| bad("day count out of range"))?;
    let when = Local::now()
        .checked_add_signed(delta)
        .ok_or_else(|| bad("day count out of range"))?;
    strftime(name, when, format.trim())
}
