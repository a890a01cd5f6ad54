use std::collections::HashMap;

/// 每个 worker 独占的变量存储
///
/// 名称限于大写字母、数字和下划线；值一律是字符串。
/// 随 worker 创建（可预置默认值），被赋值表达式和捕获原地修改，
/// 随 worker 销毁。绝不跨 worker 共享。
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    variables: HashMap<String, String>,
}

impl VariableStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 用默认变量预置
    pub fn with_defaults(defaults: &HashMap<String, String>) -> Self {
        Self {
            variables: defaults.clone(),
        }
    }

    /// 设置变量
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// 获取变量值
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(|s| s.as_str())
    }

    /// 变量是否已赋值
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// 批量插入变量
    pub fn extend(&mut self, vars: HashMap<String, String>) {
        self.variables.extend(vars);
    }

    /// 变量数量
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
