use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::logger::Verbosity;
use crate::macros::{BuiltinMacros, MacroRegistry};
use crate::parser::{self, Document};
use crate::runner::types::{RunError, Sequence, TestGroup};

/// 一次测试运行的不可变共享配置
///
/// 构建时解析所有 `.webtest` 文件（每个文件只解析一次）并分配
/// 测试编号：第 i 个首见文件的基数是 1000*(i+1)，文件内第 j 个
/// 请求编号为基数 + j + 1。构建完成后用 `Arc` 分发给各 worker。
pub struct RunnerRegistry {
    documents: HashMap<String, Arc<Document>>,
    bases: HashMap<String, u32>,
    groups: Vec<TestGroup>,
    /// weighted 调度的归一化累积上界，与 groups 一一对应
    cumulative: Vec<f64>,
    before: Option<TestGroup>,
    after: Option<TestGroup>,
    sequence: Sequence,
    think_time: Duration,
    defaults: HashMap<String, String>,
    macros: Arc<dyn MacroRegistry>,
    verbosity: Verbosity,
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry").finish_non_exhaustive()
    }
}

impl RunnerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn document(&self, filename: &str) -> Option<Arc<Document>> {
        self.documents.get(filename).cloned()
    }

    pub fn groups(&self) -> &[TestGroup] {
        &self.groups
    }

    pub fn cumulative_weights(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn before(&self) -> Option<&TestGroup> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&TestGroup> {
        self.after.as_ref()
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn think_time(&self) -> Duration {
        self.think_time
    }

    pub fn defaults(&self) -> &HashMap<String, String> {
        &self.defaults
    }

    pub fn macros(&self) -> Arc<dyn MacroRegistry> {
        self.macros.clone()
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// 文件内第 `index` 个请求的测试编号
    pub fn test_number(&self, filename: &str, index: usize) -> u32 {
        let base = self.bases.get(filename).copied().unwrap_or(0);
        base + index as u32 + 1
    }
}

/// [`RunnerRegistry`] 的构建器
///
/// 默认值: sequential 调度、500ms think time、内置宏、quiet 日志。
pub struct RegistryBuilder {
    groups: Vec<TestGroup>,
    before: Option<TestGroup>,
    after: Option<TestGroup>,
    sequence: Sequence,
    think_time: Duration,
    defaults: HashMap<String, String>,
    macros: Arc<dyn MacroRegistry>,
    verbosity: Verbosity,
    /// 预置文档，按 filename 覆盖磁盘解析（用于内存中构建的文档）
    preloaded: HashMap<String, Arc<Document>>,
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder").finish_non_exhaustive()
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            before: None,
            after: None,
            sequence: Sequence::Sequential,
            think_time: Duration::from_millis(500),
            defaults: HashMap::new(),
            macros: Arc::new(BuiltinMacros),
            verbosity: Verbosity::Quiet,
            preloaded: HashMap::new(),
        }
    }

    pub fn group(mut self, group: TestGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn groups(mut self, groups: impl IntoIterator<Item = TestGroup>) -> Self {
        self.groups.extend(groups);
        self
    }

    /// 每个 worker 启动时执行一次的组（登录等）
    pub fn before(mut self, group: TestGroup) -> Self {
        self.before = Some(group);
        self
    }

    /// 每个 worker 结束时执行一次的组（登出等）
    pub fn after(mut self, group: TestGroup) -> Self {
        self.after = Some(group);
        self
    }

    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = sequence;
        self
    }

    /// 每个请求之后的停顿
    pub fn think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    /// 预置一个默认变量
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    pub fn variables(mut self, vars: HashMap<String, String>) -> Self {
        self.defaults.extend(vars);
        self
    }

    pub fn macros(mut self, macros: Arc<dyn MacroRegistry>) -> Self {
        self.macros = macros;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// 直接注入内存中构建的文档，filename 必须非空
    pub fn document(mut self, document: Document) -> Result<Self, RunError> {
        if document.filename.is_empty() {
            return Err(RunError::Config(
                "document must carry a filename".to_string(),
            ));
        }
        self.preloaded
            .insert(document.filename.clone(), Arc::new(document));
        Ok(self)
    }

    pub fn build(self) -> Result<RunnerRegistry, RunError> {
        if self.groups.is_empty() && matches!(self.sequence, Sequence::Random | Sequence::Weighted | Sequence::Thread) {
            return Err(RunError::Config(format!(
                "{:?} sequencing requires at least one test group",
                self.sequence
            )));
        }

        let cumulative = if self.sequence == Sequence::Weighted {
            build_cumulative(&self.groups)?
        } else {
            Vec::new()
        };

        // 按首见顺序解析: before、各组、after
        let mut documents: HashMap<String, Arc<Document>> = HashMap::new();
        let mut bases: HashMap<String, u32> = HashMap::new();
        let ordered = self
            .before
            .iter()
            .chain(self.groups.iter())
            .chain(self.after.iter());
        for group in ordered {
            for filename in &group.members {
                if documents.contains_key(filename) {
                    continue;
                }
                let document = match self.preloaded.get(filename) {
                    Some(preloaded) => preloaded.clone(),
                    None => Arc::new(parser::parse_file(filename)?),
                };
                let base = 1000 * (documents.len() as u32 + 1);
                tracing::debug!("已解析 {} ({} 个请求), 编号基数 {}", filename, document.len(), base);
                documents.insert(filename.clone(), document);
                bases.insert(filename.clone(), base);
            }
        }

        Ok(RunnerRegistry {
            documents,
            bases,
            groups: self.groups,
            cumulative,
            before: self.before,
            after: self.after,
            sequence: self.sequence,
            think_time: self.think_time,
            defaults: self.defaults,
            macros: self.macros,
            verbosity: self.verbosity,
        })
    }
}

/// 归一化权重为累积上界序列，最后一项为 1.0
fn build_cumulative(groups: &[TestGroup]) -> Result<Vec<f64>, RunError> {
    let mut total = 0.0;
    for group in groups {
        if !group.weight.is_finite() || group.weight <= 0.0 {
            return Err(RunError::Config(format!(
                "group weight must be positive, got {}",
                group.weight
            )));
        }
        total += group.weight;
    }

    let mut upper = 0.0;
    let mut cumulative = Vec::with_capacity(groups.len());
    for group in groups {
        upper += group.weight / total;
        cumulative.push(upper);
    }
    if let Some(last) = cumulative.last_mut() {
        *last = 1.0;
    }
    Ok(cumulative)
}
