use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::sleep;

use crate::http::{EngineResponse, HttpEngine, PostPayload};
use crate::parser::Request;
use crate::runner::registry::RunnerRegistry;
use crate::runner::scheduler;
use crate::runner::types::{InvocationStats, RunError, TestGroup};
use crate::variable::{CaptureError, ExpressionResolver, VariableStore};

/// 单个虚拟用户
///
/// 持有自己的变量存储和随机数状态，与其他 worker 互不共享。
/// 生命周期: `new`（执行 before 组，出错即致命）→ 若干次 `call`
/// → `shutdown`（执行 after 组，尽力而为）。
pub struct Worker {
    registry: Arc<RunnerRegistry>,
    engine: Arc<dyn HttpEngine>,
    index: usize,
    variables: VariableStore,
    resolver: ExpressionResolver,
    rng: StdRng,
}

impl Worker {
    /// 创建 worker 并执行 before 组；before 组中任何错误都是致命的
    pub async fn new(
        registry: Arc<RunnerRegistry>,
        engine: Arc<dyn HttpEngine>,
        index: usize,
    ) -> Result<Self, RunError> {
        let mut worker = Self {
            variables: VariableStore::with_defaults(registry.defaults()),
            resolver: ExpressionResolver::new(registry.macros()),
            registry,
            engine,
            index,
            rng: StdRng::from_os_rng(),
        };

        let registry = worker.registry.clone();
        if let Some(before) = registry.before() {
            tracing::info!("worker {} 执行 before 组", worker.index);
            let mut stats = InvocationStats::default();
            worker.run_group(before, &mut stats).await?;
        }

        Ok(worker)
    }

    /// 执行一次调用：按调度方式选组并依次执行
    pub async fn call(&mut self) -> Result<InvocationStats, RunError> {
        let registry = self.registry.clone();
        let selected: Vec<&TestGroup> = scheduler::select(&registry, self.index, &mut self.rng);

        let mut stats = InvocationStats::default();
        for group in selected {
            self.run_group(group, &mut stats).await?;
        }
        Ok(stats)
    }

    /// 执行 after 组；错误只记日志，不向上传播
    pub async fn shutdown(&mut self) {
        let registry = self.registry.clone();
        if let Some(after) = registry.after() {
            tracing::info!("worker {} 执行 after 组", self.index);
            let mut stats = InvocationStats::default();
            if let Err(e) = self.run_group(after, &mut stats).await {
                tracing::warn!("worker {} after 组出错: {}", self.index, e);
            }
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub(crate) fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    /// 按调度方式选组并展开为文件名列表
    pub(crate) fn selected_filenames(&mut self) -> Vec<String> {
        let registry = self.registry.clone();
        scheduler::select(&registry, self.index, &mut self.rng)
            .iter()
            .flat_map(|group| group.members.iter().cloned())
            .collect()
    }

    /// 按序执行组内所有文件的所有请求
    pub(crate) async fn run_group(
        &mut self,
        group: &TestGroup,
        stats: &mut InvocationStats,
    ) -> Result<(), RunError> {
        for filename in &group.members {
            let document = self.registry.document(filename).ok_or_else(|| {
                RunError::Config(format!("unknown webtest file '{}'", filename))
            })?;

            tracing::info!("==== Executing: {} ====", filename);
            for (i, request) in document.requests.iter().enumerate() {
                let number = self.registry.test_number(filename, i);
                let response = self.execute(number, request).await?;
                stats.record_request();

                if response.is_failure() {
                    tracing::warn!("Test {} failed with status {}", number, response.status_code());
                    stats.record_failure();
                }

                match self
                    .resolver
                    .eval_capture(request, response.text(), &mut self.variables)
                {
                    Ok(_) => {}
                    Err(CaptureError::NotFound { pattern }) => {
                        stats.record_failure();
                        return Err(CaptureError::NotFound { pattern }.into());
                    }
                    Err(e) => return Err(e.into()),
                }

                sleep(self.registry.think_time()).await;
            }
        }
        Ok(())
    }

    /// 展开并发出单个请求
    ///
    /// URL、header 值、参数值、请求体都做表达式展开，
    /// 赋值表达式写入本 worker 的变量存储。
    pub(crate) async fn execute(
        &mut self,
        number: u32,
        request: &Request,
    ) -> Result<EngineResponse, RunError> {
        tracing::info!("------ Test {}: {}", number, request);

        let url = self.resolver.expand(&request.url, &mut self.variables)?;

        let mut headers = Vec::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let value = self.resolver.expand(value, &mut self.variables)?;
            headers.push((name.clone(), value));
        }

        let mut parameters = Vec::with_capacity(request.parameters.len());
        for (name, value) in &request.parameters {
            let value = self.resolver.expand(value, &mut self.variables)?;
            parameters.push((name.clone(), value));
        }

        let response = match request.method.as_str() {
            "GET" => self.engine.get(&url, &parameters, &headers).await?,
            "POST" => {
                let body;
                let payload = if !request.body.is_empty() {
                    body = self.resolver.expand(&request.body, &mut self.variables)?;
                    PostPayload::Body(&body)
                } else {
                    PostPayload::Params(&parameters)
                };
                self.engine.post(&url, payload, &headers).await?
            }
            other => {
                return Err(RunError::UnsupportedMethod {
                    method: other.to_string(),
                    line: request.line_number,
                });
            }
        };

        tracing::debug!(
            "Test {} 响应: 状态 {}, {} 字节, 耗时 {:?}",
            number,
            response.status_code(),
            response.text().len(),
            response.duration()
        );
        Ok(response)
    }
}
