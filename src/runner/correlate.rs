use std::collections::HashMap;
use std::sync::Arc;

use crate::http::HttpEngine;
use crate::runner::registry::RunnerRegistry;
use crate::runner::types::{InvocationStats, RunError};
use crate::runner::worker::Worker;

/// 一个参数的关联分析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationReport {
    /// 参数名
    pub parameter: String,

    /// 发送该参数的测试编号
    pub test_number: u32,

    /// 之前哪些测试的响应体里出现过这个参数名；空表示没找到
    pub found_in: Vec<u32>,
}

impl CorrelationReport {
    pub fn is_correlated(&self) -> bool {
        !self.found_in.is_empty()
    }
}

/// 关联分析 worker
///
/// 跟 [`Worker`] 走同一条执行路径，但跳过捕获求值，改为留存每个
/// 响应体。每个请求发出前检查它的参数名有没有在更早的响应里出现
/// 过：出现过说明该参数值可能应该从响应里捕获而不是写死。
pub struct CorrelationWorker {
    worker: Worker,
    /// 文件名 -> 该文件各请求的 (测试编号, 响应体)
    responses: HashMap<String, Vec<(u32, String)>>,
    reports: Vec<CorrelationReport>,
}

impl CorrelationWorker {
    pub async fn new(
        registry: Arc<RunnerRegistry>,
        engine: Arc<dyn HttpEngine>,
        index: usize,
    ) -> Result<Self, RunError> {
        // 关联分析不执行 before/after 之外的捕获，但 before 组
        // 仍然走标准路径（登录产生的变量是后续请求的前提）
        let worker = Worker::new(registry, engine, index).await?;
        Ok(Self {
            worker,
            responses: HashMap::new(),
            reports: Vec::new(),
        })
    }

    /// 执行一次调用并做关联分析
    pub async fn call(&mut self) -> Result<InvocationStats, RunError> {
        let filenames = self.worker.selected_filenames();

        let mut stats = InvocationStats::default();
        for filename in filenames {
            self.run_file(&filename, &mut stats).await?;
        }
        Ok(stats)
    }

    async fn run_file(
        &mut self,
        filename: &str,
        stats: &mut InvocationStats,
    ) -> Result<(), RunError> {
        let document = self
            .worker
            .registry()
            .document(filename)
            .ok_or_else(|| RunError::Config(format!("unknown webtest file '{}'", filename)))?;

        tracing::info!("==== Correlating: {} ====", filename);
        for (i, request) in document.requests.iter().enumerate() {
            let number = self.worker.registry().test_number(filename, i);
            self.analyze_parameters(filename, request, number);

            let response = self.worker.execute(number, request).await?;
            stats.record_request();
            if response.is_failure() {
                stats.record_failure();
            }

            // 捕获跳过，响应体留存供后续请求比对
            self.responses
                .entry(filename.to_string())
                .or_default()
                .push((number, response.text().to_string()));
        }
        Ok(())
    }

    /// 检查请求参数名是否出现在同一文件更早请求的响应体中
    fn analyze_parameters(&mut self, filename: &str, request: &crate::parser::Request, number: u32) {
        let Some(responses) = self.responses.get(filename) else {
            return;
        };
        if responses.is_empty() {
            return;
        }

        for (name, value) in &request.parameters {
            // 已是变量或值为空的参数不算候选
            if value.is_empty() || self.worker.variables().contains(name) {
                continue;
            }

            let found_in: Vec<u32> = responses
                .iter()
                .filter(|(_, body)| body.contains(name.as_str()))
                .map(|(test_number, _)| *test_number)
                .collect();

            if found_in.is_empty() {
                tracing::info!("--- '{}' not found in any earlier response", name);
            } else {
                tracing::info!(
                    "+++ '{}' found in response from test number(s) {:?}",
                    name,
                    found_in
                );
            }

            self.reports.push(CorrelationReport {
                parameter: name.clone(),
                test_number: number,
                found_in,
            });
        }
    }

    pub fn reports(&self) -> &[CorrelationReport] {
        &self.reports
    }

    pub async fn shutdown(&mut self) {
        self.worker.shutdown().await;
    }
}
