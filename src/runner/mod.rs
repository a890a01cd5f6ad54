pub mod correlate;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use correlate::{CorrelationReport, CorrelationWorker};
pub use registry::{RegistryBuilder, RunnerRegistry};
pub use types::{InvocationStats, RunError, Sequence, TestGroup, WorkerReport};
pub use worker::Worker;

use std::sync::Arc;

use crate::http::HttpEngine;

/// 启动 `workers` 个并发 worker，每个执行 `invocations` 次调用
///
/// 可恢复错误（捕获未命中）记入失败后继续下一次调用；
/// 其余错误终止该 worker 并记入报告的 `fatal`。
/// 无论如何都会执行 `shutdown`。
pub async fn run_workers(
    registry: Arc<RunnerRegistry>,
    engine: Arc<dyn HttpEngine>,
    workers: usize,
    invocations: usize,
) -> Vec<WorkerReport> {
    let mut handles = Vec::with_capacity(workers);

    for index in 0..workers {
        let registry = registry.clone();
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut report = WorkerReport {
                index,
                ..WorkerReport::default()
            };

            let mut worker = match Worker::new(registry, engine, index).await {
                Ok(worker) => worker,
                Err(e) => {
                    tracing::error!("worker {} 初始化失败: {}", index, e);
                    report.fatal = Some(e.to_string());
                    return report;
                }
            };

            for _ in 0..invocations {
                match worker.call().await {
                    Ok(stats) => {
                        report.invocations += 1;
                        report.requests += stats.requests;
                        if !stats.success() {
                            report.failed += 1;
                        }
                    }
                    Err(e) if e.is_recoverable() => {
                        tracing::warn!("worker {} 调用失败（可恢复）: {}", index, e);
                        report.invocations += 1;
                        report.failed += 1;
                    }
                    Err(e) => {
                        tracing::error!("worker {} 致命错误: {}", index, e);
                        report.fatal = Some(e.to_string());
                        break;
                    }
                }
            }

            worker.shutdown().await;
            report
        }));
    }

    let mut reports = Vec::with_capacity(workers);
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => tracing::error!("worker 任务崩溃: {}", e),
        }
    }
    reports.sort_by_key(|report| report.index);
    reports
}
