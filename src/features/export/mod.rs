pub mod batch;
pub mod coordinator;
pub mod models;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ExportError;
use crate::features::kv::KvApi;

pub use coordinator::BulkExporter;
pub use models::{
    ExportEvent, ExportPhase, ExportRequest, ExportSettings, ExportState, ExportStatus,
    KeyValuePair,
};

/// 后台导出任务的最终结果：状态快照（含部分结果）+ 成败
#[derive(Debug)]
pub struct ExportOutcome {
    pub state: ExportState,
    pub result: Result<Arc<Vec<KeyValuePair>>, ExportError>,
}

/// 后台导出任务句柄：事件流 + 结果
pub struct ExportTask {
    pub events: mpsc::UnboundedReceiver<ExportEvent>,
    pub handle: JoinHandle<ExportOutcome>,
}

/// 在独立的 tokio 任务中运行导出，调用方通过事件通道跟踪进度。
///
/// 导出一旦开始不支持中途取消；事件通道在任务结束后关闭。
pub fn spawn_export<C>(client: C, request: ExportRequest, settings: ExportSettings) -> ExportTask
where
    C: KvApi + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut exporter = BulkExporter::new(client, request, settings).with_events(tx);
        let result = exporter.run().await;
        ExportOutcome {
            state: exporter.into_state(),
            result,
        }
    });
    ExportTask { events: rx, handle }
}
