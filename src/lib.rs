/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 日志初始化
pub mod logging;

/// 功能聚合模块
pub mod features;

// 导出常用类型供外部使用
pub use config::AppConfig;
pub use error::{ExportError, KvError};
pub use features::export::{
    BulkExporter, ExportEvent, ExportOutcome, ExportRequest, ExportSettings, ExportState,
    ExportStatus, ExportTask, KeyValuePair, spawn_export,
};
pub use features::kv::{CloudflareClient, KeyEntry, KeyPage, KvApi, Namespace};
