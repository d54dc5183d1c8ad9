/// Workers KV REST 客户端
pub mod kv;

/// 批量导出协调器
pub mod export;
