use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 初始化全局日志订阅者
///
/// `RUST_LOG` 优先；未设置时使用配置中的级别。重复初始化时静默忽略（便于测试）。
pub fn init(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("kv_export=info"));

    // 日志写到 stderr，stdout 留给导出结果。
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match cfg.format.as_str() {
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    };
}
