use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExportError;
use crate::features::kv::{DEFAULT_PAGE_LIMIT, KeyEntry};

/// 一次导出的目标与凭据
#[derive(Clone)]
pub struct ExportRequest {
    pub api_token: String,
    pub account_id: String,
    pub namespace_id: String,
}

impl ExportRequest {
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        namespace_id: impl Into<String>,
    ) -> Self {
        Self {
            api_token: api_token.into(),
            account_id: account_id.into(),
            namespace_id: namespace_id.into(),
        }
    }
}

// 令牌不进入日志
impl fmt::Debug for ExportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRequest")
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("namespace_id", &self.namespace_id)
            .finish()
    }
}

/// 导出参数：分页大小、批次大小、请求预算与冷却时长
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub page_limit: u32,
    pub batch_size: usize,
    /// 达到该请求数后暂停 `cooldown`，然后计数清零
    pub request_budget: u32,
    pub cooldown: Duration,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            batch_size: 100,
            request_budget: 1200,
            cooldown: Duration::from_secs(5 * 60),
        }
    }
}

impl ExportSettings {
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.page_limit == 0 || self.page_limit > DEFAULT_PAGE_LIMIT {
            return Err(ExportError::InvalidSettings(format!(
                "page_limit 必须在 1..={DEFAULT_PAGE_LIMIT} 之间，当前为 {}",
                self.page_limit
            )));
        }
        if self.batch_size == 0 {
            return Err(ExportError::InvalidSettings(
                "batch_size 必须大于 0".to_string(),
            ));
        }
        if self.request_budget == 0 {
            return Err(ExportError::InvalidSettings(
                "request_budget 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 导出结果中的一条键值对
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: Value,
}

/// 冷却发生时所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportPhase {
    ListingKeys,
    FetchingValues,
}

/// 导出状态机
///
/// `Idle -> ListingKeys -> FetchingValues -> Completed`，两个活动阶段都可能进入
/// `ErrorHalted`；`Waiting` 是活动阶段内部的限流暂停。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportStatus {
    #[default]
    Idle,
    ListingKeys,
    FetchingValues,
    Waiting(ExportPhase),
    Completed,
    ErrorHalted,
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::ErrorHalted)
    }
}

/// 协调器独占的运行期状态；不跨进程持久化，每次运行重新创建
#[derive(Debug, Clone, Default)]
pub struct ExportState {
    /// 按 API 返回顺序、按页拼接的全部键，追加后不重排、不去重
    pub keys: Vec<KeyEntry>,
    /// 已成功读取的键值对，按键顺序排列
    pub pairs: Arc<Vec<KeyValuePair>>,
    pub cursor: Option<String>,
    /// 距离上次冷却以来的请求数
    pub request_count: u32,
    /// 已发生的冷却次数
    pub cooldowns: u32,
    pub status: ExportStatus,
}

impl ExportState {
    pub fn total_fetched(&self) -> usize {
        self.pairs.len()
    }
}

/// 推送给调用方（UI/CLI）的进度事件。每次运行恰好有一个终止事件。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExportEvent {
    Fetching {
        cursor: Option<String>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Waiting {
        message: String,
        cooldown_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Progress {
        total_fetched: usize,
        total_keys: usize,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        all_key_value_pairs: Arc<Vec<KeyValuePair>>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_status: Option<u16>,
    },
}

/// 冷却时长的可读形式；不足整秒时按毫秒显示，避免显示成 0 秒
pub(crate) fn describe_cooldown(cooldown: Duration) -> String {
    if cooldown.subsec_millis() == 0 {
        format!("{} 秒", cooldown.as_secs())
    } else {
        format!("{} 毫秒", cooldown.as_millis())
    }
}

impl ExportEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportEvent::Completed { .. } | ExportEvent::Error { .. })
    }

    pub(crate) fn from_error(err: &ExportError) -> Self {
        ExportEvent::Error {
            message: err.to_string(),
            remote_status: err.remote_status(),
        }
    }
}

impl fmt::Display for ExportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportEvent::Fetching { message, .. } | ExportEvent::Waiting { message, .. } => {
                f.write_str(message)
            }
            ExportEvent::Progress {
                total_fetched,
                total_keys,
            } => write!(f, "已读取 {total_fetched}/{total_keys}"),
            ExportEvent::Completed {
                all_key_value_pairs,
            } => write!(f, "导出完成，共 {} 条", all_key_value_pairs.len()),
            ExportEvent::Error { message, .. } => write!(f, "导出失败: {message}"),
        }
    }
}
