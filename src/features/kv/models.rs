use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cloudflare v4 API 通用响应信封
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub result: T,
    #[serde(default)]
    pub result_info: Option<ResultInfo>,
}

/// 分页信息（列键接口通过 cursor 翻页）
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResultInfo {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// 令牌校验结果
#[derive(Debug, Deserialize)]
pub(crate) struct TokenStatus {
    pub status: String,
}

/// KV 命名空间
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Namespace {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_url_encoding: Option<bool>,
}

/// 键条目（镜像拉取时刻的远端状态）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyEntry {
    pub name: String,
    /// 过期时间（Unix 秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    /// 不透明的元数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl KeyEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expiration: None,
            metadata: None,
        }
    }
}

/// 一页键列表
#[derive(Debug, Clone, Default)]
pub struct KeyPage {
    pub keys: Vec<KeyEntry>,
    /// 下一页游标；None 表示没有更多页。原样转发，不做解析。
    pub cursor: Option<String>,
}

impl KeyPage {
    /// 空字符串游标与缺省等价
    pub(crate) fn from_wire(keys: Vec<KeyEntry>, info: Option<ResultInfo>) -> Self {
        let cursor = info
            .and_then(|i| i.cursor)
            .filter(|c| !c.is_empty());
        Self { keys, cursor }
    }
}
