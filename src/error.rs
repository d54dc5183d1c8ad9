use thiserror::Error;

/// KV 客户端错误类型
///
/// 所有失败细节（HTTP 状态码、响应体）都原样保留，交由调用方判断是否需要手动重试。
#[derive(Error, Debug)]
pub enum KvError {
    /// 远端返回非 2xx 响应
    #[error("远端请求失败: HTTP {status} - {body}")]
    RemoteRequest {
        /// HTTP 状态码
        status: u16,
        /// 原始响应体
        body: String,
    },

    /// 网络请求错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 超时
    #[error("请求超时")]
    Timeout,

    /// 响应体解析错误
    #[error("响应解析错误: {0}")]
    Decode(String),

    /// URL 构造失败
    #[error("无效的 URL: {0}")]
    InvalidUrl(String),
}

impl KvError {
    /// 远端 HTTP 状态码（仅 `RemoteRequest` 有）
    pub fn status(&self) -> Option<u16> {
        match self {
            KvError::RemoteRequest { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 批量导出错误类型
#[derive(Error, Debug)]
pub enum ExportError {
    /// 导出参数不合法，导出未开始
    #[error("导出参数错误: {0}")]
    InvalidSettings(String),

    /// 键枚举阶段失败
    #[error("键枚举失败: {0}")]
    Listing(#[source] KvError),

    /// 某一批次中任意一个键读取失败，整批作废
    #[error("批量读取失败（键 {key}）: {source}")]
    BatchFetch {
        /// 第一个失败的键
        key: String,
        #[source]
        source: KvError,
    },
}

impl ExportError {
    /// 底层客户端错误（参数错误时为 None）
    pub fn kv_error(&self) -> Option<&KvError> {
        match self {
            ExportError::InvalidSettings(_) => None,
            ExportError::Listing(e) => Some(e),
            ExportError::BatchFetch { source, .. } => Some(source),
        }
    }

    /// 远端 HTTP 状态码，便于调用方决定是否重跑
    pub fn remote_status(&self) -> Option<u16> {
        self.kv_error().and_then(KvError::status)
    }
}

// =============== Error conversions for common external errors ===============

impl From<reqwest::Error> for KvError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            KvError::Timeout
        } else if err.is_decode() {
            KvError::Decode(err.to_string())
        } else {
            KvError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Decode(err.to_string())
    }
}
