use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::CloudflareConfig;
use crate::error::KvError;

use super::models::{Envelope, KeyEntry, KeyPage, Namespace, TokenStatus};

/// 列键接口的默认/最大单页数量
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;

/// 远端 KV API 的四个操作。
///
/// 每次调用对应一次请求/响应：不重试、不缓存、不做并发控制。
/// 导出协调器只依赖这个 trait，测试中可以替换为内存实现。
#[async_trait]
pub trait KvApi: Send + Sync {
    /// 校验令牌是否处于 active 状态。任何失败都降级为 `false`，从不报错。
    async fn verify_token(&self, token: &str) -> bool;

    async fn list_namespaces(
        &self,
        token: &str,
        account_id: &str,
    ) -> Result<Vec<Namespace>, KvError>;

    /// 列出一页键。`cursor` 为 None 时从头开始。
    async fn list_keys(
        &self,
        token: &str,
        account_id: &str,
        namespace_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<KeyPage, KvError>;

    /// 读取单个键的值
    async fn read_value(
        &self,
        token: &str,
        account_id: &str,
        namespace_id: &str,
        key: &str,
    ) -> Result<Value, KvError>;
}

#[async_trait]
impl<T: KvApi + ?Sized> KvApi for Arc<T> {
    async fn verify_token(&self, token: &str) -> bool {
        (**self).verify_token(token).await
    }

    async fn list_namespaces(
        &self,
        token: &str,
        account_id: &str,
    ) -> Result<Vec<Namespace>, KvError> {
        (**self).list_namespaces(token, account_id).await
    }

    async fn list_keys(
        &self,
        token: &str,
        account_id: &str,
        namespace_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<KeyPage, KvError> {
        (**self)
            .list_keys(token, account_id, namespace_id, limit, cursor)
            .await
    }

    async fn read_value(
        &self,
        token: &str,
        account_id: &str,
        namespace_id: &str,
        key: &str,
    ) -> Result<Value, KvError> {
        (**self)
            .read_value(token, account_id, namespace_id, key)
            .await
    }
}

/// Cloudflare Workers KV REST 客户端
#[derive(Clone)]
pub struct CloudflareClient {
    client: reqwest::Client,
    base_url: Url,
}

impl CloudflareClient {
    pub fn new(cfg: &CloudflareConfig) -> Result<Self, KvError> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| KvError::InvalidUrl(format!("{}: {e}", cfg.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(KvError::InvalidUrl(cfg.base_url.clone()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout_duration())
            .user_agent(cfg.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| KvError::Network(format!("初始化 HTTP Client 失败: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// 在基地址后追加路径段；每段单独做百分号编码（键名可能包含 `/`）。
    fn endpoint<I>(&self, segments: I) -> Result<Url, KvError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| KvError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn namespace_endpoint(
        &self,
        account_id: &str,
        namespace_id: &str,
        tail: &[&str],
    ) -> Result<Url, KvError> {
        let head = [
            "accounts",
            account_id,
            "storage",
            "kv",
            "namespaces",
            namespace_id,
        ];
        self.endpoint(head.iter().chain(tail.iter()))
    }

    /// 发送带 Bearer 认证的 GET，非 2xx 时携带状态码与响应体返回错误
    async fn get(
        &self,
        url: Url,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, KvError> {
        tracing::debug!("GET {}", url.path());

        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body 读取失败>".to_string());
            return Err(KvError::RemoteRequest {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<Envelope<T>, KvError> {
        let resp = self.get(url, token, query).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn try_verify_token(&self, token: &str) -> Result<bool, KvError> {
        let url = self.endpoint(["user", "tokens", "verify"])?;
        let env: Envelope<TokenStatus> = self.get_envelope(url, token, &[]).await?;
        Ok(env.result.status == "active")
    }
}

#[async_trait]
impl KvApi for CloudflareClient {
    async fn verify_token(&self, token: &str) -> bool {
        match self.try_verify_token(token).await {
            Ok(active) => {
                if !active {
                    tracing::info!("API 令牌未处于 active 状态");
                }
                active
            }
            Err(e) => {
                tracing::warn!("API 令牌校验失败: {}", e);
                false
            }
        }
    }

    async fn list_namespaces(
        &self,
        token: &str,
        account_id: &str,
    ) -> Result<Vec<Namespace>, KvError> {
        let url = self.endpoint(["accounts", account_id, "storage", "kv", "namespaces"])?;
        let env: Envelope<Vec<Namespace>> = self.get_envelope(url, token, &[]).await?;
        Ok(env.result)
    }

    async fn list_keys(
        &self,
        token: &str,
        account_id: &str,
        namespace_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<KeyPage, KvError> {
        let url = self.namespace_endpoint(account_id, namespace_id, &["keys"])?;
        let limit = limit.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(c) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", c));
        }

        let env: Envelope<Vec<KeyEntry>> = self.get_envelope(url, token, &query).await?;
        Ok(KeyPage::from_wire(env.result, env.result_info))
    }

    async fn read_value(
        &self,
        token: &str,
        account_id: &str,
        namespace_id: &str,
        key: &str,
    ) -> Result<Value, KvError> {
        let url = self.namespace_endpoint(account_id, namespace_id, &["values", key])?;
        let bytes = self.get(url, token, &[]).await?.bytes().await?;
        // 值可能是 JSON，也可能是任意文本；二进制值无法无损表示为 JSON，直接报错
        if let Ok(v) = serde_json::from_slice(&bytes) {
            return Ok(v);
        }
        String::from_utf8(bytes.to_vec())
            .map(Value::String)
            .map_err(|_| {
                KvError::Decode(format!(
                    "键 {key} 的值既不是 JSON 也不是 UTF-8 文本（{} 字节）",
                    bytes.len()
                ))
            })
    }
}
