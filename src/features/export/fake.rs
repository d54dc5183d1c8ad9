//! 单元测试用的内存版 KV API

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::KvError;
use crate::features::kv::{KeyEntry, KeyPage, KvApi, Namespace};

#[derive(Default)]
pub(crate) struct FakeKv {
    pages: Vec<Vec<KeyEntry>>,
    /// 为 true 时每页只有一个键且总带着下一页游标
    endless: bool,
    read_failures: HashMap<String, u16>,
    read_delays: HashMap<String, Duration>,
    /// 第 N 次（从 0 计）列键调用返回该状态码
    list_failure: Option<(usize, u16)>,
    list_calls: Mutex<Vec<Option<String>>>,
    read_calls: AtomicUsize,
}

impl FakeKv {
    /// 按页大小生成键，键名全局递增：key-0000, key-0001, ...
    pub fn with_page_sizes(sizes: &[usize]) -> Self {
        let mut next = 0usize;
        let pages = sizes
            .iter()
            .map(|&n| {
                (0..n)
                    .map(|_| {
                        let k = KeyEntry::new(format!("key-{next:04}"));
                        next += 1;
                        k
                    })
                    .collect()
            })
            .collect();
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::default()
        }
    }

    pub fn fail_read(mut self, key: &str, status: u16) -> Self {
        self.read_failures.insert(key.to_string(), status);
        self
    }

    pub fn delay_read(mut self, key: &str, delay: Duration) -> Self {
        self.read_delays.insert(key.to_string(), delay);
        self
    }

    pub fn fail_list_at(mut self, call: usize, status: u16) -> Self {
        self.list_failure = Some((call, status));
        self
    }

    pub fn all_keys(&self) -> Vec<KeyEntry> {
        self.pages.iter().flatten().cloned().collect()
    }

    pub fn value_for(key: &str) -> Value {
        json!({ "stored": key })
    }

    pub fn list_calls(&self) -> Vec<Option<String>> {
        self.list_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    // 游标故意带上 `/`、`+`、`=`，确保调用方原样转发
    fn cursor_for(page: usize) -> String {
        format!("c{page}/opaque+token==")
    }

    fn page_index(cursor: Option<&str>) -> usize {
        cursor
            .and_then(|c| c.strip_prefix('c'))
            .and_then(|c| c.split('/').next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl KvApi for FakeKv {
    async fn verify_token(&self, token: &str) -> bool {
        token == "good-token"
    }

    async fn list_namespaces(
        &self,
        _token: &str,
        _account_id: &str,
    ) -> Result<Vec<Namespace>, KvError> {
        Ok(Vec::new())
    }

    async fn list_keys(
        &self,
        _token: &str,
        _account_id: &str,
        _namespace_id: &str,
        _limit: u32,
        cursor: Option<&str>,
    ) -> Result<KeyPage, KvError> {
        let call = {
            let mut calls = self.list_calls.lock().map_err(|e| KvError::Network(e.to_string()))?;
            calls.push(cursor.map(str::to_string));
            calls.len() - 1
        };
        if let Some((at, status)) = self.list_failure
            && at == call
        {
            return Err(KvError::RemoteRequest {
                status,
                body: "list failed".to_string(),
            });
        }

        let idx = Self::page_index(cursor);
        if self.endless {
            return Ok(KeyPage {
                keys: vec![KeyEntry::new(format!("key-{idx:04}"))],
                cursor: Some(Self::cursor_for(idx + 1)),
            });
        }

        let keys = self.pages.get(idx).cloned().unwrap_or_default();
        let cursor = (idx + 1 < self.pages.len()).then(|| Self::cursor_for(idx + 1));
        Ok(KeyPage { keys, cursor })
    }

    async fn read_value(
        &self,
        _token: &str,
        _account_id: &str,
        _namespace_id: &str,
        key: &str,
    ) -> Result<Value, KvError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(&status) = self.read_failures.get(key) {
            return Err(KvError::RemoteRequest {
                status,
                body: format!("cannot read {key}"),
            });
        }
        Ok(Self::value_for(key))
    }
}
