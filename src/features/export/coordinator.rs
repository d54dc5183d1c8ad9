use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ExportError;
use crate::features::kv::{KeyEntry, KvApi};

use super::batch::{batch_count, batch_ranges, fetch_batch};
use super::models::{
    ExportEvent, ExportPhase, ExportRequest, ExportSettings, ExportState, ExportStatus,
    KeyValuePair, describe_cooldown,
};

/// 批量导出协调器
///
/// 先按游标翻完所有键页，再按固定批次并发读取值；两个阶段严格串行。
/// 请求计数达到预算后固定暂停一段时间再继续，这是唯一的限流手段。
/// 状态只由协调器所在的单个任务修改，无需加锁。
pub struct BulkExporter<C> {
    client: C,
    request: ExportRequest,
    settings: ExportSettings,
    state: ExportState,
    events: Option<mpsc::UnboundedSender<ExportEvent>>,
}

impl<C: KvApi> BulkExporter<C> {
    pub fn new(client: C, request: ExportRequest, settings: ExportSettings) -> Self {
        Self {
            client,
            request,
            settings,
            state: ExportState::default(),
            events: None,
        }
    }

    /// 绑定进度事件通道；接收端提前关闭不会中断导出
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ExportEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> &ExportState {
        &self.state
    }

    pub fn into_state(self) -> ExportState {
        self.state
    }

    /// 执行完整导出：键枚举 -> 分批读值 -> 完成。
    ///
    /// 每次调用都从头开始（不续传）。无论成败都会发出恰好一个终止事件；
    /// 失败时已读取的键值对仍保留在 `state().pairs` 中。
    pub async fn run(&mut self) -> Result<Arc<Vec<KeyValuePair>>, ExportError> {
        self.state = ExportState::default();

        let result = self.run_phases().await;
        match &result {
            Ok(pairs) => {
                self.state.status = ExportStatus::Completed;
                tracing::info!(
                    namespace = %self.request.namespace_id,
                    "导出完成，共 {} 条键值对",
                    pairs.len()
                );
                self.emit(ExportEvent::Completed {
                    all_key_value_pairs: Arc::clone(pairs),
                });
            }
            Err(e) => self.halt(e),
        }
        result
    }

    /// 仅执行键枚举阶段（同样遵守请求预算）。
    ///
    /// 成功时 `status` 停留在 `ListingKeys`；不发出终止事件。
    pub async fn list_all_keys(&mut self) -> Result<&[KeyEntry], ExportError> {
        self.state = ExportState::default();

        let listed = match self.settings.validate() {
            Ok(()) => self.list_keys_phase().await,
            Err(e) => Err(e),
        };
        if let Err(e) = listed {
            self.halt(&e);
            return Err(e);
        }
        Ok(&self.state.keys)
    }

    async fn run_phases(&mut self) -> Result<Arc<Vec<KeyValuePair>>, ExportError> {
        self.settings.validate()?;
        self.list_keys_phase().await?;
        self.fetch_values_phase().await?;
        Ok(Arc::clone(&self.state.pairs))
    }

    async fn list_keys_phase(&mut self) -> Result<(), ExportError> {
        self.state.status = ExportStatus::ListingKeys;
        tracing::info!(
            account = %self.request.account_id,
            namespace = %self.request.namespace_id,
            "开始枚举键"
        );

        loop {
            let cursor = self.state.cursor.clone();
            let message = match cursor.as_deref() {
                Some(c) => format!("从游标 {c} 继续拉取键"),
                None => "从第一页开始拉取键".to_string(),
            };
            self.emit(ExportEvent::Fetching {
                cursor: cursor.clone(),
                message,
            });

            let page = self
                .client
                .list_keys(
                    &self.request.api_token,
                    &self.request.account_id,
                    &self.request.namespace_id,
                    self.settings.page_limit,
                    cursor.as_deref(),
                )
                .await
                .map_err(ExportError::Listing)?;

            self.state.request_count = self.state.request_count.saturating_add(1);
            tracing::debug!(
                "本页 {} 个键，累计 {} 个",
                page.keys.len(),
                self.state.keys.len() + page.keys.len()
            );
            self.state.keys.extend(page.keys);
            self.state.cursor = page.cursor;

            if self.state.cursor.is_none() {
                break;
            }
            if self.budget_exhausted() {
                self.cooldown(ExportPhase::ListingKeys).await;
            }
        }

        tracing::info!("键枚举完成，共 {} 个键", self.state.keys.len());
        Ok(())
    }

    async fn fetch_values_phase(&mut self) -> Result<(), ExportError> {
        self.state.status = ExportStatus::FetchingValues;

        let total_keys = self.state.keys.len();
        let batch_size = self.settings.batch_size;
        let batches = batch_count(total_keys, batch_size);
        tracing::info!("开始读取值：{} 个键，分 {} 批", total_keys, batches);

        for (index, range) in batch_ranges(total_keys, batch_size).enumerate() {
            let fetched = fetch_batch(&self.client, &self.request, &self.state.keys[range]).await?;

            let fetched_len = fetched.len();
            Arc::make_mut(&mut self.state.pairs).extend(fetched);
            self.state.request_count = self
                .state
                .request_count
                .saturating_add(u32::try_from(fetched_len).unwrap_or(u32::MAX));

            tracing::debug!("第 {}/{} 批完成", index + 1, batches);
            self.emit(ExportEvent::Progress {
                total_fetched: self.state.total_fetched(),
                total_keys,
            });

            let is_last = index + 1 == batches;
            if !is_last && self.budget_exhausted() {
                self.cooldown(ExportPhase::FetchingValues).await;
            }
        }
        Ok(())
    }

    fn budget_exhausted(&self) -> bool {
        self.state.request_count >= self.settings.request_budget
    }

    async fn cooldown(&mut self, phase: ExportPhase) {
        let wait = describe_cooldown(self.settings.cooldown);
        self.state.status = ExportStatus::Waiting(phase);
        tracing::warn!(
            "已达到请求上限 {}，暂停 {} 后继续",
            self.settings.request_budget,
            wait
        );
        self.emit(ExportEvent::Waiting {
            message: format!(
                "已达到 {} 次请求上限，等待 {} 后继续",
                self.settings.request_budget, wait
            ),
            cooldown_ms: u64::try_from(self.settings.cooldown.as_millis()).unwrap_or(u64::MAX),
        });

        tokio::time::sleep(self.settings.cooldown).await;

        self.state.request_count = 0;
        self.state.cooldowns += 1;
        self.state.status = match phase {
            ExportPhase::ListingKeys => ExportStatus::ListingKeys,
            ExportPhase::FetchingValues => ExportStatus::FetchingValues,
        };
    }

    fn halt(&mut self, err: &ExportError) {
        self.state.status = ExportStatus::ErrorHalted;
        tracing::warn!(
            namespace = %self.request.namespace_id,
            "导出中止: {}（已读取 {} 条）",
            err,
            self.state.total_fetched()
        );
        self.emit(ExportEvent::from_error(err));
    }

    fn emit(&self, event: ExportEvent) {
        if let Some(tx) = &self.events {
            // 接收端已关闭时丢弃事件，不影响导出本身
            let _ = tx.send(event);
        }
    }
}
