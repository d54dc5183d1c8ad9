use std::ops::Range;

use futures_util::future::try_join_all;

use crate::error::ExportError;
use crate::features::kv::{KeyEntry, KvApi};

use super::models::{ExportRequest, KeyValuePair};

/// `total` 个元素按 `batch_size` 切分后的批次数（向上取整）
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}

/// 按原顺序切分出的批次下标区间；最后一批可能不足 `batch_size`
pub fn batch_ranges(total: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let size = batch_size.max(1);
    (0..total)
        .step_by(size)
        .map(move |start| start..(start + size).min(total))
}

/// 并发读取一批键的值，整批等待完成。
///
/// 任意一个读取失败即放弃整批（其余在途请求随之取消），不保留部分结果。
/// 返回顺序与提交顺序一致，与响应到达顺序无关。
pub(crate) async fn fetch_batch<C>(
    client: &C,
    request: &ExportRequest,
    batch: &[KeyEntry],
) -> Result<Vec<KeyValuePair>, ExportError>
where
    C: KvApi + ?Sized,
{
    let reads = batch.iter().map(|entry| async move {
        match client
            .read_value(
                &request.api_token,
                &request.account_id,
                &request.namespace_id,
                &entry.name,
            )
            .await
        {
            Ok(value) => Ok(KeyValuePair {
                key: entry.name.clone(),
                value,
            }),
            Err(source) => Err(ExportError::BatchFetch {
                key: entry.name.clone(),
                source,
            }),
        }
    });
    try_join_all(reads).await
}
