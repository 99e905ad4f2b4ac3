use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::core::{ListSink, PushSide, SinkError};
use crate::cfg::serde_duration::{serde_as, HumanDur};

/// 内存列表存储配置
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, SmartDefault)]
#[serde(default)]
pub struct MemoryListSinkConfig {
    /// 追加方向，与 Redis 的 LPUSH/RPUSH 语义一致
    pub push_side: PushSide,

    /// 每次请求的模拟延迟
    #[serde_as(as = "Option<HumanDur>")]
    pub latency: Option<Duration>,
}

/// 进程内的列表存储
///
/// 除了追加之外还记录每一次请求的原始内容，便于检查批次的组成。
/// `set_failing(true)` 之后所有请求都会失败；`set_failing_key` 只让指定列表的追加失败，
/// 批量请求中其余列表照常写入。两者都用于验证失败路径。
pub struct MemoryListSink {
    lists: DashMap<String, Vec<String>>,
    requests: Mutex<Vec<(String, Vec<String>)>>,
    batch_count: AtomicUsize,
    failing: AtomicBool,
    failing_keys: DashSet<String>,
    closed: AtomicBool,
    config: MemoryListSinkConfig,
}

impl MemoryListSink {
    pub fn new(config: MemoryListSinkConfig) -> Self {
        Self {
            lists: DashMap::new(),
            requests: Mutex::new(Vec::new()),
            batch_count: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            failing_keys: DashSet::new(),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// 使后续请求全部失败（或恢复正常）
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 使指定列表的追加失败（或恢复正常）
    pub fn set_failing_key(&self, key: impl Into<String>, failing: bool) {
        let key = key.into();
        if failing {
            self.failing_keys.insert(key);
        } else {
            self.failing_keys.remove(&key);
        }
    }

    /// 列表的当前内容（从头到尾）
    pub fn list(&self, key: &str) -> Vec<String> {
        self.lists
            .get(key)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// 所有列表的 key（已排序）
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lists.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// 成功执行过的追加请求，按接收顺序排列
    pub fn requests(&self) -> Vec<(String, Vec<String>)> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 收到的批量请求次数（包括失败的）
    pub fn batch_count(&self) -> usize {
        self.batch_count.load(Ordering::SeqCst)
    }

    /// 所有列表中的元素总数
    pub fn total_len(&self) -> usize {
        self.lists.iter().map(|e| e.value().len()).sum()
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::CommandFailed("memory sink is failing".to_string()));
        }
        Ok(())
    }

    fn check_key(&self, key: &str) -> Result<(), SinkError> {
        if self.failing_keys.contains(key) {
            return Err(SinkError::CommandFailed(format!("push to {} rejected", key)));
        }
        Ok(())
    }

    fn append(&self, key: String, values: Vec<String>) {
        {
            let mut list = self.lists.entry(key.clone()).or_default();
            match self.config.push_side {
                // LPUSH a b c 的结果为 [c, b, a, ...]
                PushSide::Left => {
                    let tail = std::mem::take(&mut *list);
                    list.extend(values.iter().rev().cloned());
                    list.extend(tail);
                }
                PushSide::Right => list.extend(values.iter().cloned()),
            }
        }

        match self.requests.lock() {
            Ok(mut requests) => requests.push((key, values)),
            Err(poisoned) => poisoned.into_inner().push((key, values)),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.config.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MemoryListSink {
    fn default() -> Self {
        Self::new(MemoryListSinkConfig::default())
    }
}

#[async_trait]
impl ListSink for MemoryListSink {
    async fn push(&self, key: String, values: Vec<String>) -> Result<(), SinkError> {
        self.simulate_latency().await;
        self.check()?;
        self.check_key(&key)?;
        self.append(key, values);
        Ok(())
    }

    async fn batch_push(
        &self,
        keys: Vec<String>,
        vals: Vec<Vec<String>>,
    ) -> Result<Vec<Result<(), SinkError>>, SinkError> {
        if keys.len() != vals.len() {
            return Err(SinkError::InvalidConfig(
                "Keys and values length mismatch".to_string(),
            ));
        }

        self.batch_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check()?;

        Ok(keys
            .into_iter()
            .zip(vals)
            .map(|(key, values)| {
                self.check_key(&key)?;
                self.append(key, values);
                Ok(())
            })
            .collect())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

crate::impl_from!(MemoryListSinkConfig => MemoryListSink);
crate::impl_box_from!(MemoryListSink => dyn ListSink);

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_memory_sink_push_left() {
        let sink = MemoryListSink::default();

        sink.push("k".to_string(), strings(&["a", "b"])).await.unwrap();
        sink.push("k".to_string(), strings(&["c"])).await.unwrap();

        assert_eq!(sink.list("k"), strings(&["c", "b", "a"]));
        assert_eq!(
            sink.requests(),
            vec![
                ("k".to_string(), strings(&["a", "b"])),
                ("k".to_string(), strings(&["c"]))
            ]
        );
    }

    #[tokio::test]
    async fn test_memory_sink_push_right() {
        let sink = MemoryListSink::new(MemoryListSinkConfig {
            push_side: PushSide::Right,
            ..Default::default()
        });

        sink.push("k".to_string(), strings(&["a", "b"])).await.unwrap();
        sink.push("k".to_string(), strings(&["c"])).await.unwrap();

        assert_eq!(sink.list("k"), strings(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_memory_sink_batch_push() {
        let sink = MemoryListSink::default();

        let results = sink
            .batch_push(
                strings(&["k1", "k2"]),
                vec![strings(&["a"]), strings(&["b", "c"])],
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(sink.keys(), strings(&["k1", "k2"]));
        assert_eq!(sink.total_len(), 3);
        assert_eq!(sink.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_sink_batch_push_length_mismatch() {
        let sink = MemoryListSink::default();
        let result = sink.batch_push(strings(&["k1", "k2"]), vec![strings(&["a"])]).await;
        assert!(matches!(result, Err(SinkError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_memory_sink_failing() {
        let sink = MemoryListSink::default();
        sink.set_failing(true);

        let result = sink.batch_push(strings(&["k"]), vec![strings(&["a"])]).await;
        assert!(matches!(result, Err(SinkError::CommandFailed(_))));
        assert_eq!(sink.batch_count(), 1);
        assert_eq!(sink.total_len(), 0);

        sink.set_failing(false);
        sink.push("k".to_string(), strings(&["a"])).await.unwrap();
        assert_eq!(sink.total_len(), 1);
    }

    #[tokio::test]
    async fn test_memory_sink_failing_key() {
        let sink = MemoryListSink::default();
        sink.set_failing_key("k2", true);

        let results = sink
            .batch_push(
                strings(&["k1", "k2", "k3"]),
                vec![strings(&["a"]), strings(&["b"]), strings(&["c"])],
            )
            .await
            .unwrap();

        assert!(results[0].is_ok());
        assert!(matches!(&results[1], Err(SinkError::CommandFailed(msg)) if msg.contains("k2")));
        assert!(results[2].is_ok());
        assert_eq!(sink.keys(), strings(&["k1", "k3"]));

        let result = sink.push("k2".to_string(), strings(&["d"])).await;
        assert!(result.is_err());

        sink.set_failing_key("k2", false);
        sink.push("k2".to_string(), strings(&["d"])).await.unwrap();
        assert_eq!(sink.list("k2"), strings(&["d"]));
    }

    #[tokio::test]
    async fn test_memory_sink_closed() {
        let sink = MemoryListSink::default();
        sink.close().await.unwrap();

        let result = sink.push("k".to_string(), strings(&["a"])).await;
        assert!(matches!(result, Err(SinkError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_sink_latency() {
        let sink = MemoryListSink::new(MemoryListSinkConfig {
            latency: Some(Duration::from_millis(200)),
            ..Default::default()
        });

        let start = tokio::time::Instant::now();
        sink.push("k".to_string(), strings(&["a"])).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_memory_sink_config_from_json() {
        let config: MemoryListSinkConfig =
            json5::from_str(r#"{ push_side: "right", latency: "50ms" }"#).unwrap();
        assert_eq!(config.push_side, PushSide::Right);
        assert_eq!(config.latency, Some(Duration::from_millis(50)));
    }
}
