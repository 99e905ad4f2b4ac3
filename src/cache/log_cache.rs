use anyhow::{anyhow, Result};
use garde::Validate;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::time::Instant;

use super::bucket::{bucket_key, BucketMap};
use super::flush_timer::FlushTimer;
use crate::cfg::serde_duration::{non_zero_duration, serde_as, HumanDur};
use crate::cfg::TypeOptions;
use crate::log::{LogDriver, LogLevel, Logger, LoggerConfig};
use crate::sink::{create_sink_from_options, register_sinks, ListSink};

/// 默认的缓冲条数上限
pub const DEFAULT_CAPACITY: usize = 1024;

/// 默认的刷新间隔
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

static SINKS_REGISTERED: OnceCell<()> = OnceCell::new();

/// LogCache 配置
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, SmartDefault, Validate)]
#[serde(default)]
pub struct LogCacheConfig {
    /// 服务名，作为 key 的第二段
    #[garde(length(min = 1))]
    pub service: String,

    /// 列表存储，未配置时需要之后调用 `attach_sink`
    #[garde(skip)]
    pub sink: Option<TypeOptions>,

    /// 缓冲条数达到该值时立即刷新
    #[default(DEFAULT_CAPACITY)]
    #[garde(range(min = 1))]
    pub capacity: usize,

    /// 距上次刷新超过该时间后由定时器刷新
    #[serde_as(as = "HumanDur")]
    #[default(DEFAULT_FLUSH_INTERVAL)]
    #[garde(custom(non_zero_duration))]
    pub flush_interval: Duration,

    /// 定时器的检查周期，默认与 flush_interval 相同
    #[serde_as(as = "Option<HumanDur>")]
    #[garde(skip)]
    pub check_interval: Option<Duration>,

    /// 自身诊断日志的 Logger
    #[default(default_diagnostic_logger())]
    #[garde(skip)]
    pub logger: LoggerConfig,
}

fn default_diagnostic_logger() -> LoggerConfig {
    LoggerConfig {
        subject: "logger.cache".to_string(),
        driver: TypeOptions::new("ConsoleDriver", serde_json::json!({ "target": "stderr" })),
        ..Default::default()
    }
}

struct State {
    buckets: BucketMap,
    last_flush_at: Instant,
}

struct Inner {
    service: String,
    capacity: usize,
    flush_interval: Duration,
    state: Mutex<State>,
    sink: OnceCell<Arc<dyn ListSink>>,
    logger: Arc<Logger>,
    runtime: Handle,
    flush_count: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, text: String, subject: &str, time: SystemTime) {
        let key = bucket_key(&self.service, subject, time);

        // 追加和达到容量后的取走在同一个临界区内完成，每次触发恰好取走 capacity 条
        let delivery = {
            let mut state = self.lock();
            if state.buckets.push(key, text) < self.capacity {
                return;
            }
            self.take_batches(&mut state)
        };

        if let Some(delivery) = delivery {
            self.runtime.spawn(delivery);
        }
    }

    /// 取走并清空缓冲区，返回发送这批日志的 future
    ///
    /// 清空在返回之前同步完成，发送期间的新日志进入新的缓冲区。
    /// 未挂载 sink 时不做任何修改并返回 None。
    fn begin_flush(&self) -> Option<impl Future<Output = ()> + Send + 'static> {
        let mut state = self.lock();
        self.take_batches(&mut state)
    }

    fn take_batches(&self, state: &mut State) -> Option<impl Future<Output = ()> + Send + 'static> {
        let sink = self.sink.get()?.clone();

        state.last_flush_at = Instant::now();
        let batches = state.buckets.take();
        self.flush_count.fetch_add(1, Ordering::Relaxed);

        Some(deliver(sink, self.logger.clone(), batches))
    }

    async fn flush(&self) {
        if let Some(delivery) = self.begin_flush() {
            delivery.await;
        }
    }

    async fn try_flush(&self) {
        let due = self.lock().last_flush_at.elapsed() >= self.flush_interval;
        if due {
            self.flush().await;
        }
    }
}

/// 发送一批日志，失败只记录诊断日志，不向上传播
async fn deliver(
    sink: Arc<dyn ListSink>,
    logger: Arc<Logger>,
    batches: HashMap<String, Vec<String>>,
) {
    if batches.is_empty() {
        return;
    }

    let entries: usize = batches.values().map(Vec::len).sum();
    let (keys, vals): (Vec<String>, Vec<Vec<String>>) = batches.into_iter().unzip();
    let key_count = keys.len();

    match sink.batch_push(keys.clone(), vals).await {
        Ok(results) => {
            let mut failed = 0usize;
            for (key, result) in keys.iter().zip(results) {
                if let Err(e) = result {
                    failed += 1;
                    let _ = logger.errorm(
                        "failed to push log list",
                        vec![("key", key.as_str().into()), ("error", e.to_string().into())],
                    );
                }
            }
            if failed == 0 {
                let _ = logger.logm(
                    LogLevel::Debug,
                    "log batch pushed",
                    vec![("keys", key_count.into()), ("entries", entries.into())],
                );
            }
        }
        Err(e) => {
            let _ = logger.errorm(
                "failed to push log batch",
                vec![
                    ("keys", key_count.into()),
                    ("entries", entries.into()),
                    ("error", e.to_string().into()),
                ],
            );
        }
    }
}

/// 写缓冲的日志驱动
///
/// 日志按 `log_<service>_<subject>_<小时>` 分桶缓存在内存中，满足以下任一条件时
/// 把全部桶通过一次批量请求写入列表存储：
///
/// - 缓冲条数达到 `capacity`（由触发的那次 `write` 发起，在后台发送）
/// - 定时器发现距上次刷新已超过 `flush_interval`
/// - 调用 `flush` 或 `close`
///
/// 刷新采用乐观清空：缓冲区在发送前清空，发送失败的日志不会重试。
/// 没有挂载 sink 时日志一直保留在缓冲区中。
///
/// 必须在 tokio runtime 中创建。
///
/// # 示例
/// ```ignore
/// use logcache::cache::{LogCache, LogCacheConfig};
///
/// let cache = LogCache::new(LogCacheConfig {
///     service: "api".to_string(),
///     sink: Some(TypeOptions::from_json(r#"{ type: "RedisListSink", options: { endpoint: "localhost:6379" } }"#)?),
///     ..Default::default()
/// })?;
///
/// cache.write("GET /health 200", "access", LogLevel::Info, SystemTime::now());
/// cache.close().await;
/// ```
pub struct LogCache {
    inner: Arc<Inner>,
    timer: FlushTimer,
}

impl LogCache {
    /// 从配置创建，诊断日志使用配置中的 Logger
    pub fn new(config: LogCacheConfig) -> Result<Self> {
        let logger = Arc::new(Logger::new(config.logger.clone())?);
        Self::with_logger(config, logger)
    }

    /// 从配置创建，诊断日志使用给定的 Logger
    pub fn with_logger(config: LogCacheConfig, logger: Arc<Logger>) -> Result<Self> {
        if let Err(errors) = config.validate() {
            return Err(anyhow!("invalid LogCache config: {}", errors));
        }
        let check_interval = config.check_interval.unwrap_or(config.flush_interval);
        if check_interval.is_zero() {
            return Err(anyhow!("check_interval must be greater than zero"));
        }

        let runtime = Handle::try_current()
            .map_err(|e| anyhow!("LogCache must be created inside a tokio runtime: {}", e))?;

        let sink = OnceCell::new();
        if let Some(options) = &config.sink {
            SINKS_REGISTERED.get_or_try_init(register_sinks)?;
            let _ = sink.set(create_sink_from_options(options)?);
        }

        let inner = Arc::new(Inner {
            service: config.service,
            capacity: config.capacity,
            flush_interval: config.flush_interval,
            state: Mutex::new(State {
                buckets: BucketMap::new(),
                last_flush_at: Instant::now(),
            }),
            sink,
            logger,
            runtime: runtime.clone(),
            flush_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let timer = FlushTimer::start(&runtime, check_interval, move || {
            let inner = weak.upgrade()?;
            Some(async move { inner.try_flush().await })
        });

        Ok(Self { inner, timer })
    }

    /// 使用已有的 sink 创建，其余配置取默认值
    pub fn with_sink(
        service: impl Into<String>,
        sink: Arc<dyn ListSink>,
        capacity: usize,
        flush_interval: Duration,
    ) -> Result<Self> {
        let cache = Self::new(LogCacheConfig {
            service: service.into(),
            capacity,
            flush_interval,
            ..Default::default()
        })?;
        cache.attach_sink(sink);
        Ok(cache)
    }

    /// 挂载列表存储，只有第一次调用生效
    ///
    /// 返回是否挂载成功
    pub fn attach_sink(&self, sink: Arc<dyn ListSink>) -> bool {
        match self.inner.sink.set(sink) {
            Ok(()) => {
                let _ = self.inner.logger.infom(
                    "list sink attached",
                    vec![("service", self.inner.service.as_str().into())],
                );
                true
            }
            Err(_) => {
                let _ = self.inner.logger.warn("list sink already attached, ignoring");
                false
            }
        }
    }

    /// 缓冲一条日志
    ///
    /// 缓冲条数达到上限且已挂载 sink 时，返回前缓冲区已被清空，发送在后台进行
    ///
    /// `level` 只随日志传入，不参与分桶
    pub fn write(&self, text: impl Into<String>, subject: &str, _level: LogLevel, time: SystemTime) {
        self.inner.write(text.into(), subject, time);
    }

    /// 立即刷新，等待本次发送结束
    ///
    /// 未挂载 sink 时什么也不做
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// 距上次刷新超过 flush_interval 时刷新
    pub async fn try_flush(&self) {
        self.inner.try_flush().await;
    }

    /// 停止定时器并刷新剩余日志
    ///
    /// 定时器已经发出的刷新不等待
    pub async fn close(&self) {
        self.timer.stop();
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.flush().await;
        let _ = self.inner.logger.logm(
            LogLevel::Debug,
            "log cache closed",
            vec![
                ("service", self.inner.service.as_str().into()),
                ("pending", self.pending().into()),
            ],
        );
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn flush_interval(&self) -> Duration {
        self.inner.flush_interval
    }

    /// 缓冲中的日志条数
    pub fn pending(&self) -> usize {
        self.inner.lock().buckets.pending()
    }

    /// 缓冲中的桶数
    pub fn bucket_count(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// 缓冲区内容的副本
    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        self.inner.lock().buckets.snapshot()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.sink.get().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// 上次刷新的时间，从未刷新时为创建时间
    pub fn last_flush_at(&self) -> Instant {
        self.inner.lock().last_flush_at
    }

    /// 已发起的刷新次数（空缓冲区的刷新也计入）
    pub fn flush_count(&self) -> u64 {
        self.inner.flush_count.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl LogDriver for LogCache {
    fn write(&self, text: &str, subject: &str, _level: LogLevel, time: SystemTime) {
        self.inner.write(text.to_string(), subject, time);
    }

    async fn flush(&self) -> Result<()> {
        LogCache::flush(self).await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        LogCache::close(self).await;
        Ok(())
    }
}

crate::impl_from!(LogCacheConfig => LogCache, expect: "Failed to create LogCache");
crate::impl_box_from!(LogCache => dyn LogDriver);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::bucket::hour_bucket;
    use crate::sink::{MemoryListSink, MemoryListSinkConfig, PushSide};
    use std::time::UNIX_EPOCH;

    #[derive(Default)]
    struct CaptureDriver {
        lines: Mutex<Vec<(String, LogLevel)>>,
    }

    impl CaptureDriver {
        fn lines_at(&self, level: LogLevel) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, l)| *l == level)
                .map(|(text, _)| text.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl LogDriver for CaptureDriver {
        fn write(&self, text: &str, _subject: &str, level: LogLevel, _time: SystemTime) {
            self.lines.lock().unwrap().push((text.to_string(), level));
        }
    }

    fn config(capacity: usize, flush_interval: Duration) -> LogCacheConfig {
        LogCacheConfig {
            service: "svc".to_string(),
            capacity,
            flush_interval,
            ..Default::default()
        }
    }

    fn new_cache(capacity: usize, flush_interval: Duration) -> (LogCache, Arc<CaptureDriver>) {
        let capture = Arc::new(CaptureDriver::default());
        let logger = Arc::new(Logger::with_text_driver(
            "logger.cache",
            LogLevel::Debug,
            capture.clone(),
        ));
        let cache = LogCache::with_logger(config(capacity, flush_interval), logger).unwrap();
        (cache, capture)
    }

    fn right_sink(latency: Option<Duration>) -> Arc<MemoryListSink> {
        Arc::new(MemoryListSink::new(MemoryListSinkConfig {
            push_side: PushSide::Right,
            latency,
        }))
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_log_cache_config_default() {
        let config = LogCacheConfig::default();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.check_interval, None);
        assert_eq!(config.sink, None);
        assert_eq!(config.logger.subject, "logger.cache");
    }

    #[test]
    fn test_log_cache_config_from_json() {
        let config: LogCacheConfig = json5::from_str(
            r#"
            {
                service: "api",
                capacity: 500,
                flush_interval: "10s",
                check_interval: "1s",
                sink: { type: "RedisListSink", options: { endpoint: "localhost:6379" } },
            }
        "#,
        )
        .unwrap();

        assert_eq!(config.service, "api");
        assert_eq!(config.capacity, 500);
        assert_eq!(config.flush_interval, Duration::from_secs(10));
        assert_eq!(config.check_interval, Some(Duration::from_secs(1)));
        assert_eq!(config.sink.unwrap().type_name, "RedisListSink");
    }

    #[test]
    fn test_log_cache_requires_runtime() {
        let result = LogCache::new(config(10, Duration::from_secs(1)));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_log_cache_config_validation() {
        assert!(LogCache::new(LogCacheConfig::default()).is_err());
        let err = LogCache::new(config(0, Duration::from_secs(1)))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("capacity"));
        assert!(LogCache::new(config(10, Duration::ZERO)).is_err());
        assert!(LogCache::new(LogCacheConfig {
            check_interval: Some(Duration::ZERO),
            ..config(10, Duration::from_secs(1))
        })
        .is_err());
        assert!(LogCache::new(config(10, Duration::from_secs(1))).is_ok());
    }

    #[tokio::test]
    async fn test_log_cache_with_sink_from_config() {
        let cache = LogCache::new(LogCacheConfig {
            sink: Some(TypeOptions::with_type("MemoryListSink")),
            ..config(10, Duration::from_secs(60))
        })
        .unwrap();
        assert!(cache.is_attached());
        assert!(crate::cfg::is_trait_registered::<dyn ListSink>("MemoryListSink"));
        assert!(crate::cfg::is_trait_registered::<dyn ListSink>("RedisListSink"));

        let result = LogCache::new(LogCacheConfig {
            sink: Some(TypeOptions::with_type("NoSuchSink")),
            ..config(10, Duration::from_secs(60))
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_log_cache_write_groups_by_bucket() {
        let (cache, _) = new_cache(100, Duration::from_secs(60));
        let t0 = UNIX_EPOCH + Duration::from_millis(1_700_000_000_000);
        let hour = hour_bucket(t0);

        cache.write("a", "access", LogLevel::Info, t0);
        cache.write("b", "access", LogLevel::Info, t0 + Duration::from_secs(1));
        cache.write("c", "error", LogLevel::Info, t0);
        cache.write("d", "access", LogLevel::Info, t0 + Duration::from_secs(3600));

        assert_eq!(cache.pending(), 4);
        assert_eq!(cache.bucket_count(), 3);

        let snapshot = cache.snapshot();
        assert_eq!(
            snapshot[&format!("log_svc_access_{}", hour)],
            strings(&["a", "b"])
        );
        assert_eq!(snapshot[&format!("log_svc_error_{}", hour)], strings(&["c"]));
        assert_eq!(
            snapshot[&format!("log_svc_access_{}", hour + 3_600_000)],
            strings(&["d"])
        );
    }

    #[tokio::test]
    async fn test_log_cache_capacity_triggers_flush() {
        let (cache, _) = new_cache(3, Duration::from_secs(60));
        let sink = right_sink(None);
        assert!(cache.attach_sink(sink.clone()));

        let now = SystemTime::now();
        let key = bucket_key("svc", "s", now);

        cache.write("a", "s", LogLevel::Info, now);
        cache.write("b", "s", LogLevel::Info, now);
        assert_eq!(cache.pending(), 2);
        assert_eq!(cache.flush_count(), 0);

        cache.write("c", "s", LogLevel::Info, now);
        assert_eq!(cache.pending(), 0);
        assert_eq!(cache.bucket_count(), 0);
        assert_eq!(cache.flush_count(), 1);

        settle().await;
        assert_eq!(sink.batch_count(), 1);
        assert_eq!(sink.requests(), vec![(key, strings(&["a", "b", "c"]))]);
    }

    #[tokio::test]
    async fn test_log_cache_flush_without_sink_is_noop() {
        let (cache, capture) = new_cache(2, Duration::from_secs(60));
        let before = cache.last_flush_at();

        // 超过容量也不会清空
        for text in ["a", "b", "c"] {
            cache.write(text, "s", LogLevel::Info, SystemTime::now());
        }
        cache.flush().await;

        assert_eq!(cache.pending(), 3);
        assert_eq!(cache.flush_count(), 0);
        assert_eq!(cache.last_flush_at(), before);
        assert!(capture.lines_at(LogLevel::Error).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cache_buffers_until_attached() {
        let (cache, _) = new_cache(100, Duration::from_secs(60));
        cache.write("early", "s", LogLevel::Info, SystemTime::now());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(cache.pending(), 1);

        let sink = right_sink(None);
        cache.attach_sink(sink.clone());
        cache.flush().await;

        assert_eq!(cache.pending(), 0);
        assert_eq!(sink.total_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cache_optimistic_clear() {
        let (cache, _) = new_cache(100, Duration::from_secs(60));
        let cache = Arc::new(cache);
        let sink = right_sink(Some(Duration::from_secs(1)));
        cache.attach_sink(sink.clone());

        let now = SystemTime::now();
        cache.write("a", "s", LogLevel::Info, now);
        cache.write("b", "s", LogLevel::Info, now);

        let flushing = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.flush().await })
        };
        settle().await;

        // 请求已发出但尚未完成，缓冲区已经清空
        assert_eq!(sink.batch_count(), 1);
        assert_eq!(sink.total_len(), 0);
        assert_eq!(cache.pending(), 0);

        cache.write("c", "s", LogLevel::Info, now);
        assert_eq!(cache.pending(), 1);

        flushing.await.unwrap();
        assert_eq!(sink.list(&bucket_key("svc", "s", now)), strings(&["a", "b"]));
        assert_eq!(cache.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cache_concurrent_flushes_do_not_duplicate() {
        let (cache, _) = new_cache(100, Duration::from_secs(60));
        let cache = Arc::new(cache);
        let sink = right_sink(Some(Duration::from_millis(500)));
        cache.attach_sink(sink.clone());

        let now = SystemTime::now();
        cache.write("a", "s", LogLevel::Info, now);

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.flush().await })
        };
        settle().await;

        cache.write("b", "s", LogLevel::Info, now);
        let second = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.flush().await })
        };

        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(sink.batch_count(), 2);
        let mut list = sink.list(&bucket_key("svc", "s", now));
        list.sort();
        assert_eq!(list, strings(&["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cache_timer_flush() {
        let (cache, _) = new_cache(100, Duration::from_secs(30));
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());

        cache.write("a", "s", LogLevel::Info, SystemTime::now());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(sink.batch_count(), 0);
        assert_eq!(cache.pending(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(sink.batch_count(), 1);
        assert_eq!(sink.total_len(), 1);
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cache_capacity_flush_postpones_timer_flush() {
        let (cache, _) = new_cache(2, Duration::from_secs(30));
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        cache.write("a", "s", LogLevel::Info, SystemTime::now());
        cache.write("b", "s", LogLevel::Info, SystemTime::now());
        cache.write("c", "s", LogLevel::Info, SystemTime::now());
        settle().await;
        assert_eq!(sink.batch_count(), 1);

        // 30s 时距上次刷新只有 20s
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(sink.batch_count(), 1);
        assert_eq!(cache.pending(), 1);

        // 60s 时刷新
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(sink.batch_count(), 2);
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cache_try_flush() {
        let (cache, _) = new_cache(100, Duration::from_secs(30));
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());
        cache.write("a", "s", LogLevel::Info, SystemTime::now());

        cache.try_flush().await;
        assert_eq!(cache.flush_count(), 0);

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.try_flush().await;
        assert_eq!(cache.flush_count(), 1);
        assert_eq!(sink.total_len(), 1);
    }

    #[tokio::test]
    async fn test_log_cache_failed_push_is_logged() {
        let (cache, capture) = new_cache(100, Duration::from_secs(60));
        let sink = right_sink(None);
        sink.set_failing(true);
        cache.attach_sink(sink.clone());

        cache.write("a", "s", LogLevel::Info, SystemTime::now());
        cache.write("b", "t", LogLevel::Info, SystemTime::now());
        cache.flush().await;

        // 失败的日志不会回到缓冲区
        assert_eq!(cache.pending(), 0);
        assert_eq!(sink.batch_count(), 1);
        assert_eq!(sink.total_len(), 0);

        let errors = capture.lines_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("failed to push log batch"));
        assert!(errors[0].contains("keys=2"));
        assert!(errors[0].contains("entries=2"));

        sink.set_failing(false);
        cache.write("c", "s", LogLevel::Info, SystemTime::now());
        cache.flush().await;
        assert_eq!(sink.total_len(), 1);
    }

    #[tokio::test]
    async fn test_log_cache_failed_keys_are_logged_individually() {
        let (cache, capture) = new_cache(100, Duration::from_secs(60));
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());

        let now = SystemTime::now();
        let rejected_a = bucket_key("svc", "billing", now);
        let rejected_b = bucket_key("svc", "audit", now);
        sink.set_failing_key(rejected_a.clone(), true);
        sink.set_failing_key(rejected_b.clone(), true);

        cache.write("a", "billing", LogLevel::Info, now);
        cache.write("b", "audit", LogLevel::Info, now);
        cache.write("c", "access", LogLevel::Info, now);
        cache.flush().await;

        // 失败的列表同样被清空，其余列表照常写入
        assert_eq!(cache.pending(), 0);
        assert_eq!(cache.bucket_count(), 0);
        assert_eq!(sink.keys(), vec![bucket_key("svc", "access", now)]);

        let errors = capture.lines_at(LogLevel::Error);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|line| line.contains("failed to push log list")));
        assert!(errors.iter().any(|line| line.contains(&format!("key={}", rejected_a))));
        assert!(errors.iter().any(|line| line.contains(&format!("key={}", rejected_b))));
        assert!(!capture
            .lines_at(LogLevel::Debug)
            .iter()
            .any(|line| line.contains("log batch pushed")));

        cache.write("d", "access", LogLevel::Info, now);
        cache.flush().await;
        assert!(capture
            .lines_at(LogLevel::Debug)
            .iter()
            .any(|line| line.contains("log batch pushed")));
    }

    #[tokio::test]
    async fn test_log_cache_empty_flush_sends_nothing() {
        let (cache, _) = new_cache(100, Duration::from_secs(60));
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());

        let before = cache.last_flush_at();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.flush().await;

        assert_eq!(sink.batch_count(), 0);
        assert_eq!(cache.flush_count(), 1);
        assert!(cache.last_flush_at() > before);
    }

    #[tokio::test]
    async fn test_log_cache_with_sink() {
        let sink = right_sink(None);
        let cache = LogCache::with_sink("api", sink.clone(), 2, Duration::from_secs(60)).unwrap();
        assert!(cache.is_attached());
        assert_eq!(cache.service(), "api");
        assert_eq!(cache.capacity(), 2);
        assert_eq!(cache.flush_interval(), Duration::from_secs(60));

        cache.write("a", "s", LogLevel::Info, SystemTime::now());
        cache.write("b", "s", LogLevel::Info, SystemTime::now());
        settle().await;
        assert_eq!(sink.total_len(), 2);
    }

    #[tokio::test]
    async fn test_log_cache_attach_sink_once() {
        let (cache, capture) = new_cache(100, Duration::from_secs(60));
        let first = right_sink(None);
        let second = right_sink(None);

        assert!(!cache.is_attached());
        assert!(cache.attach_sink(first.clone()));
        assert!(!cache.attach_sink(second.clone()));
        assert!(cache.is_attached());
        assert_eq!(capture.lines_at(LogLevel::Warn).len(), 1);

        cache.write("a", "s", LogLevel::Info, SystemTime::now());
        cache.flush().await;
        assert_eq!(first.total_len(), 1);
        assert_eq!(second.total_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_cache_close_drains_and_stops_timer() {
        let (cache, capture) = new_cache(100, Duration::from_secs(30));
        let sink = right_sink(Some(Duration::from_millis(100)));
        cache.attach_sink(sink.clone());

        cache.write("a", "s", LogLevel::Info, SystemTime::now());
        cache.write("b", "t", LogLevel::Info, SystemTime::now());
        cache.close().await;

        assert!(cache.is_closed());
        assert_eq!(cache.pending(), 0);
        assert_eq!(sink.total_len(), 2);
        assert!(capture
            .lines_at(LogLevel::Debug)
            .iter()
            .any(|line| line.contains("log cache closed")));

        // 定时器已停止
        cache.write("c", "s", LogLevel::Info, SystemTime::now());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(cache.pending(), 1);
        assert_eq!(sink.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_log_cache_as_log_driver() -> Result<()> {
        let (cache, _) = new_cache(100, Duration::from_secs(60));
        let cache = Arc::new(cache);
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());

        let logger = Logger::with_text_driver("orders", LogLevel::Info, cache.clone());
        logger.info("order created")?;
        logger.debug("filtered")?;
        assert_eq!(cache.pending(), 1);

        logger.close().await?;
        let keys = sink.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("log_svc_orders_"));
        assert!(sink.list(&keys[0])[0].ends_with("[orders] order created"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_log_cache_concurrent_writers() {
        let (cache, _) = new_cache(64, Duration::from_secs(60));
        let cache = Arc::new(cache);
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        cache.write(format!("{}-{}", worker, i), "load", LogLevel::Info, SystemTime::now());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        cache.close().await;
        // 容量触发的发送在后台进行，等它们全部完成
        for _ in 0..100 {
            if sink.total_len() == 8000 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.total_len(), 8000);
        assert_eq!(cache.pending(), 0);

        // 每次达到容量恰好发出 64 条，close 时缓冲区已空
        assert_eq!(sink.batch_count(), 125);
        assert_eq!(cache.flush_count(), 126);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_log_cache_concurrent_writers_no_empty_threshold_flush() {
        let (cache, _) = new_cache(2, Duration::from_secs(60));
        let cache = Arc::new(cache);
        let sink = right_sink(None);
        cache.attach_sink(sink.clone());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..2000 {
                        cache.write(format!("{}-{}", worker, i), "load", LogLevel::Info, SystemTime::now());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for _ in 0..500 {
            if sink.total_len() == 16000 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.total_len(), 16000);
        assert_eq!(cache.pending(), 0);
        assert_eq!(cache.flush_count(), 8000);
        assert_eq!(sink.batch_count(), 8000);
    }
}
