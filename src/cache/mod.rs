//! cache 模块 - 写缓冲的日志驱动
//!
//! 日志先按 `(service, subject, 小时)` 分桶缓存在内存中，
//! 再按容量、时间或关闭时批量写入列表存储。

pub mod bucket;
mod flush_timer;
mod log_cache;

pub use bucket::{bucket_key, hour_bucket, BucketMap, HOUR_MS};
pub use log_cache::{LogCache, LogCacheConfig, DEFAULT_CAPACITY, DEFAULT_FLUSH_INTERVAL};
