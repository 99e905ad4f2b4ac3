//! LogCache - 写缓冲的日志驱动
//!
//! 日志在进程内按服务、分类和小时分桶缓存，再批量写入远端的只追加列表存储（Redis 列表），
//! 避免每条日志一次网络往返。
//!
//! ## 模块
//!
//! - **cache**: 缓冲与刷新引擎（`LogCache`）
//! - **sink**: 列表存储抽象（`ListSink`）及 Redis、内存实现
//! - **log**: 日志前端（级别过滤、格式化、驱动）
//! - **cfg**: 配置基础设施（`TypeOptions`、类型注册表、时长格式）
//!
//! ## 刷新时机
//!
//! - 缓冲条数达到 `capacity`
//! - 距上次刷新超过 `flush_interval`
//! - 调用 `flush` 或 `close`
//!
//! 刷新在发送前清空缓冲区，发送失败的日志只记录诊断日志，不重试。

pub mod cache;
pub mod cfg;
pub mod log;
pub mod sink;

// 重新导出主要的公共 API
pub use cfg::{create_trait_from_type_options, register_trait, TypeOptions};

pub use cache::{bucket_key, hour_bucket, LogCache, LogCacheConfig};

pub use log::{LogDriver, LogFormatter, LogLevel, LogRecord, Logger, LoggerConfig};

pub use sink::{ListSink, MemoryListSink, PushSide, RedisListSink, SinkError};
