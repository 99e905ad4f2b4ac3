//! sink 模块 - 只追加的远端列表存储
//!
//! - `RedisListSink`: 通过 Redis 流水线执行 LPUSH/RPUSH
//! - `MemoryListSink`: 进程内实现，用于开发和测试

mod core;
mod memory_sink;
mod redis_sink;
mod registry;

pub use self::core::{ListSink, PushSide, SinkError};
pub use memory_sink::{MemoryListSink, MemoryListSinkConfig};
pub use redis_sink::{RedisListSink, RedisListSinkConfig};
pub use registry::{create_sink_from_options, register_sinks};
