use anyhow::Result;
use std::sync::Arc;

use crate::cfg::{create_trait_from_type_options, register_trait, TypeOptions};
use crate::sink::{
    memory_sink::{MemoryListSink, MemoryListSinkConfig},
    redis_sink::{RedisListSink, RedisListSinkConfig},
    ListSink,
};

/// 注册所有 ListSink 实现
pub fn register_sinks() -> Result<()> {
    register_trait::<RedisListSink, dyn ListSink, RedisListSinkConfig>("RedisListSink")?;
    register_trait::<MemoryListSink, dyn ListSink, MemoryListSinkConfig>("MemoryListSink")?;
    Ok(())
}

/// 从 TypeOptions 创建 ListSink
pub fn create_sink_from_options(options: &TypeOptions) -> Result<Arc<dyn ListSink>> {
    let sink: Box<dyn ListSink> = create_trait_from_type_options(options)?;
    Ok(Arc::from(sink))
}
