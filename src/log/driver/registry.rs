use crate::cache::{LogCache, LogCacheConfig};
use crate::cfg::{create_trait_from_type_options, register_trait, TypeOptions};
use crate::log::driver::{
    console_driver::{ConsoleDriver, ConsoleDriverConfig},
    LogDriver,
};
use anyhow::Result;

/// 注册所有 Driver 实现
///
/// `LogCache` 依赖列表存储的注册表来创建 sink，这里一并注册
pub fn register_drivers() -> Result<()> {
    crate::sink::register_sinks()?;
    register_trait::<ConsoleDriver, dyn LogDriver, ConsoleDriverConfig>("ConsoleDriver")?;
    register_trait::<LogCache, dyn LogDriver, LogCacheConfig>("LogCache")?;
    Ok(())
}

/// 从 TypeOptions 创建 Driver
pub fn create_driver_from_options(options: &TypeOptions) -> Result<Box<dyn LogDriver>> {
    create_trait_from_type_options(options)
}
