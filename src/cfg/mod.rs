//! cfg 模块 - 配置管理
//!
//! 提供基于 TypeOptions 的组件注册与创建，以及人性化的时长配置格式。
//! 日志格式化器、日志驱动和列表存储都通过这里的注册表按名称创建。

pub mod macros;
pub mod registry;
pub mod serde_duration;
pub mod type_options;

pub use registry::{create_trait_from_type_options, is_trait_registered, register_trait};
pub use serde_duration::{format_duration, non_zero_duration, parse_duration, HumanDur};
pub use type_options::TypeOptions;
