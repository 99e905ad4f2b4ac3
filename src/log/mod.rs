//! 日志模块
//!
//! 日志的前端：级别过滤、格式化，以及把格式化结果交给驱动（`LogDriver`）。
//!
//! - 格式化器：`TextFormatter`、`JsonFormatter`
//! - 驱动：`ConsoleDriver`（直接输出）、`LogCache`（缓冲后批量写入远端列表）
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use logcache::log::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config: LoggerConfig = json5::from_str(r#"
//!     {
//!         level: "info",
//!         subject: "app",
//!         formatter: { type: "TextFormatter", options: { colored: false } },
//!         driver: { type: "ConsoleDriver", options: { target: "stdout" } }
//!     }
//! "#)?;
//!
//! let logger = Logger::new(config)?;
//! logger.info("Application started")?;
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod formatter;
pub mod log_record;
pub mod logger;

pub use driver::{register_drivers, ConsoleDriver, ConsoleDriverConfig, LogDriver, Target};
pub use formatter::{
    register_formatters, JsonFormatter, JsonFormatterConfig, LogFormatter, TextFormatter,
    TextFormatterConfig,
};
pub use log_record::{LogLevel, LogRecord, MetadataValue};
pub use logger::{Logger, LoggerConfig};
