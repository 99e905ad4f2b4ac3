use crate::cfg::{create_trait_from_type_options, TypeOptions};
use crate::log::{
    driver::LogDriver,
    formatter::{LogFormatter, TextFormatter},
    log_record::{LogLevel, LogRecord, MetadataValue},
};
use anyhow::Result;
use serde::Deserialize;
use smart_default::SmartDefault;
use once_cell::sync::OnceCell;
use std::sync::{Arc, RwLock};

/// Logger 配置
#[derive(Debug, Clone, Deserialize, SmartDefault, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    /// 日志级别
    #[default = "info"]
    pub level: String,

    /// 日志分类，作为每条日志的 subject 交给驱动
    #[default = "default"]
    pub subject: String,

    /// Formatter 配置
    #[default(TypeOptions::with_type("TextFormatter"))]
    pub formatter: TypeOptions,

    /// Driver 配置
    #[default(TypeOptions::with_type("ConsoleDriver"))]
    pub driver: TypeOptions,
}

/// 注册所有日志组件（成功后不再重复执行）
static COMPONENTS_REGISTERED: OnceCell<()> = OnceCell::new();

fn register_components() -> Result<()> {
    crate::log::register_formatters()?;
    crate::log::register_drivers()
}

/// 日志器
///
/// 负责级别过滤和格式化，然后把结果交给驱动。
/// 所有记录方法都是同步的，驱动保证 `write` 不阻塞。
pub struct Logger {
    subject: String,
    level: RwLock<LogLevel>,
    formatter: Arc<dyn LogFormatter>,
    driver: Arc<dyn LogDriver>,
}

impl Logger {
    /// 从配置创建 Logger
    pub fn new(config: LoggerConfig) -> Result<Self> {
        COMPONENTS_REGISTERED.get_or_try_init(register_components)?;

        let level = config.level.parse::<LogLevel>().unwrap_or(LogLevel::Info);
        let formatter: Arc<dyn LogFormatter> =
            Arc::from(create_trait_from_type_options::<dyn LogFormatter>(&config.formatter)?);
        let driver: Arc<dyn LogDriver> =
            Arc::from(create_trait_from_type_options::<dyn LogDriver>(&config.driver)?);

        Ok(Self::with_driver(config.subject, level, formatter, driver))
    }

    /// 使用已有的驱动创建 Logger
    ///
    /// 常见用法是多个 Logger 共享同一个 `LogCache`，各自使用不同的 subject
    pub fn with_driver(
        subject: impl Into<String>,
        level: LogLevel,
        formatter: Arc<dyn LogFormatter>,
        driver: Arc<dyn LogDriver>,
    ) -> Self {
        Self {
            subject: subject.into(),
            level: RwLock::new(level),
            formatter,
            driver,
        }
    }

    /// 使用默认文本格式创建 Logger
    pub fn with_text_driver(subject: impl Into<String>, level: LogLevel, driver: Arc<dyn LogDriver>) -> Self {
        Self::with_driver(subject, level, Arc::new(TextFormatter::default()), driver)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// 设置日志级别
    pub fn set_level(&self, level: LogLevel) {
        match self.level.write() {
            Ok(mut guard) => *guard = level,
            Err(poisoned) => *poisoned.into_inner() = level,
        }
    }

    /// 获取当前日志级别
    pub fn get_level(&self) -> LogLevel {
        match self.level.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// 记录日志
    ///
    /// 低于当前级别的记录直接忽略；record 中的 subject 为空时使用 Logger 的 subject
    pub fn log(&self, record: LogRecord) -> Result<()> {
        if record.level < self.get_level() {
            return Ok(());
        }

        let formatted = self.formatter.format(&record)?;
        let subject = if record.subject.is_empty() {
            &self.subject
        } else {
            &record.subject
        };
        self.driver
            .write(&formatted, subject, record.level, record.timestamp);
        Ok(())
    }

    /// 记录带 metadata 的日志
    ///
    /// # 示例
    ///
    /// ```ignore
    /// logger.logm(LogLevel::Error, "flush failed", vec![("keys", 3usize.into())])?;
    /// ```
    pub fn logm(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        metadata: impl IntoIterator<Item = (impl Into<String>, MetadataValue)>,
    ) -> Result<()> {
        let mut record = LogRecord::new(level, self.subject.as_str(), message);
        for (key, value) in metadata {
            record.metadata.push((key.into(), value));
        }
        self.log(record)
    }

    pub fn trace(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogRecord::new(LogLevel::Trace, self.subject.as_str(), message))
    }

    pub fn debug(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogRecord::new(LogLevel::Debug, self.subject.as_str(), message))
    }

    pub fn info(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogRecord::new(LogLevel::Info, self.subject.as_str(), message))
    }

    pub fn warn(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogRecord::new(LogLevel::Warn, self.subject.as_str(), message))
    }

    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.log(LogRecord::new(LogLevel::Error, self.subject.as_str(), message))
    }

    pub fn infom(
        &self,
        message: impl Into<String>,
        metadata: impl IntoIterator<Item = (impl Into<String>, MetadataValue)>,
    ) -> Result<()> {
        self.logm(LogLevel::Info, message, metadata)
    }

    pub fn warnm(
        &self,
        message: impl Into<String>,
        metadata: impl IntoIterator<Item = (impl Into<String>, MetadataValue)>,
    ) -> Result<()> {
        self.logm(LogLevel::Warn, message, metadata)
    }

    pub fn errorm(
        &self,
        message: impl Into<String>,
        metadata: impl IntoIterator<Item = (impl Into<String>, MetadataValue)>,
    ) -> Result<()> {
        self.logm(LogLevel::Error, message, metadata)
    }

    /// 刷新驱动
    pub async fn flush(&self) -> Result<()> {
        self.driver.flush().await
    }

    /// 关闭驱动，等待缓冲的日志全部发出
    pub async fn close(&self) -> Result<()> {
        self.driver.close().await
    }
}

impl From<LoggerConfig> for Logger {
    fn from(config: LoggerConfig) -> Self {
        Logger::new(config).expect("Failed to create Logger")
    }
}
