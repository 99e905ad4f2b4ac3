use crate::log::driver::LogDriver;
use crate::log::log_record::LogLevel;
use anyhow::Result;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::io::{self, Write};
use std::time::SystemTime;

/// 输出目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Stdout,
    Stderr,
}

/// ConsoleDriver 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ConsoleDriverConfig {
    pub target: Target,
}

/// 终端驱动
///
/// 将日志逐行写到标准输出或标准错误，不做缓冲
pub struct ConsoleDriver {
    config: ConsoleDriverConfig,
}

impl ConsoleDriver {
    pub fn new(config: ConsoleDriverConfig) -> Self {
        Self { config }
    }

    pub fn target(&self) -> Target {
        self.config.target
    }
}

#[async_trait::async_trait]
impl LogDriver for ConsoleDriver {
    fn write(&self, text: &str, _subject: &str, _level: LogLevel, _time: SystemTime) {
        // 终端写失败时无处可报，直接丢弃
        let _ = match self.config.target {
            Target::Stdout => writeln!(io::stdout().lock(), "{}", text),
            Target::Stderr => writeln!(io::stderr().lock(), "{}", text),
        };
    }

    async fn flush(&self) -> Result<()> {
        match self.config.target {
            Target::Stdout => io::stdout().flush()?,
            Target::Stderr => io::stderr().flush()?,
        }
        Ok(())
    }
}

crate::impl_from!(ConsoleDriverConfig => ConsoleDriver);
crate::impl_box_from!(ConsoleDriver => dyn LogDriver);
