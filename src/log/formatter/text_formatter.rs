use crate::log::formatter::LogFormatter;
use crate::log::log_record::{LogLevel, LogRecord};
use anyhow::Result;
use serde::Deserialize;
use smart_default::SmartDefault;
use std::fmt::Write;

/// TextFormatter 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct TextFormatterConfig {
    /// 是否启用颜色输出（写入远端存储时应关闭）
    #[default = false]
    pub colored: bool,
}

/// 文本格式化器
///
/// 输出格式: `[2025-01-19T12:34:56.789Z] INFO  [subject] message | k=v`
#[derive(Default)]
pub struct TextFormatter {
    config: TextFormatterConfig,
}

impl TextFormatter {
    pub fn new(config: TextFormatterConfig) -> Self {
        Self { config }
    }
}

impl LogFormatter for TextFormatter {
    fn format(&self, record: &LogRecord) -> Result<String> {
        let mut out = String::with_capacity(48 + record.subject.len() + record.message.len());

        write!(out, "[{}] ", record.timestamp_rfc3339())?;
        if self.config.colored {
            write!(out, "{} ", colored_level(record.level))?;
        } else {
            write!(out, "{:<5} ", record.level)?;
        }
        write!(out, "[{}] {}", record.subject, record.message)?;

        if !record.metadata.is_empty() {
            out.push_str(" |");
            for (key, value) in &record.metadata {
                if self.config.colored {
                    write!(out, " \x1b[36m{}\x1b[0m={}", key, value)?;
                } else {
                    write!(out, " {}={}", key, value)?;
                }
            }
        }

        Ok(out)
    }
}

fn colored_level(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "\u{1b}[31mERROR\u{1b}[0m",
        LogLevel::Warn => "\u{1b}[33mWARN \u{1b}[0m",
        LogLevel::Info => "\u{1b}[32mINFO \u{1b}[0m",
        LogLevel::Debug => "\u{1b}[36mDEBUG\u{1b}[0m",
        LogLevel::Trace => "\u{1b}[37;2mTRACE\u{1b}[0m",
    }
}

crate::impl_from!(TextFormatterConfig => TextFormatter);
crate::impl_box_from!(TextFormatter => dyn LogFormatter);
