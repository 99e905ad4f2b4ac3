use crate::cfg::{create_trait_from_type_options, register_trait, TypeOptions};
use crate::log::formatter::{
    json_formatter::{JsonFormatter, JsonFormatterConfig},
    text_formatter::{TextFormatter, TextFormatterConfig},
    LogFormatter,
};
use anyhow::Result;

/// 注册所有 Formatter 实现
pub fn register_formatters() -> Result<()> {
    register_trait::<TextFormatter, dyn LogFormatter, TextFormatterConfig>("TextFormatter")?;
    register_trait::<JsonFormatter, dyn LogFormatter, JsonFormatterConfig>("JsonFormatter")?;
    Ok(())
}

/// 从 TypeOptions 创建 Formatter
pub fn create_formatter_from_options(options: &TypeOptions) -> Result<Box<dyn LogFormatter>> {
    create_trait_from_type_options(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, LogRecord};

    #[test]
    fn test_create_formatters() -> Result<()> {
        register_formatters()?;
        let record = LogRecord::new(LogLevel::Info, "svc", "hello");

        let text = create_formatter_from_options(&TypeOptions::from_json(
            r#"{ type: "TextFormatter", options: { colored: false } }"#,
        )?)?;
        assert!(text.format(&record)?.contains("[svc] hello"));

        let json = create_formatter_from_options(&TypeOptions::with_type("JsonFormatter"))?;
        assert!(json.format(&record)?.starts_with('{'));
        Ok(())
    }

    #[test]
    fn test_create_unknown_formatter() -> Result<()> {
        register_formatters()?;
        assert!(create_formatter_from_options(&TypeOptions::with_type("XmlFormatter")).is_err());
        Ok(())
    }
}
