use crate::log::log_record::LogLevel;
use anyhow::Result;
use std::time::SystemTime;

/// 日志驱动 trait
///
/// Logger 把格式化后的文本连同分类、级别和事件时间交给驱动。
/// `write` 在调用方线程上同步执行，不允许阻塞在网络 I/O 上；
/// 需要远端 I/O 的驱动应先缓冲，再在 `flush` 中批量发送。
#[async_trait::async_trait]
pub trait LogDriver: Send + Sync {
    /// 写入一条已格式化的日志
    fn write(&self, text: &str, subject: &str, level: LogLevel, time: SystemTime);

    /// 刷新缓冲区（默认实现为空操作）
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// 关闭驱动，默认等价于一次 flush
    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}
