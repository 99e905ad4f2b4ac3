use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 列表存储相关错误
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Command failed: {0}")]
    CommandFailed(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Sink closed")]
    Closed,
}

/// 追加方向
///
/// `Left` 对应 LPUSH：同一批次内后写入的元素位于列表头部；
/// `Right` 对应 RPUSH：列表顺序与写入顺序一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PushSide {
    #[default]
    Left,
    Right,
}

/// 只追加的远端列表存储
///
/// 日志缓存只依赖追加能力，不读取也不删除
#[async_trait]
pub trait ListSink: Send + Sync {
    /// 向单个列表追加一组元素
    async fn push(&self, key: String, values: Vec<String>) -> Result<(), SinkError>;

    /// 批量追加：所有请求在一次流水线往返中发出
    ///
    /// 外层错误表示整个批次失败，内层结果与 `keys` 一一对应
    async fn batch_push(
        &self,
        keys: Vec<String>,
        vals: Vec<Vec<String>>,
    ) -> Result<Vec<Result<(), SinkError>>, SinkError>;

    /// 关闭存储
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
