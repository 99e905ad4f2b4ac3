use async_trait::async_trait;
use garde::Validate;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

use super::core::{ListSink, PushSide, SinkError};
use crate::cfg::serde_duration::{non_zero_duration, serde_as, HumanDur};

/// Redis 列表存储配置
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, SmartDefault, Validate)]
#[serde(default)]
pub struct RedisListSinkConfig {
    // ===== 连接配置 =====
    /// host:port 地址（如 "localhost:6379"）
    #[garde(required, length(min = 1))]
    pub endpoint: Option<String>,

    /// Redis 6.0+ ACL 用户名
    #[garde(skip)]
    pub username: Option<String>,

    /// 密码
    #[garde(skip)]
    pub password: Option<String>,

    /// 数据库编号
    #[default = 0]
    #[garde(range(min = 0))]
    pub db: i64,

    // ===== 写入配置 =====
    /// 追加方向，默认 LPUSH
    #[garde(skip)]
    pub push_side: PushSide,

    /// 每次追加后为列表设置的过期时间（毫秒精度），None 或 0 表示不过期
    #[serde_as(as = "Option<HumanDur>")]
    #[garde(skip)]
    pub ttl: Option<Duration>,

    // ===== 超时配置 =====
    /// 建立连接的超时
    #[serde_as(as = "HumanDur")]
    #[default(Duration::from_secs(5))]
    #[garde(custom(non_zero_duration))]
    pub connection_timeout: Duration,

    /// 单次流水线执行的超时
    #[serde_as(as = "HumanDur")]
    #[default(Duration::from_secs(3))]
    #[garde(custom(non_zero_duration))]
    pub command_timeout: Duration,
}

/// 基于 Redis 列表的存储
///
/// 批量追加在一个非事务流水线中发出，整个批次只需要一次网络往返。
/// 连接在第一次使用时建立并缓存，出错后丢弃，下次请求时重连。
///
/// # 示例
/// ```ignore
/// use logcache::sink::{ListSink, RedisListSink, RedisListSinkConfig};
///
/// let sink = RedisListSink::new(RedisListSinkConfig {
///     endpoint: Some("localhost:6379".to_string()),
///     ..Default::default()
/// })?;
///
/// sink.push("log_api_access_1700000000000".to_string(), vec!["line".to_string()]).await?;
/// ```
pub struct RedisListSink {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    push_side: PushSide,
    ttl: Option<Duration>,
    connection_timeout: Duration,
    command_timeout: Duration,
}

impl RedisListSink {
    /// 校验配置并创建客户端，不会立即连接
    pub fn new(config: RedisListSinkConfig) -> Result<Self, SinkError> {
        // 使用 garde 验证配置
        if let Err(errors) = config.validate() {
            return Err(SinkError::InvalidConfig(format!("{}", errors)));
        }
        let endpoint = config.endpoint.as_deref().unwrap_or_default();

        let url = match &config.password {
            Some(password) => {
                let username = config.username.as_deref().unwrap_or("default");
                format!("redis://{}:{}@{}/{}", username, password, endpoint, config.db)
            }
            None => format!("redis://{}/{}", endpoint, config.db),
        };

        let client = redis::Client::open(url)
            .map_err(|e| SinkError::InvalidConfig(format!("Invalid connection URL: {}", e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            push_side: config.push_side,
            ttl: config.ttl,
            connection_timeout: config.connection_timeout,
            command_timeout: config.command_timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, SinkError> {
        let mut cached = self.connection.lock().await;
        if let Some(con) = cached.as_ref() {
            return Ok(con.clone());
        }

        let con = with_timeout(
            self.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await?
        .map_err(|e| SinkError::ConnectionFailed(e.to_string()))?;

        *cached = Some(con.clone());
        Ok(con)
    }

    async fn reset_connection(&self) {
        *self.connection.lock().await = None;
    }

    /// 把一个列表的追加命令加入流水线
    fn queue_push(&self, pipe: &mut redis::Pipeline, key: &str, values: &[String]) {
        match self.push_side {
            PushSide::Left => pipe.lpush(key, values).ignore(),
            PushSide::Right => pipe.rpush(key, values).ignore(),
        };
        // 按毫秒设置过期，零表示不过期
        if let Some(ttl) = self.ttl.filter(|ttl| !ttl.is_zero()) {
            pipe.pexpire(key, ttl.as_millis() as i64).ignore();
        }
    }

    async fn execute(&self, pipe: redis::Pipeline) -> Result<(), SinkError> {
        let mut con = self.connection().await?;
        let outcome = with_timeout(self.command_timeout, pipe.query_async::<()>(&mut con))
            .await
            .and_then(|result| result.map_err(|e| SinkError::CommandFailed(e.to_string())));

        if outcome.is_err() {
            self.reset_connection().await;
        }
        outcome
    }
}

async fn with_timeout<T>(limit: Duration, fut: impl Future<Output = T>) -> Result<T, SinkError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SinkError::Timeout(limit))
}

#[async_trait]
impl ListSink for RedisListSink {
    async fn push(&self, key: String, values: Vec<String>) -> Result<(), SinkError> {
        if values.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        self.queue_push(&mut pipe, &key, &values);
        self.execute(pipe).await
    }

    async fn batch_push(
        &self,
        keys: Vec<String>,
        vals: Vec<Vec<String>>,
    ) -> Result<Vec<Result<(), SinkError>>, SinkError> {
        if keys.len() != vals.len() {
            return Err(SinkError::InvalidConfig(
                "Keys and values length mismatch".to_string(),
            ));
        }

        // LPUSH 不接受空参数列表，空列表直接视为成功
        let mut pipe = redis::pipe();
        for (key, values) in keys.iter().zip(&vals) {
            if !values.is_empty() {
                self.queue_push(&mut pipe, key, values);
            }
        }

        if vals.iter().any(|values| !values.is_empty()) {
            self.execute(pipe).await?;
        }

        Ok(keys.iter().map(|_| Ok(())).collect())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.reset_connection().await;
        Ok(())
    }
}

crate::impl_from!(RedisListSinkConfig => RedisListSink, expect: "Failed to create RedisListSink");
crate::impl_box_from!(RedisListSink => dyn ListSink);
