//! 日志分桶
//!
//! 每条日志按 `(service, subject, 所在小时)` 归入一个桶，桶的 key 就是远端列表的 key：
//! `log_<service>_<subject>_<小时起点的 Unix 毫秒>`。

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// 一小时的毫秒数
pub const HOUR_MS: i64 = 3_600_000;

/// 事件时间所在小时的起点（Unix 毫秒）
///
/// 早于 1970 年的时间向负无穷取整
pub fn hour_bucket(time: SystemTime) -> i64 {
    let millis = match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    };
    millis.div_euclid(HOUR_MS) * HOUR_MS
}

/// 计算日志所属桶的 key
pub fn bucket_key(service: &str, subject: &str, time: SystemTime) -> String {
    format!("log_{}_{}_{}", service, subject, hour_bucket(time))
}

/// 按 key 分组的待发送日志
///
/// `pending` 始终等于所有桶中日志条数之和
#[derive(Debug, Default)]
pub struct BucketMap {
    buckets: HashMap<String, Vec<String>>,
    pending: usize,
}

impl BucketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条日志，桶不存在时自动创建；返回追加后的总条数
    pub fn push(&mut self, key: String, text: String) -> usize {
        self.buckets.entry(key).or_default().push(text);
        self.pending += 1;
        self.pending
    }

    /// 取走全部日志，留下一个空的 BucketMap
    pub fn take(&mut self) -> HashMap<String, Vec<String>> {
        self.pending = 0;
        std::mem::take(&mut self.buckets)
    }

    /// 待发送的日志总条数
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// 桶的数量
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// 当前内容的副本
    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        self.buckets.clone()
    }
}
