use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

// 重新导出 serde_with，配置结构体通过 #[serde_as] 使用 HumanDur
pub use serde_with::{serde_as, DeserializeAs, SerializeAs};

/// Duration 的人性化格式化器
///
/// 支持格式: "3s", "100ms", "2m", "1h", "1h30m45s", "2d"
pub struct HumanDur;

impl SerializeAs<Duration> for HumanDur {
    fn serialize_as<S>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDur {
    fn deserialize_as<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// 解析时间字符串: "1h30m45s" -> Duration
///
/// 每一段由数字（可带小数）和单位组成，单位不区分大小写
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("空字符串"));
    }

    let mut total = Duration::ZERO;
    let mut rest = s.as_str();

    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(anyhow!("期望数字: {}", rest));
        }
        let (num_str, tail) = rest.split_at(num_end);
        let value: f64 = num_str
            .parse()
            .map_err(|_| anyhow!("无效数字: {}", num_str))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "d" => 86400e9,
            "" => return Err(anyhow!("缺少时间单位: {}", num_str)),
            _ => return Err(anyhow!("不支持的时间单位: {}", unit)),
        };

        total += Duration::from_nanos((value * nanos_per_unit).round() as u64);
        rest = next;
    }

    Ok(total)
}

/// garde 校验函数：时长必须大于零
///
/// 用法：`#[garde(custom(non_zero_duration))]`
pub fn non_zero_duration(value: &Duration, _: &()) -> garde::Result {
    if value.is_zero() {
        return Err(garde::Error::new("must be greater than zero"));
    }
    Ok(())
}

/// Duration 格式化为字符串: Duration -> "1h30m45s"
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let nanos = duration.subsec_nanos();

    if total_secs == 0 {
        return match nanos {
            0 => "0s".to_string(),
            n if n % 1_000_000 == 0 => format!("{}ms", n / 1_000_000),
            n if n % 1_000 == 0 => format!("{}us", n / 1_000),
            n => format!("{}ns", n),
        };
    }

    let mut out = String::new();
    let mut remaining = total_secs;
    for (unit_secs, suffix) in [(86400, "d"), (3600, "h"), (60, "m")] {
        if remaining >= unit_secs {
            out.push_str(&format!("{}{}", remaining / unit_secs, suffix));
            remaining %= unit_secs;
        }
    }

    if nanos == 0 {
        if remaining > 0 {
            out.push_str(&format!("{}s", remaining));
        }
    } else {
        out.push_str(&format!("{}ms", remaining * 1000 + u64::from(nanos) / 1_000_000));
    }

    out
}
