//! 按客户端地址的限流器
//!
//! 管线只依赖 `RateLimiter::check_and_consume`，单实例用内存固定窗口实现，
//! 多实例部署可以换成共享存储的实现。进程内计数在多实例下只是近似值。

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitSettings;

/// 限流能力
pub trait RateLimiter: Send + Sync {
    /// 检查并消耗一次配额，返回是否放行
    fn check_and_consume(&self, key: &str) -> bool;
}

/// 窗口内的计数记录
#[derive(Debug, Clone)]
struct WindowRecord {
    count: usize,
    window_start: Instant,
}

/// 固定窗口限流器
pub struct FixedWindowRateLimiter {
    enabled: bool,
    max_requests: usize,
    window: Duration,
    records: DashMap<String, WindowRecord>,
}

impl FixedWindowRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            enabled: true,
            max_requests,
            window,
            records: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ..Self::new(settings.max_requests, Duration::from_secs(settings.window_secs))
        }
    }

    /// 清理已过期的窗口
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.records
            .retain(|_, record| now.duration_since(record.window_start) < self.window);
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut entry = self.records.entry(key.to_string()).or_insert(WindowRecord {
            count: 0,
            window_start: now,
        });
        let record = entry.value_mut();

        if now.duration_since(record.window_start) >= self.window {
            record.count = 0;
            record.window_start = now;
        }

        if record.count >= self.max_requests {
            warn!(
                "Rate limit exceeded for client: {} ({} requests in window)",
                key, record.count
            );
            return false;
        }

        record.count += 1;
        debug!("Request allowed for client: {} ({}/{})", key, record.count, self.max_requests);
        true
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_and_consume(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }
}
