//! Per-channel call log with a sliding rate-limit window.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use toolgate_core::redact::sanitize_args;

/// Length of the rate-limit window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ChannelCalls {
    total: u64,
    window: VecDeque<Instant>,
}

impl ChannelCalls {
    fn prune(&mut self, now: Instant) {
        while self
            .window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > RATE_WINDOW)
        {
            self.window.pop_front();
        }
    }
}

/// Call counts for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub channel: String,
    /// Calls since the log was created.
    pub total_calls: u64,
    /// Calls inside the current window.
    pub recent_calls: usize,
}

/// Records every inbound invocation.
#[derive(Default)]
pub struct CallLog {
    channels: RwLock<HashMap<String, ChannelCalls>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call on `channel` and log its sanitized arguments.
    pub async fn record(&self, channel: &str, args: &[Value]) {
        self.record_at(channel, args, Instant::now()).await;
    }

    /// [`record`](Self::record) with an explicit clock.
    pub async fn record_at(&self, channel: &str, args: &[Value], now: Instant) {
        let recent = {
            let mut channels = self.channels.write().await;
            let calls = channels.entry(channel.to_string()).or_default();
            calls.total += 1;
            calls.window.push_back(now);
            calls.prune(now);
            calls.window.len()
        };

        if tracing::enabled!(tracing::Level::DEBUG) {
            let sanitized = Value::Array(sanitize_args(args));
            debug!(channel, recent, args = %sanitized, "Call received");
        }
    }

    /// Whether `channel` saw more than `max_per_minute` calls in the window.
    pub async fn is_rate_limited(&self, channel: &str, max_per_minute: u32) -> bool {
        self.is_rate_limited_at(channel, max_per_minute, Instant::now())
            .await
    }

    /// [`is_rate_limited`](Self::is_rate_limited) with an explicit clock.
    pub async fn is_rate_limited_at(&self, channel: &str, max_per_minute: u32, now: Instant) -> bool {
        let mut channels = self.channels.write().await;
        let Some(calls) = channels.get_mut(channel) else {
            return false;
        };
        calls.prune(now);
        calls.window.len() > max_per_minute as usize
    }

    /// Per-channel counts, busiest channel first.
    pub async fn stats(&self) -> Vec<ChannelStats> {
        let now = Instant::now();
        let mut channels = self.channels.write().await;
        let mut stats: Vec<ChannelStats> = channels
            .iter_mut()
            .map(|(channel, calls)| {
                calls.prune(now);
                ChannelStats {
                    channel: channel.clone(),
                    total_calls: calls.total,
                    recent_calls: calls.window.len(),
                }
            })
            .collect();
        drop(channels);
        stats.sort_by(|a, b| {
            b.total_calls
                .cmp(&a.total_calls)
                .then_with(|| a.channel.cmp(&b.channel))
        });
        stats
    }
}
