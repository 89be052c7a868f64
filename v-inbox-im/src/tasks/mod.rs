use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

use crate::conversation::ConversationManager;

/// 每分钟上报一次会话缓存规模 / Report the conversation cache size every minute
pub fn spawn_metrics_task(manager: Arc<ConversationManager>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            debug!(
                cached_conversations = manager.cache_len(),
                dirty_uids = manager.dirty_len(),
                "conversation cache gauge"
            );
        }
    });
}

/// 每天凌晨2点清扫过期会话 / Sweep expired conversations daily at 02:00
pub fn spawn_expire_sweep_task(manager: Arc<ConversationManager>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(duration_until_next_hour(2)).await;
            manager.expire_sweep();
        }
    });
}

/// 距下一个整点 hour 的时长 / Duration until the next occurrence of `hour` o'clock
fn duration_until_next_hour(hour: u32) -> Duration {
    let now = chrono::Local::now().naive_local();
    let today_at = now.date().and_hms_opt(hour, 0, 0).unwrap_or(now);
    let next = if now < today_at {
        today_at
    } else {
        today_at + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(3600))
}
