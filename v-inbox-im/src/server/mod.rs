use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use v::{HealthCheck, HealthStatus};

use crate::clock::Clock;
use crate::cluster::{ClusterManager, ClusterOptions};
use crate::conversation::{ConversationManager, ConversationOptions};
use crate::storage::MessageStore;

/// 服务端全局状态 / Server global state
pub struct VInboxIMServer {
    pub node_id: u64,
    pub store: Arc<dyn MessageStore>,
    pub conversation_manager: Arc<ConversationManager>,
    pub cluster_manager: Arc<ClusterManager>,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl VInboxIMServer {
    pub fn new(
        conversation_opts: ConversationOptions,
        cluster_opts: ClusterOptions,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let node_id = cluster_opts.peer_id;
        let conversation_manager = Arc::new(ConversationManager::new(
            conversation_opts,
            store.clone(),
            clock,
        ));
        let cluster_manager = Arc::new(ClusterManager::new(cluster_opts)?);
        Ok(Self {
            node_id,
            store,
            conversation_manager,
            cluster_manager,
            started_at: chrono::Utc::now(),
        })
    }

    /// 启动两个核心与后台任务 / Start both cores and the background tasks
    pub fn start(&self) {
        self.conversation_manager.start();
        self.cluster_manager.start();
        crate::tasks::spawn_metrics_task(self.conversation_manager.clone());
        crate::tasks::spawn_expire_sweep_task(self.conversation_manager.clone());
    }

    pub async fn stop(&self) {
        self.conversation_manager.stop().await;
        self.cluster_manager.stop();
    }

    pub fn uptime_secs(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }
}

#[async_trait]
impl HealthCheck for VInboxIMServer {
    async fn check_health(&self) -> HealthStatus {
        HealthStatus {
            component: "v-inbox-im".to_string(),
            healthy: true,
            message: Some(format!(
                "uptime={}s cached_conversations={} dirty_uids={}",
                self.uptime_secs(),
                self.conversation_manager.cache_len(),
                self.conversation_manager.dirty_len(),
            )),
            timestamp: chrono::Utc::now(),
        }
    }
}
