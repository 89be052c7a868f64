use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::cluster::ClusterOptions;
use crate::conversation::ConversationOptions;

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

/// 从全局配置管理器读取各组件配置 / Read component options from the global config manager
pub fn load() -> Result<(ServerConfig, ConversationOptions, ClusterOptions)> {
    let cm = v::get_global_config_manager()?;
    let server = ServerConfig {
        host: cm.get_or("server.host", "127.0.0.1".to_string()),
        http_port: cm.get_or("server.http_port", 5001_i64) as u16,
    };
    let conversation = ConversationOptions {
        on: cm.get_or("conversation.on", true),
        bucket_count: cm.get_or("conversation.bucket_count", 10_i64) as usize,
        user_max_count: cm.get_or("conversation.user_max_count", 1000_i64) as usize,
        sync_interval: Duration::from_millis(cm.get_or("conversation.sync_interval_ms", 300_000_i64) as u64),
        sync_once: cm.get_or("conversation.sync_once", 100_i64) as usize,
        cache_expire: Duration::from_secs(cm.get_or("conversation.cache_expire_secs", 172_800_i64) as u64),
        calc_workers: cm.get_or("conversation.calc_workers", 20_i64) as usize,
        flush_workers: cm.get_or("conversation.flush_workers", 5_i64) as usize,
    };
    let cluster = ClusterOptions {
        peer_id: cm.get_or("cluster.peer_id", 1_i64) as u64,
        grpc_server_addr: cm.get_or("cluster.grpc_server_addr", "127.0.0.1:6000".to_string()),
        api_server_addr: cm.get_or("cluster.api_server_addr", "127.0.0.1:5001".to_string()),
        slot_count: cm.get_or("cluster.slot_count", 64_i64) as u32,
        replica_count: cm.get_or("cluster.replica_count", 2_i64) as u32,
        config_path: PathBuf::from(
            cm.get_or("cluster.config_path", "data/clusterconfig/cluster.json".to_string()),
        ),
        get_slot_state: None,
    };
    Ok((server, conversation, cluster))
}
