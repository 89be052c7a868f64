use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::info;

use v_inbox_im::clock::SystemClock;
use v_inbox_im::cluster::{Slot, SlotActionType, SlotState};
use v_inbox_im::config;
use v_inbox_im::router;
use v_inbox_im::storage::{MemoryMessageStore, MessageStore};
use v_inbox_im::VInboxIMServer;

/// 命令行参数 / Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "v-inbox-im conversation & cluster coordinator server", long_about = None)]
pub struct Args {
    /// 指定配置文件路径（TOML/JSON/YAML自动识别）
    /// Specify config file path (auto-detect TOML/JSON/YAML)
    #[arg(short = 'c', long = "config", default_value = "config/default.toml")]
    config: String,
}

/// 默认执行器：消费 ready 事件并回调对应的变更接口
/// Default executor: consume ready events and call back the matching mutators
fn spawn_default_executor(server: Arc<VInboxIMServer>, started_slots: Arc<DashSet<u32>>) {
    let Some(mut ready_rx) = server.cluster_manager.take_ready_receiver() else {
        return;
    };
    let cluster_manager = server.cluster_manager.clone();
    tokio::spawn(async move {
        while let Some(ready) = ready_rx.recv().await {
            if let Some(set) = ready.allocate_slot_set {
                for alloc in set.allocate_slots {
                    info!(slot = alloc.slot, peers = ?alloc.peers, "allocating slot");
                    cluster_manager.add_slot(Slot { slot: alloc.slot, peers: alloc.peers, leader: 0 });
                }
            }
            if let Some(actions) = ready.slot_actions {
                for action in actions {
                    match action.action {
                        SlotActionType::Start => {
                            started_slots.insert(action.slot);
                            info!(slot = action.slot, "slot started");
                        }
                    }
                }
            }
            if let Some(peer) = ready.update_peer {
                info!(peer_id = peer.peer_id, "updating peer config");
                cluster_manager.update_peer_config(peer);
            }
            if let Some(set) = ready.slot_leader_relation_set {
                cluster_manager.updated_slot_leader_relations(&set);
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    v::init_global_config_with_file(&args.config)?;
    v::init_tracing()?;
    info!("starting v-inbox-im server, config file: {}", args.config);

    let (server_cfg, conversation_opts, mut cluster_opts) = config::load()?;

    // 本地槽位状态探针：执行器启动过的槽位视为 Started
    // Local slot-state probe: slots the executor started count as Started
    let started_slots: Arc<DashSet<u32>> = Arc::new(DashSet::new());
    let probe_slots = started_slots.clone();
    cluster_opts.get_slot_state = Some(Arc::new(move |slot| {
        if probe_slots.contains(&slot) {
            SlotState::Started
        } else {
            SlotState::NotStarted
        }
    }));

    let store: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());
    let server = Arc::new(VInboxIMServer::new(
        conversation_opts,
        cluster_opts,
        store,
        Arc::new(SystemClock),
    )?);
    server.start();
    spawn_default_executor(server.clone(), started_slots);

    let addr = format!("{}:{}", server_cfg.host, server_cfg.http_port);
    info!("HTTP server listening on http://{}", addr);
    let app_server = server.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_server.clone()))
            .configure(router::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    info!("shutting down, flushing conversations");
    server.stop().await;
    Ok(())
}
