use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::config::{load_cluster, save_cluster, Cluster, Peer, Role, Slot};

/// 本地槽位运行状态，由注入的探针返回
/// Local slot state, returned by the injected probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    NotStarted,
    Started,
}

/// 槽位行为类型，后续可扩展 Stop、Migrate
/// Slot action type, Stop and Migrate may follow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotActionType {
    Start,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotAction {
    pub slot: u32,
    pub action: SlotActionType,
}

/// 待传播的槽位leader关系 / Pending slot-leader relation awaiting propagation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotLeaderRelation {
    pub slot: u32,
    pub leader: u64,
    pub need_update: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotLeaderRelationSet {
    pub relations: Vec<SlotLeaderRelation>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocateSlot {
    pub slot: u32,
    pub peers: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocateSlotSet {
    pub allocate_slots: Vec<AllocateSlot>,
}

/// 协调器每个tick产出的就绪动作包，同一tick只携带一类动作
/// Ready bundle emitted per tick, carrying exactly one kind of action
#[derive(Clone, Debug, Default)]
pub struct ClusterReady {
    pub allocate_slot_set: Option<AllocateSlotSet>,
    pub slot_actions: Option<Vec<SlotAction>>,
    pub update_peer: Option<Peer>,
    pub slot_leader_relation_set: Option<SlotLeaderRelationSet>,
}

impl ClusterReady {
    pub fn is_empty(&self) -> bool {
        self.allocate_slot_set.is_none()
            && self.slot_actions.is_none()
            && self.update_peer.is_none()
            && self.slot_leader_relation_set.is_none()
    }
}

pub type SlotStateFn = Arc<dyn Fn(u32) -> SlotState + Send + Sync>;

/// 协调器配置 / Coordinator options
#[derive(Clone)]
pub struct ClusterOptions {
    pub peer_id: u64,
    pub grpc_server_addr: String,
    pub api_server_addr: String,
    pub slot_count: u32,
    pub replica_count: u32,
    pub config_path: PathBuf,
    /// 本地槽位状态探针 / Local slot-state probe
    pub get_slot_state: Option<SlotStateFn>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            peer_id: 0,
            grpc_server_addr: String::new(),
            api_server_addr: String::new(),
            slot_count: 64,
            replica_count: 2,
            config_path: PathBuf::from("clusterconfig/cluster.json"),
            get_slot_state: None,
        }
    }
}

struct ClusterState {
    cluster: Cluster,
    relations: Vec<SlotLeaderRelation>,
}

/// 集群槽位协调器 / Cluster slot coordinator
///
/// 每秒跑一轮检查，把第一类待收敛的动作发到 ready 通道，由外部执行器应用后
/// 回调对应的变更接口，配置在持有写锁期间原子落盘。
/// Runs the check sequence once per second, emits the first pending action kind
/// on the ready channel, the external executor applies it and calls back the
/// matching mutator; the config is persisted atomically under the write lock.
pub struct ClusterManager {
    state: RwLock<ClusterState>,
    leader_id: AtomicU64,
    opts: ClusterOptions,
    ready_tx: mpsc::Sender<ClusterReady>,
    ready_rx: Mutex<Option<mpsc::Receiver<ClusterReady>>>,
    stop_tx: broadcast::Sender<()>,
}

impl ClusterManager {
    /// 启动时读取持久化配置，文件非法属致命错误
    /// Load the persisted config at startup, a malformed file is fatal
    pub fn new(opts: ClusterOptions) -> Result<Self> {
        let cluster = match load_cluster(&opts.config_path)? {
            Some(cluster) => cluster,
            None => Cluster {
                slot_count: opts.slot_count,
                replica_count: opts.replica_count,
                ..Default::default()
            },
        };
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let (stop_tx, _) = broadcast::channel(1);
        Ok(Self {
            state: RwLock::new(ClusterState { cluster, relations: Vec::new() }),
            leader_id: AtomicU64::new(0),
            opts,
            ready_tx,
            ready_rx: Mutex::new(Some(ready_rx)),
            stop_tx,
        })
    }

    /// 执行器从这里取走 ready 事件流，只能取一次
    /// The executor takes the ready event stream here, once
    pub fn take_ready_receiver(&self) -> Option<mpsc::Receiver<ClusterReady>> {
        self.ready_rx.lock().take()
    }

    /// 启动 1Hz tick 协程与检查协程 / Spawn the 1 Hz ticker and the check loop
    pub fn start(self: &Arc<Self>) {
        let (tick_tx, mut tick_rx) = mpsc::channel::<()>(1);

        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = ticker.tick() => {
                        if tick_tx.send(()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let manager = self.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    tick = tick_rx.recv() => {
                        if tick.is_none() {
                            break;
                        }
                        manager.tick().await;
                    }
                }
            }
        });
        info!(peer_id = self.opts.peer_id, "cluster manager started");
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    async fn tick(&self) {
        let ready = self.check_cluster_config();
        if ready.is_empty() {
            return;
        }
        debug!(?ready, "cluster ready");
        // 没有读者时这里阻塞，流控权在执行器手里
        // Blocks when there is no reader, the executor owns flow control
        if self.ready_tx.send(ready).await.is_err() {
            warn!("cluster ready receiver dropped");
        }
    }

    /// 按固定顺序跑检查，返回第一个非空结果
    /// Run the checks in order, return the first non-empty result
    pub fn check_cluster_config(&self) -> ClusterReady {
        let ready = self.check_peers();
        if !ready.is_empty() {
            return ready;
        }
        let ready = self.check_alloc_slots();
        if !ready.is_empty() {
            return ready;
        }
        let ready = self.check_slot_states();
        if !ready.is_empty() {
            return ready;
        }
        self.check_slot_leaders()
    }

    /// 对齐持久化的leader并核对本节点地址 / Align the persisted leader and verify this peer's addresses
    fn check_peers(&self) -> ClusterReady {
        let mut state = self.state.write();
        if state.cluster.peers.is_empty() {
            return ClusterReady::default();
        }
        let leader_id = self.leader_id.load(Ordering::Acquire);
        if leader_id != 0 && state.cluster.leader != leader_id {
            state.cluster.leader = leader_id;
            if let Err(e) = save_cluster(&self.opts.config_path, &state.cluster) {
                error!(error = %e, "failed to persist leader change");
            }
        }
        for peer in &state.cluster.peers {
            if peer.peer_id == self.opts.peer_id
                && (peer.grpc_server_addr != self.opts.grpc_server_addr
                    || peer.api_server_addr != self.opts.api_server_addr)
            {
                let mut updated = peer.clone();
                updated.grpc_server_addr = self.opts.grpc_server_addr.clone();
                updated.api_server_addr = self.opts.api_server_addr.clone();
                return ClusterReady { update_peer: Some(updated), ..Default::default() };
            }
        }
        ClusterReady::default()
    }

    /// 仅leader分配缺失槽位，针对克隆逐槽演算负载
    /// Leader-only allocation of missing slots, load staged against a clone per slot
    fn check_alloc_slots(&self) -> ClusterReady {
        let state = self.state.read();
        if !self.is_leader() {
            return ClusterReady::default();
        }
        if state.cluster.peers.is_empty()
            || state.cluster.slots.len() as u32 >= state.cluster.slot_count
        {
            return ClusterReady::default();
        }
        let mut staged = state.cluster.clone();
        let mut allocate_slots = Vec::new();
        for slot_id in 0..state.cluster.slot_count {
            if state.cluster.slot(slot_id).is_some() {
                continue;
            }
            let peer_ids = least_loaded_peers(&staged, staged.replica_count);
            stage_alloc_slot(&mut staged, slot_id, peer_ids.clone());
            allocate_slots.push(AllocateSlot { slot: slot_id, peers: peer_ids });
        }
        if allocate_slots.is_empty() {
            return ClusterReady::default();
        }
        ClusterReady {
            allocate_slot_set: Some(AllocateSlotSet { allocate_slots }),
            ..Default::default()
        }
    }

    /// 本节点副本中未启动的槽位需要 Start 动作
    /// Replicas on this peer that have not started need a Start action
    fn check_slot_states(&self) -> ClusterReady {
        if self.leader_id.load(Ordering::Acquire) == 0 {
            return ClusterReady::default();
        }
        let Some(get_slot_state) = self.opts.get_slot_state.as_ref() else {
            return ClusterReady::default();
        };
        let state = self.state.read();
        let mut actions = Vec::new();
        for slot in &state.cluster.slots {
            if !slot.peers.contains(&self.opts.peer_id) {
                continue;
            }
            if get_slot_state(slot.slot) == SlotState::NotStarted {
                actions.push(SlotAction { slot: slot.slot, action: SlotActionType::Start });
            }
        }
        if actions.is_empty() {
            return ClusterReady::default();
        }
        ClusterReady { slot_actions: Some(actions), ..Default::default() }
    }

    /// 本节点为leader的待传播关系 / Pending relations led by this peer
    fn check_slot_leaders(&self) -> ClusterReady {
        if self.leader_id.load(Ordering::Acquire) == 0 {
            return ClusterReady::default();
        }
        let state = self.state.read();
        let relations: Vec<SlotLeaderRelation> = state
            .relations
            .iter()
            .filter(|r| r.need_update && r.leader == self.opts.peer_id && r.leader != 0)
            .cloned()
            .collect();
        if relations.is_empty() {
            return ClusterReady::default();
        }
        ClusterReady {
            slot_leader_relation_set: Some(SlotLeaderRelationSet { relations }),
            ..Default::default()
        }
    }

    fn is_leader(&self) -> bool {
        self.leader_id.load(Ordering::Acquire) == self.opts.peer_id
    }

    pub fn leader_id(&self) -> u64 {
        self.leader_id.load(Ordering::Acquire)
    }

    pub fn set_leader_id(&self, leader_id: u64) {
        let mut state = self.state.write();
        info!(leader_id, "cluster leader updated");
        self.leader_id.store(leader_id, Ordering::Release);
        state.cluster.leader = leader_id;
        if let Err(e) = save_cluster(&self.opts.config_path, &state.cluster) {
            error!(error = %e, "failed to persist leader id");
        }
    }

    /// 整体替换集群配置并落盘 / Replace the whole cluster config and persist
    pub fn update_cluster_config(&self, cluster: Cluster) {
        let mut state = self.state.write();
        state.cluster = cluster;
        if let Err(e) = save_cluster(&self.opts.config_path, &state.cluster) {
            error!(error = %e, "failed to persist cluster config");
        }
    }

    pub fn update_peer_config(&self, peer: Peer) {
        let mut state = self.state.write();
        if state.cluster.peers.is_empty() {
            return;
        }
        if let Some(existing) = state
            .cluster
            .peers
            .iter_mut()
            .find(|p| p.peer_id == peer.peer_id)
        {
            *existing = peer;
        }
        if let Err(e) = save_cluster(&self.opts.config_path, &state.cluster) {
            error!(error = %e, "failed to persist peer config");
        }
    }

    pub fn set_peer_role(&self, peer_id: u64, role: Role) {
        let mut state = self.state.write();
        if let Some(peer) = state.cluster.peers.iter_mut().find(|p| p.peer_id == peer_id) {
            peer.role = role;
        }
        if let Err(e) = save_cluster(&self.opts.config_path, &state.cluster) {
            error!(error = %e, "failed to persist peer role");
        }
    }

    /// 幂等加槽：已存在时不做任何事 / Idempotent slot insert, a no-op when present
    pub fn add_slot(&self, slot: Slot) {
        let mut state = self.state.write();
        if state.cluster.slot(slot.slot).is_some() {
            return;
        }
        state.cluster.slots.push(slot);
        if let Err(e) = save_cluster(&self.opts.config_path, &state.cluster) {
            error!(error = %e, "failed to persist slot");
        }
    }

    /// 更新槽位leader并登记待传播关系
    /// Update the slot leader and register the pending relation
    pub fn set_slot_leader(&self, slot_id: u32, leader_id: u64) {
        let mut state = self.state.write();
        let mut slot_exists = false;
        if let Some(slot) = state.cluster.slots.iter_mut().find(|s| s.slot == slot_id) {
            slot.leader = leader_id;
            slot_exists = true;
        }
        match state.relations.iter_mut().find(|r| r.slot == slot_id) {
            Some(relation) => {
                if relation.leader != leader_id {
                    relation.leader = leader_id;
                    relation.need_update = true;
                }
            }
            None => {
                state.relations.push(SlotLeaderRelation {
                    slot: slot_id,
                    leader: leader_id,
                    need_update: true,
                });
            }
        }
        if slot_exists {
            if let Err(e) = save_cluster(&self.opts.config_path, &state.cluster) {
                warn!(error = %e, "failed to persist slot leader");
            }
        }
    }

    /// 执行器确认已传播的关系 / The executor confirms propagated relations
    pub fn updated_slot_leader_relations(&self, set: &SlotLeaderRelationSet) {
        let mut state = self.state.write();
        for applied in &set.relations {
            if let Some(relation) = state
                .relations
                .iter_mut()
                .find(|r| r.slot == applied.slot && r.leader == applied.leader)
            {
                relation.need_update = false;
            }
        }
    }

    pub fn get_peers(&self) -> Vec<Peer> {
        self.state.read().cluster.peers.clone()
    }

    pub fn get_peer(&self, peer_id: u64) -> Option<Peer> {
        self.state.read().cluster.peer(peer_id).cloned()
    }

    pub fn get_slot(&self, slot_id: u32) -> Option<Slot> {
        self.state.read().cluster.slot(slot_id).cloned()
    }

    /// 槽位leader对应的节点 / The peer leading the slot
    pub fn get_leader_peer(&self, slot_id: u32) -> Option<Peer> {
        let state = self.state.read();
        let slot = state.cluster.slot(slot_id)?;
        state.cluster.peer(slot.leader).cloned()
    }

    /// 任取槽位的一个副本节点 / A random replica peer of the slot
    pub fn get_one_peer_by_slot_id(&self, slot_id: u32) -> Option<Peer> {
        let state = self.state.read();
        let slot = state.cluster.slot(slot_id)?;
        let peer_id = slot.peers.choose(&mut rand::thread_rng())?;
        state.cluster.peer(*peer_id).cloned()
    }

    pub fn get_slot_count(&self) -> u32 {
        self.state.read().cluster.slot_count
    }

    pub fn get_cluster(&self) -> Cluster {
        self.state.read().cluster.clone()
    }

    pub fn save(&self) -> Result<()> {
        let state = self.state.write();
        save_cluster(&self.opts.config_path, &state.cluster)
    }
}

/// 负载最少的节点集合：按槽位数稳定升序，取前 min(k, |peers|) 个
/// Least-loaded peers: stable ascending sort by slot count, first min(k, |peers|)
///
/// 节点数不足副本数时照常返回不足额的集合，欠副本槽位由执行器在节点加入后再收敛。
/// With fewer peers than replicas the short list is returned as-is, the executor
/// re-converges under-replicated slots once peers join.
fn least_loaded_peers(cluster: &Cluster, replica_count: u32) -> Vec<u64> {
    let mut peers: Vec<&Peer> = cluster.peers.iter().collect();
    peers.sort_by_key(|p| cluster.slot_count_of(p.peer_id));
    peers
        .into_iter()
        .take(replica_count as usize)
        .map(|p| p.peer_id)
        .collect()
}

/// 把试分配写回克隆，让后续槽位看到新负载
/// Write the trial allocation back into the clone so later slots see the load
fn stage_alloc_slot(cluster: &mut Cluster, slot_id: u32, peers: Vec<u64>) {
    match cluster.slots.iter_mut().find(|s| s.slot == slot_id) {
        Some(slot) => slot.peers = peers,
        None => cluster.slots.push(Slot { slot: slot_id, peers, leader: 0 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(peer_id: u64) -> Peer {
        Peer {
            peer_id,
            grpc_server_addr: format!("127.0.0.1:70{:02}", peer_id),
            api_server_addr: format!("127.0.0.1:80{:02}", peer_id),
            ..Default::default()
        }
    }

    fn manager_with(slot_count: u32, replica_count: u32, peer_id: u64) -> (ClusterManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ClusterManager::new(ClusterOptions {
            peer_id,
            grpc_server_addr: format!("127.0.0.1:70{:02}", peer_id),
            api_server_addr: format!("127.0.0.1:80{:02}", peer_id),
            slot_count,
            replica_count,
            config_path: dir.path().join("cluster.json"),
            get_slot_state: None,
        })
        .unwrap();
        (manager, dir)
    }

    #[test]
    fn alloc_slots_balances_replicas_across_peers() {
        let (manager, _dir) = manager_with(6, 2, 1);
        let mut cluster = manager.get_cluster();
        cluster.peers = vec![peer(1), peer(2), peer(3)];
        manager.update_cluster_config(cluster);
        manager.set_leader_id(1);

        let ready = manager.check_cluster_config();
        let set = ready.allocate_slot_set.expect("allocation expected");
        assert_eq!(set.allocate_slots.len(), 6);
        for alloc in &set.allocate_slots {
            assert_eq!(alloc.peers.len(), 2);
        }
        // 6槽 x 2副本 / 3节点 = 每节点4个副本
        // 6 slots x 2 replicas over 3 peers = 4 replicas each
        for peer_id in 1..=3u64 {
            let load = set
                .allocate_slots
                .iter()
                .filter(|a| a.peers.contains(&peer_id))
                .count();
            assert_eq!(load, 4);
        }

        // 执行器应用后收敛，下一轮不再分配
        // After the executor applies the set, the next tick allocates nothing
        for alloc in set.allocate_slots {
            manager.add_slot(Slot { slot: alloc.slot, peers: alloc.peers, leader: 0 });
        }
        assert!(manager.check_cluster_config().is_empty());
    }

    #[test]
    fn alloc_slots_is_leader_gated() {
        let (manager, _dir) = manager_with(4, 2, 1);
        let mut cluster = manager.get_cluster();
        cluster.peers = vec![peer(1), peer(2)];
        manager.update_cluster_config(cluster);
        manager.set_leader_id(2);
        assert!(manager.check_alloc_slots().is_empty());
    }

    #[test]
    fn under_replicated_allocation_returns_short_list() {
        let (manager, _dir) = manager_with(2, 3, 1);
        let mut cluster = manager.get_cluster();
        cluster.peers = vec![peer(1)];
        manager.update_cluster_config(cluster);
        manager.set_leader_id(1);
        let set = manager.check_cluster_config().allocate_slot_set.unwrap();
        for alloc in set.allocate_slots {
            assert_eq!(alloc.peers, vec![1]);
        }
    }

    #[test]
    fn check_peers_emits_update_for_changed_addresses() {
        let (manager, _dir) = manager_with(4, 2, 1);
        let mut cluster = manager.get_cluster();
        cluster.peers = vec![
            Peer { peer_id: 1, grpc_server_addr: "old:1".into(), api_server_addr: "old:2".into(), ..Default::default() },
            peer(2),
        ];
        manager.update_cluster_config(cluster);
        let ready = manager.check_peers();
        let updated = ready.update_peer.expect("peer update expected");
        assert_eq!(updated.grpc_server_addr, "127.0.0.1:7001");
        assert_eq!(updated.api_server_addr, "127.0.0.1:8001");

        // 执行器回调后不再触发 / No further trigger once the executor calls back
        manager.update_peer_config(updated);
        assert!(manager.check_peers().is_empty());
    }

    #[test]
    fn check_peers_persists_observed_leader() {
        let (manager, dir) = manager_with(4, 2, 1);
        let mut cluster = manager.get_cluster();
        cluster.peers = vec![peer(1)];
        manager.update_cluster_config(cluster);
        manager.leader_id.store(9, Ordering::Release);
        let _ = manager.check_peers();
        let persisted = load_cluster(&dir.path().join("cluster.json")).unwrap().unwrap();
        assert_eq!(persisted.leader, 9);
    }

    #[test]
    fn slot_states_probe_yields_start_actions() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ClusterManager::new(ClusterOptions {
            peer_id: 1,
            grpc_server_addr: "127.0.0.1:7001".into(),
            api_server_addr: "127.0.0.1:8001".into(),
            slot_count: 4,
            replica_count: 2,
            config_path: dir.path().join("cluster.json"),
            get_slot_state: Some(Arc::new(|slot| {
                if slot == 0 {
                    SlotState::Started
                } else {
                    SlotState::NotStarted
                }
            })),
        })
        .unwrap();
        let mut cluster = manager.get_cluster();
        cluster.peers = vec![peer(1), peer(2)];
        cluster.slots = vec![
            Slot { slot: 0, peers: vec![1, 2], leader: 1 },
            Slot { slot: 1, peers: vec![1, 2], leader: 2 },
            Slot { slot: 2, peers: vec![2], leader: 2 },
            Slot { slot: 3, peers: vec![1], leader: 1 },
        ];
        manager.update_cluster_config(cluster);
        manager.set_leader_id(1);

        let ready = manager.check_slot_states();
        let actions = ready.slot_actions.expect("actions expected");
        let slots: Vec<u32> = actions.iter().map(|a| a.slot).collect();
        // 槽0已启动，槽2不在本节点 / Slot 0 runs already, slot 2 is not hosted here
        assert_eq!(slots, vec![1, 3]);
    }

    #[test]
    fn slot_leader_relations_propagate_then_settle() {
        let (manager, _dir) = manager_with(4, 2, 1);
        let mut cluster = manager.get_cluster();
        cluster.peers = vec![peer(1), peer(2)];
        cluster.slots = (0..4)
            .map(|slot| Slot { slot, peers: vec![1, 2], leader: 0 })
            .collect();
        manager.update_cluster_config(cluster);
        manager.set_leader_id(1);

        manager.set_slot_leader(2, 1);
        let ready = manager.check_cluster_config();
        let set = ready.slot_leader_relation_set.expect("relation set expected");
        assert_eq!(
            set.relations,
            vec![SlotLeaderRelation { slot: 2, leader: 1, need_update: true }]
        );

        manager.updated_slot_leader_relations(&set);
        assert!(manager.check_cluster_config().is_empty());

        // 重复确认保持收敛 / Confirming again stays settled
        manager.updated_slot_leader_relations(&set);
        assert!(manager.check_cluster_config().is_empty());

        // 同leader重复设置不再标记待传播 / Re-setting the same leader does not re-mark
        manager.set_slot_leader(2, 1);
        assert!(manager.check_cluster_config().is_empty());

        // leader变更重新进入待传播 / A leader change re-enters propagation
        manager.set_slot_leader(2, 2);
        assert!(manager.check_slot_leaders().is_empty());
        let state = manager.state.read();
        assert!(state.relations.iter().any(|r| r.slot == 2 && r.leader == 2 && r.need_update));
    }

    #[test]
    fn add_slot_is_idempotent() {
        let (manager, _dir) = manager_with(4, 2, 1);
        manager.add_slot(Slot { slot: 0, peers: vec![1, 2], leader: 1 });
        manager.add_slot(Slot { slot: 0, peers: vec![3], leader: 3 });
        let slot = manager.get_slot(0).unwrap();
        assert_eq!(slot.peers, vec![1, 2]);
        assert_eq!(slot.leader, 1);
    }

    #[test]
    fn config_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        let opts = ClusterOptions {
            peer_id: 1,
            grpc_server_addr: "127.0.0.1:7001".into(),
            api_server_addr: "127.0.0.1:8001".into(),
            slot_count: 8,
            replica_count: 2,
            config_path: path.clone(),
            get_slot_state: None,
        };
        {
            let manager = ClusterManager::new(opts.clone()).unwrap();
            let mut cluster = manager.get_cluster();
            cluster.peers = vec![peer(1), peer(2)];
            manager.update_cluster_config(cluster);
            manager.set_leader_id(2);
        }
        let reborn = ClusterManager::new(opts).unwrap();
        let cluster = reborn.get_cluster();
        assert_eq!(cluster.leader, 2);
        assert_eq!(cluster.peers.len(), 2);
        assert_eq!(cluster.slot_count, 8);
    }

    #[test]
    fn least_loaded_peers_prefers_light_peers_stably() {
        let cluster = Cluster {
            slot_count: 4,
            replica_count: 2,
            leader: 0,
            peers: vec![peer(1), peer(2), peer(3)],
            slots: vec![Slot { slot: 0, peers: vec![1, 2], leader: 0 }],
        };
        assert_eq!(least_loaded_peers(&cluster, 2), vec![3, 1]);
    }
}
