use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 节点角色 / Peer role
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Follower,
    Leader,
}

/// 节点状态 / Peer state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    #[default]
    Initial,
    Joined,
}

/// 集群成员 / Cluster member
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: u64,
    #[serde(default)]
    pub grpc_server_addr: String,
    #[serde(default)]
    pub api_server_addr: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub state: PeerState,
}

/// 槽位与其副本 / Slot and its replicas
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot: u32,
    #[serde(default)]
    pub peers: Vec<u64>,
    /// 0 表示leader未知 / 0 means the leader is unknown
    #[serde(default)]
    pub leader: u64,
}

/// 持久化的集群配置 / Persisted cluster configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub slot_count: u32,
    #[serde(default)]
    pub replica_count: u32,
    /// 集群leader，0 表示未知 / Cluster leader, 0 when unknown
    #[serde(default)]
    pub leader: u64,
    #[serde(default)]
    pub peers: Vec<Peer>,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl Cluster {
    pub fn peer(&self, peer_id: u64) -> Option<&Peer> {
        self.peers.iter().find(|p| p.peer_id == peer_id)
    }

    pub fn slot(&self, slot_id: u32) -> Option<&Slot> {
        self.slots.iter().find(|s| s.slot == slot_id)
    }

    /// 该节点承载的槽位副本数 / Number of slot replicas hosted by the peer
    pub fn slot_count_of(&self, peer_id: u64) -> usize {
        self.slots
            .iter()
            .filter(|s| s.peers.contains(&peer_id))
            .count()
    }
}

/// 读取集群配置，文件缺失或为空返回 None，内容非法返回错误
/// Load the cluster config; a missing or empty file yields None, malformed content is an error
pub fn load_cluster(path: &Path) -> Result<Option<Cluster>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context(format!("read cluster config {}", path.display())),
    };
    if data.is_empty() {
        return Ok(None);
    }
    let cluster = serde_json::from_slice(&data)
        .context(format!("malformed cluster config {}", path.display()))?;
    Ok(Some(cluster))
}

/// 写临时文件后原子改名，读者永远看不到半份配置
/// Write a temp file then rename atomically, readers never observe a partial config
pub fn save_cluster(path: &Path, cluster: &Cluster) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).context(format!("create config dir {}", dir.display()))?;
        }
    }
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    let data = serde_json::to_vec(cluster)?;
    fs::write(&tmp, data).context(format!("write cluster config {}", tmp.display()))?;
    fs::rename(&tmp, path).context(format!("rename cluster config to {}", path.display()))?;
    Ok(())
}
