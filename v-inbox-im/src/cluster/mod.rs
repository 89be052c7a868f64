//! 集群槽位协调器 / Cluster slot coordinator

pub mod config;
pub mod manager;

pub use config::{Cluster, Peer, PeerState, Role, Slot};
pub use manager::{
    AllocateSlot, AllocateSlotSet, ClusterManager, ClusterOptions, ClusterReady, SlotAction,
    SlotActionType, SlotLeaderRelation, SlotLeaderRelationSet, SlotState,
};
