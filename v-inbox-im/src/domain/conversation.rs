use serde::{Deserialize, Serialize};

/// 每用户每频道的最近会话摘要 / Per-user per-channel conversation summary
///
/// `version` 随每次变更严格递增，客户端用它做增量同步。
/// `version` strictly increases on every mutation and drives client delta sync.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    pub unread_count: u32,
    /// 最后一条消息的毫秒时间戳 / Millisecond timestamp of the last message
    pub timestamp: i64,
    pub last_msg_seq: u32,
    /// 用户已读到的序列号，超大频道的未读数由 last_msg_seq - offset_msg_seq 推导
    /// Sequence the user has read up to; large channels derive unread from it
    #[serde(default)]
    pub offset_msg_seq: u32,
    pub last_client_msg_no: String,
    pub last_msg_id: i64,
    pub version: i64,
}
