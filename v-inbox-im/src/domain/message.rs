use serde::{Deserialize, Serialize};

/// 投递管道交给会话引擎的消息 / Message handed to the conversation engine by the delivery pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub message_seq: u32,
    pub client_msg_no: String,
    pub from_uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    /// 毫秒时间戳 / Milliseconds since epoch
    pub timestamp: i64,
    /// 是否计入未读红点 / Whether the message increments the unread badge
    pub red_dot: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}
