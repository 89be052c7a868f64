//! 最近会话HTTP接口 / Conversation HTTP endpoints

pub mod clear_unread;
pub mod delete;
pub mod list;
pub mod set_unread;
pub mod sync;
pub mod sync_messages;

use anyhow::Result;
use std::collections::HashMap;

use crate::domain::channel::{channel_key, message_channel_id, resolve_person_channel, CHANNEL_TYPE_PERSON};
use crate::domain::message::Message;
use crate::storage::MessageStore;

/// 消息摘要响应体 / Message summary response body
#[derive(Clone, Debug, serde::Serialize)]
pub struct MessageResp {
    pub message_id: i64,
    pub message_seq: u32,
    pub client_msg_no: String,
    pub from_uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    pub timestamp: i64,
    pub payload: serde_json::Value,
}

impl From<&Message> for MessageResp {
    fn from(m: &Message) -> Self {
        Self {
            message_id: m.message_id,
            message_seq: m.message_seq,
            client_msg_no: m.client_msg_no.clone(),
            from_uid: m.from_uid.clone(),
            channel_id: m.channel_id.clone(),
            channel_type: m.channel_type,
            timestamp: m.timestamp,
            payload: m.payload.clone(),
        }
    }
}

/// 客户端请求的单频道消息范围 / Per-channel message range requested by the client
#[derive(Clone, Debug, serde::Deserialize)]
pub struct ChannelRecentReq {
    pub channel_id: String,
    pub channel_type: u8,
    #[serde(default)]
    pub last_msg_seq: u32,
}

/// 单频道的最近消息应答，最新在前 / Recent messages of one channel, newest first
#[derive(Debug, serde::Serialize)]
pub struct ChannelRecentMessagesResp {
    pub channel_id: String,
    pub channel_type: u8,
    pub messages: Vec<MessageResp>,
}

/// 逐频道拉取比 last_msg_seq 新的消息，单聊换算伪频道ID
/// Pull messages newer than last_msg_seq per channel, personal channels go
/// through the fake channel id
pub(crate) fn get_recent_messages(
    store: &dyn MessageStore,
    uid: &str,
    msg_count: usize,
    channels: &[ChannelRecentReq],
) -> Result<Vec<ChannelRecentMessagesResp>> {
    let mut out = Vec::with_capacity(channels.len());
    for channel in channels {
        let peer_channel_id = if channel.channel_type == CHANNEL_TYPE_PERSON {
            resolve_person_channel(uid, &channel.channel_id)?
        } else {
            channel.channel_id.clone()
        };
        let target = message_channel_id(uid, &peer_channel_id, channel.channel_type);
        let messages =
            store.load_last_msgs_with_end(&target, channel.channel_type, channel.last_msg_seq, msg_count)?;
        let mut resps: Vec<MessageResp> = messages.iter().map(MessageResp::from).collect();
        resps.sort_by(|a, b| b.message_seq.cmp(&a.message_seq));
        out.push(ChannelRecentMessagesResp {
            channel_id: channel.channel_id.clone(),
            channel_type: channel.channel_type,
            messages: resps,
        });
    }
    Ok(out)
}

/// 解析 "channelID:channelType:lastMsgSeq|..." 为频道键到序列号的映射
/// Parse "channelID:channelType:lastMsgSeq|..." into a channel-key map
pub(crate) fn parse_last_msg_seqs(raw: &str) -> HashMap<String, u32> {
    let mut out = HashMap::new();
    for part in raw.split('|') {
        let fields: Vec<&str> = part.rsplitn(3, ':').collect();
        if fields.len() != 3 {
            continue;
        }
        let (seq, channel_type, channel_id) = (fields[0], fields[1], fields[2]);
        let (Ok(seq), Ok(channel_type)) = (seq.parse::<u32>(), channel_type.parse::<u8>()) else {
            continue;
        };
        out.insert(channel_key(channel_id, channel_type), seq);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::CHANNEL_TYPE_GROUP;

    #[test]
    fn parse_last_msg_seqs_tolerates_garbage() {
        let parsed = parse_last_msg_seqs("g1:2:15|broken|p1:1:7|x:y:z");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get(&channel_key("g1", CHANNEL_TYPE_GROUP)), Some(&15));
        assert_eq!(parsed.get(&channel_key("p1", CHANNEL_TYPE_PERSON)), Some(&7));
    }

    #[test]
    fn parse_last_msg_seqs_empty_input() {
        assert!(parse_last_msg_seqs("").is_empty());
    }
}
