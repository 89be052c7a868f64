//! 消息存储契约与内存参考实现
//! Message store contract and in-memory reference implementation

use anyhow::Result;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::domain::channel::channel_key;
use crate::domain::conversation::Conversation;
use crate::domain::message::Message;

/// 消息存储契约，便于测试替换 / Message store contract, swappable for tests
///
/// 实现必须支持并发读，单频道写串行。
/// Implementations must be safe for concurrent readers and serialized writers per channel.
pub trait MessageStore: Send + Sync {
    /// 按序列号取单条消息 / Load one message by sequence
    fn load_msg(&self, channel_id: &str, channel_type: u8, message_seq: u32) -> Result<Option<Message>>;
    /// 取频道最新的 limit 条消息，按序列号升序返回
    /// Load the newest `limit` messages, ascending by sequence
    fn load_last_msgs(&self, channel_id: &str, channel_type: u8, limit: usize) -> Result<Vec<Message>>;
    /// 取序列号大于 end_seq 的最新 limit 条消息（end_seq 为 0 表示不限制），升序返回
    /// Load the newest `limit` messages with sequence above `end_seq` (0 means unbounded), ascending
    fn load_last_msgs_with_end(
        &self,
        channel_id: &str,
        channel_type: u8,
        end_seq: u32,
        limit: usize,
    ) -> Result<Vec<Message>>;
    fn get_conversation(&self, uid: &str, channel_id: &str, channel_type: u8) -> Result<Option<Conversation>>;
    fn get_conversations(&self, uid: &str) -> Result<Vec<Conversation>>;
    fn add_or_update_conversations(&self, uid: &str, conversations: Vec<Conversation>) -> Result<()>;
    fn delete_conversation(&self, uid: &str, channel_id: &str, channel_type: u8) -> Result<()>;
}

/// 内存存储 / In-memory store
///
/// 消息按频道键保存为序列号升序的列表，会话按 uid 分组。
/// Messages are kept per channel key ascending by sequence, conversations grouped by uid.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: DashMap<String, Vec<Message>>,
    conversations: DashMap<String, HashMap<String, Conversation>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一条消息，保持序列号升序 / Append a message keeping ascending sequence order
    pub fn append_message(&self, message: Message) {
        let key = channel_key(&message.channel_id, message.channel_type);
        let mut list = self.messages.entry(key).or_default();
        let pos = list
            .iter()
            .position(|m| m.message_seq > message.message_seq)
            .unwrap_or(list.len());
        list.insert(pos, message);
    }
}

impl MessageStore for MemoryMessageStore {
    fn load_msg(&self, channel_id: &str, channel_type: u8, message_seq: u32) -> Result<Option<Message>> {
        let key = channel_key(channel_id, channel_type);
        Ok(self
            .messages
            .get(&key)
            .and_then(|list| list.iter().find(|m| m.message_seq == message_seq).cloned()))
    }

    fn load_last_msgs(&self, channel_id: &str, channel_type: u8, limit: usize) -> Result<Vec<Message>> {
        self.load_last_msgs_with_end(channel_id, channel_type, 0, limit)
    }

    fn load_last_msgs_with_end(
        &self,
        channel_id: &str,
        channel_type: u8,
        end_seq: u32,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let key = channel_key(channel_id, channel_type);
        let Some(list) = self.messages.get(&key) else {
            return Ok(Vec::new());
        };
        let matched: Vec<Message> = list
            .iter()
            .filter(|m| end_seq == 0 || m.message_seq > end_seq)
            .cloned()
            .collect();
        let skip = matched.len().saturating_sub(limit);
        Ok(matched.into_iter().skip(skip).collect())
    }

    fn get_conversation(&self, uid: &str, channel_id: &str, channel_type: u8) -> Result<Option<Conversation>> {
        let key = channel_key(channel_id, channel_type);
        Ok(self
            .conversations
            .get(uid)
            .and_then(|map| map.get(&key).cloned()))
    }

    fn get_conversations(&self, uid: &str) -> Result<Vec<Conversation>> {
        Ok(self
            .conversations
            .get(uid)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default())
    }

    fn add_or_update_conversations(&self, uid: &str, conversations: Vec<Conversation>) -> Result<()> {
        let mut map = self.conversations.entry(uid.to_string()).or_default();
        for conversation in conversations {
            let key = channel_key(&conversation.channel_id, conversation.channel_type);
            map.insert(key, conversation);
        }
        Ok(())
    }

    fn delete_conversation(&self, uid: &str, channel_id: &str, channel_type: u8) -> Result<()> {
        if let Some(mut map) = self.conversations.get_mut(uid) {
            map.remove(&channel_key(channel_id, channel_type));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::CHANNEL_TYPE_GROUP;

    fn msg(seq: u32) -> Message {
        Message {
            message_id: seq as i64,
            message_seq: seq,
            client_msg_no: format!("no-{}", seq),
            from_uid: "alice".to_string(),
            channel_id: "g1".to_string(),
            channel_type: CHANNEL_TYPE_GROUP,
            timestamp: 1_000 * seq as i64,
            red_dot: true,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn load_last_msgs_with_end_returns_newest_above_boundary() {
        let store = MemoryMessageStore::new();
        for seq in [3, 1, 2, 5, 4] {
            store.append_message(msg(seq));
        }
        let out = store
            .load_last_msgs_with_end("g1", CHANNEL_TYPE_GROUP, 2, 2)
            .unwrap();
        let seqs: Vec<u32> = out.iter().map(|m| m.message_seq).collect();
        assert_eq!(seqs, vec![4, 5]);

        let unbounded = store.load_last_msgs("g1", CHANNEL_TYPE_GROUP, 10).unwrap();
        let seqs: Vec<u32> = unbounded.iter().map(|m| m.message_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn conversations_round_trip_per_uid() {
        let store = MemoryMessageStore::new();
        let conversation = Conversation {
            uid: "bob".to_string(),
            channel_id: "g1".to_string(),
            channel_type: CHANNEL_TYPE_GROUP,
            unread_count: 2,
            timestamp: 1000,
            last_msg_seq: 5,
            offset_msg_seq: 0,
            last_client_msg_no: "no-5".to_string(),
            last_msg_id: 5,
            version: 1,
        };
        store
            .add_or_update_conversations("bob", vec![conversation.clone()])
            .unwrap();
        assert_eq!(
            store.get_conversation("bob", "g1", CHANNEL_TYPE_GROUP).unwrap(),
            Some(conversation)
        );
        store.delete_conversation("bob", "g1", CHANNEL_TYPE_GROUP).unwrap();
        assert!(store.get_conversations("bob").unwrap().is_empty());
    }
}
