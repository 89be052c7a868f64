use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// 单聊频道 / Personal (1:1) channel
pub const CHANNEL_TYPE_PERSON: u8 = 1;
/// 群聊频道 / Group channel
pub const CHANNEL_TYPE_GROUP: u8 = 2;

/// 频道地址 / Channel address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub channel_type: u8,
}

/// 缓存与存储共用的频道键 / Channel key shared by cache and store
pub fn channel_key(channel_id: &str, channel_type: u8) -> String {
    format!("{}-{}", channel_id, channel_type)
}

/// 由两个参与者推导单聊的伪频道ID，双方得到同一个ID
/// Derive the personal-channel fake id from both participants, identical on both sides
pub fn fake_channel_id(uid: &str, other_uid: &str) -> String {
    if uid <= other_uid {
        format!("{}@{}", uid, other_uid)
    } else {
        format!("{}@{}", other_uid, uid)
    }
}

/// 解析伪频道ID为两个参与者 / Parse a fake channel id into both participants
pub fn parse_fake_channel_id(channel_id: &str) -> Result<(String, String)> {
    let mut parts = channel_id.splitn(2, '@');
    let a = parts.next().unwrap_or_default();
    let b = parts.next().unwrap_or_default();
    if a.is_empty() || b.is_empty() {
        bail!("malformed fake channel id: {}", channel_id);
    }
    Ok((a.to_string(), b.to_string()))
}

/// 规范化单聊频道ID：客户端可传对方uid或伪频道ID，统一还原为对方uid
/// Normalize a personal channel id: clients may pass the peer uid or the fake id,
/// always resolve to the peer uid
pub fn resolve_person_channel(uid: &str, channel_id: &str) -> Result<String> {
    if !channel_id.contains('@') {
        return Ok(channel_id.to_string());
    }
    let (a, b) = parse_fake_channel_id(channel_id)?;
    if a == uid {
        Ok(b)
    } else if b == uid {
        Ok(a)
    } else {
        bail!("uid {} is not a participant of channel {}", uid, channel_id)
    }
}

/// 消息日志使用的频道ID：单聊转伪频道ID，其余原样
/// Channel id for the message log: personal channels use the fake id
pub fn message_channel_id(uid: &str, channel_id: &str, channel_type: u8) -> String {
    if channel_type == CHANNEL_TYPE_PERSON {
        fake_channel_id(uid, channel_id)
    } else {
        channel_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_channel_id_is_symmetric() {
        assert_eq!(fake_channel_id("alice", "bob"), fake_channel_id("bob", "alice"));
        assert_eq!(fake_channel_id("alice", "bob"), "alice@bob");
    }

    #[test]
    fn parse_fake_channel_id_rejects_malformed_ids() {
        assert!(parse_fake_channel_id("nodelimiter").is_err());
        assert!(parse_fake_channel_id("@bob").is_err());
        assert!(parse_fake_channel_id("alice@").is_err());
        assert_eq!(
            parse_fake_channel_id("alice@bob").unwrap(),
            ("alice".to_string(), "bob".to_string())
        );
    }

    #[test]
    fn resolve_person_channel_maps_to_peer() {
        assert_eq!(resolve_person_channel("alice", "bob").unwrap(), "bob");
        assert_eq!(resolve_person_channel("alice", "alice@bob").unwrap(), "bob");
        assert_eq!(resolve_person_channel("bob", "alice@bob").unwrap(), "alice");
        assert!(resolve_person_channel("carol", "alice@bob").is_err());
    }

    #[test]
    fn message_channel_id_only_rewrites_person_channels() {
        assert_eq!(message_channel_id("alice", "bob", CHANNEL_TYPE_PERSON), "alice@bob");
        assert_eq!(message_channel_id("alice", "g1", CHANNEL_TYPE_GROUP), "g1");
    }
}
