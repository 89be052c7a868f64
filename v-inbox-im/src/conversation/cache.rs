use lru::LruCache;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroUsize;

use super::hash_uid;
use crate::domain::channel::channel_key;
use crate::domain::conversation::Conversation;

/// 分桶的会话缓存：每个桶持有 uid 到有界LRU的映射
/// Sharded conversation cache: each bucket maps uid to a bounded LRU
///
/// 桶内操作经由桶锁串行，不同桶互不影响；每用户LRU上限保证内存有界。
/// Operations on a bucket serialize through its lock, buckets are independent;
/// the per-user LRU cap bounds memory.
pub struct ConversationCache {
    buckets: Vec<RwLock<HashMap<String, LruCache<String, Conversation>>>>,
    user_max_count: NonZeroUsize,
}

impl ConversationCache {
    pub fn new(bucket_count: usize, user_max_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let user_max_count =
            NonZeroUsize::new(user_max_count).unwrap_or(NonZeroUsize::new(1000).unwrap());
        let buckets = (0..bucket_count)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { buckets, user_max_count }
    }

    fn bucket(&self, uid: &str) -> &RwLock<HashMap<String, LruCache<String, Conversation>>> {
        &self.buckets[hash_uid(uid) as usize % self.buckets.len()]
    }

    pub fn get(&self, uid: &str, channel_id: &str, channel_type: u8) -> Option<Conversation> {
        let key = channel_key(channel_id, channel_type);
        let mut bucket = self.bucket(uid).write();
        bucket.get_mut(uid).and_then(|cache| cache.get(&key).cloned())
    }

    pub fn put(&self, uid: &str, conversation: Conversation) {
        let key = channel_key(&conversation.channel_id, conversation.channel_type);
        let mut bucket = self.bucket(uid).write();
        bucket
            .entry(uid.to_string())
            .or_insert_with(|| LruCache::new(self.user_max_count))
            .put(key, conversation);
    }

    pub fn remove(&self, uid: &str, channel_id: &str, channel_type: u8) {
        let key = channel_key(channel_id, channel_type);
        let mut bucket = self.bucket(uid).write();
        if let Some(cache) = bucket.get_mut(uid) {
            cache.pop(&key);
            if cache.is_empty() {
                bucket.remove(uid);
            }
        }
    }

    /// 该用户当前缓存的全部会话快照 / Snapshot of every cached conversation for the uid
    pub fn list_for_user(&self, uid: &str) -> Vec<Conversation> {
        let bucket = self.bucket(uid).read();
        bucket
            .get(uid)
            .map(|cache| cache.iter().map(|(_, c)| c.clone()).collect())
            .unwrap_or_default()
    }

    /// 淘汰 timestamp + expire 已过期的会话并清掉空用户，返回淘汰数量
    /// Evict conversations whose timestamp + expire has passed and drop empty users,
    /// returns the eviction count
    pub fn remove_expired(&self, now_ms: i64, expire_secs: u64) -> usize {
        let now_secs = now_ms / 1000;
        let mut removed = 0;
        for bucket in &self.buckets {
            let mut bucket = bucket.write();
            for cache in bucket.values_mut() {
                let expired: Vec<String> = cache
                    .iter()
                    .filter(|(_, c)| c.timestamp / 1000 + (expire_secs as i64) < now_secs)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in expired {
                    cache.pop(&key);
                    removed += 1;
                }
            }
            bucket.retain(|_, cache| !cache.is_empty());
        }
        removed
    }

    /// 缓存的会话总数，供指标上报 / Total cached conversations, for the metrics tick
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.read().values().map(|cache| cache.len()).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::CHANNEL_TYPE_GROUP;

    fn conversation(uid: &str, channel_id: &str, timestamp: i64) -> Conversation {
        Conversation {
            uid: uid.to_string(),
            channel_id: channel_id.to_string(),
            channel_type: CHANNEL_TYPE_GROUP,
            unread_count: 0,
            timestamp,
            last_msg_seq: 1,
            offset_msg_seq: 0,
            last_client_msg_no: "no-1".to_string(),
            last_msg_id: 1,
            version: 1,
        }
    }

    #[test]
    fn put_get_remove() {
        let cache = ConversationCache::new(4, 10);
        cache.put("bob", conversation("bob", "g1", 1000));
        assert!(cache.get("bob", "g1", CHANNEL_TYPE_GROUP).is_some());
        assert!(cache.get("bob", "g2", CHANNEL_TYPE_GROUP).is_none());
        cache.remove("bob", "g1", CHANNEL_TYPE_GROUP);
        assert!(cache.get("bob", "g1", CHANNEL_TYPE_GROUP).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn per_user_lru_evicts_coldest() {
        let cache = ConversationCache::new(4, 2);
        cache.put("bob", conversation("bob", "g1", 1000));
        cache.put("bob", conversation("bob", "g2", 2000));
        // 访问g1使其变热 / touch g1 so it becomes hot
        assert!(cache.get("bob", "g1", CHANNEL_TYPE_GROUP).is_some());
        cache.put("bob", conversation("bob", "g3", 3000));
        assert!(cache.get("bob", "g1", CHANNEL_TYPE_GROUP).is_some());
        assert!(cache.get("bob", "g2", CHANNEL_TYPE_GROUP).is_none());
        assert!(cache.get("bob", "g3", CHANNEL_TYPE_GROUP).is_some());
        assert_eq!(cache.list_for_user("bob").len(), 2);
    }

    #[test]
    fn remove_expired_with_zero_ttl_clears_past_records() {
        let cache = ConversationCache::new(2, 10);
        cache.put("bob", conversation("bob", "g1", 1_000));
        cache.put("carol", conversation("carol", "g2", 5_000));
        let removed = cache.remove_expired(10_000, 0);
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_expired_keeps_fresh_records() {
        let cache = ConversationCache::new(2, 10);
        cache.put("bob", conversation("bob", "g1", 9_000));
        let removed = cache.remove_expired(10_000, 3600);
        assert_eq!(removed, 0);
        assert_eq!(cache.len(), 1);
    }
}
