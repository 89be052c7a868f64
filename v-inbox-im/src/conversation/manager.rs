use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::cache::ConversationCache;
use super::hash_uid;
use super::queue::FanoutQueue;
use crate::clock::Clock;
use crate::domain::channel::{Channel, CHANNEL_TYPE_PERSON};
use crate::domain::conversation::Conversation;
use crate::domain::message::Message;
use crate::storage::MessageStore;

/// 会话引擎配置 / Conversation engine options
#[derive(Clone, Debug)]
pub struct ConversationOptions {
    /// 引擎开关，关闭时 push 为空操作且不启动工作协程
    /// Engine switch, push becomes a no-op and no workers run when off
    pub on: bool,
    pub bucket_count: usize,
    /// 每用户LRU上限 / Per-user LRU cap
    pub user_max_count: usize,
    /// 刷盘定时周期 / Flush timer period
    pub sync_interval: Duration,
    /// 刷盘计数阈值 / Flush counter threshold
    pub sync_once: usize,
    /// 会话缓存TTL / Conversation cache TTL
    pub cache_expire: Duration,
    pub calc_workers: usize,
    pub flush_workers: usize,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            on: true,
            bucket_count: 10,
            user_max_count: 1000,
            sync_interval: Duration::from_secs(300),
            sync_once: 100,
            cache_expire: Duration::from_secs(48 * 3600),
            calc_workers: 20,
            flush_workers: 5,
        }
    }
}

/// 最近会话管理器 / Conversation manager
///
/// 投递管道通过 `push_message` 扇出，计算协程更新缓存并标脏，
/// 刷盘协程按分片批量落库，查询接口合并缓存与存储视图。
/// The delivery pipeline fans out through `push_message`, calculator workers
/// update the cache and mark dirty uids, flusher workers batch them into the
/// store per partition, and the query surface merges cache and store views.
pub struct ConversationManager {
    opts: ConversationOptions,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    cache: ConversationCache,
    queue: Arc<FanoutQueue>,
    need_save: Mutex<HashSet<String>>,
    flush_signal_txs: Vec<mpsc::Sender<()>>,
    flush_signal_rxs: Mutex<Vec<mpsc::Receiver<()>>>,
    stop_tx: broadcast::Sender<()>,
}

impl ConversationManager {
    pub fn new(opts: ConversationOptions, store: Arc<dyn MessageStore>, clock: Arc<dyn Clock>) -> Self {
        let opts = ConversationOptions {
            bucket_count: opts.bucket_count.max(1),
            calc_workers: opts.calc_workers.max(1),
            flush_workers: opts.flush_workers.max(1),
            sync_once: opts.sync_once.max(1),
            ..opts
        };
        let mut flush_signal_txs = Vec::with_capacity(opts.flush_workers);
        let mut flush_signal_rxs = Vec::with_capacity(opts.flush_workers);
        for _ in 0..opts.flush_workers {
            // 有界信号通道去抖刷盘触发 / Bounded signal channel debounces flush triggers
            let (tx, rx) = mpsc::channel(100);
            flush_signal_txs.push(tx);
            flush_signal_rxs.push(rx);
        }
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            cache: ConversationCache::new(opts.bucket_count, opts.user_max_count),
            opts,
            store,
            clock,
            queue: Arc::new(FanoutQueue::new()),
            need_save: Mutex::new(HashSet::new()),
            flush_signal_txs,
            flush_signal_rxs: Mutex::new(flush_signal_rxs),
            stop_tx,
        }
    }

    pub fn options(&self) -> &ConversationOptions {
        &self.opts
    }

    /// 启动计算与刷盘协程 / Spawn calculator and flusher workers
    pub fn start(self: &Arc<Self>) {
        if !self.opts.on {
            return;
        }
        for _ in 0..self.opts.calc_workers {
            let manager = self.clone();
            let mut stop_rx = self.stop_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop_rx.recv() => break,
                        task = manager.queue.pop() => {
                            let Some(task) = task else { break };
                            for subscriber in &task.subscribers {
                                manager.calc_conversation(&task.message, subscriber);
                            }
                            manager.queue.task_done();
                        }
                    }
                }
            });
        }

        let receivers: Vec<mpsc::Receiver<()>> = self.flush_signal_rxs.lock().drain(..).collect();
        for (partition, mut signal_rx) in receivers.into_iter().enumerate() {
            let manager = self.clone();
            let mut stop_rx = self.stop_tx.subscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(manager.opts.sync_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let mut pending = 0usize;
                loop {
                    if pending >= manager.opts.sync_once {
                        pending = 0;
                        manager.flush_partition(partition);
                    }
                    tokio::select! {
                        _ = stop_rx.recv() => {
                            manager.flush_partition(partition);
                            break;
                        }
                        signal = signal_rx.recv() => {
                            if signal.is_some() {
                                pending += 1;
                            }
                        }
                        _ = ticker.tick() => {
                            if pending > 0 {
                                pending = 0;
                                manager.flush_partition(partition);
                            }
                        }
                    }
                }
            });
        }
        info!(
            calc_workers = self.opts.calc_workers,
            flush_workers = self.opts.flush_workers,
            "conversation manager started"
        );
    }

    /// 停机：清空队列，停工作协程，最后整体落库
    /// Shutdown: drain the queue, stop workers, then flush everything
    pub async fn stop(&self) {
        if !self.opts.on {
            return;
        }
        self.queue.wait().await;
        let _ = self.stop_tx.send(());
        self.flush_conversations();
        info!("conversation manager stopped");
    }

    /// 投递管道入口，非阻塞 / Delivery pipeline entry, non-blocking
    pub fn push_message(&self, message: Message, subscribers: Vec<String>) {
        if !self.opts.on {
            return;
        }
        self.queue.push(message, subscribers);
    }

    /// 单个订阅者的会话更新 / Conversation update for one subscriber
    fn calc_conversation(&self, message: &Message, subscriber: &str) {
        // 单聊且频道ID等于订阅者本人时，订阅者视角的会话键是对端uid
        // For a personal channel whose id equals the subscriber, the subscriber's
        // view of the conversation is keyed by the other party
        let channel_id = if message.channel_type == CHANNEL_TYPE_PERSON && message.channel_id == subscriber {
            message.from_uid.clone()
        } else {
            message.channel_id.clone()
        };

        let cached = self.cache.get(subscriber, &channel_id, message.channel_type);
        let existing = match cached {
            Some(conversation) => Some(conversation),
            None => match self
                .store
                .get_conversation(subscriber, &channel_id, message.channel_type)
            {
                Ok(conversation) => conversation,
                Err(e) => {
                    error!(
                        error = %e,
                        subscriber,
                        channel_id,
                        channel_type = message.channel_type,
                        "failed to load conversation from store"
                    );
                    None
                }
            },
        };

        let mut modified = false;
        let conversation = match existing {
            None => {
                let unread_count = if message.red_dot && message.from_uid != subscriber {
                    1
                } else {
                    0
                };
                modified = true;
                Conversation {
                    uid: subscriber.to_string(),
                    channel_id,
                    channel_type: message.channel_type,
                    unread_count,
                    timestamp: message.timestamp,
                    last_msg_seq: message.message_seq,
                    offset_msg_seq: 0,
                    last_client_msg_no: message.client_msg_no.clone(),
                    last_msg_id: message.message_id,
                    version: self.next_version(0),
                }
            }
            Some(mut conversation) => {
                if message.red_dot && message.from_uid != subscriber {
                    conversation.unread_count += 1;
                    modified = true;
                }
                // 旧消息不能覆盖新消息 / An older message never overwrites a newer one
                if conversation.last_msg_seq < message.message_seq {
                    conversation.timestamp = message.timestamp;
                    conversation.last_client_msg_no = message.client_msg_no.clone();
                    conversation.last_msg_seq = message.message_seq;
                    conversation.last_msg_id = message.message_id;
                    modified = true;
                }
                if modified {
                    conversation.version = self.next_version(conversation.version);
                }
                conversation
            }
        };
        if modified {
            self.cache.put(subscriber, conversation);
            self.set_need_save(subscriber);
        }
    }

    /// 缓存优先读取单个会话，回落到存储，只读
    /// Cache-first single conversation read with store fallback, never writes
    pub fn get_conversation(&self, uid: &str, channel_id: &str, channel_type: u8) -> Option<Conversation> {
        if let Some(conversation) = self.cache.get(uid, channel_id, channel_type) {
            return Some(conversation);
        }
        match self.store.get_conversation(uid, channel_id, channel_type) {
            Ok(conversation) => conversation,
            Err(e) => {
                error!(error = %e, uid, channel_id, channel_type, "failed to query conversation");
                None
            }
        }
    }

    /// 合并存储快照与缓存视图的增量同步读取
    /// Delta-sync read merging the store snapshot with the cache view
    ///
    /// 过滤规则：version<=0 全量，否则只保留更新的记录；larges 中的频道总是保留。
    /// Filter: everything when version<=0, otherwise only newer records;
    /// channels in `larges` always pass.
    pub fn get_conversations(&self, uid: &str, version: i64, larges: &[Channel]) -> Vec<Conversation> {
        let old = match self.store.get_conversations(uid) {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, uid, "failed to get conversations from store");
                return Vec::new();
            }
        };
        let mut merged = old;
        for updated in self.cache.list_for_user(uid) {
            match merged
                .iter()
                .position(|c| c.channel_id == updated.channel_id && c.channel_type == updated.channel_type)
            {
                Some(idx) => merged[idx] = updated,
                None => merged.push(updated),
            }
        }
        let mut out: Vec<Conversation> = merged
            .into_iter()
            .filter(|c| {
                version <= 0
                    || c.version > version
                    || channel_in_larges(&c.channel_id, c.channel_type, larges)
            })
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }

    /// 设置未读数，缓存未命中时回落存储；存储也没有则不产生记录
    /// Set the unread count with store fallback on cache miss; when the store
    /// has no record either the call succeeds without mutating
    pub fn set_conversation_unread(
        &self,
        uid: &str,
        channel_id: &str,
        channel_type: u8,
        unread: u32,
        message_seq: u32,
    ) -> Result<()> {
        if let Some(conversation) = self.cache.get(uid, channel_id, channel_type) {
            self.apply_unread(uid, conversation, unread, message_seq);
            return Ok(());
        }
        if let Some(conversation) = self.store.get_conversation(uid, channel_id, channel_type)? {
            self.apply_unread(uid, conversation, unread, message_seq);
        }
        Ok(())
    }

    fn apply_unread(&self, uid: &str, mut conversation: Conversation, unread: u32, message_seq: u32) {
        let mut modified = false;
        if conversation.unread_count != unread {
            conversation.unread_count = unread;
            modified = true;
        }
        if message_seq > 0 && conversation.offset_msg_seq != message_seq {
            conversation.offset_msg_seq = message_seq;
            modified = true;
        }
        if modified {
            conversation.version = self.next_version(conversation.version);
            self.cache.put(uid, conversation);
            self.set_need_save(uid);
        }
    }

    /// 写入缓存并标脏，版本随之递增 / Cache the record, mark dirty, bump the version
    pub fn add_or_update_conversation(&self, uid: &str, mut conversation: Conversation) {
        conversation.version = self.next_version(conversation.version);
        self.cache.put(uid, conversation);
        self.set_need_save(uid);
    }

    /// 从缓存与存储同时删除 / Remove from both cache and store
    pub fn delete_conversation(&self, uids: &[String], channel_id: &str, channel_type: u8) {
        for uid in uids {
            self.cache.remove(uid, channel_id, channel_type);
            if let Err(e) = self.store.delete_conversation(uid, channel_id, channel_type) {
                error!(error = %e, uid, channel_id, channel_type, "failed to delete conversation from store");
            }
        }
    }

    /// 同步刷盘全部脏用户 / Synchronously flush every dirty uid
    pub fn flush_conversations(&self) {
        let uids = self.take_dirty(None);
        self.flush_uids(uids);
    }

    fn flush_partition(&self, partition: usize) {
        let uids = self.take_dirty(Some(partition));
        self.flush_uids(uids);
    }

    /// 摘取脏集合快照；先摘除再落库，落库失败重新标脏，保证不丢更新
    /// Take a dirty-set snapshot; the bit is removed before the write and
    /// restored on failure so updates are never lost
    fn take_dirty(&self, partition: Option<usize>) -> Vec<String> {
        let mut need_save = self.need_save.lock();
        match partition {
            None => need_save.drain().collect(),
            Some(idx) => {
                let picked: Vec<String> = need_save
                    .iter()
                    .filter(|uid| hash_uid(uid) as usize % self.opts.flush_workers == idx)
                    .cloned()
                    .collect();
                for uid in &picked {
                    need_save.remove(uid);
                }
                picked
            }
        }
    }

    fn flush_uids(&self, uids: Vec<String>) {
        if uids.is_empty() {
            return;
        }
        debug!(count = uids.len(), "saving conversations");
        for uid in uids {
            self.flush_user_conversations(&uid);
        }
    }

    fn flush_user_conversations(&self, uid: &str) {
        let conversations = self.cache.list_for_user(uid);
        if conversations.is_empty() {
            return;
        }
        if let Err(e) = self
            .store
            .add_or_update_conversations(uid, conversations.clone())
        {
            warn!(error = %e, uid, "failed to store conversation data");
            self.need_save.lock().insert(uid.to_string());
            return;
        }
        // 落库成功后移除已过期的缓存 / Drop expired cache entries after a successful write
        let now_secs = self.clock.now_millis() / 1000;
        let expire_secs = self.opts.cache_expire.as_secs() as i64;
        for conversation in conversations {
            if conversation.timestamp / 1000 + expire_secs < now_secs {
                self.cache
                    .remove(uid, &conversation.channel_id, conversation.channel_type);
            }
        }
    }

    fn set_need_save(&self, uid: &str) {
        self.need_save.lock().insert(uid.to_string());
        let partition = hash_uid(uid) as usize % self.flush_signal_txs.len();
        // 通道已满说明刷盘协程即将醒来，信号可丢弃
        // A full channel means the flusher is about to wake, the signal is droppable
        let _ = self.flush_signal_txs[partition].try_send(());
    }

    fn next_version(&self, prev: i64) -> i64 {
        self.clock.now_millis().max(prev + 1)
    }

    /// 过期清扫，由定时任务每天触发 / Expiry sweep, fired daily by the scheduler
    pub fn expire_sweep(&self) {
        let removed = self
            .cache
            .remove_expired(self.clock.now_millis(), self.opts.cache_expire.as_secs());
        if removed > 0 {
            info!(removed, "expired conversations evicted");
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn dirty_len(&self) -> usize {
        self.need_save.lock().len()
    }
}

fn channel_in_larges(channel_id: &str, channel_type: u8, larges: &[Channel]) -> bool {
    larges
        .iter()
        .any(|c| c.channel_id == channel_id && c.channel_type == channel_type)
}
