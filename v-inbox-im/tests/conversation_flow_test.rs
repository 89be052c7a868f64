//! 会话引擎端到端流程测试 / Conversation engine end-to-end flow tests

use std::sync::Arc;
use std::time::Duration;

use v_inbox_im::clock::SystemClock;
use v_inbox_im::conversation::{ConversationManager, ConversationOptions};
use v_inbox_im::domain::channel::{CHANNEL_TYPE_GROUP, CHANNEL_TYPE_PERSON};
use v_inbox_im::domain::message::Message;
use v_inbox_im::storage::{MemoryMessageStore, MessageStore};

fn group_message(seq: u32, from: &str, channel_id: &str, red_dot: bool) -> Message {
    Message {
        message_id: seq as i64,
        message_seq: seq,
        client_msg_no: format!("no-{}", seq),
        from_uid: from.to_string(),
        channel_id: channel_id.to_string(),
        channel_type: CHANNEL_TYPE_GROUP,
        timestamp: 1_000 * seq as i64,
        red_dot,
        payload: serde_json::json!({"text": format!("m{}", seq)}),
    }
}

fn manager_for_test(store: Arc<MemoryMessageStore>) -> Arc<ConversationManager> {
    Arc::new(ConversationManager::new(
        ConversationOptions {
            sync_interval: Duration::from_millis(50),
            sync_once: 4,
            calc_workers: 4,
            flush_workers: 2,
            ..Default::default()
        },
        store,
        Arc::new(SystemClock),
    ))
}

#[tokio::test]
async fn fanout_updates_every_subscriber_and_flushes_on_stop() {
    let store = Arc::new(MemoryMessageStore::new());
    let manager = manager_for_test(store.clone());
    manager.start();

    manager.push_message(group_message(1, "alice", "g1", true), vec![
        "alice".to_string(),
        "bob".to_string(),
        "carol".to_string(),
    ]);
    manager.push_message(group_message(2, "alice", "g1", true), vec![
        "alice".to_string(),
        "bob".to_string(),
    ]);
    manager.stop().await;

    let bob = store
        .get_conversation("bob", "g1", CHANNEL_TYPE_GROUP)
        .unwrap()
        .expect("bob's conversation must be persisted");
    assert_eq!(bob.unread_count, 2);
    assert_eq!(bob.last_msg_seq, 2);

    let alice = store
        .get_conversation("alice", "g1", CHANNEL_TYPE_GROUP)
        .unwrap()
        .expect("alice's conversation must be persisted");
    assert_eq!(alice.unread_count, 0);
    assert_eq!(alice.last_msg_seq, 2);

    let carol = store
        .get_conversation("carol", "g1", CHANNEL_TYPE_GROUP)
        .unwrap()
        .expect("carol's conversation must be persisted");
    assert_eq!(carol.unread_count, 1);
    assert_eq!(carol.last_msg_seq, 1);
}

#[tokio::test]
async fn persisted_record_matches_cache_after_flush() {
    let store = Arc::new(MemoryMessageStore::new());
    let manager = manager_for_test(store.clone());
    manager.start();

    for seq in 1..=10u32 {
        manager.push_message(group_message(seq, "alice", "g1", true), vec!["bob".to_string()]);
    }
    manager.stop().await;

    let cached = manager
        .get_conversation("bob", "g1", CHANNEL_TYPE_GROUP)
        .expect("cached record expected");
    let stored = store
        .get_conversation("bob", "g1", CHANNEL_TYPE_GROUP)
        .unwrap()
        .expect("stored record expected");
    assert_eq!(cached, stored);
    assert_eq!(stored.last_msg_seq, 10);
    assert_eq!(stored.unread_count, 10);
}

#[tokio::test]
async fn personal_message_lands_in_subscriber_view_keyed_by_peer() {
    let store = Arc::new(MemoryMessageStore::new());
    let manager = manager_for_test(store.clone());
    manager.start();

    let message = Message {
        message_id: 1,
        message_seq: 1,
        client_msg_no: "no-1".to_string(),
        from_uid: "alice".to_string(),
        channel_id: "bob".to_string(),
        channel_type: CHANNEL_TYPE_PERSON,
        timestamp: 1_000,
        red_dot: true,
        payload: serde_json::Value::Null,
    };
    manager.push_message(message, vec!["alice".to_string(), "bob".to_string()]);
    manager.stop().await;

    // bob 视角的会话键是 alice，alice 视角的是 bob
    // bob's view is keyed by alice, alice's by bob
    let bob = store
        .get_conversation("bob", "alice", CHANNEL_TYPE_PERSON)
        .unwrap()
        .expect("bob's personal conversation expected");
    assert_eq!(bob.unread_count, 1);
    let alice = store
        .get_conversation("alice", "bob", CHANNEL_TYPE_PERSON)
        .unwrap()
        .expect("alice's personal conversation expected");
    assert_eq!(alice.unread_count, 0);
}

#[tokio::test]
async fn disabled_engine_ignores_pushes() {
    let store = Arc::new(MemoryMessageStore::new());
    let manager = Arc::new(ConversationManager::new(
        ConversationOptions { on: false, ..Default::default() },
        store.clone(),
        Arc::new(SystemClock),
    ));
    manager.start();
    manager.push_message(group_message(1, "alice", "g1", true), vec!["bob".to_string()]);
    manager.stop().await;
    assert_eq!(manager.cache_len(), 0);
    assert!(store.get_conversations("bob").unwrap().is_empty());
}

#[tokio::test]
async fn timer_flush_persists_without_stop() {
    let store = Arc::new(MemoryMessageStore::new());
    let manager = manager_for_test(store.clone());
    manager.start();

    manager.push_message(group_message(1, "alice", "g1", true), vec!["bob".to_string()]);

    // 定时器周期50ms，等若干周期后应已落库
    // With a 50ms flush timer the record should be durable after a few periods
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if store
            .get_conversation("bob", "g1", CHANNEL_TYPE_GROUP)
            .unwrap()
            .is_some()
        {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "flush timer never fired");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    manager.stop().await;
}
