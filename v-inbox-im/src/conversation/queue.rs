use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::domain::message::Message;

/// 扇出任务：一条消息加它的订阅者列表
/// Fan-out task: one message plus its subscriber list
#[derive(Debug)]
pub struct ConversationTask {
    pub message: Message,
    pub subscribers: Vec<String>,
}

/// 无界多生产者多消费者队列
/// Unbounded multi-producer multi-consumer queue
///
/// 生产者从不阻塞；消费者共享接收端，逐个弹出。`wait` 在停机时等待在途任务清空。
/// Producers never block; consumers share the receiver and pop one at a time.
/// `wait` drains outstanding tasks at shutdown.
pub struct FanoutQueue {
    tx: mpsc::UnboundedSender<ConversationTask>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ConversationTask>>,
    outstanding: AtomicUsize,
    drained: Notify,
}

impl FanoutQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            outstanding: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    pub fn push(&self, message: Message, subscribers: Vec<String>) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(ConversationTask { message, subscribers }).is_err() {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub async fn pop(&self) -> Option<ConversationTask> {
        self.rx.lock().await.recv().await
    }

    /// 任务处理完毕后由消费者调用 / Called by a consumer once a task is fully processed
    pub fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// 等待所有在途任务处理完成 / Wait until every outstanding task is processed
    pub async fn wait(&self) {
        loop {
            let notified = self.drained.notified();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

impl Default for FanoutQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::CHANNEL_TYPE_GROUP;
    use std::sync::Arc;

    fn message(seq: u32) -> Message {
        Message {
            message_id: seq as i64,
            message_seq: seq,
            client_msg_no: format!("no-{}", seq),
            from_uid: "alice".to_string(),
            channel_id: "g1".to_string(),
            channel_type: CHANNEL_TYPE_GROUP,
            timestamp: 0,
            red_dot: true,
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn pop_preserves_fifo_order() {
        let queue = FanoutQueue::new();
        queue.push(message(1), vec!["bob".to_string()]);
        queue.push(message(2), vec!["bob".to_string()]);
        assert_eq!(queue.pop().await.unwrap().message.message_seq, 1);
        assert_eq!(queue.pop().await.unwrap().message.message_seq, 2);
    }

    #[tokio::test]
    async fn wait_returns_after_drain() {
        let queue = Arc::new(FanoutQueue::new());
        for seq in 0..10 {
            queue.push(message(seq), vec!["bob".to_string()]);
        }
        let consumer = queue.clone();
        tokio::spawn(async move {
            while consumer.outstanding() > 0 {
                if consumer.pop().await.is_some() {
                    consumer.task_done();
                }
            }
        });
        tokio::time::timeout(std::time::Duration::from_secs(5), queue.wait())
            .await
            .expect("queue should drain");
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_empty() {
        let queue = FanoutQueue::new();
        queue.wait().await;
    }
}
