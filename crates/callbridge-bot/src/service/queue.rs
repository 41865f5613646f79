use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use callbridge_core::types::ChatId;
use tokio::sync::mpsc;

/// Handles the jobs of one chat, one at a time.
#[async_trait]
pub trait ChatWorker<T: Send + 'static>: Send + Sync + 'static {
    async fn run(&self, chat_id: ChatId, job: T);
}

/// Per-chat FIFO queues. Jobs of one chat run sequentially in the order
/// they were pushed; different chats run concurrently.
pub struct ChatQueues<T, W> {
    senders: Mutex<HashMap<ChatId, mpsc::UnboundedSender<T>>>,
    worker: Arc<W>,
    _job: PhantomData<fn(T)>,
}

impl<T: Send + 'static, W: ChatWorker<T>> ChatQueues<T, W> {
    pub fn new(worker: Arc<W>) -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            worker,
            _job: PhantomData,
        }
    }

    /// Enqueue without waiting. Must be called inside a tokio runtime.
    pub fn push(&self, chat_id: ChatId, job: T) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = senders
            .entry(chat_id)
            .or_insert_with(|| self.spawn_worker(chat_id));

        // A worker that died mid-job drops its receiver; start a fresh one.
        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            tracing::warn!(chat_id, "[session] chat worker gone, restarting");
            let fresh = self.spawn_worker(chat_id);
            if fresh.send(job).is_ok() {
                senders.insert(chat_id, fresh);
            }
        }
    }

    fn spawn_worker(&self, chat_id: ChatId) -> mpsc::UnboundedSender<T> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = Arc::clone(&self.worker);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                worker.run(chat_id, job).await;
            }
        });
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        done: mpsc::UnboundedSender<(ChatId, u64)>,
    }

    #[async_trait]
    impl ChatWorker<u64> for Recorder {
        async fn run(&self, chat_id: ChatId, job: u64) {
            // Earlier jobs take longer.
            tokio::time::sleep(Duration::from_millis(30 - job * 10)).await;
            let _ = self.done.send((chat_id, job));
        }
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<(ChatId, u64)>, n: usize) -> Vec<(ChatId, u64)> {
        let mut out = Vec::new();
        for _ in 0..n {
            let item = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_same_chat_keeps_push_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queues = ChatQueues::new(Arc::new(Recorder { done: tx }));

        for job in 0..3 {
            queues.push(7, job);
        }
        assert_eq!(collect(&mut rx, 3).await, vec![(7, 0), (7, 1), (7, 2)]);
    }

    #[tokio::test]
    async fn test_other_chats_run_alongside() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queues = ChatQueues::new(Arc::new(Recorder { done: tx }));

        queues.push(1, 0);
        queues.push(2, 2);
        // Chat 2's short job finishes before chat 1's long one.
        assert_eq!(collect(&mut rx, 2).await, vec![(2, 2), (1, 0)]);
    }
}
