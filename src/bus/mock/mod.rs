//! Mock producer for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, Producer, Result};

/// A record captured by [`MockProducer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Mock producer for testing.
#[derive(Default)]
pub struct MockProducer {
    sent: RwLock<Vec<SentMessage>>,
    fail_on_send: RwLock<bool>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_send(&self, fail: bool) {
        *self.fail_on_send.write().await = fail;
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.read().await.clone()
    }

    pub async fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.sent.write().await)
    }
}

#[async_trait]
impl Producer for MockProducer {
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()> {
        if *self.fail_on_send.read().await {
            return Err(BusError::BrokerUnavailable("Mock send failure".to_string()));
        }
        self.sent.write().await.push(SentMessage {
            topic: topic.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }
}
