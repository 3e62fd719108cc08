//! 消息处理调度器
//!
//! Subscribes to the client side of the bus and routes each message to the
//! [`MessageProcessor`] registered for its event type. Infrastructure
//! failures are retried with exponential backoff; business failures travel
//! back to the client inside response payloads and are not retried.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use shared::message::{BusMessage, EventType};

use super::processor::{
    HandshakeProcessor, MessageProcessor, ProcessResult, RequestCommandProcessor, TypingProcessor,
};
use crate::core::state::ServerState;

/// Routes bus messages to their processors
pub struct MessageHandler {
    receiver: broadcast::Receiver<BusMessage>,
    shutdown_token: CancellationToken,
    processors: HashMap<EventType, Arc<dyn MessageProcessor>>,
}

impl MessageHandler {
    pub fn new(receiver: broadcast::Receiver<BusMessage>, shutdown_token: CancellationToken) -> Self {
        Self {
            receiver,
            shutdown_token,
            processors: HashMap::new(),
        }
    }

    /// Register a processor for its event type
    pub fn register_processor(mut self, processor: Arc<dyn MessageProcessor>) -> Self {
        self.processors.insert(processor.event_type(), processor);
        self
    }

    /// Handler with the full server processor set
    pub fn with_default_processors(
        receiver: broadcast::Receiver<BusMessage>,
        shutdown_token: CancellationToken,
        state: Arc<ServerState>,
    ) -> Self {
        Self::new(receiver, shutdown_token)
            .register_processor(Arc::new(HandshakeProcessor::new(state.clone())))
            .register_processor(Arc::new(RequestCommandProcessor::new(state.clone())))
            .register_processor(Arc::new(TypingProcessor::new(state)))
    }

    /// Main loop: route messages until shutdown
    pub async fn run(mut self) {
        tracing::info!(
            processors = self.processors.len(),
            "Message handler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Message handler received shutdown signal");
                    break;
                }

                result = self.receiver.recv() => {
                    match result {
                        Ok(msg) => self.handle_message(msg).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Message handler lagged, {} messages dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Message channel closed, handler exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(&self, msg: BusMessage) {
        match self.processors.get(&msg.event_type) {
            Some(processor) => {
                self.process_with_retry(processor.clone(), &msg).await;
            }
            None => {
                tracing::debug!(
                    event_type = %msg.event_type,
                    request_id = %msg.request_id,
                    "No processor registered for event type, ignoring"
                );
            }
        }
    }

    async fn process_with_retry(&self, processor: Arc<dyn MessageProcessor>, msg: &BusMessage) {
        if processor.is_duplicate(msg) {
            tracing::debug!(request_id = %msg.request_id, "Skipping duplicate message");
            return;
        }

        let max_retries = processor.max_retries();
        let mut retry_count = 0u32;

        loop {
            match processor.process(msg).await {
                Ok(ProcessResult::Success { message }) => {
                    if let Some(note) = message {
                        tracing::debug!(request_id = %msg.request_id, "Processed: {}", note);
                    }
                    return;
                }
                Ok(ProcessResult::Skipped { reason }) => {
                    tracing::debug!(request_id = %msg.request_id, "Skipped: {}", reason);
                    return;
                }
                Ok(ProcessResult::Failed { reason }) => {
                    tracing::error!(
                        request_id = %msg.request_id,
                        event_type = %msg.event_type,
                        "处理失败 (permanent): {}", reason
                    );
                    return;
                }
                Ok(ProcessResult::Retry { reason, .. }) => {
                    retry_count += 1;
                    if retry_count > max_retries {
                        tracing::error!(
                            request_id = %msg.request_id,
                            retries = max_retries,
                            "Giving up after retries: {}", reason
                        );
                        return;
                    }
                    self.backoff(&processor, retry_count, &reason).await;
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > max_retries {
                        tracing::error!(
                            request_id = %msg.request_id,
                            retries = max_retries,
                            "Giving up after retries: {}", e
                        );
                        return;
                    }
                    self.backoff(&processor, retry_count, &e.to_string()).await;
                }
            }
        }
    }

    async fn backoff(&self, processor: &Arc<dyn MessageProcessor>, retry_count: u32, reason: &str) {
        let delay = processor.retry_delay_ms() * 2u64.pow(retry_count - 1);
        tracing::warn!(
            retry = retry_count,
            delay_ms = delay,
            "Processing failed, retrying: {}", reason
        );
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::utils::AppError;
    use shared::message::NotificationPayload;

    struct CountingProcessor {
        calls: Arc<AtomicU32>,
        fail_first: u32,
    }

    #[async_trait]
    impl MessageProcessor for CountingProcessor {
        fn event_type(&self) -> EventType {
            EventType::Notification
        }

        async fn process(&self, _msg: &BusMessage) -> Result<ProcessResult, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Ok(ProcessResult::Retry {
                    reason: "not yet".to_string(),
                    retry_count: call,
                })
            } else {
                Ok(ProcessResult::Success { message: None })
            }
        }

        fn retry_delay_ms(&self) -> u64 {
            1
        }
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_routes_to_registered_processor() {
        let (tx, rx) = broadcast::channel(16);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let handler = MessageHandler::new(rx, token.clone()).register_processor(Arc::new(
            CountingProcessor {
                calls: calls.clone(),
                fail_first: 0,
            },
        ));
        tokio::spawn(handler.run());

        let payload = NotificationPayload::info("Test", "Hello");
        tx.send(BusMessage::notification(&payload).unwrap()).unwrap();

        let calls_check = calls.clone();
        eventually(move || calls_check.load(Ordering::SeqCst) == 1).await;
        token.cancel();
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (tx, rx) = broadcast::channel(16);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let handler = MessageHandler::new(rx, token.clone()).register_processor(Arc::new(
            CountingProcessor {
                calls: calls.clone(),
                fail_first: 2,
            },
        ));
        tokio::spawn(handler.run());

        let payload = NotificationPayload::info("Test", "Hello");
        tx.send(BusMessage::notification(&payload).unwrap()).unwrap();

        // two retries then success = three calls total
        let calls_check = calls.clone();
        eventually(move || calls_check.load(Ordering::SeqCst) == 3).await;
        token.cancel();
    }

    #[tokio::test]
    async fn test_unregistered_event_type_is_ignored() {
        let (tx, rx) = broadcast::channel(16);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let handler = MessageHandler::new(rx, token.clone()).register_processor(Arc::new(
            CountingProcessor {
                calls: calls.clone(),
                fail_first: 0,
            },
        ));
        tokio::spawn(handler.run());

        // Typing has no processor registered here
        let payload = shared::message::TypingPayload {
            thread_id: "t".to_string(),
            typing_user_id: "u".to_string(),
            typing_user_name: "U".to_string(),
            is_typing: true,
        };
        tx.send(BusMessage::typing(&payload).unwrap()).unwrap();

        let payload = NotificationPayload::info("Test", "Hello");
        tx.send(BusMessage::notification(&payload).unwrap()).unwrap();

        // the notification is processed, the typing message was skipped
        let calls_check = calls.clone();
        eventually(move || calls_check.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        token.cancel();
    }
}
