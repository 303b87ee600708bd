use super::channel::{pub_sub, EventConsumer, EventPublisher};
use crossbeam::channel::RecvTimeoutError;
use std::time::Duration;

pub type CancellationMessage = ();

impl EventConsumer<CancellationMessage> {
    /// Checks whether the consumer is cancelled immediately.
    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled_with_timeout(Duration::ZERO)
    }

    /// Checks whether the consumer is cancelled for the given timeout.
    ///
    /// It returns true if the consumer received a cancellation message or the publisher side
    /// was dropped before the timeout elapsed. Otherwise it blocks until the timeout is elapsed
    /// and returns false.
    pub fn is_cancelled_with_timeout(&self, timeout: Duration) -> bool {
        match self.as_ref().recv_timeout(timeout) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// Cancellation token embedded by every lifecycle state.
///
/// The publisher side can be cloned and handed out so a different thread can nudge the state
/// that owns the token. Cancelling a token whose state already finished is a no-op.
pub struct Cancellation {
    publisher: EventPublisher<CancellationMessage>,
    consumer: EventConsumer<CancellationMessage>,
}

impl Default for Cancellation {
    fn default() -> Self {
        let (publisher, consumer) = pub_sub();
        Self {
            publisher,
            consumer,
        }
    }
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns false if nobody is listening anymore.
    pub fn cancel(&self) -> bool {
        self.publisher.publish(()).is_ok()
    }

    pub fn publisher(&self) -> EventPublisher<CancellationMessage> {
        self.publisher.clone()
    }

    /// Splits the token so the consumer side can be moved into a background task.
    pub fn into_parts(
        self,
    ) -> (
        EventPublisher<CancellationMessage>,
        EventConsumer<CancellationMessage>,
    ) {
        (self.publisher, self.consumer)
    }

    pub fn consumer(&self) -> &EventConsumer<CancellationMessage> {
        &self.consumer
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn not_cancelled_consumer_waits_for_timeout() {
        let cancellation = Cancellation::new();
        let start = Instant::now();

        assert!(!cancellation
            .consumer()
            .is_cancelled_with_timeout(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn cancelled_consumer_returns_immediately() {
        let cancellation = Cancellation::new();
        assert!(cancellation.cancel());

        let start = Instant::now();
        assert!(cancellation
            .consumer()
            .is_cancelled_with_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancelling_twice_is_allowed() {
        let cancellation = Cancellation::new();
        assert!(cancellation.cancel());
        assert!(cancellation.cancel());
        assert!(cancellation.consumer().is_cancelled());
    }

    #[test]
    fn cancel_after_consumer_dropped_is_a_noop() {
        let (publisher, consumer) = Cancellation::new().into_parts();
        drop(consumer);

        assert!(publisher.publish(()).is_err());
    }
}
