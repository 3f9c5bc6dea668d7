//! Deferred event delivery.
//!
//! Events produced during startup would race the host's own initialization,
//! so the worker queues them until the host is marked loaded and a recurring
//! timer drains the backlog. Once loaded, events bypass the queue entirely.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use icasync_core::IcaEvent;

/// Default drain interval.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(60);

/// Receiver of domain events.
///
/// Production wires this to the host's event bus; tests use an in-memory
/// vector.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Must not block.
    fn emit(&self, event: IcaEvent);
}

/// Queues and delivers events around the host's startup window.
pub struct BackgroundWorker {
    sink: Arc<dyn EventSink>,
    queue: Mutex<VecDeque<IcaEvent>>,
    loaded: AtomicBool,
    shutdown: AtomicBool,
    send_interval: Duration,
}

impl BackgroundWorker {
    /// Creates a worker with the default drain interval.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_interval(sink, DEFAULT_SEND_INTERVAL)
    }

    /// Creates a worker with a custom drain interval.
    pub fn with_interval(sink: Arc<dyn EventSink>, send_interval: Duration) -> Self {
        Self {
            sink,
            queue: Mutex::new(VecDeque::new()),
            loaded: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            send_interval,
        }
    }

    /// Spawns the recurring drain timer.
    ///
    /// The timer rearms after each drain only while the worker has not been
    /// shut down; `shutdown()` performs the final flush itself.
    pub fn spawn_drain_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(worker.send_interval).await;
                if worker.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                worker.drain();
            }
        })
    }

    /// Marks the host as fully loaded; later events skip the queue.
    pub fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::SeqCst);
    }

    /// Delivers an event immediately when loaded, otherwise queues it.
    pub fn fire_or_queue_event(&self, event: IcaEvent) {
        if self.loaded.load(Ordering::SeqCst) {
            info!(event_type = %event.event_type, "Firing event");
            self.sink.emit(event);
        } else {
            debug!(event_type = %event.event_type, "Queuing event");
            if let Ok(mut queue) = self.queue.lock() {
                queue.push_back(event);
            }
        }
    }

    /// Queues an event for the next drain regardless of the loaded state.
    pub fn queue_event(&self, event: IcaEvent) {
        debug!(event_type = %event.event_type, "Queuing event");
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(event);
        }
    }

    /// Delivers every queued event in FIFO order.
    pub fn drain(&self) {
        let pending: Vec<IcaEvent> = match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => return,
        };
        for event in pending {
            info!(event_type = %event.event_type, "Firing queued event");
            self.sink.emit(event);
        }
    }

    /// Stops the timer from rearming and flushes the queue unconditionally.
    pub fn shutdown(&self) {
        debug!("Worker shutting down, flushing queue");
        self.shutdown.store(true, Ordering::SeqCst);
        self.drain();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        events: Mutex<Vec<IcaEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn recorded(&self) -> Vec<IcaEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: IcaEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn event(n: usize) -> IcaEvent {
        IcaEvent::products_changed("acc-1", &[format!("ean-{n}")])
    }

    #[tokio::test]
    async fn test_events_queue_until_loaded_then_fire_directly() {
        let sink = RecordingSink::new();
        let worker = BackgroundWorker::new(sink.clone() as Arc<dyn EventSink>);

        worker.fire_or_queue_event(event(1));
        worker.fire_or_queue_event(event(2));
        assert!(sink.recorded().is_empty());

        worker.mark_loaded();
        worker.fire_or_queue_event(event(3));
        // The direct event arrives first; the backlog waits for a drain.
        assert_eq!(sink.recorded().len(), 1);

        worker.drain();
        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 3);
        // Queued events keep their order.
        assert_eq!(recorded[1].payload["eans"][0].as_str(), Some("ean-1"));
        assert_eq!(recorded[2].payload["eans"][0].as_str(), Some("ean-2"));
    }

    #[tokio::test]
    async fn test_timer_drains_backlog() {
        let sink = RecordingSink::new();
        let worker = Arc::new(BackgroundWorker::with_interval(
            sink.clone() as Arc<dyn EventSink>,
            Duration::from_millis(10),
        ));
        let handle = worker.spawn_drain_timer();

        worker.queue_event(event(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.recorded().len(), 1);

        worker.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_stops_rearm() {
        let sink = RecordingSink::new();
        let worker = Arc::new(BackgroundWorker::with_interval(
            sink.clone() as Arc<dyn EventSink>,
            Duration::from_millis(10),
        ));
        let handle = worker.spawn_drain_timer();

        worker.queue_event(event(1));
        worker.shutdown();
        assert_eq!(sink.recorded().len(), 1);

        // After shutdown the timer is gone; nothing drains this one.
        worker.queue_event(event(2));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.recorded().len(), 1);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_duplicate_emission() {
        let sink = RecordingSink::new();
        let worker = BackgroundWorker::new(sink.clone() as Arc<dyn EventSink>);

        worker.queue_event(event(1));
        worker.drain();
        worker.drain();
        worker.shutdown();
        assert_eq!(sink.recorded().len(), 1);
    }
}
