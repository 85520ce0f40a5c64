//! Settle timer for bursts of newly discovered peers.
//!
//! When a node joins a LAN, every other node answers its broadcast at almost
//! the same moment.  Notifying the application after each answer would cause
//! a storm of callbacks.  Instead, each new peer (re)arms one timer; the settle
//! action runs only when the timer expires with no further arrivals.
//!
//! ```text
//! arrivals:   x  x   x               x
//! timer:      |--|---|-------->      |-------->
//! settle:                     ^                ^
//! ```
//!
//! There is exactly one timer per running server: an arrival *resets* it and
//! never schedules a second, independent one.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// Runs `on_settle` once after every quiet period of `window` that follows
/// at least one event on `events`.
///
/// Returns when the sender side of `events` is dropped.  A burst still waiting
/// for its quiet period at that moment is discarded.
pub(crate) async fn run_debounced<F, Fut>(
    window: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
    mut on_settle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while events.recv().await.is_some() {
        let settle = time::sleep(window);
        tokio::pin!(settle);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(()) => settle.as_mut().reset(Instant::now() + window),
                    None => return,
                },
                () = &mut settle => break,
            }
        }

        on_settle().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_millis(500);

    fn spawn_counter(
        events: mpsc::UnboundedReceiver<()>,
    ) -> (Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = tokio::spawn(run_debounced(WINDOW, events, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        (fired, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_event_fires_once_after_window() {
        // Arrange
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, _handle) = spawn_counter(rx);

        // Act
        tx.send(()).unwrap();
        time::sleep(WINDOW - Duration::from_millis(10)).await;
        let before = fired.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(20)).await;

        // Assert
        assert_eq!(before, 0, "must not fire before the window elapses");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_settle() {
        // Arrange
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, _handle) = spawn_counter(rx);

        // Act: five events, each arriving before the previous window expires
        for _ in 0..5 {
            tx.send(()).unwrap();
            time::sleep(Duration::from_millis(300)).await;
        }
        time::sleep(WINDOW * 2).await;

        // Assert
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_arrival_resets_the_timer() {
        // Arrange
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, _handle) = spawn_counter(rx);

        // Act: second event at 400ms pushes the deadline to 900ms
        tx.send(()).unwrap();
        time::sleep(Duration::from_millis(400)).await;
        tx.send(()).unwrap();
        time::sleep(Duration::from_millis(400)).await;
        let at_800ms = fired.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(200)).await;

        // Assert
        assert_eq!(at_800ms, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, _handle) = spawn_counter(rx);

        tx.send(()).unwrap();
        time::sleep(WINDOW * 2).await;
        tx.send(()).unwrap();
        time::sleep(WINDOW * 2).await;

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_when_sender_dropped_without_firing_pending_burst() {
        // Arrange
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired, handle) = spawn_counter(rx);

        // Act
        tx.send(()).unwrap();
        drop(tx);
        handle.await.unwrap();

        // Assert
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
