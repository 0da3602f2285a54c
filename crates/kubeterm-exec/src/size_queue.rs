//! Single-slot handoff of terminal resizes to the remote transport

use tokio::sync::mpsc;

use kubeterm_types::TerminalSize;

/// Create a linked resize sender and size queue.
///
/// `initial` is yielded by the queue before anything offered through the
/// sender and does not occupy the pending slot.
pub fn resize_channel(initial: Option<TerminalSize>) -> (ResizeSender, TerminalSizeQueue) {
    let (tx, rx) = mpsc::channel(1);
    (ResizeSender { tx }, TerminalSizeQueue { initial, rx })
}

/// Input side of the queue. Offers never block.
#[derive(Clone, Debug)]
pub struct ResizeSender {
    tx: mpsc::Sender<TerminalSize>,
}

impl ResizeSender {
    /// Place `size` in the pending slot. Returns `false` (and drops `size`)
    /// if the previous resize has not been consumed yet or the queue is gone.
    pub fn offer(&self, size: TerminalSize) -> bool {
        self.tx.try_send(size).is_ok()
    }
}

/// Pulled by the remote transport whenever it can apply a new size
#[derive(Debug)]
pub struct TerminalSizeQueue {
    initial: Option<TerminalSize>,
    rx: mpsc::Receiver<TerminalSize>,
}

impl TerminalSizeQueue {
    /// Wait for the next size. `None` means every sender is gone and no
    /// more resizes will arrive.
    pub async fn next(&mut self) -> Option<TerminalSize> {
        if let Some(size) = self.initial.take() {
            return Some(size);
        }
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_initial_size_first() {
        let (tx, mut queue) = resize_channel(Some(TerminalSize::default()));
        assert!(tx.offer(TerminalSize::new(40, 100)));

        assert_eq!(queue.next().await, Some(TerminalSize::new(30, 120)));
        assert_eq!(queue.next().await, Some(TerminalSize::new(40, 100)));
    }

    #[tokio::test]
    async fn test_overflow_drops_newest() {
        let (tx, mut queue) = resize_channel(None);
        let r1 = TerminalSize::new(24, 80);
        let r2 = TerminalSize::new(50, 200);
        let r3 = TerminalSize::new(60, 220);

        assert!(tx.offer(r1));
        assert!(!tx.offer(r2));
        assert_eq!(queue.next().await, Some(r1));

        assert!(tx.offer(r3));
        assert_eq!(queue.next().await, Some(r3));
    }

    #[tokio::test]
    async fn test_next_blocks_until_offer() {
        let (tx, mut queue) = resize_channel(None);
        assert!(
            timeout(Duration::from_millis(50), queue.next())
                .await
                .is_err()
        );

        let handle = tokio::spawn(async move { queue.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(tx.offer(TerminalSize::new(10, 20)));

        let size = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(size, Some(TerminalSize::new(10, 20)));
    }

    #[tokio::test]
    async fn test_closed_sender_ends_queue() {
        let (tx, mut queue) = resize_channel(Some(TerminalSize::default()));
        drop(tx);

        assert_eq!(queue.next().await, Some(TerminalSize::default()));
        assert_eq!(queue.next().await, None);
    }

    #[test]
    fn test_offer_after_queue_dropped() {
        let (tx, queue) = resize_channel(None);
        drop(queue);
        assert!(!tx.offer(TerminalSize::new(1, 1)));
    }
}
