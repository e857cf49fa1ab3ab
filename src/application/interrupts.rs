//! Interrupt channel (T5 boundary).
//!
//! A delivery-ordered stream of typed signals from the spawning tier.
//! The lifecycle controller drains it between OODA cycles; kill is
//! non-negotiable and handled ahead of everything else.

use tokio::sync::mpsc;

use crate::domain::models::event::{InterruptKind, InterruptSignal};

/// Sending half handed to the boundary tier.
#[derive(Clone)]
pub struct InterruptHandle {
    tx: mpsc::UnboundedSender<InterruptSignal>,
}

impl InterruptHandle {
    pub fn send(&self, kind: InterruptKind) {
        // A closed channel means the agent already reached its final
        // state; late interrupts are no-ops by design.
        let _ = self.tx.send(InterruptSignal::new(kind));
    }
}

/// Receiving half owned by the lifecycle controller.
pub struct InterruptChannel {
    rx: mpsc::UnboundedReceiver<InterruptSignal>,
}

impl InterruptChannel {
    pub fn new() -> (InterruptHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InterruptHandle { tx }, Self { rx })
    }

    /// Drain every signal currently queued, preserving delivery order.
    pub fn drain(&mut self) -> Vec<InterruptSignal> {
        let mut signals = Vec::new();
        while let Ok(signal) = self.rx.try_recv() {
            signals.push(signal);
        }
        signals
    }

    /// Await the next signal; used while parked or panicked.
    pub async fn recv(&mut self) -> Option<InterruptSignal> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_preserves_delivery_order() {
        let (handle, mut channel) = InterruptChannel::new();
        handle.send(InterruptKind::Pause);
        handle.send(InterruptKind::Resume);
        handle.send(InterruptKind::Terminate);

        let drained = channel.drain();
        assert_eq!(drained.len(), 3);
        assert!(matches!(drained[0].kind, InterruptKind::Pause));
        assert!(matches!(drained[1].kind, InterruptKind::Resume));
        assert!(matches!(drained[2].kind, InterruptKind::Terminate));
    }

    #[tokio::test]
    async fn late_sends_after_drop_are_noops() {
        let (handle, channel) = InterruptChannel::new();
        drop(channel);
        handle.send(InterruptKind::Pause);
    }
}
