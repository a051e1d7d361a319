// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! A thread-safe single-argument signal with drop-to-disconnect connections.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;

type Slot<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T: ?Sized> {
    next_id: AtomicU64,
    slots: Mutex<Vec<(u64, Slot<T>)>>,
}

/// Signal delivering `&T` to every connected slot, in connection order.
///
/// Emission iterates over a snapshot of the slots, so slots may connect or
/// disconnect (including themselves) while the signal is being emitted.
pub struct Signal<T: ?Sized> {
    inner: Arc<Slots<T>>,
}

impl<T: ?Sized + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> Signal<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Slots {
                next_id: AtomicU64::new(1),
                slots: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn connect<F>(&self, slot: F) -> Connection
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots.lock().push((id, Arc::new(slot)));

        let weak: Weak<Slots<T>> = Arc::downgrade(&self.inner);
        Connection {
            disconnect: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.slots.lock().retain(|(slot_id, _)| *slot_id != id);
                }
            })),
        }
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Slot<T>> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|(_, slot)| slot.clone())
            .collect();

        for slot in snapshot {
            slot(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Live connection to a [`Signal`]. Disconnects on drop.
pub struct Connection {
    disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl Connection {
    pub fn disconnect(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn drop_disconnects() {
        let signal: Signal<u32> = Signal::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t = total.clone();
        let connection = signal.connect(move |v| {
            t.fetch_add(*v as usize, Ordering::SeqCst);
        });
        assert_eq!(signal.len(), 1);

        signal.emit(&5);
        drop(connection);
        signal.emit(&7);

        assert_eq!(total.load(Ordering::SeqCst), 5);
        assert!(signal.is_empty());
    }

    #[test]
    fn slots_may_disconnect_during_emit() {
        let signal: Arc<Signal<()>> = Arc::new(Signal::new());
        let held = Arc::new(Mutex::new(None::<Connection>));
        let calls = Arc::new(AtomicUsize::new(0));

        let h = held.clone();
        let c = calls.clone();
        *held.lock() = Some(signal.connect(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            h.lock().take();
        }));

        signal.emit(&());
        signal.emit(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_outliving_signal_is_harmless() {
        let signal: Signal<u8> = Signal::new();
        let connection = signal.connect(|_| {});
        drop(signal);
        connection.disconnect();
    }
}
