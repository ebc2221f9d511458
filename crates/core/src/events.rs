use tokio::sync::watch;

/// Tagged state of a one-shot event. An event is meant to trigger exactly
/// one reaction: once the consumer acknowledges it, the slot returns to
/// `Idle` and later subscribers see nothing pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OneShot<T> {
    #[default]
    Idle,
    Pending(T),
}

impl<T> OneShot<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, OneShot::Pending(_))
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            OneShot::Pending(payload) => Some(payload),
            OneShot::Idle => None,
        }
    }
}

/// A watch-backed slot holding at most one pending event.
#[derive(Debug)]
pub struct EventSlot<T> {
    tx: watch::Sender<OneShot<T>>,
    rx: watch::Receiver<OneShot<T>>,
}

impl<T: Clone> EventSlot<T> {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(OneShot::Idle);
        Self { tx, rx }
    }

    pub fn publish(&self, payload: T) {
        let _ = self.tx.send(OneShot::Pending(payload));
    }

    /// Return the slot to neutral. Watchers are only notified if an event
    /// was actually pending, so an idle acknowledge never re-fires.
    pub fn reset(&self) {
        self.tx.send_if_modified(|slot| {
            if slot.is_pending() {
                *slot = OneShot::Idle;
                true
            } else {
                false
            }
        });
    }

    pub fn get(&self) -> OneShot<T> {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<OneShot<T>> {
        self.rx.clone()
    }
}

impl<T: Clone> Default for EventSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
