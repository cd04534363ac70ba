use tokio::sync::watch;

/// Owner of the unread badge value.
///
/// Two independent update paths: [`commit_refresh`](Self::commit_refresh)
/// replaces the value with the server's count, [`apply_delta`](Self::apply_delta)
/// adjusts it after a confirmed mutation. Every change is published on a
/// `watch` channel; the header badge holds a receiver from
/// [`subscribe`](Self::subscribe) instead of reading shared global state.
#[derive(Debug)]
pub struct CounterReconciler {
    value: u64,
    generation: u64,
    pending: Option<u64>,
    tx: watch::Sender<u64>,
}

impl Default for CounterReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterReconciler {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            value: 0,
            generation: 0,
            pending: None,
            tx,
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a refresh; returns the generation its completion must carry.
    pub fn begin_refresh(&mut self) -> u64 {
        self.generation += 1;
        self.pending = Some(self.generation);
        self.generation
    }

    /// Replace the value with the server count. Stale generations are ignored.
    pub fn commit_refresh(&mut self, generation: u64, count: u64) -> bool {
        if self.pending != Some(generation) {
            tracing::debug!(
                generation,
                latest = self.generation,
                "Ignoring stale unread count (generation mismatch)"
            );
            return false;
        }
        self.pending = None;
        if count != self.value {
            tracing::debug!(from = self.value, to = count, "Unread count refreshed");
        }
        self.publish(count);
        true
    }

    /// A refresh failed; the current value stands.
    pub fn fail_refresh(&mut self, generation: u64) -> bool {
        if self.pending != Some(generation) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Add `delta`, clamped at zero. Returns the new value.
    pub fn apply_delta(&mut self, delta: i64) -> u64 {
        let next = if delta.is_negative() {
            self.value.saturating_sub(delta.unsigned_abs())
        } else {
            self.value.saturating_add(delta as u64)
        };
        if delta != 0 {
            self.publish(next);
        }
        next
    }

    /// Drop any in-flight refresh (blur, unmount).
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    /// Sign-out: forget the in-flight refresh and zero the badge.
    pub fn reset(&mut self) {
        self.invalidate();
        self.publish(0);
    }

    fn publish(&mut self, value: u64) {
        self.value = value;
        self.tx.send_replace(value);
    }
}
