use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide "ready to receive traffic" flag.
///
/// Observers get a `watch::Receiver` and see only transitions; setting the switch to
/// its current value notifies nobody.
#[derive(Clone)]
pub struct ReadinessSwitch {
    state: Arc<watch::Sender<bool>>,
}

impl ReadinessSwitch {
    pub fn new(initial: bool) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn is_on(&self) -> bool {
        *self.state.borrow()
    }

    /// Returns true when the value actually changed.
    pub fn set(&self, on: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == on {
                false
            } else {
                *current = on;
                true
            }
        });
        if changed {
            tracing::info!("Readiness switched {}", if on { "on" } else { "off" });
        }
        changed
    }

    pub fn turn_on(&self) -> bool {
        self.set(true)
    }

    pub fn turn_off(&self) -> bool {
        self.set(false)
    }

    /// The current value counts as already seen.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ReadinessSwitch {
    fn default() -> Self {
        Self::new(false)
    }
}
