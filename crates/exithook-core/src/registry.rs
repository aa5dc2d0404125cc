//! Fixed-capacity exit callback registries.
//!
//! Callbacks are stored in registration order from the lowest slot upward
//! and fired from the highest occupied slot downward, so the last callback
//! registered runs first. A slot is emptied before its callback runs; a second
//! drain finds nothing left to fire.

use crate::config::{ATEXIT_MAX, ONEXIT_MAX};
use crate::error::RegistryFull;

/// Zero-argument exit callback.
pub type AtExitFn = Box<dyn FnOnce() + Send>;

/// Exit callback receiving `(status, arg)`.
pub type OnExitFn = Box<dyn FnOnce(i32, usize) + Send>;

/// Registry of `atexit`-style callbacks.
pub type AtExitRegistry = CallbackRegistry<AtExitFn, ATEXIT_MAX>;

/// Registry of `on_exit`-style callbacks with their stored argument.
pub type OnExitRegistry = CallbackRegistry<(OnExitFn, usize), ONEXIT_MAX>;

/// Inline array of `K` callback slots with explicit occupancy.
pub struct CallbackRegistry<T, const K: usize> {
    slots: [Option<T>; K],
}

impl<T, const K: usize> CallbackRegistry<T, K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        K
    }

    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Store `entry` in the lowest empty slot and return that slot's index.
    pub fn register(&mut self, entry: T) -> Result<usize, RegistryFull> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryFull { capacity: K })?;
        self.slots[index] = Some(entry);
        Ok(index)
    }

    /// Hand every stored entry to `invoke`, highest slot first.
    ///
    /// Each slot is cleared before `invoke` sees its entry. Returns how many
    /// entries were drained.
    pub fn drain_with(&mut self, mut invoke: impl FnMut(T)) -> usize {
        let mut fired = 0;
        for index in (0..K).rev() {
            if let Some(entry) = self.slots[index].take() {
                invoke(entry);
                fired += 1;
            }
        }
        fired
    }
}

impl<const K: usize> CallbackRegistry<AtExitFn, K> {
    /// Fire every registered `atexit` callback once, in reverse registration order.
    pub fn drain_and_invoke(&mut self) -> usize {
        self.drain_with(|func| func())
    }
}

impl<const K: usize> CallbackRegistry<(OnExitFn, usize), K> {
    /// Fire every registered `on_exit` callback once with `status` and its argument.
    pub fn drain_and_invoke(&mut self, status: i32) -> usize {
        self.drain_with(|(func, arg)| func(status, arg))
    }
}

impl<T, const K: usize> Default for CallbackRegistry<T, K> {
    fn default() -> Self {
        Self::new()
    }
}
