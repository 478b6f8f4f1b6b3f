//! Runtime controls shared with pass execute callbacks.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

/// A value read by reference every frame.
///
/// Pass setup captures a clone of the control in its pass data; the owner
/// (configuration UI, input handling, tests) keeps another clone and writes
/// to it. Execute callbacks read the current value each frame, so changing a
/// control never requires recompiling the graph.
///
/// ```
/// use frame_graph::Control;
///
/// let intensity = Control::new(0.5_f32);
/// let captured = intensity.clone();
/// intensity.set(0.8);
/// assert_eq!(captured.get(), 0.8);
/// ```
pub struct Control<T> {
    value: Arc<RwLock<T>>,
}

impl<T> Control<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
    }

    /// Modify the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.write());
    }

    /// Borrow the current value.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read()
    }
}

impl<T: Clone> Control<T> {
    /// Copy out the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T> Clone for Control<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: Default> Default for Control<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Control<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Control").field(&*self.value.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct BloomSettings {
        enabled: bool,
        intensity: f32,
    }

    #[test]
    fn test_clones_share_value() {
        let control = Control::new(BloomSettings::default());
        let captured = control.clone();

        control.update(|s| {
            s.enabled = true;
            s.intensity = 2.0;
        });

        assert_eq!(
            captured.get(),
            BloomSettings {
                enabled: true,
                intensity: 2.0
            }
        );
        assert!(captured.read().enabled);
    }

    #[test]
    fn test_readable_across_threads() {
        let control = Control::new(1u32);
        let reader = control.clone();
        control.set(7);
        let seen = std::thread::spawn(move || reader.get()).join().unwrap();
        assert_eq!(seen, 7);
    }
}
