use std::cell::Cell;

/// A derived value stored alongside its validity. The value is recomputed on the next read after
/// [`Memo::invalidate`] was called.
pub struct Memo<T: Copy> {
    value: Cell<Option<T>>,
}

impl<T: Copy> Memo<T> {
    pub fn new() -> Self {
        Self {
            value: Cell::new(None),
        }
    }

    /// Mark the stored value as stale.
    pub fn invalidate(&self) {
        self.value.replace(None);
    }

    pub fn is_valid(&self) -> bool {
        self.value.get().is_some()
    }

    /// Return the stored value, computing it with `f` first if it is stale.
    pub fn get_or(&self, f: impl FnOnce() -> T) -> T {
        if let Some(value) = self.value.get() {
            return value;
        }
        let value = f();
        self.value.replace(Some(value));
        value
    }
}

impl<T: Copy> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}
