use anyhow::Result;
use log::{trace, warn};

type Release<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/**
 * Owned resources released in reverse order of registration.
 *
 * A failing release is logged and does not stop the others. Whatever is
 * still registered when the stack is dropped gets released then. Releases
 * may borrow from their surroundings for `'a`.
 */
#[derive(Default)]
pub struct CleanupStack<'a> {
    entries: Vec<(String, Release<'a>)>,
}

impl<'a> CleanupStack<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, name: impl Into<String>, release: F)
    where
        F: FnOnce() -> Result<()> + 'a,
    {
        let name = name.into();
        trace!("Registered cleanup '{}'", name);
        self.entries.push((name, Box::new(release)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets everything without releasing it.
    pub fn disarm(&mut self) {
        self.entries.clear();
    }

    /// Releases everything, newest first. Returns the failures.
    pub fn release(&mut self) -> Vec<anyhow::Error> {
        let mut failures = Vec::new();
        while let Some((name, release)) = self.entries.pop() {
            trace!("Running cleanup '{}'", name);
            if let Err(e) = release() {
                warn!("Cleanup '{}' failed: {:#}", name, e);
                failures.push(e.context(name));
            }
        }
        failures
    }
}

impl Drop for CleanupStack<'_> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.release();
        }
    }
}
