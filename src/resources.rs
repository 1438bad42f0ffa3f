//! LIFO resource cleanup, mirroring the original dev server's
//! `resource_manager`: register resources as they're acquired, tear them
//! down in reverse order exactly once, swallowing individual failures so
//! one broken cleanup never blocks the rest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type CleanupFn = Box<dyn FnOnce() -> Result<(), String> + Send>;

struct Entry {
    name: &'static str,
    cleanup: CleanupFn,
}

pub struct ResourceManager {
    stack: Mutex<Vec<Entry>>,
    cleaned: AtomicBool,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
            cleaned: AtomicBool::new(false),
        }
    }

    /// Registers a resource for cleanup. `cleanup` runs at most once, in
    /// reverse registration order, the first time `cleanup_all` is called.
    pub fn register(&self, name: &'static str, cleanup: impl FnOnce() -> Result<(), String> + Send + 'static) {
        self.stack.lock().unwrap().push(Entry {
            name,
            cleanup: Box::new(cleanup),
        });
    }

    /// Tears down every registered resource in LIFO order. Safe to call
    /// more than once; only the first call does anything.
    pub fn cleanup_all(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries = {
            let mut stack = self.stack.lock().unwrap();
            std::mem::take(&mut *stack)
        };

        for entry in entries.into_iter().rev() {
            if let Err(err) = (entry.cleanup)() {
                eprintln!("[hotsite] cleanup of '{}' failed: {err}", entry.name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.stack.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn cleanup_runs_in_reverse_registration_order() {
        let manager = ResourceManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            manager.register(name, move || {
                order.lock().unwrap().push(name);
                Ok(())
            });
        }

        manager.cleanup_all();
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let manager = ResourceManager::new();
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        manager.register("res", move || {
            *count_clone.lock().unwrap() += 1;
            Ok(())
        });

        manager.cleanup_all();
        manager.cleanup_all();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn one_failing_cleanup_does_not_block_the_rest() {
        let manager = ResourceManager::new();
        let ran = Arc::new(Mutex::new(Vec::new()));

        let ran_a = ran.clone();
        manager.register("a", move || {
            ran_a.lock().unwrap().push("a");
            Err("boom".to_string())
        });
        let ran_b = ran.clone();
        manager.register("b", move || {
            ran_b.lock().unwrap().push("b");
            Ok(())
        });

        manager.cleanup_all();
        assert_eq!(*ran.lock().unwrap(), vec!["b", "a"]);
    }
}
