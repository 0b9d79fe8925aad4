/// A list of listeners for one kind of event.
///
/// Listeners are called synchronously, on the thread that calls
/// [`Observers::notify`]. Any number may be registered; callers must not rely
/// on the order in which different listeners run.
pub struct Observers<T: ?Sized> {
    listeners: Vec<Box<dyn FnMut(&T) + Send>>,
}

impl<T: ?Sized> Observers<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&T) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn notify(&mut self, value: &T) {
        for listener in &mut self.listeners {
            listener(value);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_notify_reaches_every_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observers: Observers<[u32]> = Observers::new();
        for tag in 0..3u32 {
            let seen = Arc::clone(&seen);
            observers.subscribe(move |values: &[u32]| {
                seen.lock().unwrap().push((tag, values.len()));
            });
        }
        observers.notify(&[1, 2]);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![(0, 2), (1, 2), (2, 2)]);
        assert_eq!(observers.len(), 3);
    }

    #[test]
    fn test_no_listeners_is_fine() {
        let mut observers: Observers<u32> = Observers::default();
        assert!(observers.is_empty());
        observers.notify(&7);
    }
}
