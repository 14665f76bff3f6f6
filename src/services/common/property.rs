use std::fmt::Debug;

use futures::stream::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A reactive value cell that can be watched for changes.
///
/// The activation core owns the writing side; bus adapters and clients read
/// snapshots or follow the stream. Each watcher gets the current value
/// immediately when subscribing.
#[derive(Clone)]
pub struct Property<T: Clone + Send + Sync + 'static> {
    tx: watch::Sender<T>,
    rx: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// Create a new property with an initial value.
    pub fn new(initial: T) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self { tx, rx }
    }

    /// Set a new value and notify all watchers if it differs from the current one.
    pub(crate) fn set(&self, new_value: T)
    where
        T: PartialEq,
    {
        self.tx.send_if_modified(|current| {
            if *current != new_value {
                *current = new_value;
                true
            } else {
                false
            }
        });
    }

    /// Mutate the value in place. Watchers are notified only when the closure
    /// reports a modification.
    pub(crate) fn update(&self, modify: impl FnOnce(&mut T) -> bool) {
        self.tx.send_if_modified(modify);
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Watch for changes to this property.
    ///
    /// The stream immediately yields the current value, then yields
    /// whenever the value changes.
    pub fn watch(&self) -> impl Stream<Item = T> + Send + use<T> {
        WatchStream::new(self.rx.clone())
    }
}

impl<T: Clone + Send + Sync + Debug + 'static> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn watch_yields_current_then_changes() {
        let prop = Property::new(1u32);
        let mut stream = Box::pin(prop.watch());

        assert_eq!(stream.next().await, Some(1));

        prop.set(1);
        prop.set(2);
        assert_eq!(stream.next().await, Some(2));
    }

    #[test]
    fn update_without_modification_keeps_value() {
        let prop = Property::new(vec![1u32]);
        prop.update(|_| false);
        prop.update(|v| {
            v.push(2);
            true
        });
        assert_eq!(prop.get(), vec![1, 2]);
    }
}
