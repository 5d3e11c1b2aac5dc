//! Watch stream events

/// One change observed on a watched kind.
///
/// A (re)list is framed by `RelistStarted` and `RelistDone` with every object
/// currently present delivered as `Listed` in between. Consumers that keep a
/// cache must treat objects missing from a relist as deleted.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    /// Object was created or modified
    Applied(K),
    /// Object was deleted
    Deleted(K),
    /// A full listing is starting (initial sync or reconnect)
    RelistStarted,
    /// Object present in the listing
    Listed(K),
    /// Listing complete
    RelistDone,
}

impl<K> From<kube_runtime::watcher::Event<K>> for WatchEvent<K> {
    fn from(event: kube_runtime::watcher::Event<K>) -> Self {
        use kube_runtime::watcher::Event;
        match event {
            Event::Apply(obj) => Self::Applied(obj),
            Event::Delete(obj) => Self::Deleted(obj),
            Event::Init => Self::RelistStarted,
            Event::InitApply(obj) => Self::Listed(obj),
            Event::InitDone => Self::RelistDone,
        }
    }
}
