//! Live views over the shared cache.
//!
//! The cache is one [`LayeredCache`] behind a mutex. Every change publishes
//! the affected query results on `watch` channels while still holding the
//! lock, so subscribers observe changes in the order they were applied, and
//! only wake when a result actually differs.

use chatcore::cache::{CachePatch, LayerId, LayeredCache, NormalizedCache};
use chatcore::types::{Chat, ChatId, User};
use dashmap::DashMap;
use futures_util::Stream;
use futures_util::stream;
use log::trace;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
#[error("the live query source was dropped")]
pub struct LiveQueryClosed;

/// A continuously-updating query result. `None` means the result is not
/// cached (not fetched yet, or removed). Dropping the query unsubscribes it.
#[derive(Debug, Clone)]
pub struct LiveQuery<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> LiveQuery<T> {
    fn new(rx: watch::Receiver<Option<T>>) -> Self {
        Self { rx }
    }

    /// The latest value, without waiting.
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Waits for the next change and returns the new value.
    pub async fn changed(&mut self) -> Result<Option<T>, LiveQueryClosed> {
        self.rx.changed().await.map_err(|_| LiveQueryClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// The current value followed by every change, until the source is dropped.
    pub fn into_stream(mut self) -> impl Stream<Item = Option<T>> {
        self.rx.mark_changed();
        stream::unfold(self, |mut query| async move {
            let value = query.changed().await.ok()?;
            Some((value, query))
        })
    }
}

fn publish<T: PartialEq>(tx: &watch::Sender<Option<T>>, value: Option<T>) {
    tx.send_if_modified(|current| {
        if *current != value {
            *current = value;
            true
        } else {
            false
        }
    });
}

pub struct LiveCache {
    cache: Mutex<LayeredCache>,
    chat_list: watch::Sender<Option<Vec<Chat>>>,
    users: watch::Sender<Option<Vec<User>>>,
    chats: DashMap<ChatId, watch::Sender<Option<Chat>>>,
}

impl Default for LiveCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveCache {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LayeredCache::new()),
            chat_list: watch::channel(None).0,
            users: watch::channel(None).0,
            chats: DashMap::new(),
        }
    }

    // Lock order is always cache, then the chat sender map.
    fn lock(&self) -> MutexGuard<'_, LayeredCache> {
        self.cache.lock().expect("Mutex should not be poisoned")
    }

    pub fn watch_chats(&self) -> LiveQuery<Vec<Chat>> {
        LiveQuery::new(self.chat_list.subscribe())
    }

    pub fn watch_users(&self) -> LiveQuery<Vec<User>> {
        LiveQuery::new(self.users.subscribe())
    }

    pub fn watch_chat(&self, chat_id: &str) -> LiveQuery<Chat> {
        let cache = self.lock();
        let rx = self
            .chats
            .entry(chat_id.to_string())
            .or_insert_with(|| watch::channel(cache.view().read_chat(chat_id)).0)
            .subscribe();
        drop(cache);
        LiveQuery::new(rx)
    }

    /// Reads the cache as views see it (optimistic layers included).
    pub fn read<R>(&self, f: impl FnOnce(&NormalizedCache) -> R) -> R {
        f(self.lock().view())
    }

    /// Stores confirmed query results.
    pub fn write(&self, f: impl FnOnce(&mut NormalizedCache)) {
        let mut cache = self.lock();
        cache.write(f);
        self.publish(&cache);
    }

    /// Applies a confirmed patch.
    pub fn apply(&self, patch: &CachePatch) {
        let mut cache = self.lock();
        cache.apply(patch);
        self.publish(&cache);
    }

    pub fn push_optimistic(&self, patch: CachePatch) -> LayerId {
        let mut cache = self.lock();
        let layer = cache.push_optimistic(patch);
        self.publish(&cache);
        layer
    }

    pub fn commit(&self, layer: LayerId, patch: &CachePatch) {
        let mut cache = self.lock();
        cache.commit(layer, patch);
        self.publish(&cache);
    }

    pub fn rollback(&self, layer: LayerId) {
        let mut cache = self.lock();
        cache.rollback(layer);
        self.publish(&cache);
    }

    fn publish(&self, cache: &LayeredCache) {
        let view = cache.view();
        publish(&self.chat_list, view.read_chat_list());
        publish(&self.users, view.read_users());

        // Torn-down chat views are forgotten here.
        self.chats.retain(|id, tx| {
            if tx.receiver_count() == 0 {
                trace!("Dropping live view of chat {id}");
                return false;
            }
            publish(tx, view.read_chat(id));
            true
        });
    }

    /// Number of single-chat views with live subscribers.
    pub fn live_chat_views(&self) -> usize {
        self.chats.len()
    }
}
