use crossbeam::queue::ArrayQueue;
use log::{debug, trace};

use crate::chunk::edit::ChunkEdit;
use crate::config::StoreConfig;

/// Something that can be cleared and handed to a new owner.
pub trait Recycle {
    /// Restores the value to its freshly constructed state, keeping allocations where possible.
    fn reset(&mut self);
}

/**
 * A bounded set of idle instances shared between threads. [`poll`](Pool::poll) hands out an idle
 * instance or builds a new one; [`recycle`](Pool::recycle) resets an instance and keeps it if
 * there is room.
 *
 * Each instance has exactly one owner at a time: it moves out of the pool on poll and back in on
 * recycle, so nothing can read it between the two.
 */
pub struct Pool<T> {
    idle: ArrayQueue<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Recycle> Pool<T> {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            idle: ArrayQueue::new(capacity),
            factory: Box::new(factory),
        }
    }

    pub fn poll(&self) -> T {
        match self.idle.pop() {
            Some(instance) => instance,
            None => {
                debug!("Pool has no idle instance, creating a new one");
                (self.factory)()
            }
        }
    }

    pub fn recycle(&self, mut instance: T) {
        instance.reset();
        if self.idle.push(instance).is_err() {
            trace!("Pool is full, dropping recycled instance");
        }
    }

    /// Number of instances waiting to be polled.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }
}

pub type EditPool = Pool<ChunkEdit>;

impl Pool<ChunkEdit> {
    /// An edit pool sized by `pool_size` whose fresh edits span the configured initial range.
    pub fn for_edits(config: &StoreConfig) -> Self {
        let config = config.clone();
        Pool::new(config.pool_size, move || ChunkEdit::from_config(&config))
    }
}
