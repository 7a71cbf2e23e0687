//! Fixed set of reusable network clones for leaf workers.
//!
//! Acquiring blocks until a clone is free, which bounds memory by the pool
//! size rather than by the number of candidate leaves.

use parking_lot::{Condvar, Mutex};
use rao_core::Network;
use std::ops::{Deref, DerefMut};

pub struct NetworkPool {
    base: Network,
    networks: Mutex<Vec<Network>>,
    released: Condvar,
    size: usize,
}

impl NetworkPool {
    pub fn new(base: &Network, size: usize) -> Self {
        let size = size.max(1);
        Self {
            base: base.clone(),
            networks: Mutex::new((0..size).map(|_| base.clone()).collect()),
            released: Condvar::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free clone, reset to the base network.
    pub fn acquire(&self) -> PooledNetwork<'_> {
        let mut networks = self.networks.lock();
        let mut network = loop {
            match networks.pop() {
                Some(network) => break network,
                None => self.released.wait(&mut networks),
            }
        };
        drop(networks);
        network.clone_from(&self.base);
        PooledNetwork {
            pool: self,
            network,
        }
    }

    fn release(&self, network: Network) {
        self.networks.lock().push(network);
        self.released.notify_one();
    }

    pub fn available(&self) -> usize {
        self.networks.lock().len()
    }
}

/// Scoped handle; the clone returns to the pool on drop.
pub struct PooledNetwork<'a> {
    pool: &'a NetworkPool,
    network: Network,
}

impl Deref for PooledNetwork<'_> {
    type Target = Network;

    fn deref(&self) -> &Network {
        &self.network
    }
}

impl DerefMut for PooledNetwork<'_> {
    fn deref_mut(&mut self) -> &mut Network {
        &mut self.network
    }
}

impl Drop for PooledNetwork<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.network));
    }
}
