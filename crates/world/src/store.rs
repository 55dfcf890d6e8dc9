use parking_lot::RwLock;

use crate::model::World;

/// The single mutation surface for one session's [`World`]. All reads take
/// a clone of the current state (cheap relative to an LLM round trip);
/// mutations run under the write lock one at a time.
///
/// This is deliberately the *only* way to touch a session's world: the
/// engine crate never holds a `&mut World` across an `.await` point,
/// because every tool dispatch goes through [`WorldStore::mutate`], which
/// takes and releases the lock synchronously.
pub struct WorldStore {
    inner: RwLock<World>,
}

impl WorldStore {
    pub fn new(world: World) -> Self {
        Self {
            inner: RwLock::new(world),
        }
    }

    /// A consistent point-in-time copy of the world, safe to read from
    /// across `.await` points (e.g. while building a prompt or streaming a
    /// completion).
    pub fn snapshot(&self) -> World {
        self.inner.read().clone()
    }

    /// Run a synchronous mutation against the live world under the write
    /// lock. `f` must not perform I/O or hold the returned guard past this
    /// call; it runs and returns before any other session activity can
    /// observe a half-applied mutation.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut World) -> T) -> T {
        let mut guard = self.inner.write();
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_prior_mutations_but_not_concurrent_ones() {
        let world = World::new("T", "D", "Morning");
        let store = WorldStore::new(world);
        store.mutate(|w| w.advance_time(5, ""));
        let snap = store.snapshot();
        assert_eq!(snap.tick, 5);

        store.mutate(|w| w.advance_time(5, ""));
        assert_eq!(snap.tick, 5);
        assert_eq!(store.snapshot().tick, 10);
    }
}
