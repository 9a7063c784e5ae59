//! Free lists of scratch resources reused across constructions.
//!
//! Views are `Copy` stack values, so only the heap-backed scratch storage
//! (value storages, slot arrays, builders) is pooled. A [`Pooled`] guard owns
//! its resource and hands it back to the pool when dropped.
use super::storage::ValueStorage;
use core::any::{Any, TypeId};
use core::ops::{Deref, DerefMut};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A resource that can be cleared for reuse.
pub trait Poolable: Any + Default {
    fn reset(&mut self);
}

impl Poolable for ValueStorage {
    fn reset(&mut self) {
        ValueStorage::reset(self);
    }
}

impl<T: 'static> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

type FreeLists = HashMap<TypeId, Vec<Box<dyn Any>>>;

/// Frame-local pool. Cloning shares the same free lists.
#[derive(Clone, Default)]
pub struct PointablePool {
    free: Rc<RefCell<FreeLists>>,
}

impl PointablePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cleared resource, recycled when one is available.
    pub fn take<T: Poolable>(&self) -> T {
        let recycled = self
            .free
            .borrow_mut()
            .get_mut(&TypeId::of::<T>())
            .and_then(Vec::pop)
            .and_then(|b| b.downcast::<T>().ok());
        match recycled {
            Some(mut r) => {
                r.reset();
                *r
            }
            None => T::default(),
        }
    }

    pub fn give_back<T: Poolable>(&self, resource: T) {
        self.free
            .borrow_mut()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Box::new(resource));
    }

    /// Borrows a resource under a guard that returns it on drop.
    pub fn borrow<T: Poolable>(&self) -> Pooled<T> {
        Pooled {
            resource: self.take(),
            detached: false,
            pool: self.clone(),
        }
    }

    /// Number of idle resources of type `T`.
    pub fn idle<T: Poolable>(&self) -> usize {
        self.free
            .borrow()
            .get(&TypeId::of::<T>())
            .map_or(0, Vec::len)
    }
}

impl core::fmt::Debug for PointablePool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let lists = self.free.borrow();
        f.debug_struct("PointablePool")
            .field("kinds", &lists.len())
            .field("idle", &lists.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

/// Scoped loan from a [`PointablePool`].
pub struct Pooled<T: Poolable> {
    resource: T,
    detached: bool,
    pool: PointablePool,
}

impl<T: Poolable> Pooled<T> {
    /// Keeps the resource instead of returning it.
    pub fn into_inner(mut self) -> T {
        self.detached = true;
        core::mem::take(&mut self.resource)
    }
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.resource
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.pool.give_back(core::mem::take(&mut self.resource));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn guard_returns_resource_on_drop() {
        let pool = PointablePool::new();
        {
            let mut s = pool.borrow::<ValueStorage>();
            s.put_i32(42);
            assert_eq!(pool.idle::<ValueStorage>(), 0);
        }
        assert_eq!(pool.idle::<ValueStorage>(), 1);
        let s = pool.borrow::<ValueStorage>();
        assert!(s.is_empty());
        assert_eq!(pool.idle::<ValueStorage>(), 0);
    }

    #[rstest]
    fn kinds_have_separate_free_lists() {
        let pool = PointablePool::new();
        pool.give_back(vec![1i32, 2, 3]);
        pool.give_back(ValueStorage::new());
        assert_eq!(pool.idle::<Vec<i32>>(), 1);
        assert_eq!(pool.idle::<Vec<u8>>(), 0);
        assert!(pool.take::<Vec<i32>>().is_empty());
    }

    #[rstest]
    fn into_inner_detaches() {
        let pool = PointablePool::new();
        let v = pool.borrow::<Vec<u8>>().into_inner();
        drop(v);
        assert_eq!(pool.idle::<Vec<u8>>(), 0);
    }
}
