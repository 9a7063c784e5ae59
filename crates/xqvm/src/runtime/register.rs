//! Typed registers.
//!
//! Iterator trees are immutable and shared, so every piece of per-execution
//! state lives in a register of the executing [`Frame`]. Handles are plain
//! indexes handed out by the [`RegisterAllocator`] while the plan is compiled;
//! the type parameter fixes what a register holds.
use super::frame::Frame;
use core::any::Any;
use core::fmt;
use core::marker::PhantomData;

/// One scope's register slots.
#[derive(Default)]
pub struct RegisterSet {
    slots: Vec<Option<Box<dyn Any>>>,
}

impl RegisterSet {
    pub fn with_len(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()?.downcast_ref()
    }

    fn get_mut<T: Any>(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()?.downcast_mut()
    }

    fn set<T: Any>(&mut self, index: usize, value: T) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        let slot = &mut self.slots[index];
        // reuse the allocation when the register already holds a T
        match slot.as_mut().and_then(|b| b.downcast_mut::<T>()) {
            Some(existing) => *existing = value,
            None => *slot = Some(Box::new(value)),
        }
    }

    fn take<T: Any>(&mut self, index: usize) -> Option<T> {
        let boxed = self.slots.get_mut(index)?.take()?;
        boxed.downcast::<T>().ok().map(|b| *b)
    }

    fn clear(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    /// Empties every slot, keeping the length.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}

impl fmt::Debug for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterSet")
            .field("len", &self.slots.len())
            .field("set", &self.slots.iter().filter(|s| s.is_some()).count())
            .finish()
    }
}

macro_rules! register_handle {
    ($(#[$doc:meta])* $name:ident, $set:ident, $set_mut:ident) => {
        $(#[$doc])*
        pub struct $name<T> {
            index: usize,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.index)
            }
        }

        impl<T: Any> $name<T> {
            fn new(index: usize) -> Self {
                Self {
                    index,
                    _marker: PhantomData,
                }
            }

            pub fn index(&self) -> usize {
                self.index
            }

            pub fn get<'f>(&self, frame: &'f Frame<'_>) -> Option<&'f T> {
                frame.$set().get(self.index)
            }

            pub fn get_mut<'f>(&self, frame: &'f mut Frame<'_>) -> Option<&'f mut T> {
                frame.$set_mut().get_mut(self.index)
            }

            pub fn set(&self, frame: &mut Frame<'_>, value: T) {
                frame.$set_mut().set(self.index, value);
            }

            pub fn take(&self, frame: &mut Frame<'_>) -> Option<T> {
                frame.$set_mut().take(self.index)
            }

            pub fn clear(&self, frame: &mut Frame<'_>) {
                frame.$set_mut().clear(self.index);
            }

            pub fn is_set(&self, frame: &Frame<'_>) -> bool {
                self.get(frame).is_some()
            }
        }

        impl $name<bool> {
            /// Unset reads as `false`.
            pub fn flag(&self, frame: &Frame<'_>) -> bool {
                self.get(frame).copied().unwrap_or(false)
            }
        }
    };
}

register_handle!(
    /// Register of one iterator instance within a frame.
    LocalRegister,
    locals,
    locals_mut
);

register_handle!(
    /// Register shared by the whole plan (global variables).
    GlobalRegister,
    globals,
    globals_mut
);

/// Hands out register indexes while a plan is compiled. Indexes only grow.
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    locals: usize,
    globals: usize,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local<T: Any>(&mut self) -> LocalRegister<T> {
        let r = LocalRegister::new(self.locals);
        self.locals += 1;
        r
    }

    pub fn global<T: Any>(&mut self) -> GlobalRegister<T> {
        let r = GlobalRegister::new(self.globals);
        self.globals += 1;
        r
    }

    pub fn local_count(&self) -> usize {
        self.locals
    }

    pub fn global_count(&self) -> usize {
        self.globals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::DynamicContext;
    use rstest::rstest;

    #[rstest]
    fn handles_are_monotonic() {
        let mut alloc = RegisterAllocator::new();
        let a = alloc.local::<bool>();
        let b = alloc.local::<i64>();
        let g = alloc.global::<String>();
        assert_eq!((a.index(), b.index(), g.index()), (0, 1, 0));
        assert_eq!((alloc.local_count(), alloc.global_count()), (2, 1));
    }

    #[rstest]
    fn typed_slots_roundtrip() {
        let mut alloc = RegisterAllocator::new();
        let flag = alloc.local::<bool>();
        let count = alloc.local::<i64>();
        let name = alloc.global::<String>();
        let ctx = DynamicContext::default();
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());

        assert!(!flag.flag(&frame));
        flag.set(&mut frame, true);
        count.set(&mut frame, 41);
        *count.get_mut(&mut frame).unwrap() += 1;
        name.set(&mut frame, "x".to_owned());
        assert!(flag.flag(&frame));
        assert_eq!(count.get(&frame), Some(&42));
        assert_eq!(name.take(&mut frame).as_deref(), Some("x"));
        assert!(!name.is_set(&frame));
        count.clear(&mut frame);
        assert_eq!(count.get(&frame), None);
    }
}
