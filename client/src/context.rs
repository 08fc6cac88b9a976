use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Per-operation values shared between the before and after hook calls.
///
/// One `Context` is created for every command or pipeline and dropped when
/// the operation completes, so concurrent operations never see each other's
/// values. Entries are keyed by type: a hook that stores a private type can
/// never collide with another hook.
#[derive(Default)]
pub struct Context {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok())
            .map(|prev| *prev)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct A(u32);

    #[derive(Debug, PartialEq)]
    struct B(u32);

    #[test]
    fn keyed_by_type() {
        let mut ctx = Context::new();
        assert!(ctx.is_empty());
        assert_eq!(ctx.insert(A(1)), None);
        assert_eq!(ctx.insert(B(2)), None);
        assert_eq!(ctx.get::<A>(), Some(&A(1)));
        assert_eq!(ctx.get::<B>(), Some(&B(2)));
    }

    #[test]
    fn insert_replaces() {
        let mut ctx = Context::new();
        ctx.insert(A(1));
        assert_eq!(ctx.insert(A(2)), Some(A(1)));
        assert_eq!(ctx.remove::<A>(), Some(A(2)));
        assert_eq!(ctx.get::<A>(), None);
    }
}
