//! Resources that can be placed in a pool.
//!
//! The pool tracks members by a stable identity key rather than by value
//! equality, so any caller-supplied type can participate as long as it can
//! name itself.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// A value that can be registered with a [`ResourcePool`].
///
/// The pool never inspects or mutates the value itself; it only uses the
/// [`key`](Resource::key) as a registry handle. Keys must stay stable for
/// the lifetime of the value and be unique among the resources added to any
/// one pool.
///
/// [`ResourcePool`]: crate::pool::exclusive::ResourcePool
pub trait Resource: Send + fmt::Debug + 'static {
    /// The identity under which the pool registry tracks this resource.
    type Key: Clone + Eq + Hash + fmt::Debug + Send + 'static;

    /// Return the identity key for this resource.
    fn key(&self) -> Self::Key;
}

/// A ready-made pool resource that carries nothing but a unique id.
///
/// Useful when the pooled things are interchangeable slots and a caller only
/// needs to know *which* slot it holds. Ids come from a process-wide counter,
/// so two tokens never collide.
///
/// `Token` is `Clone` so a caller can keep a copy of the identity it held
/// (for example to look the slot up again later); only the clone that is
/// checked out counts as held by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// The id assigned at creation.
    id: u64,
}

impl Token {
    /// Create a token with a fresh id.
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The id assigned to this token.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.id)
    }
}

impl Resource for Token {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}

macro_rules! key_is_value {
    ($($ty:ty),+ $(,)?) => {$(
        impl Resource for $ty {
            type Key = $ty;

            fn key(&self) -> $ty {
                *self
            }
        }
    )+};
}

key_is_value!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn tokens_have_unique_ids() {
        let mut handles = Vec::new();

        for _ in 0..4 {
            handles.push(thread::spawn(|| {
                (0..250).map(|_| Token::new().id()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "token id {} handed out twice", id);
            }
        }

        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn token_key_is_its_id() {
        let token = Token::new();
        assert_eq!(token.key(), token.id());

        let copy = token.clone();
        assert_eq!(copy.key(), token.key());
    }

    #[test]
    fn integers_key_as_themselves() {
        assert_eq!(7u32.key(), 7);
        assert_eq!((-3i64).key(), -3);
    }
}
