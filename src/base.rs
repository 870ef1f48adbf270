//! Identity for GPU-backed and stateful objects

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a stateful object. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentity(u64);

impl ObjectIdentity {
    pub fn next() -> Self {
        Self(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marker for everything that owns GPU resources or cumulative render state.
pub trait GlBase {
    fn identity(&self) -> ObjectIdentity;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_are_unique() {
        let a = ObjectIdentity::next();
        let b = ObjectIdentity::next();
        assert_ne!(a, b);
        assert!(b.value() > a.value());
        assert_eq!(format!("{}", a), format!("#{}", a.value()));
    }
}
