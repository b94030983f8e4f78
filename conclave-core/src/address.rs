use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

/// Globally unique identity of a group member.
///
/// Two addresses are equal iff their identity bytes are equal. The optional
/// payload carried for pluggable identity schemes and the logical name held
/// in a [`NameCache`] never participate in comparison or hashing, so losing
/// either cannot change membership decisions.
#[derive(Debug, Clone)]
pub struct Address {
    id: Uuid,
    payload: Option<Bytes>,
}

impl Address {
    /// Creates a fresh random address.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: None,
        }
    }

    /// Creates a fresh random address carrying an opaque payload blob.
    #[must_use]
    pub fn with_payload(payload: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: Some(payload),
        }
    }

    /// Creates a fresh random address and registers a logical name for it.
    #[must_use]
    pub fn named(name: impl Into<String>, cache: &NameCache) -> Self {
        let addr = Self::new();
        cache.register(&addr, name);
        addr
    }

    /// Rebuilds an address from its identity and optional payload, e.g. when
    /// decoding a wire form.
    #[must_use]
    pub const fn from_parts(id: Uuid, payload: Option<Bytes>) -> Self {
        Self { id, payload }
    }

    /// The 16-byte identity this address is compared and hashed by.
    #[must_use]
    pub const fn identity(&self) -> Uuid {
        self.id
    }

    /// Opaque payload attached by a pluggable identity scheme, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.as_bytes().cmp(other.id.as_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.id.as_bytes();
        write!(f, "{:02x}{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

/// Process-scoped lookup aid mapping member identities to logical names.
///
/// Read-mostly and append-only: the first registration for an identity wins
/// and later attempts are ignored, which keeps the cache a display aid
/// rather than a source of truth. Concurrent readers never block writers.
#[derive(Debug, Default)]
pub struct NameCache {
    names: DashMap<Uuid, String>,
}

impl NameCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a logical name for the address. Returns `false` when the
    /// identity already had a name; the existing mapping is kept.
    pub fn register(&self, addr: &Address, name: impl Into<String>) -> bool {
        match self.names.entry(addr.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(name.into());
                true
            }
        }
    }

    /// Looks up the logical name registered for the address.
    #[must_use]
    pub fn lookup(&self, addr: &Address) -> Option<String> {
        self.names.get(&addr.id).map(|name| name.clone())
    }

    /// Resolves the address to its logical name, falling back to the short
    /// identity form.
    #[must_use]
    pub fn display(&self, addr: &Address) -> String {
        self.lookup(addr).unwrap_or_else(|| addr.to_string())
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` when no names are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_payload() {
        let addr = Address::new();
        let twin = Address::from_parts(addr.identity(), Some(Bytes::from_static(b"site-token")));
        assert_eq!(addr, twin);
        assert_eq!(addr.cmp(&twin), Ordering::Equal);
    }

    #[test]
    fn ordering_follows_identity_bytes() {
        let lo = Address::from_parts(Uuid::from_bytes([0x01; 16]), None);
        let hi = Address::from_parts(Uuid::from_bytes([0x02; 16]), None);
        assert!(lo < hi);
        assert_eq!(lo.max(hi.clone()), hi);
    }

    #[test]
    fn name_cache_first_writer_wins() {
        let cache = NameCache::new();
        let addr = Address::new();
        assert!(cache.register(&addr, "alpha"));
        assert!(!cache.register(&addr, "beta"));
        assert_eq!(cache.lookup(&addr).as_deref(), Some("alpha"));
    }

    #[test]
    fn display_falls_back_to_short_identity() {
        let cache = NameCache::new();
        let addr = Address::new();
        assert_eq!(cache.display(&addr), addr.to_string());
        cache.register(&addr, "alpha");
        assert_eq!(cache.display(&addr), "alpha");
    }
}
