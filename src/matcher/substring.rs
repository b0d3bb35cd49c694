//! Substring-keyed lookup table.
//!
//! # Responsibilities
//! - Store path keys and their values in a frozen open-addressed table
//! - Look up `path[..length]` without allocating the substring
//!
//! # Design Decisions
//! - Power-of-two capacity, linear probing, doubled while building
//! - Polynomial (×31) hash over the first `length` bytes
//! - Built once from an iterator; there is no mutation after construction

/// Initial number of slots. Always a power of two.
const INITIAL_CAPACITY: usize = 16;

struct Slot<V> {
    hash: u32,
    key: String,
    value: V,
}

/// A key/value pair found by [`SubstringMap::get`].
#[derive(Debug)]
pub struct SubstringMatch<'a, V> {
    pub key: &'a str,
    pub value: &'a V,
}

/// Immutable open-addressed hash table keyed by string prefixes.
pub struct SubstringMap<V> {
    slots: Box<[Option<Slot<V>>]>,
    len: usize,
}

impl<V> SubstringMap<V> {
    /// Build a table from `(key, value)` pairs. A repeated key replaces the
    /// earlier value.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let mut slots: Vec<Option<Slot<V>>> = Vec::new();
        slots.resize_with(INITIAL_CAPACITY, || None);
        let mut len = 0;

        for (key, value) in entries {
            // Keep the load factor at or below one half.
            if (len + 1) * 2 > slots.len() {
                slots = grow(slots);
            }
            let hash = hash_prefix(key.as_bytes());
            if insert(&mut slots, Slot { hash, key, value }) {
                len += 1;
            }
        }

        Self {
            slots: slots.into_boxed_slice(),
            len,
        }
    }

    /// Look up the entry whose key equals `path[..length]`.
    pub fn get(&self, path: &str, length: usize) -> Option<SubstringMatch<'_, V>> {
        let bytes = path.as_bytes();
        if length > bytes.len() || self.len == 0 {
            return None;
        }
        let candidate = &bytes[..length];
        let hash = hash_prefix(candidate);
        let mask = self.slots.len() - 1;
        let mut index = hash as usize & mask;

        while let Some(slot) = &self.slots[index] {
            if slot.hash == hash && slot.key.as_bytes() == candidate {
                return Some(SubstringMatch {
                    key: &slot.key,
                    value: &slot.value,
                });
            }
            index = (index + 1) & mask;
        }
        None
    }

    /// Look up the entry whose key equals the whole `path`.
    pub fn get_full(&self, path: &str) -> Option<&V> {
        self.get(path, path.len()).map(|found| found.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().flatten().map(|slot| slot.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<V> Default for SubstringMap<V> {
    fn default() -> Self {
        Self::from_entries(std::iter::empty())
    }
}

impl<V> FromIterator<(String, V)> for SubstringMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for SubstringMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().flatten().map(|s| (&s.key, &s.value)))
            .finish()
    }
}

/// Polynomial rolling hash, the same recurrence for stored keys and probes.
fn hash_prefix(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// Returns `true` when a new key was added, `false` when an existing key was
/// overwritten.
fn insert<V>(slots: &mut [Option<Slot<V>>], slot: Slot<V>) -> bool {
    let mask = slots.len() - 1;
    let mut index = slot.hash as usize & mask;
    loop {
        match &mut slots[index] {
            Some(existing) if existing.hash == slot.hash && existing.key == slot.key => {
                existing.value = slot.value;
                return false;
            }
            Some(_) => index = (index + 1) & mask,
            empty @ None => {
                *empty = Some(slot);
                return true;
            }
        }
    }
}

fn grow<V>(old: Vec<Option<Slot<V>>>) -> Vec<Option<Slot<V>>> {
    let mut slots = Vec::new();
    slots.resize_with(old.len() * 2, || None);
    for slot in old.into_iter().flatten() {
        insert(&mut slots, slot);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_length() {
        let map: SubstringMap<u32> = [("/api".to_string(), 1), ("/api/admin".to_string(), 2)]
            .into_iter()
            .collect();

        let found = map.get("/api/admin/users", 10).unwrap();
        assert_eq!(found.key, "/api/admin");
        assert_eq!(*found.value, 2);

        assert_eq!(*map.get("/api/admin/users", 4).unwrap().value, 1);
        assert!(map.get("/api/admin/users", 5).is_none());
        assert!(map.get("/ap", 4).is_none());
    }

    #[test]
    fn test_full_lookup() {
        let map = SubstringMap::from_entries([("/".to_string(), "root")]);
        assert_eq!(map.get_full("/"), Some(&"root"));
        assert_eq!(map.get_full(""), None);
        assert_eq!(map.get_full("//"), None);
    }

    #[test]
    fn test_growth_keeps_all_entries() {
        let map: SubstringMap<usize> = (0..500).map(|i| (format!("/p/{i}"), i)).collect();
        assert_eq!(map.len(), 500);
        for i in 0..500 {
            let key = format!("/p/{i}");
            assert_eq!(map.get_full(&key), Some(&i));
        }
        assert_eq!(map.keys().count(), 500);
    }

    #[test]
    fn test_repeated_key_replaces() {
        let map = SubstringMap::from_entries([("/a".to_string(), 1), ("/a".to_string(), 2)]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_full("/a"), Some(&2));
    }

    #[test]
    fn test_empty_map() {
        let map: SubstringMap<()> = SubstringMap::default();
        assert!(map.is_empty());
        assert!(map.get("/anything", 1).is_none());
    }
}
