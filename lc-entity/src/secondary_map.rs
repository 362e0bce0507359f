use crate::EntityRef;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A mapping `K -> V` for densely indexed entity references.
///
/// Unlike `PrimaryMap`, a `SecondaryMap` can't allocate new keys; it
/// associates secondary information (a variable's inferred type, a loop's
/// break-patch list) with entities a `PrimaryMap` already owns. Reading an
/// absent key returns the map's default value rather than `None`.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K, V> SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    /// Create a new empty map using `V::default()` for unset entries.
    pub fn new() -> Self
    where
        V: Default,
    {
        Self {
            elems: Vec::new(),
            default: Default::default(),
            unused: PhantomData,
        }
    }

    /// Create a new empty map with an explicit default value.
    pub fn with_default(default: V) -> Self {
        Self {
            elems: Vec::new(),
            default,
            unused: PhantomData,
        }
    }

    /// Number of elements in the backing vector (not the number of
    /// distinct keys ever written; reading past this returns the default).
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Get the value at `k`, extending with the default if necessary on
    /// write, or returning the default on read past the backing vector.
    pub fn get(&self, k: K) -> &V {
        self.elems.get(k.index()).unwrap_or(&self.default)
    }

    fn resize(&mut self, k: K) {
        if k.index() >= self.elems.len() {
            self.elems.resize(k.index() + 1, self.default.clone());
        }
    }

    /// Set the value at `k`, growing the backing vector with the default
    /// value as needed.
    pub fn set(&mut self, k: K, v: V) {
        self.resize(k);
        self.elems[k.index()] = v;
    }

    /// Mutable access to the value at `k`, growing as needed.
    pub fn get_mut(&mut self, k: K) -> &mut V {
        self.resize(k);
        &mut self.elems[k.index()]
    }

    /// Whether nothing has ever been written to this map.
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}

impl<K, V> Index<K> for SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    type Output = V;

    fn index(&self, k: K) -> &V {
        self.get(k)
    }
}

impl<K, V> IndexMut<K> for SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone + Default,
{
    fn index_mut(&mut self, k: K) -> &mut V {
        self.get_mut(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::entity_impl!(K);

    #[test]
    fn unset_keys_read_as_default() {
        let map: SecondaryMap<K, bool> = SecondaryMap::new();
        assert_eq!(*map.get(K::new(4)), false);
    }

    #[test]
    fn set_then_get() {
        let mut map: SecondaryMap<K, u32> = SecondaryMap::new();
        map.set(K::new(2), 9);
        assert_eq!(*map.get(K::new(2)), 9);
        assert_eq!(*map.get(K::new(0)), 0);
    }
}
