//! Entity handles and the dense storage keyed by them.
//!
//! Every intra-function entity ([`Block`](crate::Block), [`Inst`](crate::Inst),
//! [`Loop`](crate::cf::loops::Loop)) is a `u32` index into an [`EntityDefs`]
//! arena, which only ever grows, so handles stay valid for the lifetime of the
//! function (this is what lets analyses key side tables by handle, and patch
//! them incrementally, instead of having to rebuild them after every change).

use std::marker::PhantomData;
use std::{fmt, ops};

/// Entity handle, i.e. a dense index into some [`EntityDefs`].
pub trait Entity: Copy + Eq + std::hash::Hash + fmt::Debug {
    type Def;

    fn from_index(idx: usize) -> Self;
    fn index(self) -> usize;
}

/// Declare `u32` newtype entity handles, alongside their definition types.
macro_rules! entities {
    ($($(#[$attr:meta])* $name:ident => $def:ty),+ $(,)?) => {$(
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From, derive_more::Into)]
        pub struct $name(u32);

        impl $crate::entity::Entity for $name {
            type Def = $def;

            fn from_index(idx: usize) -> Self {
                $name(u32::try_from(idx).expect(concat!("too many `", stringify!($name), "`s")))
            }
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    )+};
}
pub(crate) use entities;

/// Append-only arena of entity definitions, indexed by their handles.
pub struct EntityDefs<E: Entity> {
    defs: Vec<E::Def>,
}

impl<E: Entity> Clone for EntityDefs<E>
where
    E::Def: Clone,
{
    fn clone(&self) -> Self {
        Self { defs: self.defs.clone() }
    }
}

impl<E: Entity> Default for EntityDefs<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityDefs<E> {
    pub fn new() -> Self {
        Self { defs: vec![] }
    }

    pub fn define(&mut self, def: E::Def) -> E {
        let entity = E::from_index(self.defs.len());
        self.defs.push(def);
        entity
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// All entities defined so far, in definition order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = E> + ExactSizeIterator + use<E> {
        (0..self.defs.len()).map(E::from_index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (E, &E::Def)> + '_ {
        self.defs.iter().enumerate().map(|(i, def)| (E::from_index(i), def))
    }
}

impl<E: Entity> ops::Index<E> for EntityDefs<E> {
    type Output = E::Def;
    fn index(&self, entity: E) -> &E::Def {
        &self.defs[entity.index()]
    }
}

impl<E: Entity> ops::IndexMut<E> for EntityDefs<E> {
    fn index_mut(&mut self, entity: E) -> &mut E::Def {
        &mut self.defs[entity.index()]
    }
}

/// Side table from entity handles to some `V`, densely allocated by index
/// (i.e. cheap lookups, but proportional in size to the largest key used).
#[derive(Clone)]
pub struct EntityOrientedDenseMap<K: Entity, V> {
    values: Vec<Option<V>>,
    _marker: PhantomData<K>,
}

impl<K: Entity, V> Default for EntityOrientedDenseMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Entity, V> EntityOrientedDenseMap<K, V> {
    pub fn new() -> Self {
        Self { values: vec![], _marker: PhantomData }
    }

    /// Get the slot for `key` (allocating it if needed), which is `None` iff
    /// `key` has no value yet.
    pub fn entry(&mut self, key: K) -> &mut Option<V> {
        let idx = key.index();
        if self.values.len() <= idx {
            self.values.resize_with(idx + 1, || None);
        }
        &mut self.values[idx]
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entry(key).replace(value)
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.values.get(key.index())?.as_ref()
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.values.get_mut(key.index())?.as_mut()
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: K) -> Option<V> {
        self.values.get_mut(key.index())?.take()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((K::from_index(i), v.as_ref()?)))
    }
}

impl<K: Entity, V> ops::Index<K> for EntityOrientedDenseMap<K, V> {
    type Output = V;
    #[track_caller]
    fn index(&self, key: K) -> &V {
        self.get(key).unwrap_or_else(|| panic!("no entry for {key:?}"))
    }
}

impl<K: Entity, V> ops::IndexMut<K> for EntityOrientedDenseMap<K, V> {
    #[track_caller]
    fn index_mut(&mut self, key: K) -> &mut V {
        self.get_mut(key).unwrap_or_else(|| panic!("no entry for {key:?}"))
    }
}
