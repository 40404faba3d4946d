//! The [`FlatConMap`][crate::FlatConMap] type and its helpers.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::hash::{BuildHasher, Hash};
use std::iter::FromIterator;
use std::marker::PhantomData;

use crossbeam_epoch::Guard;

#[cfg(feature = "rayon")]
use rayon::iter::{FromParallelIterator, IntoParallelIterator, ParallelExtend, ParallelIterator};

use crate::existing_or_new::ExistingOrNew;
use crate::raw::config::Config;
use crate::raw::{self, Raw, DEFAULT_CAPACITY};

struct FlatMapConfig<K, V>(PhantomData<(K, V)>);

impl<K, V> Config for FlatMapConfig<K, V>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    type Key = K;
    type Pair = (K, V);
    type Slot = (K, V);

    fn key_of(pair: &(K, V)) -> &K {
        &pair.0
    }

    fn make_slot(_mixed: u64, pair: (K, V)) -> (K, V) {
        pair
    }

    fn copy_slot(slot: &(K, V)) -> (K, V) {
        slot.clone()
    }

    unsafe fn matches<Q>(slot: &(K, V), _mixed: u64, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        slot.0.borrow() == key
    }

    unsafe fn pair_of(slot: &(K, V)) -> &(K, V) {
        slot
    }

    unsafe fn retire_slot(_slot: &(K, V), _pin: &Guard) {}

    unsafe fn drop_slot(slot: (K, V)) {
        drop(slot);
    }
}

/// The iterator of the [`FlatConMap`].
///
/// See the [`iter`][FlatConMap::iter] method for details.
pub struct Iter<'a, K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    inner: raw::iterator::Iter<'a, FlatMapConfig<K, V>, S>,
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    type Item = (K, V);
    fn next(&mut self) -> Option<(K, V)> {
        self.inner.next().cloned()
    }
}

/// A concurrent map storing its entries inline.
///
/// This flavour keeps the `(K, V)` pairs directly inside the bucket slots: no allocation per
/// entry and no pointer to chase on lookup. The price is that every republication of a bucket
/// list ‒ each insert, remove or resize touching the bucket ‒ clones the pairs in it, so it is
/// the right choice for small, cheap-to-copy types (integers, small `Copy` structs and the
/// like). Big or allocation-backed types are better off in [`ConMap`][crate::ConMap], which
/// stores them behind tagged pointers and never moves them.
///
/// The API matches [`ConMap`][crate::ConMap]: `insert` keeps the resident entry on duplicates,
/// `upsert` overwrites, lookups return clones.
///
/// # Examples
///
/// ```rust
/// use conhash::FlatConMap;
/// use crossbeam_utils::thread;
///
/// let map = FlatConMap::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         map.insert(1u64, 1u64);
///     });
///     s.spawn(|_| {
///         map.insert(2, 4);
///     });
/// }).unwrap();
/// assert_eq!(Some(1), map.get(&1));
/// assert_eq!(Some(4), map.get(&2));
/// ```
pub struct FlatConMap<K, V, S = RandomState>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    raw: Raw<FlatMapConfig<K, V>, S>,
}

impl<K, V> FlatConMap<K, V>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, RandomState::default())
    }

    /// Creates a new empty map with space for about `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }

    /// Creates a new empty map that owns its epoch pool.
    ///
    /// See [`ConMap::with_private_pool`][crate::ConMap::with_private_pool].
    pub fn with_private_pool(capacity: usize) -> Self {
        Self {
            raw: Raw::with_private_pool(capacity, RandomState::default()),
        }
    }
}

impl<K, V, S> FlatConMap<K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    /// Creates a new empty map, but with the provided hasher implementation.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hasher)
    }

    /// Creates a new empty map with the provided capacity and hasher.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            raw: Raw::with_hasher(capacity, hasher),
        }
    }

    /// Inserts a new entry, unless the key is already taken.
    ///
    /// Returns `None` when the entry went in, the resident value (left untouched) otherwise.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let pin = self.raw.pin();
        self.raw.insert((key, value), &pin).map(|(_, v)| v.clone())
    }

    /// Looks up a value, returning a copy of it.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Eq + Hash,
        K: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).map(|(_, v)| v.clone())
    }

    /// Looks up a value or inserts the provided one, reporting which of the two happened.
    pub fn get_or_insert(&self, key: K, value: V) -> ExistingOrNew<V> {
        let pin = self.raw.pin();
        let kept = value.clone();
        match self.raw.insert((key, value), &pin) {
            Some((_, existing)) => ExistingOrNew::found(existing.clone()),
            None => ExistingOrNew::inserted(kept),
        }
    }

    /// Inserts a value computed from the one currently present, if any; returns the prior one.
    ///
    /// The closure must be pure, it can run once per CAS retry under contention.
    pub fn upsert<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnMut(Option<&V>) -> V,
    {
        let mut f = f;
        let pin = self.raw.pin();
        self.raw
            .upsert(key, |k, prior| (k.clone(), f(prior.map(|(_, v)| v))), &pin)
            .map(|(_, v)| v.clone())
    }

    /// Removes an entry identified by the given key, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Eq + Hash,
        K: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.remove(key, &pin).map(|(_, v)| v.clone())
    }

    /// Runs a closure on the entry of a key, without cloning the value.
    ///
    /// The entry is only guaranteed alive for the duration of the closure.
    pub fn extract<T, Q, F>(&self, key: &Q, f: F) -> Option<T>
    where
        Q: ?Sized + Eq + Hash,
        K: Borrow<Q>,
        F: FnOnce(&K, &V) -> T,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).map(|(k, v)| f(k, v))
    }

    /// Checks if a key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Eq + Hash,
        K: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).is_some()
    }

    /// The number of entries; a non-linearizable whole-table scan.
    pub fn len(&self) -> usize {
        let pin = self.raw.pin();
        self.raw.len(&pin)
    }

    /// Checks if the map is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries.
    pub fn clear(&self) {
        let pin = self.raw.pin();
        self.raw.clear(&pin);
    }
}

impl<K, V, S> FlatConMap<K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    /// Returns an iterator through the entries of the map, yielding copies of them.
    pub fn iter(&self) -> Iter<K, V, S> {
        Iter {
            inner: raw::iterator::Iter::new(&self.raw),
        }
    }
}

impl<K, V> Default for FlatConMap<K, V>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Debug for FlatConMap<K, V, S>
where
    K: Debug + Clone + Hash + Eq + 'static,
    V: Debug + Clone + 'static,
{
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let mut d = fmt.debug_map();
        for (k, v) in self.iter() {
            d.entry(&k, &v);
        }
        d.finish()
    }
}

impl<'a, K, V, S> IntoIterator for &'a FlatConMap<K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V, S>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> Extend<(K, V)> for &'a FlatConMap<K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in iter {
            self.upsert(k, |_| v.clone());
        }
    }
}

impl<K, V, S> Extend<(K, V)> for FlatConMap<K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = (K, V)>,
    {
        let mut me: &FlatConMap<_, _, _> = self;
        me.extend(iter);
    }
}

impl<K, V> FromIterator<(K, V)> for FlatConMap<K, V>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (K, V)>,
    {
        let mut me = FlatConMap::new();
        me.extend(iter);
        me
    }
}

#[cfg(feature = "rayon")]
impl<'a, K, V, S> ParallelExtend<(K, V)> for &'a FlatConMap<K, V, S>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Sync,
{
    fn par_extend<T>(&mut self, par_iter: T)
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        par_iter.into_par_iter().for_each(|(k, v)| {
            self.upsert(k, |_| v.clone());
        });
    }
}

#[cfg(feature = "rayon")]
impl<K, V, S> ParallelExtend<(K, V)> for FlatConMap<K, V, S>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Sync,
{
    fn par_extend<T>(&mut self, par_iter: T)
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        let mut me: &FlatConMap<_, _, _> = self;
        me.par_extend(par_iter);
    }
}

#[cfg(feature = "rayon")]
impl<K, V> FromParallelIterator<(K, V)> for FlatConMap<K, V>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_par_iter<T>(par_iter: T) -> Self
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        let mut me = FlatConMap::new();
        me.par_extend(par_iter);
        me
    }
}
