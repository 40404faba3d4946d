//! The [`ConMap`][crate::ConMap] type and its helpers.

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
use crate::raw::config::{self, Config, TaggedBox};
use crate::raw::{self, Raw, DEFAULT_CAPACITY};

struct MapConfig<K, V>(PhantomData<(K, V)>);

impl<K, V> Config for MapConfig<K, V>
where
    K: Hash + Eq + 'static,
    V: 'static,
{
    type Key = K;
    type Pair = (K, V);
    type Slot = TaggedBox<(K, V)>;

    fn key_of(pair: &(K, V)) -> &K {
        &pair.0
    }

    fn make_slot(mixed: u64, pair: (K, V)) -> Self::Slot {
        TaggedBox::new(config::hash_tag(mixed), pair)
    }

    fn copy_slot(slot: &Self::Slot) -> Self::Slot {
        slot.share()
    }

    unsafe fn matches<Q>(slot: &Self::Slot, mixed: u64, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        // The cheap tag comparison first; the pair is dereferenced only on a match.
        slot.tag() == config::hash_tag(mixed) && slot.get().0.borrow() == key
    }

    unsafe fn pair_of(slot: &Self::Slot) -> &(K, V) {
        slot.get()
    }

    unsafe fn retire_slot(slot: &Self::Slot, pin: &Guard) {
        slot.retire(pin);
    }

    unsafe fn drop_slot(slot: Self::Slot) {
        drop(slot.into_box());
    }
}

/// The iterator of the [`ConMap`].
///
/// See the [`iter`][ConMap::iter] method for details.
pub struct Iter<'a, K, V, S>
where
    // TODO: It would be great if the bounds wouldn't have to be on the struct, only on the impls
    K: Hash + Eq + 'static,
    V: 'static,
{
    inner: raw::iterator::Iter<'a, MapConfig<K, V>, S>,
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

/// A concurrent map.
///
/// Entries are kept behind word-sized tagged pointers: the slot a bucket stores packs the top
/// bits of the key's hash next to the address of the heap-allocated pair, so a failed lookup
/// usually decides without touching the pair at all, and entries never move once inserted, no
/// matter how often their bucket is republished or the table resized.
///
/// Looking up (or removing, or iterating) hands out *clones* of the stored values, because the
/// originals stay shared with concurrent readers until the epoch pool reclaims them. For values
/// that are expensive to clone, wrap them in an [`Arc`][std::sync::Arc]. Keys and values that
/// are small and `Copy` may be better served by the inline-storage
/// [`FlatConMap`][crate::FlatConMap].
///
/// Unlike `std`'s `HashMap`, [`insert`][ConMap::insert] does not overwrite: the first entry for
/// a key wins and later inserts return it untouched. Overwriting is what
/// [`upsert`][ConMap::upsert] is for.
///
/// All methods take `&self`, so the map can be shared between threads (eg. in an
/// [`Arc`][std::sync::Arc] or a scoped thread) and updated from all of them.
///
/// # Examples
///
/// ```rust
/// use conhash::ConMap;
/// use crossbeam_utils::thread;
///
/// let map = ConMap::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         map.insert("hello", 1);
///     });
///     s.spawn(|_| {
///         map.insert("world", 2);
///     });
/// }).unwrap();
/// assert_eq!(Some(1), map.get("hello"));
/// assert_eq!(Some(2), map.get("world"));
/// ```
pub struct ConMap<K, V, S = RandomState>
where
    // TODO: It would be great if the bounds wouldn't have to be on the struct, only on the impls
    K: Hash + Eq + 'static,
    V: 'static,
{
    raw: Raw<MapConfig<K, V>, S>,
}

impl<K, V> ConMap<K, V>
where
    K: Hash + Eq + 'static,
    V: 'static,
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
    /// Retired entries of such a map are destroyed no later than when the map is dropped. The
    /// default shared pool gives faster operations, but may keep garbage of a dropped map around
    /// for a while.
    pub fn with_private_pool(capacity: usize) -> Self {
        Self::with_private_pool_and_hasher(capacity, RandomState::default())
    }
}

impl<K, V, S> ConMap<K, V, S>
where
    K: Hash + Eq + 'static,
    V: 'static,
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

    /// Creates a new empty map with its own epoch pool and the provided hasher.
    ///
    /// See [`with_private_pool`][ConMap::with_private_pool].
    pub fn with_private_pool_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            raw: Raw::with_private_pool(capacity, hasher),
        }
    }

    /// Checks if a key is present.
    ///
    /// Note that by the time you can act on it, the presence can change (another thread can add
    /// or remove the entry in the meantime).
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Eq + Hash,
        K: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).is_some()
    }

    /// Runs a closure on the entry of a key, without cloning the value.
    ///
    /// If the key is present, returns the closure's result; otherwise returns `None`. The entry
    /// is only guaranteed alive for the duration of the closure.
    pub fn extract<T, Q, F>(&self, key: &Q, f: F) -> Option<T>
    where
        Q: ?Sized + Eq + Hash,
        K: Borrow<Q>,
        F: FnOnce(&K, &V) -> T,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).map(|(k, v)| f(k, v))
    }

    /// The number of entries currently in the map.
    ///
    /// This scans the whole table and is not linearizable with the other operations ‒ concurrent
    /// updates may or may not be reflected.
    pub fn len(&self) -> usize {
        let pin = self.raw.pin();
        self.raw.len(&pin)
    }

    /// Checks if the map is currently empty.
    ///
    /// The same caveats as for [`len`][ConMap::len] apply.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries, retiring them to the epoch pool.
    pub fn clear(&self) {
        let pin = self.raw.pin();
        self.raw.clear(&pin);
    }
}

impl<K, V, S> ConMap<K, V, S>
where
    K: Hash + Eq + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    /// Inserts a new entry, unless the key is already taken.
    ///
    /// Returns `None` when the entry went in. When the key is already present the map is *not*
    /// modified and the resident value is returned; use [`upsert`][ConMap::upsert] to overwrite.
    /// Of several concurrent inserts of the same key, exactly one gets `None`.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let pin = self.raw.pin();
        self.raw.insert((key, value), &pin).map(|(_, v)| v.clone())
    }

    /// Looks up a value.
    ///
    /// This clones the stored value; see [`extract`][ConMap::extract] for reading without a
    /// clone.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Eq + Hash,
        K: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).map(|(_, v)| v.clone())
    }

    /// Looks up a value or inserts the provided one.
    ///
    /// Either way an owned copy of the value bound to the key is returned, together with the
    /// information which of the two happened.
    pub fn get_or_insert(&self, key: K, value: V) -> ExistingOrNew<V> {
        self.get_or_insert_with(key, || value)
    }

    /// Looks up a value or inserts a newly created one.
    ///
    /// The closure runs only when the lookup comes up empty. The lookup and the insert are two
    /// separate steps, though: a concurrent insert of the same key can land between them, in
    /// which case the freshly created value is discarded and the winner's value is returned.
    pub fn get_or_insert_with<F>(&self, key: K, create: F) -> ExistingOrNew<V>
    where
        F: FnOnce() -> V,
    {
        let pin = self.raw.pin();
        if let Some((_, existing)) = self.raw.get(&key, &pin) {
            return ExistingOrNew::found(existing.clone());
        }
        let value = create();
        let kept = value.clone();
        match self.raw.insert((key, value), &pin) {
            Some((_, existing)) => ExistingOrNew::found(existing.clone()),
            None => ExistingOrNew::inserted(kept),
        }
    }

    /// Inserts a value computed from the one currently present, if any.
    ///
    /// The entry of `key` becomes `f(None)` when absent or `f(Some(&current))` when present; the
    /// prior value is returned. The closure must be pure ‒ when several threads race on the same
    /// key it can be invoked several times, and only the winning result is stored.
    pub fn upsert<F>(&self, key: K, f: F) -> Option<V>
    where
        K: Clone,
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
}

impl<K, V, S> ConMap<K, V, S>
where
    K: Hash + Eq + 'static,
    V: 'static,
{
    /// Returns an iterator through the entries of the map.
    ///
    /// The iterator yields owned clones of the entries. Each bucket is read as a consistent
    /// snapshot, the map as a whole is not ‒ entries inserted or removed during the iteration
    /// may or may not be observed.
    pub fn iter(&self) -> Iter<K, V, S> {
        Iter {
            inner: raw::iterator::Iter::new(&self.raw),
        }
    }
}

impl<K, V> Default for ConMap<K, V>
where
    K: Hash + Eq + 'static,
    V: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Debug for ConMap<K, V, S>
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

impl<K, V, S> Clone for ConMap<K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
    S: Clone + BuildHasher,
{
    fn clone(&self) -> Self {
        let builder = self.raw.hash_builder().clone();
        let mut new = Self::with_hasher(builder);
        new.extend(self.iter());
        new
    }
}

impl<'a, K, V, S> IntoIterator for &'a ConMap<K, V, S>
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

impl<'a, K, V, S> Extend<(K, V)> for &'a ConMap<K, V, S>
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
            // Match the semantics of the std collections: later entries win.
            self.upsert(k, |_| v.clone());
        }
    }
}

impl<K, V, S> Extend<(K, V)> for ConMap<K, V, S>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = (K, V)>,
    {
        let mut me: &ConMap<_, _, _> = self;
        me.extend(iter);
    }
}

impl<K, V> FromIterator<(K, V)> for ConMap<K, V>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + 'static,
{
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (K, V)>,
    {
        let mut me = ConMap::new();
        me.extend(iter);
        me
    }
}

#[cfg(feature = "rayon")]
impl<'a, K, V, S> ParallelExtend<(K, V)> for &'a ConMap<K, V, S>
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
impl<K, V, S> ParallelExtend<(K, V)> for ConMap<K, V, S>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Sync,
{
    fn par_extend<T>(&mut self, par_iter: T)
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        let mut me: &ConMap<_, _, _> = self;
        me.par_extend(par_iter);
    }
}

#[cfg(feature = "rayon")]
impl<K, V> FromParallelIterator<(K, V)> for ConMap<K, V>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_par_iter<T>(par_iter: T) -> Self
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        let mut me = ConMap::new();
        me.par_extend(par_iter);
        me
    }
}
