//! The [`ConSet`] and other related structures.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::hash::{BuildHasher, Hash};
use std::iter::FromIterator;

#[cfg(feature = "rayon")]
use rayon::iter::{FromParallelIterator, IntoParallelIterator, ParallelExtend, ParallelIterator};

use crate::raw::config::Trivial as TrivialConfig;
use crate::raw::{self, Raw, DEFAULT_CAPACITY};

/// A concurrent lock-free set.
///
/// The values are stored directly inside the bucket slots, so looking up (or removing) always
/// hands out copies made with the `Clone` trait, and republishing a bucket clones what is in it.
/// Therefore the set is most suitable for types that are cheap to copy (eg. `u64` or `IpAddr`).
///
/// If you intend to store types that are more expensive to make copies of or are not `Clone`,
/// you can wrap them in an `Arc` (eg. `Arc<str>`).
///
/// ```rust
/// use conhash::ConSet;
/// use crossbeam_utils::thread;
///
/// let set = ConSet::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         set.insert("hello");
///     });
///     s.spawn(|_| {
///         set.insert("world");
///     });
/// }).unwrap();
///
/// assert_eq!(Some("hello"), set.get("hello"));
/// assert_eq!(Some("world"), set.get("world"));
/// assert_eq!(None, set.get("universe"));
/// set.remove("world");
/// assert_eq!(None, set.get("world"));
/// ```
///
/// ```rust
/// use conhash::set::ConSet;
/// let set: ConSet<usize> = ConSet::new();
///
/// set.insert(0);
/// set.insert(1);
///
/// assert!(set.contains(&1));
///
/// set.remove(&1);
/// assert!(!set.contains(&1));
///
/// set.remove(&0);
/// assert!(set.is_empty());
/// ```
pub struct ConSet<T, S = RandomState>
where
    T: Clone + Hash + Eq + 'static,
{
    raw: Raw<TrivialConfig<T>, S>,
}

impl<T> ConSet<T, RandomState>
where
    T: Clone + Hash + Eq + 'static,
{
    /// Creates a new empty set.
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, RandomState::default())
    }

    /// Creates a new empty set with space for about `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }

    /// Creates a new empty set that owns its epoch pool.
    ///
    /// See [`ConMap::with_private_pool`][crate::ConMap::with_private_pool]; the same trade-off
    /// applies here.
    pub fn with_private_pool(capacity: usize) -> Self {
        Self {
            raw: Raw::with_private_pool(capacity, RandomState::default()),
        }
    }
}

impl<T, S> ConSet<T, S>
where
    T: Clone + Hash + Eq + 'static,
    S: BuildHasher,
{
    /// Creates a new empty set with the given hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hasher)
    }

    /// Creates a new empty set with the provided capacity and hasher.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            raw: Raw::with_hasher(capacity, hasher),
        }
    }

    /// Inserts a new value into the set.
    ///
    /// Returns whether the value went in; a value equal to an already present one is dropped and
    /// the set stays untouched. Of several concurrent inserts of equal values, exactly one
    /// returns true.
    pub fn insert(&self, value: T) -> bool {
        let pin = self.raw.pin();
        self.raw.insert(value, &pin).is_none()
    }

    /// Looks up a value in the set.
    ///
    /// This creates a copy of the stored value. It is mostly useful for types where only part of
    /// the value participates in `Hash` and `Eq`.
    pub fn get<Q>(&self, key: &Q) -> Option<T>
    where
        Q: ?Sized + Eq + Hash,
        T: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).cloned()
    }

    /// Checks if a value identified by the given key is present in the set.
    ///
    /// Note that by the time you can act on it, the presence of the value can change (eg. other
    /// thread can add or remove it in the meantime).
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Eq + Hash,
        T: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.get(key, &pin).is_some()
    }

    /// Removes a value identified by the given key, returning it.
    pub fn remove<Q>(&self, key: &Q) -> Option<T>
    where
        Q: ?Sized + Eq + Hash,
        T: Borrow<Q>,
    {
        let pin = self.raw.pin();
        self.raw.remove(key, &pin).cloned()
    }

    /// The number of values in the set.
    ///
    /// This scans the whole table and is not linearizable with the other operations.
    pub fn len(&self) -> usize {
        let pin = self.raw.pin();
        self.raw.len(&pin)
    }

    /// Checks if the set is currently empty.
    ///
    /// Note that due to being concurrent, the use-case of this method is mostly for debugging
    /// purposes, because the state can change between reading the value and acting on it.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all values, retiring them to the epoch pool.
    pub fn clear(&self) {
        let pin = self.raw.pin();
        self.raw.clear(&pin);
    }
}

impl<T> Default for ConSet<T, RandomState>
where
    T: Clone + Hash + Eq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> Debug for ConSet<T, S>
where
    T: Debug + Clone + Hash + Eq + 'static,
{
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let mut d = fmt.debug_set();
        for n in self {
            d.entry(&n);
        }
        d.finish()
    }
}

impl<T, S> ConSet<T, S>
where
    T: Clone + Hash + Eq + 'static,
{
    /// Returns an iterator through the values of the set, yielding copies of them.
    pub fn iter(&self) -> Iter<T, S> {
        Iter {
            inner: raw::iterator::Iter::new(&self.raw),
        }
    }
}

/// The iterator of the [`ConSet`].
///
/// See the [`iter`][ConSet::iter] method for details.
pub struct Iter<'a, T, S>
where
    T: Clone + Hash + Eq + 'static,
{
    inner: raw::iterator::Iter<'a, TrivialConfig<T>, S>,
}

impl<'a, T, S> Iterator for Iter<'a, T, S>
where
    T: Clone + Hash + Eq + 'static,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next().cloned()
    }
}

impl<'a, T, S> IntoIterator for &'a ConSet<T, S>
where
    T: Clone + Hash + Eq + 'static,
{
    type Item = T;
    type IntoIter = Iter<'a, T, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, S> Extend<T> for &'a ConSet<T, S>
where
    T: Clone + Hash + Eq + 'static,
    S: BuildHasher,
{
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = T>,
    {
        for n in iter {
            self.insert(n);
        }
    }
}

impl<T, S> Extend<T> for ConSet<T, S>
where
    T: Clone + Hash + Eq + 'static,
    S: BuildHasher,
{
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut me: &ConSet<_, _> = self;
        me.extend(iter);
    }
}

impl<T> FromIterator<T> for ConSet<T>
where
    T: Clone + Hash + Eq + 'static,
{
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut me = ConSet::new();
        me.extend(iter);
        me
    }
}

#[cfg(feature = "rayon")]
impl<'a, T, S> ParallelExtend<T> for &'a ConSet<T, S>
where
    T: Clone + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Sync,
{
    fn par_extend<I>(&mut self, par_iter: I)
    where
        I: IntoParallelIterator<Item = T>,
    {
        par_iter.into_par_iter().for_each(|n| {
            self.insert(n);
        });
    }
}

#[cfg(feature = "rayon")]
impl<T, S> ParallelExtend<T> for ConSet<T, S>
where
    T: Clone + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Sync,
{
    fn par_extend<I>(&mut self, par_iter: I)
    where
        I: IntoParallelIterator<Item = T>,
    {
        let mut me: &ConSet<_, _> = self;
        me.par_extend(par_iter);
    }
}

#[cfg(feature = "rayon")]
impl<T> FromParallelIterator<T> for ConSet<T>
where
    T: Clone + Hash + Eq + Send + Sync + 'static,
{
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: IntoParallelIterator<Item = T>,
    {
        let mut me = ConSet::new();
        me.par_extend(par_iter);
        me
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_utils::thread;

    use super::*;
    use crate::raw::tests::{NoHasher, COLLIDING_KEYS};

    const TEST_THREADS: usize = 4;
    const TEST_BATCH: usize = 10000;
    const TEST_BATCH_SMALL: usize = 100;
    const TEST_REP: usize = 20;

    #[test]
    fn debug_when_empty() {
        let set: ConSet<String> = ConSet::new();
        assert_eq!("{}".to_owned(), format!("{:?}", set));
    }

    #[test]
    fn debug_with_elements() {
        let set: ConSet<&str> = ConSet::new();
        assert!(set.insert("hello"));
        let repr = format!("{:?}", set);
        // A concurrent set doesn't promise iteration order, so test with one element only.
        assert_eq!("{\"hello\"}".to_owned(), repr);
        assert!(set.remove("hello").is_some());
        assert_eq!("{}".to_owned(), format!("{:?}", set));
    }

    #[test]
    fn create_destroy() {
        let set: ConSet<String> = ConSet::new();
        drop(set);
    }

    #[test]
    fn lookup_empty() {
        let set: ConSet<String> = ConSet::new();
        assert!(set.get("hello").is_none());
    }

    #[test]
    fn insert_lookup() {
        let set = ConSet::new();
        assert!(set.insert("hello"));
        assert!(set.get("world").is_none());
        assert_eq!(Some("hello"), set.get("hello"));
    }

    #[test]
    fn insert_duplicate_is_noop() {
        let set = ConSet::new();
        assert!(set.insert(42));
        assert!(!set.insert(42));
        assert_eq!(1, set.len());
    }

    // Insert a lot of things, to push the set through several resizes.
    #[test]
    fn insert_many() {
        let set = ConSet::with_capacity(1);
        for i in 0..TEST_BATCH {
            assert!(set.insert(i));
        }

        for i in 0..TEST_BATCH {
            assert_eq!(Some(i), set.get(&i));
        }
        assert_eq!(TEST_BATCH, set.len());
    }

    #[test]
    fn par_insert_many() {
        for _ in 0..TEST_REP {
            let set: ConSet<usize> = ConSet::with_capacity(4);
            thread::scope(|s| {
                for t in 0..TEST_THREADS {
                    let set = &set;
                    s.spawn(move |_| {
                        for i in 0..TEST_BATCH {
                            let num = t * TEST_BATCH + i;
                            assert!(set.insert(num));
                        }
                    });
                }
            })
            .unwrap();

            for i in 0..TEST_BATCH * TEST_THREADS {
                assert_eq!(Some(i), set.get(&i));
            }
        }
    }

    #[test]
    fn par_get_many() {
        for _ in 0..TEST_REP {
            let set = ConSet::new();
            for i in 0..TEST_BATCH * TEST_THREADS {
                assert!(set.insert(i));
            }
            thread::scope(|s| {
                for t in 0..TEST_THREADS {
                    let set = &set;
                    s.spawn(move |_| {
                        for i in 0..TEST_BATCH {
                            let num = t * TEST_BATCH + i;
                            assert_eq!(Some(num), set.get(&num));
                        }
                    });
                }
            })
            .unwrap();
        }
    }

    #[test]
    fn collisions() {
        let set = ConSet::with_hasher(NoHasher);
        // While their hash is the same under the hasher, they don't kick each other out.
        for i in 0..COLLIDING_KEYS {
            assert!(set.insert(i));
        }
        for i in 0..COLLIDING_KEYS {
            assert_eq!(Some(i), set.get(&i));
        }
        // And no value kicks another one out.
        for i in 0..COLLIDING_KEYS {
            assert!(!set.insert(i));
        }
    }

    #[test]
    fn simple_remove() {
        let set = ConSet::new();
        assert!(set.remove(&42).is_none());
        assert!(set.insert(42));
        assert_eq!(Some(42), set.get(&42));
        assert_eq!(Some(42), set.remove(&42));
        assert!(set.get(&42).is_none());
        assert!(set.is_empty());
        assert!(set.remove(&42).is_none());
        assert!(set.is_empty());
    }

    fn remove_many_inner<H: BuildHasher>(set: ConSet<usize, H>, len: usize) {
        for i in 0..len {
            assert!(set.insert(i));
        }
        for i in 0..len {
            assert_eq!(Some(i), set.get(&i));
            assert_eq!(Some(i), set.remove(&i));
            assert!(set.get(&i).is_none());
        }

        assert!(set.is_empty());
    }

    #[test]
    fn remove_many() {
        remove_many_inner(ConSet::with_capacity(1), TEST_BATCH);
    }

    #[test]
    fn remove_many_collision() {
        remove_many_inner(ConSet::with_hasher(NoHasher), COLLIDING_KEYS);
    }

    #[test]
    fn remove_par() {
        let set = ConSet::new();
        for i in 0..TEST_THREADS * TEST_BATCH {
            set.insert(i);
        }

        thread::scope(|s| {
            for t in 0..TEST_THREADS {
                let set = &set;
                s.spawn(move |_| {
                    for i in 0..TEST_BATCH {
                        let num = t * TEST_BATCH + i;
                        assert_eq!(Some(num), set.remove(&num));
                    }
                });
            }
        })
        .unwrap();

        assert!(set.is_empty());
    }

    #[test]
    fn clear_empties() {
        let set = ConSet::with_capacity(2);
        for i in 0..TEST_BATCH_SMALL {
            set.insert(i);
        }
        set.clear();
        assert!(set.is_empty());
        assert!(set.insert(7));
        assert!(set.contains(&7));
    }

    #[test]
    fn private_pool_round_trip() {
        let set: ConSet<String> = ConSet::with_private_pool(4);
        for i in 0..TEST_BATCH_SMALL {
            assert!(set.insert(i.to_string()));
        }
        assert_eq!(TEST_BATCH_SMALL, set.len());
        drop(set);
    }

    fn iter_test_inner<S: BuildHasher>(set: ConSet<usize, S>, len: usize) {
        for i in 0..len {
            assert!(set.insert(i));
        }

        let mut extracted = set.iter().collect::<Vec<_>>();

        extracted.sort();
        let expected = (0..len).collect::<Vec<_>>();
        assert_eq!(expected, extracted);
    }

    #[test]
    fn iter() {
        let set = ConSet::new();
        iter_test_inner(set, TEST_BATCH_SMALL);
    }

    #[test]
    fn iter_collision() {
        let set = ConSet::with_hasher(NoHasher);
        iter_test_inner(set, COLLIDING_KEYS);
    }

    #[test]
    fn collect() {
        let set = (0..TEST_BATCH_SMALL).collect::<ConSet<_>>();

        let mut extracted = set.iter().collect::<Vec<_>>();
        extracted.sort();
        let expected = (0..TEST_BATCH_SMALL).collect::<Vec<_>>();
        assert_eq!(expected, extracted);
    }

    #[test]
    fn par_extend() {
        let set = ConSet::new();

        thread::scope(|s| {
            for t in 0..TEST_THREADS {
                let mut set = &set;
                s.spawn(move |_| {
                    let start = t * TEST_BATCH_SMALL;
                    set.extend(start..start + TEST_BATCH_SMALL);
                });
            }
        })
        .unwrap();

        let mut extracted = set.iter().collect::<Vec<_>>();

        extracted.sort();
        let expected = (0..TEST_THREADS * TEST_BATCH_SMALL).collect::<Vec<_>>();

        assert_eq!(expected, extracted);
    }
}
