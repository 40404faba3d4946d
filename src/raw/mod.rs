//! The core implementation of the concurrent hash table.
//!
//! This module contains the [`Raw`][crate::raw::Raw] type, which is the engine of all the data
//! structures in this crate. This is exposed to allow wrapping it into further APIs, but is
//! probably not the best thing for general use.
//!
//! The table is an array of *buckets*, each a single atomic word. The word is either null (an
//! empty bucket), a pointer to an immutable list of entry slots, or a sentinel tagged in its low
//! bits (see [`BucketFlags`]). Updates never modify a list in place; they build a replacement and
//! publish it with one compare-and-swap, handing the displaced list to the epoch pool. Readers
//! therefore never block, and the CAS is the only synchronizing primitive on the write path.
//!
//! Growth works by hanging a twice-as-large table off the current one and migrating buckets
//! cooperatively: any update that meets the old table moves its own bucket (and a few more) before
//! carrying on in the new one. A migrated bucket is stamped `FORWARDED`, which readers follow.

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash, Hasher};
use std::iter;
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;
use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use crossbeam_utils::Backoff;
use smallvec::SmallVec;

pub mod config;
pub mod debug;
pub mod iterator;
mod pool;

use self::config::Config;
use self::pool::Pool;

/// How many entries a bucket may hold before an insert into it starts a resize.
///
/// Lists stay short because of this, which is what keeps the copy-on-update scheme cheap.
pub const MAX_BUCKET_ENTRIES: usize = 8;

/// How many buckets an update migrates, beyond its own, when it finds a resize in progress.
const COPY_CHUNK: usize = 16;

/// Initial bucket count used by the plain constructors of the wrappers.
pub const DEFAULT_CAPACITY: usize = 16;

/// Finalizes a hash that came out of a non-avalanching hasher.
///
/// The multiplier is odd, so the multiplication permutes `u64`; the xor-shift folds the high bits
/// back down into the ones used for bucket selection. Constants are the splitmix64 finalizer ones.
fn remix(hash: u64) -> u64 {
    let x = hash.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^ (x >> 31)
}

bitflags! {
    /// Flags living in the unused low bits of a bucket word.
    ///
    /// Bucket lists align to at least a machine word, so the two bottom bits of the pointer are
    /// free. This is checked by an assert in the constructor.
    struct BucketFlags: usize {
        /// The bucket's entries have moved to the next table, which is now authoritative for
        /// every key hashing here. Terminal: the word never changes again.
        const FORWARDED = 0b01;
        /// A resize worker is copying this bucket right now. Nobody else may touch the word until
        /// the worker replaces this with `FORWARDED`.
        const BUSY = 0b10;
    }
}

/// Extracts [`BucketFlags`] from a bucket word.
fn bf<T>(node: Shared<T>) -> BucketFlags {
    BucketFlags::from_bits(node.tag()).expect("Invalid bucket flags")
}

// A bucket's entry list. Almost always 0‒4 entries (resizing keeps it under
// MAX_BUCKET_ENTRIES), so the inline capacity avoids a second allocation for the common case
// while still allowing longer lists under pathological hashing.
pub(crate) type Bucket<C> = SmallVec<[<C as Config>::Slot; 4]>;

/// One level of the table: a power-of-two array of buckets plus the migration bookkeeping.
pub(crate) struct Table<C: Config> {
    pub(crate) buckets: Box<[Atomic<Bucket<C>>]>,
    pub(crate) mask: usize,
    /// The destination table while a resize is running, null otherwise. Stays set after the
    /// resize finishes so that late readers can still chase forward markers.
    pub(crate) next: Atomic<Table<C>>,
    /// How many of our buckets carry the forward marker. The worker that forwards the last one
    /// promotes `next` to root.
    forwarded: AtomicUsize,
    /// Hands out bucket indexes to cooperating migrators.
    claim: AtomicUsize,
}

impl<C: Config> Table<C> {
    fn new(capacity: usize) -> Self {
        let buckets: Box<[_]> = iter::repeat_with(Atomic::null).take(capacity).collect();
        Table {
            buckets,
            mask: capacity - 1,
            next: Atomic::null(),
            forwarded: AtomicUsize::new(0),
            claim: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }
}

impl<C: Config> Drop for Table<C> {
    fn drop(&mut self) {
        // &mut self: no concurrent accesses any more, so unprotected loads and Relaxed are fine.
        // Only our own buckets are freed here; the `next` table is either long gone (a promoted
        // table never owns its successor) or freed separately by whoever detached the chain.
        let pin = unsafe { crossbeam_epoch::unprotected() };
        for bucket in &*self.buckets {
            let node = bucket.load(Ordering::Relaxed, pin);
            if node.is_null() {
                // Covers both empty and forwarded buckets.
                continue;
            }
            let mut list = unsafe { node.with_tag(0).into_owned() };
            for slot in list.drain(..) {
                unsafe { C::drop_slot(slot) };
            }
        }
    }
}

/// The raw growable hash table.
///
/// This provides the low level data structure. It does provide the lock-free operations on some
/// values. On the other hand, it does not provide a user friendly interface. It is designed to
/// separate the single implementation of the core algorithm and provide a way to wrap it into
/// different interfaces for different use cases.
///
/// The types stored inside and their in-bucket representation are described by the [`Config`]
/// type parameter and can be customized using that.
///
/// As a general rule, this data structure takes a [`crossbeam_epoch`] [`Guard`] and returns
/// borrowed data whenever appropriate. Note that even methods that would return owned values in
/// a single-threaded structure (eg. [`remove`][Raw::remove]) return borrowed values here. This is
/// because some other thread might still be accessing them; they are scheduled for destruction
/// once the epoch moves on. Guards must come from [`pin`][Raw::pin] of the same table so they
/// belong to the right pool.
pub struct Raw<C: Config, S> {
    hash_builder: S,
    root: Atomic<Table<C>>,
    initial_buckets: usize,
    pool: Pool,
    _slots: PhantomData<C::Slot>,
}

impl<C, S> Raw<C, S>
where
    C: Config,
    S: BuildHasher,
{
    /// Constructs a table with about `capacity` buckets, retiring garbage into the process-wide
    /// epoch pool.
    pub fn with_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::with_pool(capacity, hash_builder, Pool::Global)
    }

    /// Constructs a table that owns its epoch pool.
    ///
    /// Everything the table retires is destroyed no later than when the table is dropped, at the
    /// cost of a slower pin on every operation.
    pub fn with_private_pool(capacity: usize, hash_builder: S) -> Self {
        Self::with_pool(capacity, hash_builder, Pool::Owned(crossbeam_epoch::Collector::new()))
    }

    fn with_pool(capacity: usize, hash_builder: S, pool: Pool) -> Self {
        // Internal sanity check; this cannot fail for any real slot type, because SmallVec always
        // contains an usize. If it ever does fail, open a bug report.
        assert!(
            mem::align_of::<Bucket<C>>().trailing_zeros() >= BucketFlags::all().bits().count_ones(),
            "BUG: Alignment of the bucket list is not large enough to store the state flags",
        );
        let buckets = capacity.max(1).next_power_of_two();
        Self {
            hash_builder,
            root: Atomic::new(Table::new(buckets)),
            initial_buckets: buckets,
            pool,
            _slots: PhantomData,
        }
    }

    /// Computes the mixed hash of a key.
    fn mixed_hash<Q>(&self, key: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        let hash = hasher.finish();
        if C::AVALANCHING {
            hash
        } else {
            remix(hash)
        }
    }

    /// Loads a bucket word, waiting out any in-flight migration of it.
    ///
    /// The wait is bounded: a claimed bucket is finished in time proportional to its (short)
    /// list. Returns a word that is either stable or forwarded.
    fn load_stable<'g>(bucket: &Atomic<Bucket<C>>, pin: &'g Guard) -> Shared<'g, Bucket<C>> {
        let backoff = Backoff::new();
        loop {
            let node = bucket.load(Ordering::Acquire, pin);
            if !bf(node).contains(BucketFlags::BUSY) {
                return node;
            }
            backoff.snooze();
        }
    }

    /// Looks up a value.
    ///
    /// The read path never helps a resize; it only chases forward markers into newer tables.
    pub fn get<'r, 's, 'p, Q>(&'s self, key: &Q, pin: &'p Guard) -> Option<&'r C::Pair>
    where
        's: 'r,
        'p: 'r,
        Q: ?Sized + Eq + Hash,
        C::Key: Borrow<Q>,
    {
        let mixed = self.mixed_hash(key);
        let mut table = unsafe { self.root.load(Ordering::Acquire, pin).deref() };
        loop {
            let idx = mixed as usize & table.mask;
            let node = Self::load_stable(&table.buckets[idx], pin);
            if bf(node).contains(BucketFlags::FORWARDED) {
                table = unsafe {
                    table
                        .next
                        .load(Ordering::Acquire, pin)
                        .as_ref()
                        .expect("Forward marker without a next table")
                };
                continue;
            }
            let list = unsafe { node.as_ref() }?;
            return list
                .iter()
                .find(|slot| unsafe { C::matches(slot, mixed, key) })
                .map(|slot| unsafe { C::pair_of(slot) });
        }
    }

    /// Resolves the authoritative bucket of a key on the update path.
    ///
    /// Unlike readers, updates cooperate with a pending resize: before moving on to the next
    /// table they migrate their own bucket and a chunk of others, so a started resize always
    /// finishes as long as updates keep flowing.
    fn locate_for_update<'g>(
        &self,
        mixed: u64,
        pin: &'g Guard,
    ) -> (&'g Table<C>, usize, Shared<'g, Bucket<C>>) {
        let mut table = unsafe { self.root.load(Ordering::Acquire, pin).deref() };
        loop {
            let idx = mixed as usize & table.mask;
            if let Some(next) = unsafe { table.next.load(Ordering::Acquire, pin).as_ref() } {
                self.migrate_bucket(table, idx, next, pin);
                self.help_migrate(table, next, pin);
                table = next;
                continue;
            }
            let node = Self::load_stable(&table.buckets[idx], pin);
            if bf(node).contains(BucketFlags::FORWARDED) {
                // A resize started and got to our bucket after the check above.
                table = unsafe {
                    table
                        .next
                        .load(Ordering::Acquire, pin)
                        .as_ref()
                        .expect("Forward marker without a next table")
                };
                continue;
            }
            return (table, idx, node);
        }
    }

    /// Inserts a new entry unless its key is already present.
    ///
    /// Returns `None` when the entry went in, or the resident entry (which is left untouched)
    /// when the key was taken. Concurrent inserts of the same key serialize at the CAS: exactly
    /// one of them gets `None`.
    pub fn insert<'s, 'p, 'r>(&'s self, pair: C::Pair, pin: &'p Guard) -> Option<&'r C::Pair>
    where
        's: 'r,
        'p: 'r,
    {
        let mixed = self.mixed_hash(C::key_of(&pair));
        let mut slot = Some(C::make_slot(mixed, pair));
        loop {
            let (table, idx, node) = self.locate_for_update(mixed, pin);
            let list = unsafe { node.as_ref() };

            let found = {
                let my = slot.as_ref().expect("Slot lost before publishing");
                let key = unsafe { C::key_of(C::pair_of(my)) };
                list.and_then(|l| l.iter().find(|s| unsafe { C::matches(s, mixed, key) }))
            };
            if let Some(existing) = found {
                // Someone else owns the key; our never-published entry goes away right now, no
                // epoch involved.
                unsafe { C::drop_slot(slot.take().expect("Slot lost before publishing")) };
                return Some(unsafe { C::pair_of(existing) });
            }

            let len = list.map_or(0, |l| l.len());
            if len >= MAX_BUCKET_ENTRIES && self.try_grow(table, pin) {
                continue;
            }

            let mut new_list = Bucket::<C>::with_capacity(len + 1);
            if let Some(l) = list {
                new_list.extend(l.iter().map(C::copy_slot));
            }
            new_list.push(slot.take().expect("Slot lost before publishing"));
            match table.buckets[idx].compare_exchange(
                node,
                Owned::new(new_list),
                Ordering::Release,
                Ordering::Relaxed,
                pin,
            ) {
                Ok(_) => {
                    if !node.is_null() {
                        // The displaced list still has readers; its slots were copied, so
                        // dropping it later does not touch the entries of the new list.
                        unsafe { pin.defer_destroy(node) };
                    }
                    return None;
                }
                Err(e) => {
                    // Take our slot back out of the failed list before the copies are dropped.
                    let mut failed = e.new;
                    slot = failed.pop();
                }
            }
        }
    }

    /// Inserts or replaces the entry of a key, returning the prior entry if there was one.
    ///
    /// `with` receives the key and the current entry and produces the replacement. It must be
    /// pure: under contention it can run once per CAS retry and only the winning invocation's
    /// result is published.
    pub fn upsert<'s, 'p, 'r, F>(
        &'s self,
        key: C::Key,
        mut with: F,
        pin: &'p Guard,
    ) -> Option<&'r C::Pair>
    where
        's: 'r,
        'p: 'r,
        F: FnMut(&C::Key, Option<&C::Pair>) -> C::Pair,
    {
        let mixed = self.mixed_hash(&key);
        loop {
            let (table, idx, node) = self.locate_for_update(mixed, pin);
            let list = unsafe { node.as_ref() };
            let pos = list.and_then(|l| {
                l.iter()
                    .position(|s| unsafe { C::matches(s, mixed, &key) })
            });

            let len = list.map_or(0, |l| l.len());
            if pos.is_none() && len >= MAX_BUCKET_ENTRIES && self.try_grow(table, pin) {
                continue;
            }

            let prior = pos.map(|i| &list.expect("Matched a slot in an empty bucket")[i]);
            let pair = with(&key, prior.map(|s| unsafe { C::pair_of(s) }));
            let mut new_list = Bucket::<C>::with_capacity(len + 1 - pos.map_or(0, |_| 1));
            if let Some(l) = list {
                new_list.extend(
                    l.iter()
                        .enumerate()
                        .filter(|(i, _)| Some(*i) != pos)
                        .map(|(_, s)| C::copy_slot(s)),
                );
            }
            new_list.push(C::make_slot(mixed, pair));
            match table.buckets[idx].compare_exchange(
                node,
                Owned::new(new_list),
                Ordering::Release,
                Ordering::Relaxed,
                pin,
            ) {
                Ok(_) => {
                    if let Some(s) = prior {
                        unsafe {
                            C::retire_slot(s, pin);
                            pin.defer_destroy(node);
                        }
                        // Retired, but the pin keeps it alive for the caller.
                        return Some(unsafe { C::pair_of(s) });
                    }
                    if !node.is_null() {
                        unsafe { pin.defer_destroy(node) };
                    }
                    return None;
                }
                Err(e) => {
                    let mut failed = e.new;
                    let fresh = failed.pop().expect("Replacement list published empty");
                    unsafe { C::drop_slot(fresh) };
                }
            }
        }
    }

    /// Removes the entry of a key, returning it if it was present.
    pub fn remove<'r, 's, 'p, Q>(&'s self, key: &Q, pin: &'p Guard) -> Option<&'r C::Pair>
    where
        's: 'r,
        'p: 'r,
        Q: ?Sized + Eq + Hash,
        C::Key: Borrow<Q>,
    {
        let mixed = self.mixed_hash(key);
        loop {
            let (table, idx, node) = self.locate_for_update(mixed, pin);
            let list = match unsafe { node.as_ref() } {
                Some(list) => list,
                None => return None,
            };
            let pos = match list.iter().position(|s| unsafe { C::matches(s, mixed, key) }) {
                Some(pos) => pos,
                None => return None,
            };

            let new = if list.len() == 1 {
                Shared::null()
            } else {
                let mut copy = Bucket::<C>::with_capacity(list.len() - 1);
                copy.extend(
                    list.iter()
                        .enumerate()
                        .filter(|(i, _)| *i != pos)
                        .map(|(_, s)| C::copy_slot(s)),
                );
                Owned::new(copy).into_shared(pin)
            };
            match table.buckets[idx].compare_exchange(
                node,
                new,
                Ordering::Release,
                Ordering::Relaxed,
                pin,
            ) {
                Ok(_) => {
                    let removed = &list[pos];
                    unsafe {
                        C::retire_slot(removed, pin);
                        pin.defer_destroy(node);
                    }
                    return Some(unsafe { C::pair_of(removed) });
                }
                Err(_) => {
                    // We built the copy as Shared already, so it is on us to free it.
                    if !new.is_null() {
                        drop(unsafe { new.into_owned() });
                    }
                }
            }
        }
    }

    /// Starts a resize of `table` if it is the current root and none is running.
    ///
    /// Returns whether a resize is in progress afterwards. Only the root may start one, so there
    /// is always at most one migration running and destination buckets in the next table stay
    /// private to their migrator until forwarded.
    fn try_grow(&self, table: &Table<C>, pin: &Guard) -> bool {
        if !table.next.load(Ordering::Acquire, pin).is_null() {
            return true;
        }
        if !ptr::eq(self.root.load(Ordering::Acquire, pin).as_raw(), table) {
            // Not authoritative yet (we are a mid-promotion next table); the trigger fires again
            // once this table is root.
            return false;
        }
        let fresh = Owned::new(Table::new(table.len() * 2));
        // Either we publish it or someone else beat us to it; both mean a resize is running. A
        // lost race drops `fresh` with the returned error.
        let _ = table.next.compare_exchange(
            Shared::null(),
            fresh,
            Ordering::AcqRel,
            Ordering::Relaxed,
            pin,
        );
        true
    }

    /// Moves one bucket of `table` into `next`, or waits until whoever claimed it is done.
    ///
    /// Wait-free once the claim succeeds: the claimant re-hashes the entries into their two
    /// destination buckets, publishes those with plain stores (they are invisible to others
    /// until the forward marker lands) and then stamps the old bucket.
    fn migrate_bucket(&self, table: &Table<C>, idx: usize, next: &Table<C>, pin: &Guard) {
        let backoff = Backoff::new();
        loop {
            let node = table.buckets[idx].load(Ordering::Acquire, pin);
            let flags = bf(node);
            if flags.contains(BucketFlags::FORWARDED) {
                return;
            }
            if flags.contains(BucketFlags::BUSY) {
                backoff.snooze();
                continue;
            }
            if table.buckets[idx]
                .compare_exchange(
                    node,
                    node.with_tag(BucketFlags::BUSY.bits()),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                    pin,
                )
                .is_err()
            {
                continue;
            }

            // Claimed. Under doubling, entries of bucket i can only land in buckets i and
            // i + len of the next table, and nobody may touch those until we forward.
            if let Some(list) = unsafe { node.as_ref() } {
                for &dst in &[idx, idx + table.len()] {
                    let mut moved = Bucket::<C>::new();
                    for slot in list.iter() {
                        let key = unsafe { C::key_of(C::pair_of(slot)) };
                        if self.mixed_hash(key) as usize & next.mask == dst {
                            moved.push(C::copy_slot(slot));
                        }
                    }
                    if !moved.is_empty() {
                        next.buckets[dst].store(Owned::new(moved), Ordering::Release);
                    }
                }
            }
            table.buckets[idx].store(
                Shared::null().with_tag(BucketFlags::FORWARDED.bits()),
                Ordering::Release,
            );
            if !node.is_null() {
                unsafe { pin.defer_destroy(node) };
            }
            if table.forwarded.fetch_add(1, Ordering::AcqRel) + 1 == table.len() {
                self.promote(table, pin);
            }
            return;
        }
    }

    /// Claims up to [`COPY_CHUNK`] not-yet-migrated buckets and moves them.
    fn help_migrate(&self, table: &Table<C>, next: &Table<C>, pin: &Guard) {
        for _ in 0..COPY_CHUNK {
            let idx = table.claim.fetch_add(1, Ordering::Relaxed);
            if idx >= table.len() {
                return;
            }
            self.migrate_bucket(table, idx, next, pin);
        }
    }

    /// Swaps the fully-forwarded root table for its successor and retires it.
    fn promote(&self, table: &Table<C>, pin: &Guard) {
        let next = table.next.load(Ordering::Acquire, pin);
        let root = self.root.load(Ordering::Acquire, pin);
        if !ptr::eq(root.as_raw(), table) {
            // `clear` got here first; the chain it detached includes us and it will free us.
            return;
        }
        if self
            .root
            .compare_exchange(root, next, Ordering::AcqRel, Ordering::Relaxed, pin)
            .is_ok()
        {
            // All its buckets are forwarded (null), so dropping it later frees just the array.
            unsafe { pin.defer_destroy(root) };
        }
    }

    /// Counts the entries by scanning every bucket.
    ///
    /// Not linearizable: concurrent updates may or may not be reflected, and the scan itself is
    /// not atomic across buckets.
    pub fn len(&self, pin: &Guard) -> usize {
        let table = unsafe { self.root.load(Ordering::Acquire, pin).deref() };
        (0..table.len())
            .map(|idx| Self::bucket_len(table, idx, pin))
            .sum()
    }

    fn bucket_len(table: &Table<C>, idx: usize, pin: &Guard) -> usize {
        let node = Self::load_stable(&table.buckets[idx], pin);
        if bf(node).contains(BucketFlags::FORWARDED) {
            let next = unsafe {
                table
                    .next
                    .load(Ordering::Acquire, pin)
                    .as_ref()
                    .expect("Forward marker without a next table")
            };
            return Self::bucket_len(next, idx, pin) + Self::bucket_len(next, idx + table.len(), pin);
        }
        unsafe { node.as_ref() }.map_or(0, |list| list.len())
    }

    /// Drops every entry by swapping in a fresh table of the initial capacity.
    ///
    /// The detached chain is destroyed once no thread can reference it any more. Operations that
    /// overlap the call may land in the old chain; they linearize before the clear.
    pub fn clear(&self, pin: &Guard) {
        let fresh = Owned::new(Table::new(self.initial_buckets));
        let old = self.root.swap(fresh, Ordering::AcqRel, pin);
        let mut raw = old.as_raw() as *mut Table<C>;
        unsafe {
            pin.defer_unchecked(move || {
                // By the time this runs, every operation that could reach or extend the detached
                // chain has unpinned, so walking the next pointers is safe and complete.
                while !raw.is_null() {
                    let table = Owned::<Table<C>>::from_raw(raw);
                    raw = table
                        .next
                        .load(Ordering::Relaxed, crossbeam_epoch::unprotected())
                        .as_raw() as *mut Table<C>;
                    drop(table);
                }
            });
        }
    }
}

impl<C: Config, S> Raw<C, S> {
    /// Marks the calling thread active in this table's epoch pool.
    ///
    /// Every operation needs a guard obtained here; holding it is what keeps borrowed entries
    /// alive.
    pub fn pin(&self) -> Guard {
        self.pool.pin()
    }

    /// Access to the hasher the table was built with.
    pub fn hash_builder(&self) -> &S {
        &self.hash_builder
    }
}

impl<C: Config, S> Drop for Raw<C, S> {
    fn drop(&mut self) {
        /*
         * Notes about unsafety here:
         * * We are in a destructor and that one is &mut self. There are no concurrent accesses to
         *   this data structure any more, therefore we can safely assume we are the only ones
         *   looking at the pointers inside.
         * * Therefore, using unprotected is also fine.
         * * Similarly, the Relaxed ordering here is fine too, as the whole data structure must
         *   have been synchronized into our thread already by this time.
         */
        let pin = unsafe { crossbeam_epoch::unprotected() };
        let mut raw = self.root.load(Ordering::Relaxed, pin).as_raw() as *mut Table<C>;
        while !raw.is_null() {
            let table = unsafe { Owned::<Table<C>>::from_raw(raw) };
            raw = table.next.load(Ordering::Relaxed, pin).as_raw() as *mut Table<C>;
            drop(table);
        }
        // If the pool is table-owned it is dropped right after this body, which runs whatever
        // deferred destructors are still outstanding.
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::hash_map::RandomState;

    use super::config::Trivial as TrivialConfig;
    use super::*;

    // A hasher to create collisions on purpose. Let's make the hash table into a glorified list.
    // We allow tests in higher-level modules to reuse it for their tests.
    pub(crate) struct NoHasher;

    impl Hasher for NoHasher {
        fn finish(&self) -> u64 {
            0
        }

        fn write(&mut self, _: &[u8]) {}
    }

    impl BuildHasher for NoHasher {
        type Hasher = NoHasher;

        fn build_hasher(&self) -> NoHasher {
            NoHasher
        }
    }

    // Keys hashed by NoHasher all share a bucket; staying below the resize trigger keeps such
    // tests from doubling the table on every insert.
    pub(crate) const COLLIDING_KEYS: usize = MAX_BUCKET_ENTRIES - 1;

    #[test]
    fn consts_consistent() {
        assert!(MAX_BUCKET_ENTRIES >= 2);
        assert!(COPY_CHUNK >= 1);
        assert!(DEFAULT_CAPACITY.is_power_of_two());
        assert_eq!(
            BucketFlags::all().bits(),
            BucketFlags::FORWARDED.bits() | BucketFlags::BUSY.bits()
        );
        assert_eq!(0, BucketFlags::FORWARDED.bits() & BucketFlags::BUSY.bits());
    }

    #[test]
    fn remix_spreads_small_keys() {
        // Sequential keys must not land in sequential buckets only by their low bits.
        let a = remix(1);
        let b = remix(2);
        assert_ne!(a, b);
        assert_ne!(a & 0xffff, b & 0xffff);
        assert_ne!(a >> 48, b >> 48);
    }

    #[test]
    fn insert_get_remove() {
        let map = Raw::<TrivialConfig<usize>, _>::with_hasher(4, RandomState::new());
        let pin = map.pin();
        assert!(map.insert(42, &pin).is_none());
        assert_eq!(Some(&42), map.get(&42, &pin));
        assert_eq!(None, map.get(&43, &pin));
        assert_eq!(Some(&42), map.remove(&42, &pin));
        assert_eq!(None, map.get(&42, &pin));
        assert_eq!(None, map.remove(&42, &pin));
    }

    #[test]
    fn duplicate_insert_keeps_resident() {
        let map = Raw::<TrivialConfig<usize>, _>::with_hasher(4, RandomState::new());
        let pin = map.pin();
        assert!(map.insert(7, &pin).is_none());
        // The second insert must not touch the table.
        assert_eq!(Some(&7), map.insert(7, &pin));
        assert_eq!(1, map.len(&pin));
    }

    #[test]
    fn grows_from_single_bucket() {
        let mut map = Raw::<TrivialConfig<usize>, _>::with_hasher(1, RandomState::new());
        {
            let pin = map.pin();
            for i in 0..10_000 {
                assert!(map.insert(i, &pin).is_none());
            }
            for i in 0..10_000 {
                assert_eq!(Some(&i), map.get(&i, &pin));
            }
            assert_eq!(10_000, map.len(&pin));
        }
        map.assert_consistent();
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let map = Raw::<TrivialConfig<usize>, _>::with_hasher(4, RandomState::new());
        let pin = map.pin();
        assert!(map.upsert(1, |k, prior| {
            assert!(prior.is_none());
            *k
        }, &pin).is_none());
        let prior = map.upsert(1, |k, prior| {
            assert_eq!(Some(&1), prior);
            *k
        }, &pin);
        assert_eq!(Some(&1), prior);
        assert_eq!(1, map.len(&pin));
    }

    #[test]
    fn collisions_share_a_bucket() {
        let mut map = Raw::<TrivialConfig<usize>, _>::with_hasher(4, NoHasher);
        {
            let pin = map.pin();
            for i in 0..COLLIDING_KEYS {
                assert!(map.insert(i, &pin).is_none());
            }

            eprintln!("{}", debug::PrintShape(&map));
            for i in 0..COLLIDING_KEYS {
                assert_eq!(Some(&i), map.get(&i, &pin));
            }
            assert_eq!(COLLIDING_KEYS, map.len(&pin));
            for i in 0..COLLIDING_KEYS {
                assert_eq!(Some(&i), map.remove(&i, &pin));
            }
            assert_eq!(0, map.len(&pin));
        }
        map.assert_consistent();
    }

    #[test]
    fn clear_drops_everything() {
        let mut map = Raw::<TrivialConfig<usize>, _>::with_hasher(2, RandomState::new());
        {
            let pin = map.pin();
            for i in 0..1_000 {
                map.insert(i, &pin);
            }
            map.clear(&pin);
            assert_eq!(0, map.len(&pin));
            assert_eq!(None, map.get(&0, &pin));
            // Still usable afterwards.
            assert!(map.insert(5, &pin).is_none());
            assert_eq!(Some(&5), map.get(&5, &pin));
        }
        map.assert_consistent();
    }

    #[test]
    fn private_pool_round_trip() {
        let map = Raw::<TrivialConfig<usize>, _>::with_private_pool(2, RandomState::new());
        let pin = map.pin();
        for i in 0..100 {
            assert!(map.insert(i, &pin).is_none());
        }
        assert_eq!(100, map.len(&pin));
        drop(pin);
        drop(map);
    }

    // A configuration that declares its hasher avalanching; the engine must then use the digest
    // verbatim and everything still works.
    struct PreMixed;

    impl Config for PreMixed {
        type Key = u64;
        type Pair = u64;
        type Slot = u64;

        const AVALANCHING: bool = true;

        fn key_of(pair: &u64) -> &u64 {
            pair
        }
        fn make_slot(_mixed: u64, pair: u64) -> u64 {
            pair
        }
        fn copy_slot(slot: &u64) -> u64 {
            *slot
        }
        unsafe fn matches<Q>(slot: &u64, _mixed: u64, key: &Q) -> bool
        where
            u64: Borrow<Q>,
            Q: ?Sized + Eq,
        {
            slot.borrow() == key
        }
        unsafe fn pair_of(slot: &u64) -> &u64 {
            slot
        }
        unsafe fn retire_slot(_slot: &u64, _pin: &Guard) {}
        unsafe fn drop_slot(slot: u64) {
            drop(slot);
        }
    }

    #[test]
    fn avalanching_hash_used_verbatim() {
        let map = Raw::<PreMixed, _>::with_hasher(8, RandomState::new());
        let pin = map.pin();
        for i in 0..1_000u64 {
            assert!(map.insert(i, &pin).is_none());
        }
        for i in 0..1_000u64 {
            assert_eq!(Some(&i), map.get(&i, &pin));
        }
    }
}
