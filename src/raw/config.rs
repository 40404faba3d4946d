//! Configuration of the raw table, most importantly the entry
//! representation policy.
//!
//! The engine in [`raw`][crate::raw] never looks at keys or values
//! directly. Everything it stores is a *slot* and everything it knows
//! about slots goes through the [`Config`] implementation it is
//! monomorphized over. Two families of configurations exist:
//!
//! * Direct ones ([`Trivial`] and the private map configuration of
//!   [`FlatConMap`][crate::FlatConMap]), where the slot *is* the payload
//!   and copying a bucket list copies the payloads.
//! * Indirect ones (the private configuration of
//!   [`ConMap`][crate::ConMap]), where the slot is a [`TaggedBox`] ‒ a
//!   single word holding a heap pointer plus a 16-bit slice of the hash,
//!   so most negative probes never leave the bucket list.

use std::borrow::Borrow;
use std::hash::Hash;
use std::marker::PhantomData;

use crossbeam_epoch::Guard;

/// Returns the slice of the mixed hash that indirect slots keep next to
/// their pointer.
pub fn hash_tag(mixed: u64) -> u16 {
    (mixed >> 48) as u16
}

/// Describes the types stored in a raw table and how entries of those
/// types are represented inside bucket lists.
///
/// Most methods are associated functions: a configuration is a policy,
/// not a value. The unsafe ones are unsafe because indirect slots carry
/// raw pointers; their common contract is that the slot must not have
/// been retired before the caller's epoch guard was acquired.
pub trait Config {
    /// The key entries are addressed by.
    type Key: Hash + Eq;
    /// The logical entry ‒ a `(K, V)` pair for maps, the key itself for
    /// sets.
    type Pair;
    /// The in-bucket representation of one entry.
    type Slot;

    /// Set this when the hash functor self-declares as avalanching; the
    /// engine then uses its output verbatim instead of post-mixing it.
    const AVALANCHING: bool = false;

    /// Borrows the key out of a logical entry.
    fn key_of(pair: &Self::Pair) -> &Self::Key;

    /// Builds the slot for a new entry. `mixed` is the mixed hash of the
    /// entry's key; indirect configurations fold its top bits into the
    /// slot.
    fn make_slot(mixed: u64, pair: Self::Pair) -> Self::Slot;

    /// Duplicates a slot into a replacement bucket list.
    ///
    /// For direct slots this clones the payload. For indirect slots it
    /// copies the tagged word, so the original and the copy alias the
    /// same heap pair; exactly one published list refers to an entry at
    /// a time, which is what makes [`retire_slot`][Config::retire_slot]
    /// sound.
    fn copy_slot(slot: &Self::Slot) -> Self::Slot;

    /// Checks whether the slot holds the given key. `mixed` must be the
    /// mixed hash of `key`; indirect configurations compare tags before
    /// touching the heap.
    ///
    /// # Safety
    ///
    /// The slot must still be protected by the caller's guard.
    unsafe fn matches<Q>(slot: &Self::Slot, mixed: u64, key: &Q) -> bool
    where
        Self::Key: Borrow<Q>,
        Q: ?Sized + Eq;

    /// Borrows the logical entry held by the slot.
    ///
    /// # Safety
    ///
    /// The slot must still be protected by the caller's guard, and the
    /// returned borrow must not outlive that guard.
    unsafe fn pair_of(slot: &Self::Slot) -> &Self::Pair;

    /// Hands the slot's heap allocation (if any) to the epoch pool. Called
    /// exactly once per logical entry, by the operation that removed or
    /// replaced it.
    ///
    /// # Safety
    ///
    /// The slot must have been unlinked from every published bucket list
    /// reachable by new readers.
    unsafe fn retire_slot(slot: &Self::Slot, pin: &Guard);

    /// Destroys a slot immediately, heap allocation included.
    ///
    /// # Safety
    ///
    /// No other thread may hold a reference to the slot's entry; used for
    /// never-published slots and in single-threaded teardown.
    unsafe fn drop_slot(slot: Self::Slot);
}

/// Configuration for direct entries whose payload is the key itself.
///
/// This is what [`ConSet`][crate::ConSet] runs on, and the simplest
/// configuration there is: the slot is a plain `T`, copied by `Clone`
/// whenever a bucket list is republished.
pub struct Trivial<T>(PhantomData<T>);

impl<T> Config for Trivial<T>
where
    T: Clone + Hash + Eq,
{
    type Key = T;
    type Pair = T;
    type Slot = T;

    fn key_of(pair: &T) -> &T {
        pair
    }

    fn make_slot(_mixed: u64, pair: T) -> T {
        pair
    }

    fn copy_slot(slot: &T) -> T {
        slot.clone()
    }

    unsafe fn matches<Q>(slot: &T, _mixed: u64, key: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        slot.borrow() == key
    }

    unsafe fn pair_of(slot: &T) -> &T {
        slot
    }

    unsafe fn retire_slot(_slot: &T, _pin: &Guard) {}

    unsafe fn drop_slot(slot: T) {
        drop(slot);
    }
}

/// A word-sized handle to a heap-allocated entry, with the top 16 bits of
/// the entry's mixed hash packed above the pointer.
///
/// The packing assumes heap addresses fit in 48 bits, which holds on the
/// usual 4-level paging setups; the constructor debug-asserts it. A probe
/// first compares the 16-bit tags and dereferences only when they agree,
/// which filters out almost every non-matching entry without a cache miss.
pub struct TaggedBox<P> {
    ptr: usize,
    _marker: PhantomData<*mut P>,
}

const ADDR_BITS: u32 = 48;
const ADDR_MASK: usize = (1 << ADDR_BITS) - 1;

impl<P> TaggedBox<P> {
    /// Allocates the entry and tags its address.
    pub fn new(tag: u16, pair: P) -> Self {
        let raw = Box::into_raw(Box::new(pair)) as usize;
        debug_assert_eq!(raw & !ADDR_MASK, 0, "heap address exceeds 48 bits");
        TaggedBox {
            ptr: ((tag as usize) << ADDR_BITS) | (raw & ADDR_MASK),
            _marker: PhantomData,
        }
    }

    /// The hash slice stored above the address.
    pub fn tag(&self) -> u16 {
        (self.ptr >> ADDR_BITS) as u16
    }

    fn addr(&self) -> *mut P {
        (self.ptr & ADDR_MASK) as *mut P
    }

    /// Makes an aliasing copy for a replacement bucket list. Ownership of
    /// the heap entry is not duplicated; see
    /// [`Config::copy_slot`].
    pub fn share(&self) -> Self {
        TaggedBox {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }

    /// Borrows the entry.
    ///
    /// # Safety
    ///
    /// The entry must not have been retired before the caller pinned the
    /// epoch.
    pub unsafe fn get(&self) -> &P {
        &*self.addr()
    }

    /// Schedules the entry for destruction once no pinned thread can
    /// reach it.
    ///
    /// # Safety
    ///
    /// The entry must be unlinked from every published list and this must
    /// be called at most once for it.
    pub unsafe fn retire(&self, pin: &Guard) {
        let raw = self.addr();
        pin.defer_unchecked(move || drop(Box::from_raw(raw)));
    }

    /// Takes back ownership of the entry.
    ///
    /// # Safety
    ///
    /// Single ownership: no published list may still refer to the entry.
    pub unsafe fn into_box(self) -> Box<P> {
        Box::from_raw(self.addr())
    }
}

// The tagged word is as thread-safe as the entry it points at.
unsafe impl<P: Send + Sync> Send for TaggedBox<P> {}
unsafe impl<P: Send + Sync> Sync for TaggedBox<P> {}
