#![doc(test(attr(deny(warnings))))]
#![warn(missing_docs)]

//! A concurrent growable hash map and set.
//!
//! The data structures in this crate are unordered associative containers designed for
//! many-core machines and contended workloads: any number of threads can call `insert`,
//! `get`, `upsert` and `remove` through a shared reference, each operation is linearizable,
//! and none of them ever takes a lock.
//!
//! # How it works, in short
//!
//! The table is an array of buckets. A bucket is one atomic word pointing to an immutable
//! list of entries; updates build a replacement list and publish it with a single
//! compare-and-swap, so readers can walk lists without any synchronization beyond an
//! acquire load. Displaced lists (and removed entries) are reclaimed through
//! [`crossbeam_epoch`], which delays destruction until no thread can still be reading them.
//!
//! When a bucket outgrows a small bound, the table hangs a twice-as-large successor off
//! itself and buckets migrate cooperatively: every writing operation that encounters the
//! old table moves its own bucket across (plus a few others) before continuing, and
//! readers simply follow per-bucket forward markers. There is no stop-the-world phase.
//!
//! # The flavours
//!
//! * [`ConMap`] ‒ the general map. Entries live behind word-sized tagged pointers ‒ the
//!   high bits of the word carry a slice of the key's hash, so most failed probes are
//!   decided without dereferencing ‒ and never move once inserted.
//! * [`FlatConMap`] ‒ stores `(K, V)` pairs inline in the buckets. No per-entry
//!   allocation, but every bucket republication clones its pairs; meant for small `Copy`
//!   types.
//! * [`ConSet`] ‒ the set variant, storing just the values inline.
//!
//! The [`raw`] module exposes the underlying engine for building further flavours.
//!
//! # Limitations
//!
//! * Lookups and removals return *clones* of the stored values (the originals may still be
//!   read by other threads). Wrap expensive-to-clone values in an [`Arc`][std::sync::Arc].
//! * `len` and iteration are not linearizable; they observe each bucket atomically but not
//!   the table as a whole.
//! * `insert` does not overwrite ‒ the first entry for a key wins. Overwriting is spelled
//!   [`upsert`][ConMap::upsert].
//!
//! # Examples
//!
//! ```rust
//! use conhash::ConMap;
//! use crossbeam_utils::thread;
//!
//! let map = ConMap::new();
//!
//! thread::scope(|s| {
//!     for t in 0..4 {
//!         let map = &map;
//!         s.spawn(move |_| {
//!             for i in 0..100 {
//!                 map.upsert(i, |old| old.copied().unwrap_or(0) + t);
//!             }
//!         });
//!     }
//! }).unwrap();
//!
//! assert_eq!(100, map.len());
//! ```

pub mod existing_or_new;
pub mod flat_map;
pub mod map;
pub mod raw;
pub mod set;
mod tests;

pub use crate::existing_or_new::ExistingOrNew;
pub use crate::flat_map::FlatConMap;
pub use crate::map::ConMap;
pub use crate::set::ConSet;
