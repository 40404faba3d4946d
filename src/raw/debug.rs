//! A module containing few debug utilities.
//!
//! In general, they are meant for debugging the *table itself*, but it is exposed as potentially
//! useful.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::hash::BuildHasher;
use std::sync::atomic::Ordering;

use crossbeam_epoch::Shared;

use super::config::Config;
use super::{bf, Bucket, BucketFlags, Raw};

impl<C, S> Raw<C, S>
where
    C: Config,
    S: BuildHasher,
{
    // Hack: &mut to make sure it is not shared between threads and nobody is modifying the thing
    // right now.
    /// Panics if the table is not in a consistent state.
    ///
    /// Checked per table in the chain:
    /// * No bucket is left claimed (`BUSY`).
    /// * A forward marker implies a next table.
    /// * Every entry sits in the bucket its mixed hash selects.
    /// * No bucket holds the same key twice.
    /// * While a bucket is still stable, its two destination buckets in the next table are
    ///   untouched ‒ each key has exactly one authoritative bucket.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&mut self) {
        // Unprotected is fine, we are &mut so nobody else is allowed to do stuff to us at the
        // moment. Relaxed is fine for the same reason.
        let pin = unsafe { crossbeam_epoch::unprotected() };
        let mut table = unsafe { self.root.load(Ordering::Relaxed, pin).deref() };
        loop {
            let next = unsafe { table.next.load(Ordering::Relaxed, pin).as_ref() };
            for (idx, bucket) in table.buckets.iter().enumerate() {
                let node = bucket.load(Ordering::Relaxed, pin);
                let flags = bf(node);
                assert!(
                    !flags.contains(BucketFlags::BUSY),
                    "Bucket {} left claimed by a resize worker",
                    idx,
                );
                if flags.contains(BucketFlags::FORWARDED) {
                    assert!(next.is_some(), "Forward marker without a next table");
                    continue;
                }
                let list = match unsafe { node.as_ref() } {
                    Some(list) => list,
                    None => continue,
                };
                assert!(!list.is_empty(), "Empty bucket lists must not be kept around");
                for (i, slot) in list.iter().enumerate() {
                    let key = unsafe { C::key_of(C::pair_of(slot)) };
                    let mixed = self.mixed_hash(key);
                    assert_eq!(
                        idx,
                        mixed as usize & table.mask,
                        "Entry stored in the wrong bucket",
                    );
                    for other in &list[i + 1..] {
                        assert!(
                            !unsafe { C::matches(other, mixed, key) },
                            "Duplicate key within a bucket",
                        );
                    }
                }
                if let Some(next) = next {
                    for &dst in &[idx, idx + table.len()] {
                        let dest = next.buckets[dst].load(Ordering::Relaxed, pin);
                        assert!(
                            dest.is_null() && bf(dest).is_empty(),
                            "Stable bucket {} already has entries in the next table",
                            idx,
                        );
                    }
                }
            }
            match next {
                Some(next) => table = next,
                None => return,
            }
        }
    }

    fn print_bucket(node: Shared<Bucket<C>>, fmt: &mut Formatter) -> FmtResult
    where
        C::Pair: Debug,
    {
        let flags = bf(node);
        write!(fmt, "{:?}/{:?}", node.as_raw(), flags)?;
        if flags.contains(BucketFlags::FORWARDED) {
            write!(fmt, ">")?;
        } else if let Some(list) = unsafe { node.as_ref() } {
            let pairs = list
                .iter()
                .map(|slot| unsafe { C::pair_of(slot) })
                .collect::<Vec<_>>();
            write!(fmt, "{:?}", pairs)?;
        }
        Ok(())
    }

    fn print_shape(&self, fmt: &mut Formatter) -> FmtResult
    where
        C::Pair: Debug,
    {
        let pin = self.pin();
        let mut table = unsafe { self.root.load(Ordering::Acquire, &pin).deref() };
        loop {
            write!(fmt, "[{}](", table.len())?;
            for (idx, bucket) in table.buckets.iter().enumerate() {
                write!(fmt, " {:X}:", idx)?;
                Self::print_bucket(bucket.load(Ordering::Acquire, &pin), fmt)?;
            }
            write!(fmt, " )")?;
            match unsafe { table.next.load(Ordering::Acquire, &pin).as_ref() } {
                Some(next) => {
                    write!(fmt, " => ")?;
                    table = next;
                }
                None => return Ok(()),
            }
        }
    }
}

/// A pretty-printing wrapper around the raw table.
///
/// The table chain, including the pointers and flags of each bucket, is printed if this is used
/// to wrap the raw table.
pub struct PrintShape<'a, C, S>(pub &'a Raw<C, S>)
where
    C: Config;

impl<C, S> Display for PrintShape<'_, C, S>
where
    C: Config,
    C::Pair: Debug,
    S: BuildHasher,
{
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        self.0.print_shape(fmt)
    }
}
