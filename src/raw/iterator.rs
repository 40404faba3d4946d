//! Iteration support for the raw table.

use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{Guard, Shared};
use crossbeam_utils::Backoff;
use smallvec::SmallVec;

use super::config::Config;
use super::{bf, Bucket, BucketFlags, Raw, Table};

unsafe fn extend_lifetime<'a, 'b, T: 'a + 'b>(s: Shared<'a, T>) -> Shared<'b, T> {
    mem::transmute(s)
}

// Notes about the lifetimes:
// The 'a here is actually a lie. We need two things from lifetimes:
// * We must not outlive the table we are iterating through (because the drop just outright
//   destroys the data).
// * The pointers must not outlive the pin we hold.
// * We do not mind us (or the pin) moving around in memory, we are only interested in when its
//   destructor is called. The references don't actually point inside the pin itself.
//
// The lifetime of the pin is the same as of the pointers we store inside of us. We check the
// lifetime relation of the table and us in the constructor, so we won't outlive the table. But
// technically, the lifetime should be something like `'self`, which is not possible to describe.
//
// Therefore we have to make very sure to never return a reference with the 'a lifetime.
//
// For the same technical reasons, we do the extend_lifetime thing. It would be great if someone
// knew a better trick ‒ while this is probably correct, something the compiler could check would
// be much better.

/// Iterator over the entries of a raw table.
///
/// Each bucket's list is immutable while being read, so a single bucket is always a consistent
/// snapshot; the table as a whole is not. Buckets migrated mid-iteration are followed into their
/// two destination buckets in the next table, so each entry present for the whole iteration is
/// yielded exactly once.
pub struct Iter<'a, C, S>
where
    C: Config,
{
    pin: Guard,
    root: Shared<'a, Table<C>>,
    /// Cursor over the root table's buckets.
    idx: usize,
    /// Forwarded destinations still to be visited.
    pending: SmallVec<[(Shared<'a, Table<C>>, usize); 4]>,
    /// The list currently being yielded from.
    node: Shared<'a, Bucket<C>>,
    li: usize,
    _table: PhantomData<&'a Raw<C, S>>,
}

impl<'a, C, S> Iter<'a, C, S>
where
    C: Config,
{
    /// Starts iterating the given table, pinning its pool for the iterator's whole lifetime.
    pub fn new<'m: 'a>(table: &'m Raw<C, S>) -> Self {
        let pin = table.pin();
        let root = table.root.load(Ordering::Acquire, &pin);
        let root = unsafe { extend_lifetime(root) };
        Iter {
            pin,
            root,
            idx: 0,
            pending: SmallVec::new(),
            node: Shared::null(),
            li: 0,
            _table: PhantomData,
        }
    }

    /// Produces the next entry, or `None` once the table has been walked.
    // Not an iterator because this borrows out of the iterator itself (and effectively its pin).
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&C::Pair> {
        loop {
            if !self.node.is_null() {
                let list = unsafe { self.node.deref() };
                if self.li < list.len() {
                    let slot = &list[self.li];
                    self.li += 1;
                    return Some(unsafe { C::pair_of(slot) });
                }
                self.node = Shared::null();
            }

            if let Some((table, idx)) = self.pending.pop() {
                self.visit(table, idx);
                continue;
            }

            let root = unsafe { self.root.deref() };
            if self.idx < root.len() {
                let idx = self.idx;
                self.idx += 1;
                let root = self.root;
                self.visit(root, idx);
                continue;
            }

            return None;
        }
    }

    /// Resolves one bucket: either starts yielding its list or queues the two destinations its
    /// contents were forwarded to.
    fn visit(&mut self, table: Shared<'a, Table<C>>, idx: usize) {
        let table = unsafe { table.deref() };
        let backoff = Backoff::new();
        loop {
            let node = table.buckets[idx].load(Ordering::Acquire, &self.pin);
            let flags = bf(node);
            if flags.contains(BucketFlags::BUSY) {
                backoff.snooze();
                continue;
            }
            if flags.contains(BucketFlags::FORWARDED) {
                let next = table.next.load(Ordering::Acquire, &self.pin);
                assert!(!next.is_null(), "Forward marker without a next table");
                let next = unsafe { extend_lifetime(next) };
                self.pending.push((next, idx));
                self.pending.push((next, idx + table.len()));
                return;
            }
            self.node = unsafe { extend_lifetime(node) };
            self.li = 0;
            return;
        }
    }
}
