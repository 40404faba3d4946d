#![allow(dead_code)] // Allow the unused structs

//! Compile fail tests
//!
//! Implemented in a minimal way, as doc tests in a hidden module.

/// ```compile_fail
/// use std::rc::Rc;
///
/// use conhash::ConMap;
/// use crossbeam_utils::thread;
///
/// let map: ConMap<usize, Rc<usize>> = ConMap::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         drop(map);
///     });
/// }).unwrap();
/// ```
///
/// Similar one, but with Arc should work fine, though.
///
/// ```
/// use std::sync::Arc;
///
/// use conhash::ConMap;
/// use crossbeam_utils::thread;
///
/// let map: ConMap<usize, Arc<usize>> = ConMap::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         drop(map);
///     });
/// }).unwrap();
/// ```
struct MapShouldNotBeSend;

/// ```compile_fail
/// use std::rc::Rc;
///
/// use conhash::ConMap;
/// use crossbeam_utils::thread;
///
/// let map: ConMap<usize, Rc<usize>> = ConMap::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         map.get(&42);
///     });
/// }).unwrap();
/// ```
///
/// Similar one, but with Arc should work fine, though.
///
/// ```
/// use std::sync::Arc;
///
/// use conhash::ConMap;
/// use crossbeam_utils::thread;
///
/// let map: ConMap<usize, Arc<usize>> = ConMap::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         map.get(&42);
///     });
/// }).unwrap();
/// ```
struct MapShouldNotSync;

/// ```compile_fail
/// use std::rc::Rc;
///
/// use conhash::ConSet;
/// use crossbeam_utils::thread;
///
/// let set: ConSet<Rc<usize>> = ConSet::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         drop(set);
///     });
/// }).unwrap();
/// ```
struct SetShouldNotBeSend;
