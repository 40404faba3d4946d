//! Crate-internal test suites that don't belong to a single module.

#[cfg(test)]
mod acts_like_map;
mod compile_fail;
