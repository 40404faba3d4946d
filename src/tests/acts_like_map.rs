//! In these tests, we make sure the table works as a HashMap in single threaded context, and
//! sometimes in multithreaded too.
//!
//! To do that we simply generate a series of inserts, upserts, lookups and deletions and try
//! them on both maps. They need to return the same things.
//!
//! Furthermore, each test is run in several instances, with keys in differently sized universe.
//! The small ones are more likely to reuse the same value and to exercise the in-bucket
//! collision paths, the big ones push the table through resizes.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use proptest::collection::vec;
use proptest::prelude::*;
use rayon::prelude::*;

use crate::ConMap;

#[derive(Debug, Clone)]
enum Instruction<K, V> {
    Lookup(K),
    Remove(K),
    Insert(K, V),
    Upsert(K, V),
}

impl<K, V> Instruction<K, V>
where
    K: Arbitrary + Clone + Debug + Eq + Hash + 'static,
    V: Arbitrary + Clone + Debug + PartialEq + 'static,
{
    fn strategy() -> impl Strategy<Value = Self> {
        use Instruction::*;

        prop_oneof![
            any::<K>().prop_map(Lookup),
            any::<K>().prop_map(Remove),
            any::<(K, V)>().prop_map(|(k, v)| Insert(k, v)),
            any::<(K, V)>().prop_map(|(k, v)| Upsert(k, v)),
        ]
    }

    fn run(instructions: Vec<Self>) -> Result<(), TestCaseError> {
        use Instruction::*;

        let table = ConMap::with_capacity(1);
        let mut model = HashMap::new();
        for ins in instructions {
            match ins {
                Lookup(key) => {
                    let expected = model.get(&key).cloned();
                    let found = table.get(&key);
                    prop_assert_eq!(expected, found);
                }
                Remove(key) => {
                    let expected = model.remove(&key);
                    let found = table.remove(&key);
                    prop_assert_eq!(expected, found);
                    prop_assert_eq!(model.is_empty(), table.is_empty());
                }
                Insert(key, value) => {
                    // The table's insert keeps the resident entry, the std one overwrites;
                    // mirror that in the model.
                    let expected = model.get(&key).cloned();
                    if expected.is_none() {
                        model.insert(key.clone(), value.clone());
                    }
                    let found = table.insert(key, value);
                    prop_assert_eq!(expected, found);
                }
                Upsert(key, value) => {
                    let expected = model.insert(key.clone(), value.clone());
                    let found = table.upsert(key, |_| value.clone());
                    prop_assert_eq!(expected, found);
                }
            }
            prop_assert_eq!(model.len(), table.len());
        }

        Ok(())
    }
}

fn insert_parallel_test<T>(values: Vec<T>) -> Result<(), TestCaseError>
where
    T: Clone + Hash + Eq + Send + Sync + 'static,
{
    let unique: HashSet<_> = values.iter().cloned().collect();
    let table = ConMap::with_capacity(1);
    values.into_par_iter().for_each(|v| {
        table.insert(v, ());
    });
    for v in &unique {
        prop_assert!(table.get(v).is_some());
    }
    prop_assert_eq!(unique.len(), table.len());

    Ok(())
}

proptest! {
    #[test]
    fn small_keys(instructions in vec(Instruction::<u8, usize>::strategy(), 1..100)) {
        Instruction::run(instructions)?;
    }

    #[test]
    fn mid_keys(instructions in vec(Instruction::<u16, usize>::strategy(), 1..100)) {
        Instruction::run(instructions)?;
    }

    #[test]
    fn large_keys(instructions in vec(Instruction::<u64, usize>::strategy(), 1..100)) {
        Instruction::run(instructions)?;
    }

    #[test]
    fn string_keys(instructions in vec(Instruction::<String, String>::strategy(), 1..50)) {
        Instruction::run(instructions)?;
    }

    #[test]
    fn parallel_inserts_small(values in vec(any::<u8>(), 1..100)) {
        insert_parallel_test(values)?;
    }

    #[test]
    fn parallel_inserts_large(values in vec(any::<u64>(), 1..1000)) {
        insert_parallel_test(values)?;
    }

    #[test]
    fn parallel_inserts_strings(values in vec(any::<String>(), 1..100)) {
        insert_parallel_test(values)?;
    }
}
