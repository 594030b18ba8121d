//! Fuzz target for the dispatch heap.
//!
//! Interleaves arbitrary pushes and pops and checks every pop against a
//! sorted reference: lowest rank first, then submission order.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use gg_sched::scheduler::{Heap, HeapOrder};
use gg_sched::TaskPriority;

#[derive(Debug, Arbitrary)]
enum Op {
    Push(u8),
    Pop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    priority: TaskPriority,
    sequence: u64,
}

impl HeapOrder for Key {
    fn precedes(&self, other: &Self) -> bool {
        self < other
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut heap = Heap::new();
    let mut reference: Vec<Key> = Vec::new();
    let mut sequence = 0u64;

    for op in ops {
        match op {
            Op::Push(rank) => {
                let key = Key { priority: TaskPriority::from(rank % 3), sequence };
                sequence += 1;
                heap.push(key);
                reference.push(key);
            }
            Op::Pop => {
                reference.sort();
                let expected = if reference.is_empty() { None } else { Some(reference.remove(0)) };
                assert_eq!(heap.pop(), expected);
            }
        }
        assert_eq!(heap.len(), reference.len());
    }
});
