// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn allocates_lowest_first() {
    let mut pool = PortPool::new(3100..=3102);
    assert_eq!(pool.allocate(), Some(3100));
    assert_eq!(pool.allocate(), Some(3101));
    assert_eq!(pool.allocate(), Some(3102));
    assert_eq!(pool.allocate(), None);
}

#[test]
fn released_port_is_reused_lowest_first() {
    let mut pool = PortPool::new(3100..=3102);
    pool.allocate();
    pool.allocate();
    assert!(pool.release(3100));

    // 3100 comes back before 3102 is ever handed out
    assert_eq!(pool.allocate(), Some(3100));
    assert_eq!(pool.allocate(), Some(3102));
}

#[test]
fn double_release_is_rejected() {
    let mut pool = PortPool::new(3100..=3101);
    pool.allocate();
    assert!(pool.release(3100));
    assert!(!pool.release(3100));
}

#[test]
fn release_of_unallocated_port_is_rejected() {
    let mut pool = PortPool::new(3100..=3101);
    assert!(!pool.release(3100));
    assert!(!pool.release(9999));
}

#[test]
fn single_port_pool() {
    let mut pool = PortPool::new(4000..=4000);
    assert_eq!(pool.capacity(), 1);
    assert_eq!(pool.allocate(), Some(4000));
    assert_eq!(pool.allocate(), None);
    pool.release(4000);
    assert_eq!(pool.allocate(), Some(4000));
}

proptest! {
    /// Allocation count never exceeds capacity, and every allocated port is
    /// unique and in range.
    #[test]
    fn conservation(ops in proptest::collection::vec(0u8..3, 1..60)) {
        let mut pool = PortPool::new(3100..=3110);
        let mut held: Vec<u16> = Vec::new();

        for op in ops {
            match op {
                0 => {
                    if let Some(port) = pool.allocate() {
                        prop_assert!((3100..=3110).contains(&port));
                        prop_assert!(!held.contains(&port));
                        held.push(port);
                    } else {
                        prop_assert_eq!(held.len(), pool.capacity());
                    }
                }
                1 => {
                    if let Some(port) = held.pop() {
                        prop_assert!(pool.release(port));
                    }
                }
                _ => {
                    // Releasing something never held must be rejected
                    prop_assert!(!pool.release(9999));
                }
            }
            prop_assert_eq!(pool.allocated_count(), held.len());
            prop_assert!(pool.allocated_count() <= pool.capacity());
        }
    }
}
