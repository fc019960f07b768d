extern crate std;

use std::{ops::Range, prelude::v1::*};

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

fn insert_find_all(keys: &[Key]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        tree.insert(Box::new(TestNode {
            links: Links::new(),
            key,
        }));
        tree.assert_invariants();
    }

    for &key in keys {
        let node = tree.get_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }
}

fn insert_remove_all(keys: &[Key]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        tree.insert(Box::new(TestNode {
            links: Links::new(),
            key,
        }));
        tree.assert_invariants();
    }

    for &key in keys {
        let node = tree.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }

    for &key in keys {
        tree.insert(Box::new(TestNode {
            links: Links::new(),
            key,
        }));
        tree.assert_invariants();
    }

    for &key in keys.iter().rev() {
        let node = tree.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

#[test]
fn four_elems_find() {
    insert_find_all(&[0, 1, 2, 3]);
    insert_find_all(&[0, 1, 3, 2]);
    insert_find_all(&[0, 2, 1, 3]);
    insert_find_all(&[0, 2, 3, 1]);
    insert_find_all(&[0, 3, 1, 2]);
    insert_find_all(&[0, 3, 2, 1]);

    insert_find_all(&[1, 0, 2, 3]);
    insert_find_all(&[1, 0, 3, 2]);
    insert_find_all(&[1, 2, 0, 3]);
    insert_find_all(&[1, 2, 3, 0]);
    insert_find_all(&[1, 3, 0, 2]);
    insert_find_all(&[1, 3, 2, 0]);

    insert_find_all(&[2, 0, 1, 3]);
    insert_find_all(&[2, 0, 3, 1]);
    insert_find_all(&[2, 1, 0, 3]);
    insert_find_all(&[2, 1, 3, 0]);
    insert_find_all(&[2, 3, 0, 1]);
    insert_find_all(&[2, 3, 1, 0]);

    insert_find_all(&[3, 0, 1, 2]);
    insert_find_all(&[3, 0, 2, 1]);
    insert_find_all(&[3, 1, 0, 2]);
    insert_find_all(&[3, 1, 2, 0]);
    insert_find_all(&[3, 2, 0, 1]);
    insert_find_all(&[3, 2, 1, 0]);
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    insert_remove_all(&[0, 1, 2]);
    insert_remove_all(&[0, 2, 1]);
    insert_remove_all(&[1, 0, 2]);
    insert_remove_all(&[1, 2, 0]);
    insert_remove_all(&[2, 0, 1]);
    insert_remove_all(&[2, 1, 0]);
}

#[test]
fn remove_four() {
    insert_remove_all(&[0, 1, 2, 3]);
    insert_remove_all(&[0, 1, 3, 2]);
    insert_remove_all(&[0, 2, 1, 3]);
    insert_remove_all(&[0, 2, 3, 1]);
    insert_remove_all(&[0, 3, 1, 2]);
    insert_remove_all(&[0, 3, 2, 1]);

    insert_remove_all(&[1, 0, 2, 3]);
    insert_remove_all(&[1, 0, 3, 2]);
    insert_remove_all(&[1, 2, 0, 3]);
    insert_remove_all(&[1, 2, 3, 0]);
    insert_remove_all(&[1, 3, 0, 2]);
    insert_remove_all(&[1, 3, 2, 0]);

    insert_remove_all(&[2, 0, 1, 3]);
    insert_remove_all(&[2, 0, 3, 1]);
    insert_remove_all(&[2, 1, 0, 3]);
    insert_remove_all(&[2, 1, 3, 0]);
    insert_remove_all(&[2, 3, 0, 1]);
    insert_remove_all(&[2, 3, 1, 0]);

    insert_remove_all(&[3, 0, 1, 2]);
    insert_remove_all(&[3, 0, 2, 1]);
    insert_remove_all(&[3, 1, 0, 2]);
    insert_remove_all(&[3, 1, 2, 0]);
    insert_remove_all(&[3, 2, 0, 1]);
    insert_remove_all(&[3, 2, 1, 0]);
}

// Pool-sized workloads: insert a full complement of nodes, look every key
// up, then drain, validating the structure after every mutation.

const POOL_SIZE: u64 = 1024;

fn run_pool_scenario(insert_order: &[Key], remove_order: &[Key]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in insert_order {
        assert!(tree.insert(TestNode::new(key)).is_none());
        tree.assert_invariants();
        assert!(tree.get(key).is_some(), "inserted key {key} must be found");
    }

    assert_eq!(tree.len(), insert_order.len());

    for &key in insert_order {
        assert!(tree.contains_key(key));
    }

    for &key in remove_order {
        let node = tree.remove(key).expect("key to remove must be present");
        assert_eq!(node.key, key);
        assert!(tree.get(key).is_none(), "removed key {key} must be gone");
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
}

fn ascending() -> Vec<Key> {
    (1..=POOL_SIZE).collect()
}

fn descending() -> Vec<Key> {
    (1..=POOL_SIZE).rev().collect()
}

// A fixed odd-stride permutation: 9973 is coprime to 10240, so the first
// `POOL_SIZE` terms are distinct keys drawn from 0..10240.
fn scrambled() -> Vec<Key> {
    (0..POOL_SIZE).map(|i| (i * 9973) % 10240).collect()
}

#[test]
fn pool_ascending_insert_ascending_remove() {
    run_pool_scenario(&ascending(), &ascending());
}

#[test]
fn pool_ascending_insert_descending_remove() {
    run_pool_scenario(&ascending(), &descending());
}

#[test]
fn pool_descending_insert_ascending_remove() {
    run_pool_scenario(&descending(), &ascending());
}

#[test]
fn pool_descending_insert_descending_remove() {
    run_pool_scenario(&descending(), &descending());
}

#[test]
fn pool_scrambled_insert_draw_order_remove() {
    let keys = scrambled();
    run_pool_scenario(&keys, &keys);
}

#[test]
fn sequential_inserts_stay_balanced() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    // A plain BST would degenerate to a 1024-deep list on this input; the
    // rebalance walk must keep the height logarithmic instead.
    for key in 1..=POOL_SIZE {
        tree.insert(TestNode::new(key));
    }
    tree.assert_invariants();
    assert!(tree.height() <= 15, "height {} exceeds bound", tree.height());

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in (1..=POOL_SIZE).rev() {
        tree.insert(TestNode::new(key));
    }
    tree.assert_invariants();
    assert!(tree.height() <= 15, "height {} exceeds bound", tree.height());
}

#[test]
fn empty_tree() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.height(), 0);
    assert!(tree.get(1).is_none());
    assert!(tree.first().is_none());
    assert!(tree.remove(1).is_none());
    assert!(tree.pop_first().is_none());
    tree.assert_invariants();
}

#[test]
fn single_node_tree() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.insert(TestNode::new(7)).is_none());
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.first().map(|node| node.key), Some(7));
    assert_eq!(tree.balance_factor(7), Some(0));
    assert!(tree.get(9).is_none());
    tree.assert_invariants();

    let node = tree.remove(7).expect("the key must be present");
    assert_eq!(node.key, 7);
    assert!(tree.is_empty());
    tree.assert_invariants();
}

#[test]
fn duplicate_insert_is_rejected() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [5, 3, 8] {
        assert!(tree.insert(TestNode::new(key)).is_none());
    }

    let mut before = String::new();
    tree.dotgraph("dup", &mut before).unwrap();

    let rejected = tree
        .insert(TestNode::new(5))
        .expect("duplicate key must be rejected");
    assert_eq!(rejected.key, 5);
    assert_eq!(tree.len(), 3);
    tree.assert_invariants();

    // The rejected insert must not have disturbed the shape.
    let mut after = String::new();
    tree.dotgraph("dup", &mut after).unwrap();
    assert_eq!(before, after);
}

#[test]
fn removed_node_is_reusable() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [2, 1, 3] {
        tree.insert(TestNode::new(key));
    }

    let node = tree.remove(2).expect("the key must be present");
    assert_eq!(node.key, 2);

    // The handle comes back cleared and can go straight back in.
    assert!(tree.insert(node).is_none());
    assert_eq!(tree.len(), 3);
    tree.assert_invariants();
}

#[test]
fn balance_factors_at_rest() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in 1..=64 {
        tree.insert(TestNode::new(key));

        for probe in 1..=key {
            let balance = tree
                .balance_factor(probe)
                .expect("inserted key must be present");
            assert!((-1..=1).contains(&balance));
        }
    }

    assert!(tree.balance_factor(65).is_none());
}

#[test]
fn pop_first_drains_in_order() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in &scrambled()[..64] {
        tree.insert(TestNode::new(key));
    }

    let mut prev = None;
    while let Some(node) = tree.pop_first() {
        if let Some(prev) = prev {
            assert!(prev < node.key, "pop_first must yield ascending keys");
        }
        prev = Some(node.key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }
}
