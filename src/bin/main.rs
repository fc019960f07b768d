use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_avl::{AvlTree, Key, Links, TreeNode};

#[repr(C)]
struct TestNode {
    links: Links<TestNode>,
    key: Key,
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    fn key(&self) -> Key {
        self.key
    }
}

fn main() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [0, 2, 1, 3] {
        tree.insert(Box::new(TestNode {
            links: Links::new(),
            key,
        }));
        tree.assert_invariants();
    }

    println!("len: {}, height: {}", tree.len(), tree.height());

    let node = tree.get(0).expect("item not found");
    println!(
        "min key: {}, balance factor of {}: {:?}",
        tree.first().map(|node| node.key).unwrap_or_default(),
        node.key,
        tree.balance_factor(node.key),
    );

    for key in [0, 2, 1, 3] {
        let node = tree.remove(key).expect("item not found");
        println!("removed key: {}", node.key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
    drop(tree);
}
