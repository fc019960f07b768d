//! An intrusive AVL tree with caller-provided node storage.
//!
//! The tree never allocates: callers embed a [`Links`] block in their element
//! type and hand nodes to the tree by ownership transfer through
//! [`cordyceps::Linked`]. All operations are iterative and complete in
//! bounded time and constant auxiliary stack, which makes the tree suitable
//! for hard-real-time contexts where a recursive rebalance would be
//! unacceptable.

#![no_std]

// Conventions used in comments:
// - The height of the subtree rooted at `x` is denoted `h(x)`, with
//   `h(missing) = 0`; a lone leaf has height 1.
// - The balance factor of `x` is `bf(x) = h(right(x)) - h(left(x))`.
//
// The structural invariants of the tree are:
// 1. BST order: keys in `left(x)` are strictly less than `x`'s key, keys in
//    `right(x)` strictly greater.
// 2. Parent consistency: exactly one of `p(x).left`, `p(x).right` is `x` for
//    every non-root `x`; the root has no parent.
// 3. Stored heights are exact: `h(x) = 1 + max(h(left(x)), h(right(x)))`.
// 4. AVL balance: `bf(x)` is -1, 0, or +1 at every node.
//
// Insertion and deletion restore (3) and (4) by walking parent links from
// the edit site to the root, applying at most one single or double rotation
// per level. The parent pointer makes the textbook recursive unwind explicit,
// so the walk needs no stack. An insertion is fully repaired by the first
// rotation it performs; the walk continues to the root anyway because each
// step is O(1) and the height recomputation is idempotent. A deletion may
// genuinely rotate at every level, so its walk is mandatory.

use core::{
    cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not, pin::Pin,
    ptr::NonNull,
};

use cordyceps::Linked;

#[cfg(any(test, feature = "model"))]
extern crate std;

#[cfg(any(test, feature = "model"))]
mod debug;
mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
#[cfg(test)]
mod tests;

pub use map::AvlMap;

/// The key type ordering the tree.
///
/// Keys are unique within a tree and must not change while the node bearing
/// them is linked in. With a 64-bit key space the height of the tree never
/// exceeds ⌈1.44·log₂(n)⌉ < 93, so heights fit in a `u8`.
pub type Key = u64;

type Link<T> = Option<NonNull<T>>;

/// A node that can be stored in an [`AvlTree`].
///
/// Implementors must also implement [`cordyceps::Linked`] for the [`Links`]
/// block embedded in the node.
pub trait TreeNode<L>: Linked<L> {
    /// Returns this node's key.
    ///
    /// The key must be stable: while a node is linked into a tree, `key`
    /// must keep returning the value it had when the node was inserted.
    fn key(&self) -> Key;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Dir {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

/// An intrusive AVL tree.
///
/// The tree owns the shape formed by the nodes' links, but not the nodes
/// themselves: storage is provided by the caller through `T::Handle` and
/// returned to the caller on removal. The tree performs no allocation and
/// never moves a node.
///
/// A node handed to [`insert`](AvlTree::insert) is pinned until it is
/// returned by [`remove`](AvlTree::remove), [`pop_first`](AvlTree::pop_first),
/// [`clear`](AvlTree::clear), or the tree's `Drop`.
pub struct AvlTree<T: TreeNode<Links<T>> + ?Sized> {
    root: Link<T>,
    len: usize,
}

/// The intrusive link block embedded in every tree node.
///
/// A cleared `Links` (as created by [`Links::new`]) has no parent, no
/// children, and height 0; this is the state a node must be in when it is
/// handed to [`AvlTree::insert`], and the state its links are returned to
/// when the node leaves the tree.
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    height: u8,
    _unpin: PhantomPinned,
}

impl<T: TreeNode<Links<T>> + ?Sized> AvlTree<T> {
    /// Creates a new, empty tree.
    #[must_use]
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns the number of nodes in the tree.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree contains no nodes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the height of the tree: 0 if empty, 1 for a lone root.
    #[inline]
    pub fn height(&self) -> u8 {
        Self::link_height(self.root)
    }

    /// Returns the balance factor of the node with the given key, or `None`
    /// if the key is not present.
    ///
    /// With the tree at rest the value is always -1, 0, or +1; the ±2 states
    /// exist only transiently inside a rebalance step.
    pub fn balance_factor(&self, key: Key) -> Option<i8> {
        self.get_raw(key)
            // SAFETY: the node was found in this tree, and `&self` prevents
            // concurrent structural edits for the duration of the read.
            .map(|node| unsafe { Self::balance_of(node) })
    }

    /// Returns `true` if a node with the given key is in the tree.
    #[inline]
    pub fn contains_key(&self, key: Key) -> bool {
        self.get_raw(key).is_some()
    }

    /// Returns a reference to the node with the given key, if any.
    pub fn get(&self, key: Key) -> Option<Pin<&T>> {
        // SAFETY: nodes linked into the tree are pinned by contract with
        // `Linked`, and the returned borrow is tied to `&self`.
        self.get_raw(key)
            .map(|node| unsafe { Pin::new_unchecked(node.as_ref()) })
    }

    /// Returns a mutable reference to the node with the given key, if any.
    pub fn get_mut(&mut self, key: Key) -> Option<Pin<&mut T>> {
        // SAFETY: as for `get`; the node stays pinned, so the caller only
        // gets at it through `Pin`.
        self.get_raw(key)
            .map(|mut node| unsafe { Pin::new_unchecked(node.as_mut()) })
    }

    /// Returns a raw pointer to the node with the given key, if any.
    ///
    /// The pointer is valid until the node is removed from the tree. It is
    /// the caller's responsibility not to alias it against the safe
    /// accessors.
    pub fn get_raw(&self, key: Key) -> Option<NonNull<T>> {
        let mut cur = self.root;

        while let Some(node) = cur {
            // SAFETY: `node` is linked into this tree; `&self` keeps the
            // links from being mutated underneath us.
            unsafe {
                match key.cmp(&node.as_ref().key()) {
                    Ordering::Less => cur = T::links(node).as_ref().left(),
                    Ordering::Equal => return Some(node),
                    Ordering::Greater => cur = T::links(node).as_ref().right(),
                }
            }
        }

        None
    }

    /// Returns a reference to the node with the minimum key, if any.
    pub fn first(&self) -> Option<Pin<&T>> {
        let root = self.root?;

        // SAFETY: the minimum is reachable from the root, hence linked into
        // this tree; pinning as for `get`.
        unsafe {
            let min = Self::min_in_subtree(root);
            Some(Pin::new_unchecked(min.as_ref()))
        }
    }

    /// Removes the node with the minimum key and returns its handle, or
    /// `None` if the tree is empty.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let root = self.root?;

        // SAFETY: the minimum is linked into this tree.
        unsafe {
            let min = Self::min_in_subtree(root);
            Some(self.remove_at(min))
        }
    }

    /// Inserts `item` into the tree.
    ///
    /// `item`'s links must be cleared, as by [`Links::new`]; its height is
    /// initialized here. If the tree already contains a node with the same
    /// key, the tree is left unchanged and `item` is handed back to the
    /// caller.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);

        // SAFETY: `into_ptr` yields a valid pointer whose pointee we now
        // exclusively own; everything else reached below is linked into this
        // tree, which `&mut self` gives us exclusive access to.
        unsafe {
            T::links(ptr).as_mut().clear();
            Self::update_height(ptr);

            let Some(root) = self.root else {
                self.root = Some(ptr);
                self.len += 1;
                return None;
            };

            let key = ptr.as_ref().key();
            let mut cur = root;

            loop {
                match key.cmp(&cur.as_ref().key()) {
                    Ordering::Less => match T::links(cur).as_ref().left() {
                        Some(left) => cur = left,
                        None => {
                            T::links(cur).as_mut().set_left(Some(ptr));
                            T::links(ptr).as_mut().set_parent(Some(cur));
                            break;
                        }
                    },

                    // The key is already present; hand the node back.
                    Ordering::Equal => return Some(T::from_ptr(ptr)),

                    Ordering::Greater => match T::links(cur).as_ref().right() {
                        Some(right) => cur = right,
                        None => {
                            T::links(cur).as_mut().set_right(Some(ptr));
                            T::links(ptr).as_mut().set_parent(Some(cur));
                            break;
                        }
                    },
                }
            }

            self.rebalance_walk(Some(ptr));
        }

        self.len += 1;
        None
    }

    /// Removes the node with the given key and returns its handle, or `None`
    /// if no node has that key.
    ///
    /// The removed node's links are cleared before the handle is returned,
    /// so it may be reinserted or released immediately.
    pub fn remove(&mut self, key: Key) -> Option<T::Handle> {
        let node = self.get_raw(key)?;

        // SAFETY: `node` was just found in this tree.
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes `node` from the tree and returns its handle.
    ///
    /// # Safety
    ///
    /// `node` must be linked into this tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            let parent = T::links(node).as_ref().parent();

            // Pick the replacement and where the rebalance walk starts. The
            // walk origin is the deepest node whose subtree shape changed.
            let (replacement, rebalance_from): (Link<T>, Link<T>) =
                if let Some(right) = T::links(node).as_ref().right() {
                    // The in-order successor is the minimum of the right
                    // subtree; it has no left child by construction.
                    let succ = Self::min_in_subtree(right);
                    let succ_parent = T::links(succ)
                        .as_ref()
                        .parent()
                        .expect("successor descends from the removed node");
                    let succ_right = T::links(succ).as_ref().right();

                    // Detach the successor, elevating its right child.
                    self.replace_child(succ_parent, succ, succ_right);
                    self.maybe_set_parent(succ_right, Some(succ_parent));

                    let origin = if succ_parent == node { succ } else { succ_parent };

                    // Graft the successor into the removed node's place.
                    // `node`'s right link is re-read here: if the successor
                    // was its immediate right child, the detach above just
                    // replaced it.
                    let node_left = T::links(node).as_ref().left();
                    let node_right = T::links(node).as_ref().right();

                    T::links(succ).as_mut().set_left(node_left);
                    self.maybe_set_parent(node_left, Some(succ));

                    T::links(succ).as_mut().set_right(node_right);
                    self.maybe_set_parent(node_right, Some(succ));

                    T::links(succ).as_mut().set_parent(parent);

                    (Some(succ), Some(origin))
                } else if let Some(left) = T::links(node).as_ref().left() {
                    // No right subtree: the left child is elevated whole.
                    T::links(left).as_mut().set_parent(parent);
                    (Some(left), Some(left))
                } else {
                    // Leaf. If it was also the root, the walk origin is
                    // `None` and the tree becomes empty below.
                    (None, parent)
                };

            // Splice at the removed node's parent.
            match parent {
                Some(parent) => self.replace_child(parent, node, replacement),
                None => self.root = replacement,
            }

            // Return the node to its cleared lifecycle state; the key is
            // preserved.
            T::links(node).as_mut().clear();

            self.rebalance_walk(rebalance_from);

            self.len -= 1;
            T::from_ptr(node)
        }
    }

    /// Removes every node from the tree, dropping the handles.
    ///
    /// Teardown is iterative: the minimum node is unlinked and its right
    /// child elevated, repeatedly, so no call stack proportional to the
    /// tree height is ever needed.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root.take();
        self.len = 0;

        while let Some(cur) = opt_cur {
            // SAFETY: every node reached here is still linked into the
            // remnant of the tree, which we have exclusive access to.
            unsafe {
                let min = Self::min_in_subtree(cur);
                let parent = T::links(min).as_ref().parent();
                let right = T::links(min).as_ref().right();

                self.maybe_replace_child(parent, min, right);
                self.maybe_set_parent(right, parent);

                drop(T::from_ptr(min));

                opt_cur = right.or(parent);
            }
        }
    }

    /// Walks the whole tree and panics if any structural invariant is
    /// violated.
    ///
    /// This is a diagnostic for tests and debug builds; it is linear in the
    /// size of the tree and, like every other operation, iterative.
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree must have len 0");
            return;
        };

        // SAFETY: all nodes visited are reachable from the root of this
        // tree, and `&self` holds the structure still while we read it.
        unsafe {
            assert!(
                T::links(root).as_ref().parent().is_none(),
                "the root must not have a parent"
            );

            let mut seen = 0_usize;
            let mut prev_key: Option<Key> = None;
            let mut cur = Some(Self::min_in_subtree(root));

            while let Some(node) = cur {
                seen += 1;
                assert!(seen <= self.len, "parent/child links form a cycle");

                let links = T::links(node);
                let links = links.as_ref();

                for dir in [Dir::Left, Dir::Right] {
                    if let Some(child) = links.child(dir) {
                        assert_eq!(
                            T::links(child).as_ref().parent(),
                            Some(node),
                            "child's parent link must point back at its parent"
                        );
                    }
                }

                let left_height = Self::link_height(links.left());
                let right_height = Self::link_height(links.right());
                assert_eq!(
                    links.height(),
                    1 + left_height.max(right_height),
                    "stored height must match the subtree shape"
                );

                let balance = right_height as i8 - left_height as i8;
                assert!(
                    (-1..=1).contains(&balance),
                    "balance factor must be -1, 0, or +1 at rest"
                );

                let key = node.as_ref().key();
                if let Some(prev) = prev_key {
                    assert!(prev < key, "in-order keys must be strictly increasing");
                }
                prev_key = Some(key);

                cur = Self::next_in_order(node);
            }

            assert_eq!(seen, self.len, "len must count exactly the reachable nodes");
        }
    }

    // Returns the in-order successor of `node`, or `None` if `node` holds
    // the maximum key.
    unsafe fn next_in_order(node: NonNull<T>) -> Link<T> {
        unsafe {
            if let Some(right) = T::links(node).as_ref().right() {
                return Some(Self::min_in_subtree(right));
            }

            let mut cur = node;
            while let Some(parent) = T::links(cur).as_ref().parent() {
                if T::links(parent).as_ref().left() == Some(cur) {
                    return Some(parent);
                }
                cur = parent;
            }

            None
        }
    }

    // Returns the node with the minimum key in the subtree rooted at `node`,
    // which is `node` itself if it has no left child.
    #[inline]
    unsafe fn min_in_subtree(node: NonNull<T>) -> NonNull<T> {
        let mut cur = node;

        while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
            cur = left;
        }

        cur
    }

    #[inline]
    fn link_height(link: Link<T>) -> u8 {
        // SAFETY: a non-`None` link always refers to a live node of the tree
        // the link was read from.
        link.map(|node| unsafe { T::links(node).as_ref().height() })
            .unwrap_or(0)
    }

    // Recomputes `node`'s stored height from its children's stored heights,
    // which must already be correct.
    #[inline]
    unsafe fn update_height(node: NonNull<T>) {
        unsafe {
            let links = T::links(node);
            let height = 1 + u8::max(
                Self::link_height(links.as_ref().left()),
                Self::link_height(links.as_ref().right()),
            );
            T::links(node).as_mut().set_height(height);
        }
    }

    // Heights never exceed 93, so the difference always fits in `i8`.
    #[inline]
    unsafe fn balance_of(node: NonNull<T>) -> i8 {
        unsafe {
            let links = T::links(node);
            let links = links.as_ref();
            Self::link_height(links.right()) as i8 - Self::link_height(links.left()) as i8
        }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { T::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    unsafe fn maybe_replace_child(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        if let Some(parent) = parent {
            unsafe { self.replace_child(parent, old_child, new_child) };
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with
    // `new_child`.
    //
    // `new_child`'s parent pointer is not updated; every caller pre-sets it.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[cfg(not(debug_assertions))]
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            if T::links(parent).as_ref().left() == Some(old_child) {
                T::links(parent).as_mut().set_left(new_child);
            } else {
                T::links(parent).as_mut().set_right(new_child);
            }
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with
    // `new_child`.
    //
    // `new_child`'s parent pointer is not updated; every caller pre-sets it.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[cfg(debug_assertions)]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            if T::links(parent).as_ref().left() == Some(old_child) {
                if let Some(new_child) = new_child {
                    assert_ne!(
                        T::links(parent).as_ref().right(),
                        Some(new_child),
                        "`new_child` must not be a child of `parent`"
                    );
                }

                T::links(parent).as_mut().set_left(new_child);
            } else if T::links(parent).as_ref().right() == Some(old_child) {
                if let Some(new_child) = new_child {
                    assert_ne!(
                        T::links(parent).as_ref().left(),
                        Some(new_child),
                        "`new_child` must not be a child of `parent`"
                    );
                }

                T::links(parent).as_mut().set_right(new_child);
            } else {
                unreachable!("`old_child` must be a child of `parent`");
            }
        }
    }

    // Rotates the subtree rooted at `down` in direction `dir`, returning the
    // new subtree root.
    //
    // The child of `down` opposite `dir` is promoted into `down`'s place;
    // `down` becomes its `dir` child and the subtree between them switches
    // sides. Heights of both nodes are recomputed, `down` first since it is
    // now the descendant.
    //
    // # Safety
    //
    // `down` must be linked into this tree and must have a child opposite
    // `dir`.
    unsafe fn rotate(&mut self, down: NonNull<T>, dir: Dir) -> NonNull<T> {
        unsafe {
            let up = T::links(down)
                .as_ref()
                .child(!dir)
                .expect("rotation requires a child to promote");
            let across = T::links(up).as_ref().child(dir);

            T::links(down).as_mut().set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            T::links(up).as_mut().set_child(dir, Some(down));
            let parent = T::links(down).as_mut().set_parent(Some(up));
            T::links(up).as_mut().set_parent(parent);

            match parent {
                Some(parent) => self.replace_child(parent, down, Some(up)),
                None => self.root = Some(up),
            }

            Self::update_height(down);
            Self::update_height(up);

            up
        }
    }

    // Restores the AVL invariant at `node`, whose children must already be
    // balanced with correct heights. Returns the root of the subtree that
    // now stands where `node` stood.
    //
    // A ±2 imbalance with the heavy child leaning the opposite way takes a
    // preliminary inner rotation (the double-rotation cases); otherwise a
    // single rotation suffices.
    unsafe fn rebalance(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe {
            Self::update_height(node);

            match Self::balance_of(node) {
                2 => {
                    let right = T::links(node)
                        .as_ref()
                        .right()
                        .expect("a +2 balance factor requires a right subtree");
                    if Self::balance_of(right) < 0 {
                        self.rotate(right, Dir::Right);
                    }
                    self.rotate(node, Dir::Left)
                }

                -2 => {
                    let left = T::links(node)
                        .as_ref()
                        .left()
                        .expect("a -2 balance factor requires a left subtree");
                    if Self::balance_of(left) > 0 {
                        self.rotate(left, Dir::Left);
                    }
                    self.rotate(node, Dir::Right)
                }

                _ => node,
            }
        }
    }

    // Rebalances every node from `from` up to and including the root.
    // Rotations reattach subtrees (and update `self.root`) as they go, so
    // the walk just follows parent links of each step's resulting subtree
    // root.
    unsafe fn rebalance_walk(&mut self, from: Link<T>) {
        let mut cur = from;

        while let Some(node) = cur {
            unsafe {
                let subtree = self.rebalance(node);
                cur = T::links(subtree).as_ref().parent();
            }
        }
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> Default for AvlTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> Drop for AvlTree<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    /// Creates a cleared link block: no parent, no children, height 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                height: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn height(&self) -> u8 {
        unsafe { (*self.inner.get()).height }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn clear(&mut self) {
        self.set_parent(None);
        self.set_left(None);
        self.set_right(None);
        self.inner.get_mut().height = 0;
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_height(&mut self, height: u8) {
        self.inner.get_mut().height = height;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("height", &self.height())
            .finish()
    }
}
