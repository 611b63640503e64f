//! # Redwood: An Ordered Map on a Red-Black Tree
//!
//! This crate provides an in-memory ordered key/value map implemented as a
//! **red-black tree** with bidirectional, order-preserving cursors and
//! `O(log n)` point and range queries.
//!
//! ## Design Overview
//!
//! ### Key Concepts
//!
//! **Red-Black Balancing**: Every node is colored red or black. The root is
//! black, no red node has a red child, and every path from a node down to a
//! missing child crosses the same number of black nodes. Together these keep
//! the height below `2 * log2(n + 1)`. Insertions repair violations with
//! recoloring and at most two rotations; removals with at most three.
//!
//! **Arena Storage**: Nodes live in a slot arena and link to each other by
//! index. Rotations rewrite links but never move a node, so a
//! position taken before an unrelated insert or erase stays valid.
//!
//! **Checked Cursors**: A [`Cursor`] is a small `Copy` handle naming a tree,
//! a slot and the slot's generation. It borrows nothing, so the tree can be
//! mutated while cursors are held; every use is validated and misuse fails
//! fast instead of reading another entry (see [`error`]).
//!
//! **Bound Caches**: The tree caches its minimum and maximum nodes, which
//! makes [`begin`](RedBlackTree::begin) and [`rbegin`](RedBlackTree::rbegin)
//! `O(1)`. The caches are updated incrementally on insert and erase.
//!
//! ### Tree Structure
//!
//! ```text
//!                  ┌──────────────┐
//!                  │   20 (B)     │  <- root, always black
//!                  └──────┬───────┘
//!               ┌─────────┴─────────┐
//!               ▼                   ▼
//!        ┌────────────┐      ┌────────────┐
//!        │   10 (B)   │      │   30 (R)   │
//!        └─────┬──────┘      └─────┬──────┘
//!          ┌───┘              ┌────┴────┐
//!          ▼                  ▼         ▼
//!     ┌─────────┐       ┌─────────┐ ┌─────────┐
//!     │  5 (R)  │       │ 25 (B)  │ │ 35 (B)  │
//!     └─────────┘       └─────────┘ └─────────┘
//!
//!   min ──► 5                                max ──► 35
//! ```
//!
//! ## Basic Usage
//!
//! ```
//! use redwood::RedBlackTree;
//!
//! let mut tree = RedBlackTree::new();
//!
//! // Insert key-value pairs
//! let (_, inserted) = tree.emplace("b", 2);
//! assert!(inserted);
//! tree.emplace("a", 1);
//! tree.emplace("c", 3);
//!
//! // Existing keys are left untouched
//! let (pos, inserted) = tree.emplace("a", 100);
//! assert!(!inserted);
//! assert_eq!(tree.entry_at(pos), (&"a", &1));
//!
//! // Walk the tree in order
//! let keys: Vec<_> = tree.keys().copied().collect();
//! assert_eq!(keys, ["a", "b", "c"]);
//!
//! // Erase returns the position that followed the erased entry
//! let next = tree.erase(tree.find("b"));
//! assert_eq!(tree.key_at(next), &"c");
//! ```
//!
//! ## Cursors
//!
//! ```
//! use redwood::RedBlackTree;
//!
//! let mut tree: RedBlackTree<i32, &str> = [(1, "one"), (2, "two"), (3, "three")].into_iter().collect();
//!
//! let mut cursor = tree.begin();
//! cursor.move_next(&tree);
//! assert_eq!(tree.key_at(cursor), &2);
//!
//! // Cursors survive unrelated mutations
//! tree.emplace(4, "four");
//! tree.erase(tree.find(&1));
//! assert_eq!(tree.value_at(cursor), &"two");
//!
//! // Reverse cursors walk from the maximum down
//! let mut cursor = tree.rbegin();
//! let mut keys = Vec::new();
//! while cursor != tree.rend() {
//!     keys.push(*tree.key_at(cursor));
//!     cursor.move_next(&tree);
//! }
//! assert_eq!(keys, [4, 3, 2]);
//! ```
//!
//! ## Thread Safety
//!
//! The tree performs no internal synchronization. It holds no raw pointers,
//! so it is `Send` and `Sync` whenever its keys and values are; mutation
//! requires `&mut self`, which leaves serialization of writers to the
//! borrow checker or to an outer lock.

use smallvec::SmallVec;
use tracing::{debug, trace};

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::ops::{Bound, Index, RangeBounds};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

mod arena;
pub mod error;
pub mod iter;
mod node;
#[cfg(feature = "serde")]
mod serde_impl;
#[cfg(feature = "test-utils")]
pub mod util;

use arena::{Arena, Idx};
use error::Error;
use node::{Node, Side};

pub use iter::{Cursor, Direction};
pub use node::Color;

// ---------------------------------------------------------------------------
// Configuration Constants
// ---------------------------------------------------------------------------

/// Inline capacity of the explicit stacks used by whole-tree walks
/// (`clear`, deep copy, height). A red-black tree over `2^32` entries is at
/// most 64 levels deep, so these walks practically never spill to the heap.
const TRAVERSAL_STACK: usize = 64;

// ---------------------------------------------------------------------------
// Core Tree Structure
// ---------------------------------------------------------------------------

/// Identity of a tree instance, carried by every cursor it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TreeId(u64);

impl TreeId {
	pub(crate) fn fresh() -> TreeId {
		static NEXT: AtomicU64 = AtomicU64::new(0);
		TreeId(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
	}
}

/// An ordered map backed by a red-black tree.
///
/// # Type Parameters
///
/// - `K`: The key type. Lookups and insertions require `K: Ord`, a strict
///   total order. It is a logic error for a key's ordering to change while
///   it is stored in the tree.
/// - `V`: The value type. Values can be mutated in place; keys cannot.
///
/// # Internal Structure
///
/// The tree consists of:
/// - An **arena** of nodes, each holding one key-value pair, a color and
///   `parent`/`left`/`right` links.
/// - The **root** link, plus cached links to the **minimum** and **maximum**
///   nodes for `O(1)` access to both ends.
/// - A live **element count**.
/// - A process-unique **id** used to reject cursors from other trees.
pub struct RedBlackTree<K, V> {
	nodes: Arena<Node<K, V>>,
	root: Option<Idx>,
	/// Leftmost node, maintained incrementally.
	min: Option<Idx>,
	/// Rightmost node, maintained incrementally.
	max: Option<Idx>,
	len: usize,
	id: TreeId,
}

impl<K, V> Default for RedBlackTree<K, V> {
	fn default() -> Self {
		Self::new()
	}
}

// ---------------------------------------------------------------------------
// Internal Helper Types
// ---------------------------------------------------------------------------

/// Outcome of a downward key search.
enum Search {
	/// A node with an equal key exists.
	Found(Idx),
	/// The key is absent and belongs in the empty child slot `side` of
	/// `parent`, or at the root when `parent` is `None`.
	Vacant {
		parent: Option<Idx>,
		side: Side,
	},
}

// ---------------------------------------------------------------------------
// RedBlackTree Implementation
// ---------------------------------------------------------------------------

impl<K, V> RedBlackTree<K, V> {
	// -----------------------------------------------------------------------
	// Construction
	// -----------------------------------------------------------------------

	/// Creates a new, empty tree. Does not allocate.
	///
	/// # Example
	///
	/// ```
	/// use redwood::RedBlackTree;
	///
	/// let tree: RedBlackTree<String, i32> = RedBlackTree::new();
	/// assert!(tree.is_empty());
	/// assert_eq!(tree.begin(), tree.end());
	/// ```
	pub fn new() -> Self {
		Self::with_capacity(0)
	}

	/// Creates an empty tree with room for `capacity` entries before the
	/// node arena has to grow.
	pub fn with_capacity(capacity: usize) -> Self {
		RedBlackTree {
			nodes: Arena::with_capacity(capacity),
			root: None,
			min: None,
			max: None,
			len: 0,
			id: TreeId::fresh(),
		}
	}

	// -----------------------------------------------------------------------
	// Tree Metadata
	// -----------------------------------------------------------------------

	/// Returns the number of entries in the tree.
	#[inline]
	pub fn len(&self) -> usize {
		self.len
	}

	/// Returns `true` if the tree contains no entries.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Number of entries the node arena can hold without reallocating.
	pub fn capacity(&self) -> usize {
		self.nodes.capacity()
	}

	/// Releases spare arena capacity.
	pub fn shrink_to_fit(&mut self) {
		self.nodes.shrink_to_fit();
	}

	/// Returns the number of nodes on the longest root-to-leaf path.
	///
	/// This walks the whole tree and is `O(n)`. For a valid tree the result
	/// never exceeds `2 * log2(len + 1)`.
	pub fn height(&self) -> usize {
		let mut stack: SmallVec<[(Idx, usize); TRAVERSAL_STACK]> = SmallVec::new();
		stack.extend(self.root.map(|root| (root, 1)));

		let mut height = 0;
		while let Some((idx, depth)) = stack.pop() {
			height = height.max(depth);
			let node = &self.nodes[idx];
			stack.extend(node.left.map(|child| (child, depth + 1)));
			stack.extend(node.right.map(|child| (child, depth + 1)));
		}
		height
	}

	// -----------------------------------------------------------------------
	// Cursor Positions
	// -----------------------------------------------------------------------

	/// Forward cursor at the smallest entry, or [`end`](Self::end) if empty.
	#[inline]
	pub fn begin(&self) -> Cursor {
		self.cursor_at(self.min, Direction::Forward)
	}

	/// Forward cursor one past the largest entry.
	#[inline]
	pub fn end(&self) -> Cursor {
		self.cursor_at(None, Direction::Forward)
	}

	/// Reverse cursor at the largest entry, or [`rend`](Self::rend) if empty.
	#[inline]
	pub fn rbegin(&self) -> Cursor {
		self.cursor_at(self.max, Direction::Reverse)
	}

	/// Reverse cursor one before the smallest entry.
	#[inline]
	pub fn rend(&self) -> Cursor {
		self.cursor_at(None, Direction::Reverse)
	}

	#[inline]
	fn cursor_at(&self, idx: Option<Idx>, direction: Direction) -> Cursor {
		Cursor::new(self.id, idx.map(|idx| self.nodes.handle(idx)), direction)
	}

	/// Validates a cursor against this tree. `Ok(None)` is the end position.
	fn resolve(&self, cursor: &Cursor) -> error::Result<Option<Idx>> {
		if cursor.tree != self.id {
			return Err(Error::ForeignCursor);
		}
		match cursor.node {
			None => Ok(None),
			Some(handle) => self.nodes.resolve(handle).map(Some).ok_or(Error::StaleCursor),
		}
	}

	/// Like [`resolve`](Self::resolve), but the end position is an error.
	fn resolve_entry(&self, cursor: &Cursor) -> error::Result<Idx> {
		self.resolve(cursor)?.ok_or(Error::EndOfTree)
	}

	/// Moves `cursor` one entry in key order (`towards`), independent of
	/// the cursor's own direction.
	///
	/// Stepping from the end position in the cursor's own direction is an
	/// error; stepping back from it lands on the far bound of the tree.
	pub(crate) fn step(&self, cursor: &Cursor, towards: Direction) -> error::Result<Cursor> {
		let next = match self.resolve(cursor)? {
			Some(idx) => match towards {
				Direction::Forward => self.nodes.successor(idx),
				Direction::Reverse => self.nodes.predecessor(idx),
			},
			None if towards == cursor.direction => return Err(Error::EndOfTree),
			None => {
				let bound = match towards {
					Direction::Forward => self.min,
					Direction::Reverse => self.max,
				};
				Some(bound.ok_or(Error::EmptyTree)?)
			}
		};
		Ok(self.cursor_at(next, cursor.direction))
	}

	/// Returns the position one step after `cursor` in its direction.
	/// Panics like [`Cursor::move_next`].
	pub fn next_cursor(&self, cursor: Cursor) -> Cursor {
		let mut next = cursor;
		next.move_next(self);
		next
	}

	/// Returns the position one step before `cursor` in its direction.
	/// Panics like [`Cursor::move_prev`].
	pub fn prev_cursor(&self, cursor: Cursor) -> Cursor {
		let mut prev = cursor;
		prev.move_prev(self);
		prev
	}

	// -----------------------------------------------------------------------
	// Cursor Access
	// -----------------------------------------------------------------------

	/// Returns the entry under `cursor`.
	///
	/// # Panics
	///
	/// Panics if the cursor is at the end, was invalidated by erasing its
	/// entry, or belongs to another tree. See [`try_entry_at`](Self::try_entry_at).
	pub fn entry_at(&self, cursor: Cursor) -> (&K, &V) {
		match self.try_entry_at(cursor) {
			Ok(entry) => entry,
			Err(e) => panic!("invalid cursor: {e}"),
		}
	}

	/// Returns the entry under `cursor`, or the reason the cursor cannot be
	/// dereferenced.
	pub fn try_entry_at(&self, cursor: Cursor) -> error::Result<(&K, &V)> {
		let node = &self.nodes[self.resolve_entry(&cursor)?];
		Ok((&node.key, &node.value))
	}

	/// Returns the key under `cursor`. Panics like [`entry_at`](Self::entry_at).
	pub fn key_at(&self, cursor: Cursor) -> &K {
		self.entry_at(cursor).0
	}

	/// Returns the value under `cursor`. Panics like [`entry_at`](Self::entry_at).
	pub fn value_at(&self, cursor: Cursor) -> &V {
		self.entry_at(cursor).1
	}

	/// Returns the value under `cursor` for in-place mutation. Panics like
	/// [`entry_at`](Self::entry_at).
	pub fn value_at_mut(&mut self, cursor: Cursor) -> &mut V {
		match self.try_value_at_mut(cursor) {
			Ok(value) => value,
			Err(e) => panic!("invalid cursor: {e}"),
		}
	}

	/// Fallible form of [`value_at_mut`](Self::value_at_mut).
	pub fn try_value_at_mut(&mut self, cursor: Cursor) -> error::Result<&mut V> {
		let idx = self.resolve_entry(&cursor)?;
		Ok(&mut self.nodes[idx].value)
	}

	// -----------------------------------------------------------------------
	// Iteration
	// -----------------------------------------------------------------------

	/// Iterates over the entries in ascending key order.
	pub fn iter(&self) -> iter::Iter<'_, K, V> {
		iter::Iter::new(&self.nodes, self.min, self.max, self.len)
	}

	/// Iterates over the entries in ascending key order with mutable values.
	pub fn iter_mut(&mut self) -> iter::IterMut<'_, K, V> {
		let order = self.in_order();
		let entries = self
			.nodes
			.get_many_mut(&order)
			.into_iter()
			.map(|node| {
				let Node {
					key,
					value,
					..
				} = node;
				let key: &K = key;
				(key, value)
			})
			.collect();
		iter::IterMut::new(entries)
	}

	/// Iterates over the keys in ascending order.
	pub fn keys(&self) -> iter::Keys<'_, K, V> {
		iter::Keys::new(self.iter())
	}

	/// Iterates over the values in ascending key order.
	pub fn values(&self) -> iter::Values<'_, K, V> {
		iter::Values::new(self.iter())
	}

	/// Iterates mutably over the values in ascending key order.
	pub fn values_mut(&mut self) -> iter::ValuesMut<'_, K, V> {
		iter::ValuesMut::new(self.iter_mut())
	}

	/// Returns the entry with the smallest key.
	pub fn first_key_value(&self) -> Option<(&K, &V)> {
		self.min.map(|idx| {
			let node = &self.nodes[idx];
			(&node.key, &node.value)
		})
	}

	/// Returns the entry with the largest key.
	pub fn last_key_value(&self) -> Option<(&K, &V)> {
		self.max.map(|idx| {
			let node = &self.nodes[idx];
			(&node.key, &node.value)
		})
	}

	/// Node indices in ascending key order.
	fn in_order(&self) -> Vec<Idx> {
		let mut order = Vec::with_capacity(self.len);
		let mut current = self.min;
		while let Some(idx) = current {
			order.push(idx);
			current = self.nodes.successor(idx);
		}
		order
	}

	// -----------------------------------------------------------------------
	// Whole-Tree Operations
	// -----------------------------------------------------------------------

	/// Removes every entry, invalidating all outstanding cursors except end
	/// positions.
	///
	/// Nodes are freed children-first with an explicit stack, so teardown
	/// depth never depends on the call stack.
	pub fn clear(&mut self) {
		debug!(len = self.len, "clearing tree");

		let mut stack: SmallVec<[Idx; TRAVERSAL_STACK]> = SmallVec::new();
		stack.extend(self.root.take());

		while let Some(&idx) = stack.last() {
			let node = &mut self.nodes[idx];
			match (node.left.take(), node.right.take()) {
				(None, None) => {
					stack.pop();
					self.nodes.remove(idx);
				}
				(left, right) => {
					stack.extend(left);
					stack.extend(right);
				}
			}
		}

		self.min = None;
		self.max = None;
		self.len = 0;
	}

	/// Exchanges the contents of two trees.
	///
	/// Cursors follow their entries: a cursor taken from `self` before the
	/// swap is valid against `other` afterwards.
	pub fn swap(&mut self, other: &mut Self) {
		mem::swap(self, other);
	}

	/// Moves every entry out into a new tree and leaves `self` empty.
	///
	/// Outstanding cursors refer to the returned tree.
	pub fn take(&mut self) -> Self {
		mem::take(self)
	}

	// -----------------------------------------------------------------------
	// Removal
	// -----------------------------------------------------------------------

	/// Removes the entry under `cursor` and returns the position that
	/// followed it in the cursor's direction (the in-order successor for
	/// forward cursors, the predecessor for reverse ones).
	///
	/// Only the erased entry's cursors are invalidated.
	///
	/// # Panics
	///
	/// Panics if the cursor is at the end, stale, or foreign. See
	/// [`try_erase`](Self::try_erase).
	///
	/// # Example
	///
	/// ```
	/// use redwood::RedBlackTree;
	///
	/// let mut tree: RedBlackTree<i32, ()> = (1..=5).map(|k| (k, ())).collect();
	///
	/// // Erase the even keys while walking
	/// let mut cursor = tree.begin();
	/// while cursor != tree.end() {
	///     if tree.key_at(cursor) % 2 == 0 {
	///         cursor = tree.erase(cursor);
	///     } else {
	///         cursor.move_next(&tree);
	///     }
	/// }
	/// assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 3, 5]);
	/// ```
	pub fn erase(&mut self, cursor: Cursor) -> Cursor {
		match self.try_erase(cursor) {
			Ok(next) => next,
			Err(e) => panic!("cannot erase through cursor: {e}"),
		}
	}

	/// Fallible form of [`erase`](Self::erase). The tree is unchanged on error.
	pub fn try_erase(&mut self, cursor: Cursor) -> error::Result<Cursor> {
		let idx = self.resolve_entry(&cursor)?;
		// Node identities survive the removal, so the neighbor can be
		// captured before unlinking.
		let next = match cursor.direction {
			Direction::Forward => self.nodes.successor(idx),
			Direction::Reverse => self.nodes.predecessor(idx),
		};
		self.remove_node(idx);
		Ok(self.cursor_at(next, cursor.direction))
	}

	/// Erases every entry from `first` up to (not including) `last` and
	/// returns `last`.
	///
	/// # Panics
	///
	/// Panics if either cursor is invalid, or if `last` is not reachable from
	/// `first` by moving in `first`'s direction.
	pub fn erase_range(&mut self, mut first: Cursor, last: Cursor) -> Cursor {
		if let Err(e) = self.resolve(&last) {
			panic!("invalid range bound: {e}");
		}
		while first != last {
			first = self.erase(first);
		}
		first
	}

	/// Removes and returns the entry with the smallest key.
	pub fn pop_first(&mut self) -> Option<(K, V)> {
		self.min.map(|idx| self.remove_node(idx))
	}

	/// Removes and returns the entry with the largest key.
	pub fn pop_last(&mut self) -> Option<(K, V)> {
		self.max.map(|idx| self.remove_node(idx))
	}

	/// Keeps only the entries for which `keep` returns `true`, visiting them
	/// in ascending key order.
	pub fn retain<F>(&mut self, mut keep: F)
	where
		F: FnMut(&K, &mut V) -> bool,
	{
		let mut current = self.min;
		while let Some(idx) = current {
			current = self.nodes.successor(idx);
			let node = &mut self.nodes[idx];
			if !keep(&node.key, &mut node.value) {
				self.remove_node(idx);
			}
		}
	}

	/// Unlinks and frees the node at `idx`, rebalancing as needed.
	///
	/// The two-child case is reduced to the single-child case by exchanging
	/// the node's position (links and color, not payload) with its in-order
	/// predecessor. Every other node keeps its slot, so cursors to surviving
	/// entries stay valid.
	fn remove_node(&mut self, idx: Idx) -> (K, V) {
		if self.min == Some(idx) {
			self.min = self.nodes.successor(idx);
		}
		if self.max == Some(idx) {
			self.max = self.nodes.predecessor(idx);
		}

		if let (Some(left), Some(_)) = (self.nodes[idx].left, self.nodes[idx].right) {
			let predecessor = self.nodes.subtree_max(left);
			self.swap_with_predecessor(idx, predecessor);
		}

		let node = &self.nodes[idx];
		let parent = node.parent;
		let child = node.left.or(node.right);
		let is_red = node.is_red();

		if is_red {
			// A red node with fewer than two children has none.
			debug_assert!(child.is_none(), "red node with a single child");
			self.replace_child(parent, idx, None);
		} else if let Some(child) = child.filter(|&child| self.nodes[child].is_red()) {
			// Black node over a single red child: the child takes its place
			// and its color.
			self.replace_child(parent, idx, Some(child));
			let child = &mut self.nodes[child];
			child.parent = parent;
			child.color = Color::Black;
		} else {
			// Black leaf: removing it shortens every path through `parent`.
			debug_assert!(child.is_none(), "black node with a single black child");
			let sibling = self.nodes.sibling(idx);
			self.replace_child(parent, idx, None);
			self.delete_fixup(parent, sibling);
		}

		self.len -= 1;
		let node = self.nodes.remove(idx);
		(node.key, node.value)
	}

	/// Exchanges the tree positions of `node` (which has two children) and
	/// `predecessor` (the maximum of its left subtree), including colors.
	fn swap_with_predecessor(&mut self, node: Idx, predecessor: Idx) {
		let node_parent = self.nodes[node].parent;
		let node_left = self.nodes[node].left.expect("node has two children");
		let node_right = self.nodes[node].right.expect("node has two children");
		let pred_parent = self.nodes[predecessor].parent.expect("predecessor is below node");
		let pred_left = self.nodes[predecessor].left;

		// The predecessor adopts the right subtree; it had no right child.
		self.nodes[predecessor].right = Some(node_right);
		self.nodes[node_right].parent = Some(predecessor);

		// The node adopts the predecessor's left subtree and loses its right.
		self.nodes[node].right = None;
		self.nodes[node].left = pred_left;
		if let Some(pred_left) = pred_left {
			self.nodes[pred_left].parent = Some(node);
		}

		self.replace_child(node_parent, node, Some(predecessor));
		self.nodes[predecessor].parent = node_parent;

		if node_left == predecessor {
			self.nodes[predecessor].left = Some(node);
			self.nodes[node].parent = Some(predecessor);
		} else {
			self.nodes[predecessor].left = Some(node_left);
			self.nodes[node_left].parent = Some(predecessor);
			self.nodes[node].parent = Some(pred_parent);
			self.nodes[pred_parent].right = Some(node);
		}

		let node_color = self.nodes[node].color;
		self.nodes[node].color = self.nodes[predecessor].color;
		self.nodes[predecessor].color = node_color;
	}

	// -----------------------------------------------------------------------
	// Rebalancing
	// -----------------------------------------------------------------------

	/// Points `parent`'s link to `old` (or the root link) at `new`.
	#[inline]
	fn replace_child(&mut self, parent: Option<Idx>, old: Idx, new: Option<Idx>) {
		match parent {
			None => self.root = new,
			Some(parent) => {
				let parent = &mut self.nodes[parent];
				if parent.left == Some(old) {
					parent.left = new;
				} else {
					parent.right = new;
				}
			}
		}
	}

	/// Rotates around `pivot` so that it sinks towards `direction` and its
	/// child on the opposite side rises into its place.
	///
	/// ```text
	///   rotate(P, Left):
	///
	///       P                R
	///      / \              / \
	///     a   R     ──►    P   c
	///        / \          / \
	///       b   c        a   b
	/// ```
	fn rotate(&mut self, pivot: Idx, direction: Side) {
		let riser =
			self.nodes[pivot].child(direction.opposite()).expect("rotation needs a child to lift");
		let inner = self.nodes[riser].child(direction);
		let parent = self.nodes[pivot].parent;

		self.nodes[pivot].set_child(direction.opposite(), inner);
		if let Some(inner) = inner {
			self.nodes[inner].parent = Some(pivot);
		}

		self.replace_child(parent, pivot, Some(riser));
		self.nodes[riser].parent = parent;
		self.nodes[riser].set_child(direction, Some(pivot));
		self.nodes[pivot].parent = Some(riser);
	}

	/// Restores the red-black invariants after `node` was linked in as a red
	/// leaf.
	fn insert_fixup(&mut self, mut node: Idx) {
		loop {
			let Some(parent) = self.nodes[node].parent else {
				self.nodes[node].color = Color::Black;
				return;
			};
			if self.nodes[parent].is_black() {
				return;
			}

			let grandparent = self.nodes.grandparent(node).expect("a red parent is never the root");
			let parent_side = self.nodes.side_of(parent).expect("parent has a parent");
			let uncle = self.nodes.uncle(node);

			if self.nodes.is_red(uncle) {
				trace!("insert fixup: red uncle, recoloring");
				let uncle = uncle.expect("red uncle exists");
				self.nodes[parent].color = Color::Black;
				self.nodes[uncle].color = Color::Black;
				self.nodes[grandparent].color = Color::Red;
				node = grandparent;
				continue;
			}

			let mut parent = parent;
			if self.nodes.side_of(node) != Some(parent_side) {
				trace!("insert fixup: inner grandchild, rotating parent");
				self.rotate(parent, parent_side);
				parent = node;
			}

			trace!("insert fixup: outer grandchild, rotating grandparent");
			self.nodes[parent].color = Color::Black;
			self.nodes[grandparent].color = Color::Red;
			self.rotate(grandparent, parent_side.opposite());
			return;
		}
	}

	/// Restores black-height balance after a black leaf was unlinked from
	/// `parent`, whose other child is `sibling`.
	///
	/// Each pass handles the deficient subtree hanging from `parent`; only
	/// the black-sibling-black-parent case moves up a level.
	fn delete_fixup(&mut self, mut parent: Option<Idx>, mut sibling: Option<Idx>) {
		while let Some(p) = parent {
			let mut s = sibling.expect("a deficient subtree always has a sibling");
			let side = if self.nodes[p].right == Some(s) {
				Side::Left
			} else {
				Side::Right
			};

			if self.nodes[s].is_red() {
				trace!("delete fixup: red sibling, rotating parent");
				self.nodes[p].color = Color::Red;
				self.nodes[s].color = Color::Black;
				self.rotate(p, side);
				s = self.nodes[p].child(side.opposite()).expect("a red sibling has two children");
			}

			let near = self.nodes[s].child(side);
			let far = self.nodes[s].child(side.opposite());

			if !self.nodes.is_red(near) && !self.nodes.is_red(far) {
				self.nodes[s].color = Color::Red;
				if self.nodes[p].is_black() {
					trace!("delete fixup: black sibling and parent, moving up");
					sibling = self.nodes.sibling(p);
					parent = self.nodes[p].parent;
					continue;
				}
				trace!("delete fixup: red parent absorbs the missing black");
				self.nodes[p].color = Color::Black;
				return;
			}

			if !self.nodes.is_red(far) {
				trace!("delete fixup: near nephew red, rotating sibling");
				let near = near.expect("near nephew is red");
				self.nodes[s].color = Color::Red;
				self.nodes[near].color = Color::Black;
				self.rotate(s, side.opposite());
				s = near;
			}

			trace!("delete fixup: far nephew red, rotating parent");
			self.nodes[s].color = self.nodes[p].color;
			self.nodes[p].color = Color::Black;
			let far = self.nodes[s].child(side.opposite()).expect("far nephew is red");
			self.nodes[far].color = Color::Black;
			self.rotate(p, side);
			return;
		}
	}

	// -----------------------------------------------------------------------
	// Insertion Primitives
	// -----------------------------------------------------------------------

	/// Links a new red leaf at a vacant slot found by a search, updates the
	/// bound caches and rebalances.
	fn insert_at(&mut self, parent: Option<Idx>, side: Side, key: K, value: V) -> Idx {
		let idx = self.nodes.insert(Node::new(parent, key, value));

		match parent {
			None => {
				self.root = Some(idx);
				self.min = Some(idx);
				self.max = Some(idx);
			}
			Some(parent) => {
				self.nodes[parent].set_child(side, Some(idx));
				// Only the left child of the minimum can undercut it (and
				// symmetrically for the maximum).
				if side == Side::Left && self.min == Some(parent) {
					self.min = Some(idx);
				}
				if side == Side::Right && self.max == Some(parent) {
					self.max = Some(idx);
				}
			}
		}

		self.len += 1;
		self.insert_fixup(idx);
		idx
	}

	fn place(&mut self, search: Search, key: K, value: V) -> (Cursor, bool) {
		match search {
			Search::Found(idx) => (self.cursor_at(Some(idx), Direction::Forward), false),
			Search::Vacant {
				parent,
				side,
			} => {
				let idx = self.insert_at(parent, side, key, value);
				(self.cursor_at(Some(idx), Direction::Forward), true)
			}
		}
	}
}

impl<K: Ord, V> RedBlackTree<K, V> {
	// -----------------------------------------------------------------------
	// Search
	// -----------------------------------------------------------------------

	/// Descends from `start` (the root, or a subtree known to contain the
	/// key's position) looking for `key`.
	fn search_from<Q>(&self, start: Option<Idx>, key: &Q) -> Search
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let Some(mut current) = start else {
			return Search::Vacant {
				parent: None,
				side: Side::Left,
			};
		};

		loop {
			let node = &self.nodes[current];
			let side = match key.cmp(node.key.borrow()) {
				Ordering::Less => Side::Left,
				Ordering::Greater => Side::Right,
				Ordering::Equal => return Search::Found(current),
			};
			match node.child(side) {
				Some(child) => current = child,
				None => {
					return Search::Vacant {
						parent: Some(current),
						side,
					}
				}
			}
		}
	}

	fn find_idx<Q>(&self, key: &Q) -> Option<Idx>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		match self.search_from(self.root, key) {
			Search::Found(idx) => Some(idx),
			Search::Vacant {
				..
			} => None,
		}
	}

	/// Returns a cursor at `key`, or [`end`](Self::end) if it is absent.
	///
	/// # Example
	///
	/// ```
	/// use redwood::RedBlackTree;
	///
	/// let mut tree = RedBlackTree::new();
	/// tree.emplace(1, "one");
	///
	/// assert_eq!(tree.value_at(tree.find(&1)), &"one");
	/// assert_eq!(tree.find(&2), tree.end());
	/// ```
	pub fn find<Q>(&self, key: &Q) -> Cursor
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.cursor_at(self.find_idx(key), Direction::Forward)
	}

	/// Returns `true` if the tree contains the specified key.
	pub fn contains_key<Q>(&self, key: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.find_idx(key).is_some()
	}

	/// Number of entries with the given key: `0` or `1`.
	pub fn count<Q>(&self, key: &Q) -> usize
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		usize::from(self.contains_key(key))
	}

	/// Returns a reference to the value for `key`.
	pub fn get<Q>(&self, key: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.find_idx(key).map(|idx| &self.nodes[idx].value)
	}

	/// Returns the stored key and its value.
	pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.find_idx(key).map(|idx| {
			let node = &self.nodes[idx];
			(&node.key, &node.value)
		})
	}

	/// Returns a mutable reference to the value for `key`.
	pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.find_idx(key).map(|idx| &mut self.nodes[idx].value)
	}

	// -----------------------------------------------------------------------
	// Insertion
	// -----------------------------------------------------------------------

	/// Inserts `key` with `value` unless the key is already present.
	///
	/// Returns a cursor at the entry for `key` and whether a new entry was
	/// created. When the key exists nothing is modified and the supplied
	/// key and value are dropped.
	///
	/// # Example
	///
	/// ```
	/// use redwood::RedBlackTree;
	///
	/// let mut tree = RedBlackTree::new();
	/// let (first, inserted) = tree.emplace(7, "seven");
	/// assert!(inserted);
	///
	/// let (again, inserted) = tree.emplace(7, "siete");
	/// assert!(!inserted);
	/// assert_eq!(first, again);
	/// assert_eq!(tree.value_at(again), &"seven");
	/// assert_eq!(tree.len(), 1);
	/// ```
	pub fn emplace(&mut self, key: K, value: V) -> (Cursor, bool) {
		let search = self.search_from(self.root, &key);
		self.place(search, key, value)
	}

	/// Like [`emplace`](Self::emplace), but starts the search at `hint`
	/// instead of the root.
	///
	/// The search first climbs from the hint until it reaches a subtree whose
	/// key range contains `key`, then descends as usual. Any valid hint
	/// (including [`end`](Self::end)) produces exactly the same tree as
	/// `emplace`; a hint close to the key's final position saves most of the
	/// descent.
	///
	/// # Panics
	///
	/// Panics if `hint` is stale or belongs to another tree.
	pub fn emplace_hint(&mut self, hint: Cursor, key: K, value: V) -> (Cursor, bool) {
		let hinted = match self.resolve(&hint) {
			Ok(idx) => idx,
			Err(e) => panic!("invalid insertion hint: {e}"),
		};
		// The end position sits just past the maximum.
		let start = hinted.or(self.max).map(|idx| self.hint_start(idx, &key));
		let search = self.search_from(start, &key);
		self.place(search, key, value)
	}

	/// Climbs from `hint` to the lowest ancestor-or-self whose subtree key
	/// range admits `key`.
	///
	/// A subtree's range is bounded by the nearest ancestor it hangs left of
	/// (upper bound) and the nearest ancestor it hangs right of (lower bound).
	fn hint_start(&self, hint: Idx, key: &K) -> Idx {
		let mut candidate = hint;
		'climb: loop {
			let (mut lower_seen, mut upper_seen) = (false, false);
			let mut child = candidate;

			while let Some(parent) = self.nodes[child].parent {
				let bound = &self.nodes[parent].key;
				if self.nodes[parent].left == Some(child) {
					if !upper_seen {
						upper_seen = true;
						if key >= bound {
							trace!("insertion hint below upper bound, climbing");
							candidate = parent;
							continue 'climb;
						}
					}
				} else if !lower_seen {
					lower_seen = true;
					if key <= bound {
						trace!("insertion hint above lower bound, climbing");
						candidate = parent;
						continue 'climb;
					}
				}

				if lower_seen && upper_seen {
					break;
				}
				child = parent;
			}

			return candidate;
		}
	}

	/// Inserts `key` with `value`, replacing and returning the previous
	/// value if the key was present. The stored key is not replaced.
	///
	/// # Example
	///
	/// ```
	/// use redwood::RedBlackTree;
	///
	/// let mut tree = RedBlackTree::new();
	/// assert_eq!(tree.insert(1, "one"), None);
	/// assert_eq!(tree.insert(1, "uno"), Some("one"));
	/// assert_eq!(tree.get(&1), Some(&"uno"));
	/// ```
	pub fn insert(&mut self, key: K, value: V) -> Option<V> {
		match self.search_from(self.root, &key) {
			Search::Found(idx) => Some(mem::replace(&mut self.nodes[idx].value, value)),
			Search::Vacant {
				parent,
				side,
			} => {
				self.insert_at(parent, side, key, value);
				None
			}
		}
	}

	// -----------------------------------------------------------------------
	// Keyed Removal
	// -----------------------------------------------------------------------

	/// Removes `key`, returning its value if it was present.
	pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.remove_entry(key).map(|(_, value)| value)
	}

	/// Removes `key`, returning the stored key and value if it was present.
	pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.find_idx(key).map(|idx| self.remove_node(idx))
	}

	// -----------------------------------------------------------------------
	// Range Queries
	// -----------------------------------------------------------------------

	fn lower_bound_idx<Q>(&self, key: &Q) -> Option<Idx>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let mut current = self.root;
		let mut bound = None;
		while let Some(idx) = current {
			let node = &self.nodes[idx];
			if key.cmp(node.key.borrow()) != Ordering::Greater {
				bound = Some(idx);
				current = node.left;
			} else {
				current = node.right;
			}
		}
		bound
	}

	fn upper_bound_idx<Q>(&self, key: &Q) -> Option<Idx>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let mut current = self.root;
		let mut bound = None;
		while let Some(idx) = current {
			let node = &self.nodes[idx];
			if key.cmp(node.key.borrow()) == Ordering::Less {
				bound = Some(idx);
				current = node.left;
			} else {
				current = node.right;
			}
		}
		bound
	}

	/// Cursor at the first entry whose key is `>= key`, or end.
	pub fn lower_bound<Q>(&self, key: &Q) -> Cursor
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.cursor_at(self.lower_bound_idx(key), Direction::Forward)
	}

	/// Cursor at the first entry whose key is `> key`, or end.
	pub fn upper_bound<Q>(&self, key: &Q) -> Cursor
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.cursor_at(self.upper_bound_idx(key), Direction::Forward)
	}

	/// Returns `(lower_bound(key), upper_bound(key))`, the half-open span of
	/// entries equal to `key` (empty or a single entry).
	///
	/// The first descent finds the lower bound while remembering the last
	/// node it turned left at strictly above `key`; the upper bound is either
	/// that node or lies in its left subtree, so the second descent starts
	/// there.
	///
	/// # Example
	///
	/// ```
	/// use redwood::RedBlackTree;
	///
	/// let tree: RedBlackTree<i32, ()> = [10, 20, 30].into_iter().map(|k| (k, ())).collect();
	///
	/// let (first, last) = tree.equal_range(&20);
	/// assert_eq!(tree.key_at(first), &20);
	/// assert_eq!(tree.key_at(last), &30);
	///
	/// let (first, last) = tree.equal_range(&25);
	/// assert_eq!(first, last);
	/// assert_eq!(tree.key_at(first), &30);
	/// ```
	pub fn equal_range<Q>(&self, key: &Q) -> (Cursor, Cursor)
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let mut current = self.root;
		let mut first = None;
		let mut second = None;
		while let Some(idx) = current {
			let node = &self.nodes[idx];
			match key.cmp(node.key.borrow()) {
				Ordering::Greater => current = node.right,
				ordering => {
					if ordering == Ordering::Less {
						second = Some(idx);
					}
					first = Some(idx);
					current = node.left;
				}
			}
		}

		let mut current = match second {
			Some(second) => self.nodes[second].left,
			None => self.root,
		};
		while let Some(idx) = current {
			let node = &self.nodes[idx];
			if key.cmp(node.key.borrow()) == Ordering::Less {
				second = Some(idx);
				current = node.left;
			} else {
				current = node.right;
			}
		}

		(self.cursor_at(first, Direction::Forward), self.cursor_at(second, Direction::Forward))
	}

	/// Iterates over the entries whose keys fall within `range`, in
	/// ascending order. An inverted range yields nothing.
	///
	/// # Example
	///
	/// ```
	/// use redwood::RedBlackTree;
	///
	/// let tree: RedBlackTree<i32, i32> = (0..10).map(|k| (k, k * k)).collect();
	///
	/// let squares: Vec<_> = tree.range(3..6).map(|(_, v)| *v).collect();
	/// assert_eq!(squares, [9, 16, 25]);
	///
	/// let tail: Vec<_> = tree.range(8..).rev().map(|(k, _)| *k).collect();
	/// assert_eq!(tail, [9, 8]);
	/// ```
	pub fn range<Q, R>(&self, range: R) -> iter::Range<'_, K, V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
		R: RangeBounds<Q>,
	{
		let front = match range.start_bound() {
			Bound::Included(key) => self.lower_bound_idx(key),
			Bound::Excluded(key) => self.upper_bound_idx(key),
			Bound::Unbounded => self.min,
		};
		let after_back = match range.end_bound() {
			Bound::Included(key) => Some(self.upper_bound_idx(key)),
			Bound::Excluded(key) => Some(self.lower_bound_idx(key)),
			Bound::Unbounded => None,
		};
		let back = match after_back {
			Some(Some(idx)) => self.nodes.predecessor(idx),
			Some(None) | None => self.max,
		};

		match (front, back) {
			(Some(front), Some(back)) if self.nodes[front].key <= self.nodes[back].key => {
				iter::Range::new(&self.nodes, Some(front), Some(back))
			}
			_ => iter::Range::new(&self.nodes, None, None),
		}
	}
}

// ---------------------------------------------------------------------------
// Standard Trait Implementations
// ---------------------------------------------------------------------------

impl<K: Clone, V: Clone> Clone for RedBlackTree<K, V> {
	/// Deep-copies the tree, preserving its exact shape and colors.
	///
	/// Nodes are copied in pre-order with an explicit stack; each copy is
	/// linked under its already-copied parent. The copy gets its own
	/// identity, so cursors of the original do not apply to it.
	fn clone(&self) -> Self {
		debug!(len = self.len, "deep-copying tree");

		let mut nodes = Arena::with_capacity(self.len);
		let (mut root, mut min, mut max) = (None, None, None);

		let mut stack: SmallVec<[(Idx, Option<Idx>, Side); TRAVERSAL_STACK]> = SmallVec::new();
		stack.extend(self.root.map(|root| (root, None, Side::Left)));

		while let Some((source, parent, side)) = stack.pop() {
			let original = &self.nodes[source];
			let mut copy = Node::new(parent, original.key.clone(), original.value.clone());
			copy.color = original.color;
			let idx = nodes.insert(copy);

			match parent {
				None => root = Some(idx),
				Some(parent) => nodes[parent].set_child(side, Some(idx)),
			}
			if self.min == Some(source) {
				min = Some(idx);
			}
			if self.max == Some(source) {
				max = Some(idx);
			}

			// Right first so that the left subtree is copied first.
			stack.extend(original.right.map(|child| (child, Some(idx), Side::Right)));
			stack.extend(original.left.map(|child| (child, Some(idx), Side::Left)));
		}

		RedBlackTree {
			nodes,
			root,
			min,
			max,
			len: self.len,
			id: TreeId::fresh(),
		}
	}
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for RedBlackTree<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.iter()).finish()
	}
}

impl<K: PartialEq, V: PartialEq> PartialEq for RedBlackTree<K, V> {
	fn eq(&self, other: &Self) -> bool {
		self.len == other.len && self.iter().eq(other.iter())
	}
}

impl<K: Eq, V: Eq> Eq for RedBlackTree<K, V> {}

impl<K: PartialOrd, V: PartialOrd> PartialOrd for RedBlackTree<K, V> {
	/// Lexicographic comparison of the in-order entries.
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		self.iter().partial_cmp(other.iter())
	}
}

impl<K: Ord, V: Ord> Ord for RedBlackTree<K, V> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.iter().cmp(other.iter())
	}
}

impl<K: Hash, V: Hash> Hash for RedBlackTree<K, V> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_usize(self.len);
		for entry in self {
			entry.hash(state);
		}
	}
}

impl<K, Q, V> Index<&Q> for RedBlackTree<K, V>
where
	K: Borrow<Q> + Ord,
	Q: ?Sized + Ord,
{
	type Output = V;

	/// # Panics
	///
	/// Panics if the key is not present in the tree.
	fn index(&self, key: &Q) -> &V {
		self.get(key).expect("no entry found for key")
	}
}

impl<K: Ord, V> FromIterator<(K, V)> for RedBlackTree<K, V> {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut tree = RedBlackTree::new();
		tree.extend(iter);
		tree
	}
}

impl<K: Ord, V> Extend<(K, V)> for RedBlackTree<K, V> {
	/// Inserts every pair, replacing the values of keys already present.
	fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
		for (key, value) in iter {
			self.insert(key, value);
		}
	}
}

impl<'a, K: Ord + Copy, V: Copy> Extend<(&'a K, &'a V)> for RedBlackTree<K, V> {
	fn extend<I: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: I) {
		self.extend(iter.into_iter().map(|(&key, &value)| (key, value)));
	}
}

impl<K: Ord, V, const N: usize> From<[(K, V); N]> for RedBlackTree<K, V> {
	fn from(entries: [(K, V); N]) -> Self {
		entries.into_iter().collect()
	}
}

impl<'a, K, V> IntoIterator for &'a RedBlackTree<K, V> {
	type Item = (&'a K, &'a V);
	type IntoIter = iter::Iter<'a, K, V>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

impl<'a, K, V> IntoIterator for &'a mut RedBlackTree<K, V> {
	type Item = (&'a K, &'a mut V);
	type IntoIter = iter::IterMut<'a, K, V>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter_mut()
	}
}

impl<K, V> IntoIterator for RedBlackTree<K, V> {
	type Item = (K, V);
	type IntoIter = iter::IntoIter<K, V>;

	/// Consumes the tree, yielding its entries in ascending key order.
	fn into_iter(mut self) -> Self::IntoIter {
		let order = self.in_order();
		let entries: Vec<_> = order
			.into_iter()
			.map(|idx| {
				let node = self.nodes.remove(idx);
				(node.key, node.value)
			})
			.collect();
		iter::IntoIter::new(entries)
	}
}

// ===========================================================================
// Test-Only Validation Module
// ===========================================================================

/// Invariant validation for testing.
#[cfg(any(test, feature = "test-utils"))]
impl<K: Ord + fmt::Debug, V> RedBlackTree<K, V> {
	/// Validates all tree invariants. Panics with diagnostic info if any
	/// invariant is violated.
	///
	/// # Invariants Checked
	///
	/// 1. Root color: the root is black and has no parent
	/// 2. Red rule: no red node has a red child
	/// 3. Black height: every path to a missing child has the same number
	///    of black nodes
	/// 4. Key ordering: in-order keys are strictly increasing
	/// 5. Bound caches: `min`/`max` are the leftmost/rightmost nodes
	/// 6. Link and count consistency: children point back at their parent,
	///    and `len` matches both the reachable nodes and the arena
	pub fn assert_invariants(&self) {
		let Some(root) = self.root else {
			assert_eq!(self.len, 0, "Empty tree reports len {}", self.len);
			assert!(self.min.is_none(), "Empty tree still caches a minimum");
			assert!(self.max.is_none(), "Empty tree still caches a maximum");
			assert_eq!(self.nodes.len(), 0, "Empty tree still holds {} nodes", self.nodes.len());
			return;
		};

		// Invariant 1: Root color
		let root_node = &self.nodes[root];
		assert!(root_node.is_black(), "Root {:?} is red", root_node.key);
		assert!(root_node.parent.is_none(), "Root {:?} has a parent link", root_node.key);

		// Invariants 2-4, recursively
		let mut reachable = 0;
		self.validate_subtree(root, None, None, &mut reachable);

		// Invariant 6: Count consistency
		assert_eq!(reachable, self.len, "Reachable nodes {} != len {}", reachable, self.len);
		assert_eq!(
			self.nodes.len(),
			self.len,
			"Arena holds {} nodes but len is {}",
			self.nodes.len(),
			self.len
		);

		// Invariant 5: Bound caches
		let min = self.nodes.subtree_min(root);
		let max = self.nodes.subtree_max(root);
		assert_eq!(
			self.min,
			Some(min),
			"Cached minimum is stale, actual minimum is {:?}",
			self.nodes[min].key
		);
		assert_eq!(
			self.max,
			Some(max),
			"Cached maximum is stale, actual maximum is {:?}",
			self.nodes[max].key
		);
	}

	/// Validates the subtree at `idx` against the exclusive key bounds
	/// inherited from its ancestors and returns its black height (counting
	/// the node itself).
	fn validate_subtree(
		&self,
		idx: Idx,
		lower: Option<&K>,
		upper: Option<&K>,
		reachable: &mut usize,
	) -> usize {
		let node = &self.nodes[idx];
		*reachable += 1;

		// Invariant 4: Key ordering
		if let Some(lower) = lower {
			assert!(node.key > *lower, "Key {:?} not greater than lower bound {:?}", node.key, lower);
		}
		if let Some(upper) = upper {
			assert!(node.key < *upper, "Key {:?} not less than upper bound {:?}", node.key, upper);
		}

		let mut heights = [0usize; 2];
		for (slot, child) in [node.left, node.right].into_iter().enumerate() {
			let Some(child) = child else {
				continue;
			};
			let child_node = &self.nodes[child];

			// Invariant 6: Link consistency
			assert_eq!(
				child_node.parent,
				Some(idx),
				"Child {:?} of {:?} has a broken parent link",
				child_node.key,
				node.key
			);

			// Invariant 2: Red rule
			assert!(
				!(node.is_red() && child_node.is_red()),
				"Red node {:?} has red child {:?}",
				node.key,
				child_node.key
			);

			let (lo, hi) = if slot == 0 {
				(lower, Some(&node.key))
			} else {
				(Some(&node.key), upper)
			};
			heights[slot] = self.validate_subtree(child, lo, hi, reachable);
		}

		// Invariant 3: Black height
		assert_eq!(
			heights[0], heights[1],
			"Black heights differ below {:?}: left {} right {}",
			node.key, heights[0], heights[1]
		);

		heights[0] + usize::from(node.is_black())
	}

	/// Black nodes on any path from the root to a missing child, excluding
	/// the root itself.
	pub fn black_height(&self) -> usize {
		let mut height = 0;
		let mut current = self.root.and_then(|root| self.nodes[root].left);
		while let Some(idx) = current {
			height += usize::from(self.nodes[idx].is_black());
			current = self.nodes[idx].left;
		}
		height
	}

	/// Keys and colors in pre-order. Two trees with equal pre-order
	/// sequences have the same shape.
	pub fn preorder(&self) -> Vec<(&K, Color)> {
		let mut out = Vec::with_capacity(self.len);
		let mut stack: SmallVec<[Idx; TRAVERSAL_STACK]> = SmallVec::new();
		stack.extend(self.root);
		while let Some(idx) = stack.pop() {
			let node = &self.nodes[idx];
			out.push((&node.key, node.color));
			stack.extend(node.right);
			stack.extend(node.left);
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::prelude::*;

	use Color::{Black, Red};

	fn keys(tree: &RedBlackTree<i32, i32>) -> Vec<i32> {
		tree.keys().copied().collect()
	}

	fn shape(tree: &RedBlackTree<i32, i32>) -> Vec<(i32, Color)> {
		tree.preorder().into_iter().map(|(k, c)| (*k, c)).collect()
	}

	fn tree_of(keys: impl IntoIterator<Item = i32>) -> RedBlackTree<i32, i32> {
		let mut tree = RedBlackTree::new();
		for k in keys {
			tree.emplace(k, k * 10);
			tree.assert_invariants();
		}
		tree
	}

	// -----------------------------------------------------------------------
	// Basic Tree Operation Tests
	// -----------------------------------------------------------------------

	#[test]
	fn basic_emplace_and_find() {
		let mut tree: RedBlackTree<i32, &str> = RedBlackTree::new();

		assert!(tree.emplace(1, "one").1);
		assert!(tree.emplace(2, "two").1);
		assert!(tree.emplace(3, "three").1);

		tree.assert_invariants();

		assert_eq!(tree.value_at(tree.find(&1)), &"one");
		assert_eq!(tree.value_at(tree.find(&2)), &"two");
		assert_eq!(tree.value_at(tree.find(&3)), &"three");
		assert_eq!(tree.find(&4), tree.end());
		assert_eq!(tree.len(), 3);
	}

	#[test]
	fn emplace_existing_key_is_noop() {
		let mut tree: RedBlackTree<i32, &str> = RedBlackTree::new();

		let (pos, inserted) = tree.emplace(1, "one");
		assert!(inserted);
		let (again, inserted) = tree.emplace(1, "uno");
		assert!(!inserted);
		assert_eq!(pos, again);
		assert_eq!(tree.get(&1), Some(&"one"));
		assert_eq!(tree.len(), 1);

		tree.assert_invariants();
	}

	#[test]
	fn emplace_keeps_original_key_identity() {
		// Keys that compare equal but carry different payloads.
		#[derive(Debug)]
		struct Tagged(i32, &'static str);
		impl PartialEq for Tagged {
			fn eq(&self, other: &Self) -> bool {
				self.0 == other.0
			}
		}
		impl Eq for Tagged {}
		impl PartialOrd for Tagged {
			fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
				Some(self.cmp(other))
			}
		}
		impl Ord for Tagged {
			fn cmp(&self, other: &Self) -> Ordering {
				self.0.cmp(&other.0)
			}
		}

		let mut tree = RedBlackTree::new();
		tree.emplace(Tagged(1, "first"), ());
		tree.emplace(Tagged(1, "second"), ());
		tree.insert(Tagged(1, "third"), ());
		assert_eq!(tree.len(), 1);
		assert_eq!(tree.key_at(tree.begin()).1, "first");
	}

	#[test]
	fn insert_replaces_value() {
		let mut tree: RedBlackTree<i32, &str> = RedBlackTree::new();

		assert_eq!(tree.insert(1, "one"), None);
		assert_eq!(tree.insert(1, "uno"), Some("one"));
		assert_eq!(tree.get(&1), Some(&"uno"));
		assert_eq!(tree[&1], "uno");

		tree.assert_invariants();
	}

	#[test]
	fn remove() {
		let mut tree: RedBlackTree<i32, &str> = RedBlackTree::new();

		tree.insert(1, "one");
		tree.insert(2, "two");

		assert_eq!(tree.remove(&1), Some("one"));
		assert_eq!(tree.remove(&1), None);
		assert_eq!(tree.get(&1), None);
		assert_eq!(tree.get(&2), Some(&"two"));
		assert_eq!(tree.remove_entry(&2), Some((2, "two")));
		assert!(tree.is_empty());

		tree.assert_invariants();
	}

	#[test]
	fn lookups_through_borrowed_keys() {
		let mut tree: RedBlackTree<String, usize> = RedBlackTree::new();
		for word in ["pear", "apple", "fig"] {
			tree.insert(word.to_string(), word.len());
		}

		assert_eq!(tree.get("fig"), Some(&3));
		assert!(tree.contains_key("apple"));
		assert_eq!(tree.count("kiwi"), 0);
		assert_eq!(tree.count("pear"), 1);
		*tree.get_mut("pear").unwrap() += 10;
		assert_eq!(tree.get_key_value("pear"), Some((&"pear".to_string(), &14)));
		assert_eq!(tree.key_at(tree.lower_bound("b")), "fig");
	}

	// -----------------------------------------------------------------------
	// Insert Fixup Tests
	// -----------------------------------------------------------------------

	#[test]
	fn insert_sequence_keeps_invariants() {
		let tree = tree_of([10, 20, 5, 15, 30, 25]);
		assert_eq!(keys(&tree), vec![5, 10, 15, 20, 25, 30]);
		assert_eq!(tree.len(), 6);
	}

	#[test]
	fn insert_outer_grandchild_rotates_once() {
		// Left-left: 3, 2, 1 rotates right around 3.
		assert_eq!(shape(&tree_of([3, 2, 1])), vec![(2, Black), (1, Red), (3, Red)]);
		// Right-right: 1, 2, 3 rotates left around 1.
		assert_eq!(shape(&tree_of([1, 2, 3])), vec![(2, Black), (1, Red), (3, Red)]);
	}

	#[test]
	fn insert_inner_grandchild_rotates_twice() {
		// Left-right: 3, 1, 2.
		assert_eq!(shape(&tree_of([3, 1, 2])), vec![(2, Black), (1, Red), (3, Red)]);
		// Right-left: 1, 3, 2.
		assert_eq!(shape(&tree_of([1, 3, 2])), vec![(2, Black), (1, Red), (3, Red)]);
	}

	#[test]
	fn insert_red_uncle_recolors() {
		let tree = tree_of([2, 1, 3, 4]);
		// 1 and 3 turn black, 2 would turn red but is the root.
		assert_eq!(shape(&tree), vec![(2, Black), (1, Black), (3, Black), (4, Red)]);
	}

	// -----------------------------------------------------------------------
	// Delete Tests
	// -----------------------------------------------------------------------

	#[test]
	fn erase_internal_two_child_node() {
		let mut tree = tree_of(1..=7);

		let next = tree.erase(tree.find(&4));
		assert_eq!(tree.key_at(next), &5);
		tree.assert_invariants();
		assert_eq!(keys(&tree), vec![1, 2, 3, 5, 6, 7]);
	}

	#[test]
	fn erase_only_entry() {
		let mut tree = tree_of([42]);

		let next = tree.erase(tree.begin());
		assert_eq!(next, tree.end());
		assert!(tree.is_empty());
		assert_eq!(tree.len(), 0);
		assert_eq!(tree.first_key_value(), None);
		assert_eq!(tree.last_key_value(), None);
		assert_eq!(tree.begin(), tree.end());
		tree.assert_invariants();
	}

	#[test]
	fn erase_two_child_node_keeps_other_cursors() {
		let mut tree = tree_of(1..=15);
		let cursors: Vec<_> = (1..=15).map(|k| (k, tree.find(&k))).collect();

		// The root of a 15-entry tree always has two children.
		let root = *tree.preorder()[0].0;
		tree.erase(tree.find(&root));
		tree.assert_invariants();

		for (k, cursor) in cursors {
			if k == root {
				assert_eq!(tree.try_entry_at(cursor), Err(Error::StaleCursor));
			} else {
				assert_eq!(tree.entry_at(cursor), (&k, &(k * 10)));
			}
		}
	}

	#[test]
	fn erase_updates_bound_caches() {
		let mut tree = tree_of([5, 3, 8, 1, 4, 7, 9]);

		tree.erase(tree.begin());
		assert_eq!(tree.first_key_value(), Some((&3, &30)));
		tree.erase(tree.rbegin());
		assert_eq!(tree.last_key_value(), Some((&8, &80)));
		tree.assert_invariants();

		assert_eq!(tree.pop_first(), Some((3, 30)));
		assert_eq!(tree.pop_last(), Some((8, 80)));
		assert_eq!(keys(&tree), vec![4, 5, 7]);
		tree.assert_invariants();
	}

	#[test]
	fn delete_all_entries() {
		let mut tree = tree_of(0..100);

		for i in 0..100 {
			assert_eq!(tree.remove(&i), Some(i * 10));
			tree.assert_invariants();
		}

		assert!(tree.is_empty());
	}

	#[test]
	fn delete_random_order() {
		let mut tree = RedBlackTree::new();
		let mut keys: Vec<i32> = (0..500).collect();
		let mut rng = rand::rng();

		keys.shuffle(&mut rng);
		for &k in &keys {
			tree.insert(k, k);
		}
		tree.assert_invariants();

		keys.shuffle(&mut rng);
		for (removed, &k) in keys.iter().enumerate() {
			assert_eq!(tree.remove(&k), Some(k));
			assert_eq!(tree.len(), keys.len() - removed - 1);
			tree.assert_invariants();
		}

		for k in &keys {
			assert_eq!(tree.find(k), tree.end());
		}
	}

	#[test]
	fn retain_filters_in_order() {
		let mut tree = tree_of(0..50);
		let mut seen = Vec::new();
		tree.retain(|k, v| {
			seen.push(*k);
			*v += 1;
			k % 3 == 0
		});

		assert_eq!(seen, (0..50).collect::<Vec<_>>());
		assert_eq!(keys(&tree), (0..50).filter(|k| k % 3 == 0).collect::<Vec<_>>());
		assert!(tree.values().zip(tree.keys()).all(|(v, k)| *v == k * 10 + 1));
		tree.assert_invariants();
	}

	// -----------------------------------------------------------------------
	// Hint Tests
	// -----------------------------------------------------------------------

	#[test]
	fn hint_at_end_matches_plain_emplace() {
		let mut hinted = tree_of([10, 20, 30, 40]);
		let mut plain = hinted.clone();

		let end = hinted.end();
		let (pos, inserted) = hinted.emplace_hint(end, 50, 500);
		assert!(inserted);
		assert_eq!(hinted.key_at(pos), &50);
		plain.emplace(50, 500);

		hinted.assert_invariants();
		assert_eq!(shape(&hinted), shape(&plain));
	}

	#[test]
	fn hint_far_from_key_climbs() {
		let mut hinted = tree_of((0..64).map(|k| k * 2));
		let mut plain = hinted.clone();

		// Odd keys are all new. Hints sit at both extremes and in the middle,
		// near to and far from where the key lands.
		for (hint_key, key) in [(0, 200), (126, -5), (20, 67), (80, 81), (126, 3), (0, 95)] {
			let hint = hinted.find(&hint_key);
			let (pos, inserted) = hinted.emplace_hint(hint, key, key);
			assert!(inserted);
			assert_eq!(hinted.key_at(pos), &key);
			plain.emplace(key, key);
			hinted.assert_invariants();
			assert_eq!(shape(&hinted), shape(&plain));
		}
	}

	#[test]
	fn hint_with_existing_key() {
		let mut tree = tree_of(0..20);
		let (pos, inserted) = tree.emplace_hint(tree.find(&3), 17, 0);
		assert!(!inserted);
		assert_eq!(tree.entry_at(pos), (&17, &170));
	}

	#[test]
	fn hint_into_empty_tree() {
		let mut tree = RedBlackTree::new();
		let (pos, inserted) = tree.emplace_hint(tree.end(), 1, 10);
		assert!(inserted);
		assert_eq!(tree.entry_at(pos), (&1, &10));
		tree.assert_invariants();
	}

	// -----------------------------------------------------------------------
	// Bound Tests
	// -----------------------------------------------------------------------

	#[test]
	fn bounds() {
		let tree = tree_of((0..10).map(|k| k * 10));

		assert_eq!(tree.key_at(tree.lower_bound(&30)), &30);
		assert_eq!(tree.key_at(tree.upper_bound(&30)), &40);
		assert_eq!(tree.key_at(tree.lower_bound(&31)), &40);
		assert_eq!(tree.key_at(tree.upper_bound(&-1)), &0);
		assert_eq!(tree.lower_bound(&91), tree.end());
		assert_eq!(tree.upper_bound(&90), tree.end());

		let (first, last) = tree.equal_range(&90);
		assert_eq!(tree.key_at(first), &90);
		assert_eq!(last, tree.end());
		let (first, last) = tree.equal_range(&95);
		assert_eq!((first, last), (tree.end(), tree.end()));
	}

	#[test]
	fn range_queries() {
		let tree = tree_of(0..20);

		let collect = |r: iter::Range<'_, i32, i32>| r.map(|(k, _)| *k).collect::<Vec<_>>();
		assert_eq!(collect(tree.range(5..8)), vec![5, 6, 7]);
		assert_eq!(collect(tree.range(5..=8)), vec![5, 6, 7, 8]);
		assert_eq!(collect(tree.range(..3)), vec![0, 1, 2]);
		assert_eq!(collect(tree.range(17..)), vec![17, 18, 19]);
		assert_eq!(collect(tree.range((Bound::Excluded(4), Bound::Excluded(7)))), vec![5, 6]);
		assert_eq!(collect(tree.range(30..40)), Vec::<i32>::new());
		assert_eq!(collect(tree.range(8..8)), Vec::<i32>::new());
		assert_eq!(tree.range::<i32, _>(..).count(), 20);
	}

	// -----------------------------------------------------------------------
	// Whole-Tree Tests
	// -----------------------------------------------------------------------

	#[test]
	fn clear_resets_everything() {
		let mut tree = tree_of(0..100);
		let cursor = tree.find(&50);

		tree.clear();
		tree.assert_invariants();
		assert!(tree.is_empty());
		assert_eq!(tree.height(), 0);
		assert_eq!(tree.try_entry_at(cursor), Err(Error::StaleCursor));

		// The tree is fully usable afterwards.
		tree.insert(1, 1);
		tree.assert_invariants();
		assert_eq!(tree.len(), 1);
	}

	#[test]
	fn clone_preserves_shape_and_colors() {
		let mut tree = tree_of(0..200);
		for k in (0..200).step_by(3) {
			tree.remove(&k);
		}

		let copy = tree.clone();
		copy.assert_invariants();
		assert_eq!(shape(&copy), shape(&tree));
		assert_eq!(copy, tree);

		// Cursors of the original do not apply to the copy.
		assert_eq!(copy.try_entry_at(tree.begin()), Err(Error::ForeignCursor));
	}

	#[test]
	fn take_leaves_source_empty() {
		let mut tree = tree_of(0..10);
		let cursor = tree.find(&5);

		let moved = tree.take();
		assert!(tree.is_empty());
		tree.assert_invariants();
		moved.assert_invariants();
		assert_eq!(moved.len(), 10);
		assert_eq!(moved.entry_at(cursor), (&5, &50));
		assert_eq!(tree.try_entry_at(cursor), Err(Error::ForeignCursor));
	}

	#[test]
	fn swap_exchanges_contents() {
		let mut a = tree_of(0..5);
		let mut b = tree_of(100..103);
		let cursor = a.find(&3);

		a.swap(&mut b);
		assert_eq!(keys(&a), vec![100, 101, 102]);
		assert_eq!(keys(&b), vec![0, 1, 2, 3, 4]);
		assert_eq!(b.key_at(cursor), &3);
		a.assert_invariants();
		b.assert_invariants();
	}

	#[test]
	fn height_stays_logarithmic() {
		let tree = tree_of(0..1023);
		let bound = 2.0 * ((tree.len() + 1) as f64).log2();
		assert!(tree.height() as f64 <= bound, "height {} exceeds {}", tree.height(), bound);
		assert!(tree.black_height() >= 1);
	}

	// -----------------------------------------------------------------------
	// Iterator Tests
	// -----------------------------------------------------------------------

	#[test]
	fn iter_both_ends() {
		let tree = tree_of(0..10);

		let mut iter = tree.iter();
		assert_eq!(iter.len(), 10);
		assert_eq!(iter.next(), Some((&0, &0)));
		assert_eq!(iter.next_back(), Some((&9, &90)));
		assert_eq!(iter.len(), 8);
		let middle: Vec<_> = iter.map(|(k, _)| *k).collect();
		assert_eq!(middle, vec![1, 2, 3, 4, 5, 6, 7, 8]);
	}

	#[test]
	fn iter_mut_updates_values() {
		let mut tree = tree_of(0..10);
		for (k, v) in tree.iter_mut() {
			*v = k * 100;
		}
		for v in tree.values_mut() {
			*v += 1;
		}
		assert!(tree.iter().all(|(k, v)| *v == k * 100 + 1));
	}

	#[test]
	fn iter_mut_after_mass_removal_and_slot_reuse() {
		let mut tree: RedBlackTree<i32, i32> = (0..1_000).map(|k| (k, k)).collect();
		tree.retain(|k, _| k % 97 == 0);
		// Freed slots come back in reverse, so slot order no longer follows key order.
		for k in (1_000..1_005).rev() {
			tree.emplace(k, k);
		}
		assert_eq!(tree.len(), 16);

		let mut seen = Vec::new();
		for (k, v) in tree.iter_mut() {
			seen.push(*k);
			*v = -k;
		}
		tree.assert_invariants();
		assert!(seen.windows(2).all(|w| w[0] < w[1]));
		assert_eq!(seen.len(), 16);
		assert!(tree.iter().all(|(k, v)| *v == -k));
	}

	#[test]
	fn into_iter_is_ordered() {
		let mut rng = rand::rng();
		let mut keys: Vec<i32> = (0..100).collect();
		keys.shuffle(&mut rng);

		let tree: RedBlackTree<i32, ()> = keys.iter().map(|&k| (k, ())).collect();
		let mut iter = tree.into_iter();
		assert_eq!(iter.next_back(), Some((99, ())));
		let drained: Vec<_> = iter.map(|(k, _)| k).collect();
		assert_eq!(drained, (0..99).collect::<Vec<_>>());
	}

	// -----------------------------------------------------------------------
	// Trait Tests
	// -----------------------------------------------------------------------

	#[test]
	fn comparisons_are_lexicographic() {
		let a: RedBlackTree<i32, i32> = [(1, 1), (2, 2)].into();
		let b: RedBlackTree<i32, i32> = [(1, 1), (3, 3)].into();
		let c: RedBlackTree<i32, i32> = [(1, 1)].into();

		assert!(a < b);
		assert!(c < a);
		assert_ne!(a, b);
		assert_eq!(a, RedBlackTree::from([(2, 2), (1, 1)]));
		assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
	}

	#[test]
	fn debug_formats_as_map() {
		let tree: RedBlackTree<i32, &str> = [(2, "b"), (1, "a")].into();
		assert_eq!(format!("{tree:?}"), r#"{1: "a", 2: "b"}"#);
	}

	#[test]
	#[should_panic(expected = "no entry found for key")]
	fn index_missing_key_panics() {
		let tree: RedBlackTree<i32, i32> = RedBlackTree::new();
		let _ = tree[&1];
	}
}
