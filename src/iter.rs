//! Cursors and iterators for the `RedBlackTree` data structure
use crate::arena::{Arena, Handle, Idx};
use crate::error;
use crate::node::Node;
use crate::{RedBlackTree, TreeId};
use std::iter::FusedIterator;

/// The order in which a cursor walks the tree.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Direction {
	/// Ascending key order, from `begin` towards `end`.
	Forward,
	/// Descending key order, from `rbegin` towards `rend`.
	Reverse,
}

impl Direction {
	/// The opposite direction.
	#[inline]
	pub fn reverse(self) -> Direction {
		match self {
			Direction::Forward => Direction::Reverse,
			Direction::Reverse => Direction::Forward,
		}
	}
}

/// A position in a [`RedBlackTree`]: either an entry or the end position
/// past the last entry in the cursor's [`Direction`].
///
/// Cursors are plain `Copy` values that borrow nothing, so they can be held
/// across mutations of the tree. Each one remembers which tree issued it and
/// the generation of the entry it names:
///
/// - inserting or erasing *other* entries never invalidates a cursor;
/// - erasing the entry itself makes every cursor to it stale;
/// - a cursor used with a tree that did not issue it is rejected.
///
/// Two cursors are equal when they name the same position of the same tree,
/// regardless of direction. In particular, every end position of a tree
/// compares equal to every other.
#[derive(Debug, Copy, Clone)]
pub struct Cursor {
	pub(crate) tree: TreeId,
	pub(crate) node: Option<Handle>,
	pub(crate) direction: Direction,
}

impl PartialEq for Cursor {
	fn eq(&self, other: &Self) -> bool {
		self.tree == other.tree && self.node == other.node
	}
}

impl Eq for Cursor {}

impl Cursor {
	pub(crate) fn new(tree: TreeId, node: Option<Handle>, direction: Direction) -> Cursor {
		Cursor {
			tree,
			node,
			direction,
		}
	}

	/// Returns `true` at the end position.
	#[inline]
	pub fn is_end(&self) -> bool {
		self.node.is_none()
	}

	/// The direction this cursor advances in.
	#[inline]
	pub fn direction(&self) -> Direction {
		self.direction
	}

	/// The same position, walking the other way.
	pub fn reversed(self) -> Cursor {
		Cursor {
			direction: self.direction.reverse(),
			..self
		}
	}

	/// Advances one entry in the cursor's direction. Advancing from the last
	/// entry reaches the end position.
	///
	/// # Panics
	///
	/// Panics if the cursor is already at the end, is stale, or belongs to
	/// another tree. See [`try_move_next`](Self::try_move_next).
	pub fn move_next<K, V>(&mut self, tree: &RedBlackTree<K, V>) {
		if let Err(e) = self.try_move_next(tree) {
			panic!("cannot advance cursor: {e}");
		}
	}

	/// Steps one entry against the cursor's direction. Stepping back from
	/// the end position reaches the last entry, and stepping back from the
	/// first entry reaches the end position.
	///
	/// # Panics
	///
	/// Panics if the cursor is stale, belongs to another tree, or is the end
	/// position of an empty tree. See [`try_move_prev`](Self::try_move_prev).
	pub fn move_prev<K, V>(&mut self, tree: &RedBlackTree<K, V>) {
		if let Err(e) = self.try_move_prev(tree) {
			panic!("cannot retreat cursor: {e}");
		}
	}

	/// Fallible form of [`move_next`](Self::move_next). The cursor is left
	/// unchanged on error.
	pub fn try_move_next<K, V>(&mut self, tree: &RedBlackTree<K, V>) -> error::Result<()> {
		*self = tree.step(self, self.direction)?;
		Ok(())
	}

	/// Fallible form of [`move_prev`](Self::move_prev). The cursor is left
	/// unchanged on error.
	///
	/// Stepping back from the first entry yields the end position. Another
	/// step back from there wraps around to the last entry.
	pub fn try_move_prev<K, V>(&mut self, tree: &RedBlackTree<K, V>) -> error::Result<()> {
		*self = tree.step(self, self.direction.reverse())?;
		Ok(())
	}
}

/// Two-ended walk over a contiguous run of nodes, `front..=back`.
struct Raw {
	front: Option<Idx>,
	back: Option<Idx>,
}

impl Raw {
	fn next<K, V>(&mut self, nodes: &Arena<Node<K, V>>) -> Option<Idx> {
		let idx = self.front?;
		if self.front == self.back {
			self.front = None;
			self.back = None;
		} else {
			self.front = nodes.successor(idx);
		}
		Some(idx)
	}

	fn next_back<K, V>(&mut self, nodes: &Arena<Node<K, V>>) -> Option<Idx> {
		let idx = self.back?;
		if self.front == self.back {
			self.front = None;
			self.back = None;
		} else {
			self.back = nodes.predecessor(idx);
		}
		Some(idx)
	}
}

/// An iterator over a range of entries of a tree, in ascending key order.
///
/// Created by [`RedBlackTree::range`].
pub struct Range<'t, K, V> {
	nodes: &'t Arena<Node<K, V>>,
	raw: Raw,
}

impl<'t, K, V> Range<'t, K, V> {
	pub(crate) fn new(nodes: &'t Arena<Node<K, V>>, front: Option<Idx>, back: Option<Idx>) -> Self {
		Range {
			nodes,
			raw: Raw {
				front,
				back,
			},
		}
	}

	#[inline]
	fn entry(&self, idx: Idx) -> (&'t K, &'t V) {
		let nodes = self.nodes;
		let node = &nodes[idx];
		(&node.key, &node.value)
	}
}

impl<'t, K, V> Iterator for Range<'t, K, V> {
	type Item = (&'t K, &'t V);

	fn next(&mut self) -> Option<Self::Item> {
		self.raw.next(self.nodes).map(|idx| self.entry(idx))
	}
}

impl<K, V> DoubleEndedIterator for Range<'_, K, V> {
	fn next_back(&mut self) -> Option<Self::Item> {
		self.raw.next_back(self.nodes).map(|idx| self.entry(idx))
	}
}

impl<K, V> FusedIterator for Range<'_, K, V> {}

/// An iterator over all entries of a tree, in ascending key order.
///
/// Created by [`RedBlackTree::iter`].
pub struct Iter<'t, K, V> {
	range: Range<'t, K, V>,
	remaining: usize,
}

impl<'t, K, V> Iter<'t, K, V> {
	pub(crate) fn new(
		nodes: &'t Arena<Node<K, V>>,
		min: Option<Idx>,
		max: Option<Idx>,
		len: usize,
	) -> Self {
		Iter {
			range: Range::new(nodes, min, max),
			remaining: len,
		}
	}
}

impl<'t, K, V> Iterator for Iter<'t, K, V> {
	type Item = (&'t K, &'t V);

	fn next(&mut self) -> Option<Self::Item> {
		let entry = self.range.next()?;
		self.remaining -= 1;
		Some(entry)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		(self.remaining, Some(self.remaining))
	}
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
	fn next_back(&mut self) -> Option<Self::Item> {
		let entry = self.range.next_back()?;
		self.remaining -= 1;
		Some(entry)
	}
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// An iterator over the keys of a tree, in ascending order.
pub struct Keys<'t, K, V> {
	inner: Iter<'t, K, V>,
}

impl<'t, K, V> Keys<'t, K, V> {
	pub(crate) fn new(inner: Iter<'t, K, V>) -> Self {
		Keys {
			inner,
		}
	}
}

impl<'t, K, V> Iterator for Keys<'t, K, V> {
	type Item = &'t K;

	fn next(&mut self) -> Option<&'t K> {
		self.inner.next().map(|(k, _)| k)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.inner.size_hint()
	}
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
	fn next_back(&mut self) -> Option<Self::Item> {
		self.inner.next_back().map(|(k, _)| k)
	}
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// An iterator over the values of a tree, in ascending key order.
pub struct Values<'t, K, V> {
	inner: Iter<'t, K, V>,
}

impl<'t, K, V> Values<'t, K, V> {
	pub(crate) fn new(inner: Iter<'t, K, V>) -> Self {
		Values {
			inner,
		}
	}
}

impl<'t, K, V> Iterator for Values<'t, K, V> {
	type Item = &'t V;

	fn next(&mut self) -> Option<&'t V> {
		self.inner.next().map(|(_, v)| v)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.inner.size_hint()
	}
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
	fn next_back(&mut self) -> Option<Self::Item> {
		self.inner.next_back().map(|(_, v)| v)
	}
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

/// A mutable iterator over the entries of a tree, in ascending key order.
///
/// The in-order sequence is collected up front, so the iterator holds the
/// only borrow of the node storage while it hands out disjoint references.
pub struct IterMut<'t, K, V> {
	entries: std::vec::IntoIter<(&'t K, &'t mut V)>,
}

impl<'t, K, V> IterMut<'t, K, V> {
	pub(crate) fn new(entries: Vec<(&'t K, &'t mut V)>) -> Self {
		IterMut {
			entries: entries.into_iter(),
		}
	}
}

impl<'t, K, V> Iterator for IterMut<'t, K, V> {
	type Item = (&'t K, &'t mut V);

	fn next(&mut self) -> Option<Self::Item> {
		self.entries.next()
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.entries.size_hint()
	}
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
	fn next_back(&mut self) -> Option<Self::Item> {
		self.entries.next_back()
	}
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// A mutable iterator over the values of a tree, in ascending key order.
pub struct ValuesMut<'t, K, V> {
	inner: IterMut<'t, K, V>,
}

impl<'t, K, V> ValuesMut<'t, K, V> {
	pub(crate) fn new(inner: IterMut<'t, K, V>) -> Self {
		ValuesMut {
			inner,
		}
	}
}

impl<'t, K, V> Iterator for ValuesMut<'t, K, V> {
	type Item = &'t mut V;

	fn next(&mut self) -> Option<&'t mut V> {
		self.inner.next().map(|(_, v)| v)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.inner.size_hint()
	}
}

impl<K, V> DoubleEndedIterator for ValuesMut<'_, K, V> {
	fn next_back(&mut self) -> Option<Self::Item> {
		self.inner.next_back().map(|(_, v)| v)
	}
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

/// An owning iterator over the entries of a tree, in ascending key order.
pub struct IntoIter<K, V> {
	entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> IntoIter<K, V> {
	pub(crate) fn new(entries: Vec<(K, V)>) -> Self {
		IntoIter {
			entries: entries.into_iter(),
		}
	}
}

impl<K, V> Iterator for IntoIter<K, V> {
	type Item = (K, V);

	fn next(&mut self) -> Option<(K, V)> {
		self.entries.next()
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.entries.size_hint()
	}
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
	fn next_back(&mut self) -> Option<(K, V)> {
		self.entries.next_back()
	}
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V> FusedIterator for IntoIter<K, V> {}

#[cfg(test)]
mod tests {
	use crate::error::Error;
	use crate::{Direction, RedBlackTree};

	fn sample() -> RedBlackTree<i32, char> {
		(0..5).map(|k| (k, (b'a' + k as u8) as char)).collect()
	}

	#[test]
	fn forward_cursor_walk() {
		let tree = sample();
		let mut cursor = tree.begin();
		let mut seen = Vec::new();
		while !cursor.is_end() {
			seen.push(*tree.value_at(cursor));
			cursor.move_next(&tree);
		}
		assert_eq!(seen, vec!['a', 'b', 'c', 'd', 'e']);
		assert_eq!(cursor, tree.end());
		assert_eq!(cursor.try_move_next(&tree), Err(Error::EndOfTree));
	}

	#[test]
	fn reverse_cursor_walk() {
		let tree = sample();
		let mut cursor = tree.rbegin();
		assert_eq!(cursor.direction(), Direction::Reverse);
		let mut seen = Vec::new();
		while cursor != tree.rend() {
			seen.push(*tree.key_at(cursor));
			cursor.move_next(&tree);
		}
		assert_eq!(seen, vec![4, 3, 2, 1, 0]);
	}

	#[test]
	fn stepping_back_from_end() {
		let tree = sample();

		let mut cursor = tree.end();
		cursor.move_prev(&tree);
		assert_eq!(tree.key_at(cursor), &4);

		let mut cursor = tree.rend();
		cursor.move_prev(&tree);
		assert_eq!(tree.key_at(cursor), &0);
	}

	#[test]
	fn stepping_back_from_first_entry() {
		let tree = sample();
		let mut cursor = tree.begin();
		cursor.move_prev(&tree);
		assert!(cursor.is_end());
		assert_eq!(cursor.try_move_prev(&tree), Ok(()));
		assert_eq!(tree.key_at(cursor), &4);
	}

	#[test]
	fn empty_tree_end_cannot_step_back() {
		let tree: RedBlackTree<i32, ()> = RedBlackTree::new();
		let mut cursor = tree.end();
		assert_eq!(cursor.try_move_prev(&tree), Err(Error::EmptyTree));
		assert_eq!(cursor.try_move_next(&tree), Err(Error::EndOfTree));
		assert_eq!(cursor, tree.end());
	}

	#[test]
	fn reversed_cursor_keeps_position() {
		let tree = sample();
		let mut cursor = tree.find(&2).reversed();
		assert_eq!(cursor.direction(), Direction::Reverse);
		cursor.move_next(&tree);
		assert_eq!(tree.key_at(cursor), &1);
	}

	#[test]
	fn range_meets_in_the_middle() {
		let tree = sample();
		let mut range = tree.range(1..4);
		assert_eq!(range.next().map(|(k, _)| *k), Some(1));
		assert_eq!(range.next_back().map(|(k, _)| *k), Some(3));
		assert_eq!(range.next().map(|(k, _)| *k), Some(2));
		assert_eq!(range.next_back(), None);
		assert_eq!(range.next(), None);
	}

	#[test]
	fn keys_and_values_reverse() {
		let tree = sample();
		assert_eq!(tree.keys().rev().copied().collect::<Vec<_>>(), vec![4, 3, 2, 1, 0]);
		assert_eq!(tree.values().len(), 5);
		assert_eq!(tree.values().next_back(), Some(&'e'));
	}
}
