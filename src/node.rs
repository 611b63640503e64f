//! Tree cells and the pure link-walking helpers built on top of them.
//!
//! Nothing in this module changes the shape of a tree: rotations, splicing
//! and recoloring all live in the engine. The helpers here only follow
//! `parent`/`left`/`right` links to answer structural questions such as
//! "what is the minimum of this subtree" or "who is my uncle".

use crate::arena::{Arena, Idx};

/// Color of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "test-utils", derive(serde::Deserialize))]
#[cfg_attr(feature = "test-utils", serde(rename_all = "lowercase"))]
pub enum Color {
	Red,
	Black,
}

/// Which child slot of a parent a node occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
	Left,
	Right,
}

impl Side {
	#[inline]
	pub(crate) fn opposite(self) -> Side {
		match self {
			Side::Left => Side::Right,
			Side::Right => Side::Left,
		}
	}
}

/// A single tree cell owning one key-value pair.
///
/// Children are owned through the arena; `parent` is a back-link and is
/// `None` only for the root.
pub(crate) struct Node<K, V> {
	pub(crate) key: K,
	pub(crate) value: V,
	pub(crate) color: Color,
	pub(crate) parent: Option<Idx>,
	pub(crate) left: Option<Idx>,
	pub(crate) right: Option<Idx>,
}

impl<K, V> Node<K, V> {
	/// New nodes always enter the tree as red leaves.
	pub(crate) fn new(parent: Option<Idx>, key: K, value: V) -> Self {
		Node {
			key,
			value,
			color: Color::Red,
			parent,
			left: None,
			right: None,
		}
	}

	#[inline]
	pub(crate) fn is_red(&self) -> bool {
		self.color == Color::Red
	}

	#[inline]
	pub(crate) fn is_black(&self) -> bool {
		self.color == Color::Black
	}

	#[inline]
	pub(crate) fn child(&self, side: Side) -> Option<Idx> {
		match side {
			Side::Left => self.left,
			Side::Right => self.right,
		}
	}

	#[inline]
	pub(crate) fn set_child(&mut self, side: Side, child: Option<Idx>) {
		match side {
			Side::Left => self.left = child,
			Side::Right => self.right = child,
		}
	}
}

// ---------------------------------------------------------------------------
// Traversal Helpers
// ---------------------------------------------------------------------------

impl<K, V> Arena<Node<K, V>> {
	/// Absent children count as black leaves.
	#[inline]
	pub(crate) fn is_red(&self, idx: Option<Idx>) -> bool {
		idx.is_some_and(|idx| self[idx].is_red())
	}

	/// Leftmost node of the subtree rooted at `idx`.
	pub(crate) fn subtree_min(&self, mut idx: Idx) -> Idx {
		while let Some(left) = self[idx].left {
			idx = left;
		}
		idx
	}

	/// Rightmost node of the subtree rooted at `idx`.
	pub(crate) fn subtree_max(&self, mut idx: Idx) -> Idx {
		while let Some(right) = self[idx].right {
			idx = right;
		}
		idx
	}

	/// The side of its parent that `idx` hangs from, or `None` for the root.
	#[inline]
	pub(crate) fn side_of(&self, idx: Idx) -> Option<Side> {
		let parent = self[idx].parent?;
		if self[parent].left == Some(idx) {
			Some(Side::Left)
		} else {
			Some(Side::Right)
		}
	}

	#[inline]
	pub(crate) fn grandparent(&self, idx: Idx) -> Option<Idx> {
		self[self[idx].parent?].parent
	}

	pub(crate) fn sibling(&self, idx: Idx) -> Option<Idx> {
		let parent = self[idx].parent?;
		let side = self.side_of(idx)?;
		self[parent].child(side.opposite())
	}

	pub(crate) fn uncle(&self, idx: Idx) -> Option<Idx> {
		self.sibling(self[idx].parent?)
	}

	/// In-order successor: the minimum of the right subtree, or else the
	/// nearest ancestor reached from a left child.
	pub(crate) fn successor(&self, idx: Idx) -> Option<Idx> {
		if let Some(right) = self[idx].right {
			return Some(self.subtree_min(right));
		}
		let mut current = idx;
		while let Some(parent) = self[current].parent {
			if self[parent].left == Some(current) {
				return Some(parent);
			}
			current = parent;
		}
		None
	}

	/// In-order predecessor, the mirror image of [`successor`](Self::successor).
	pub(crate) fn predecessor(&self, idx: Idx) -> Option<Idx> {
		if let Some(left) = self[idx].left {
			return Some(self.subtree_max(left));
		}
		let mut current = idx;
		while let Some(parent) = self[current].parent {
			if self[parent].right == Some(current) {
				return Some(parent);
			}
			current = parent;
		}
		None
	}
}
