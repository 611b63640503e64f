//! # Generational Node Storage
//!
//! Nodes of a [`RedBlackTree`](crate::RedBlackTree) live in a single `Vec` of
//! slots and link to each other through slot indices instead of pointers. A
//! slot keeps its index for as long as it is occupied, so tree rotations only
//! rewrite links and never move a node.
//!
//! Every slot also carries a generation counter that is bumped whenever the
//! slot is vacated. A [`Handle`] records the generation at the time it was
//! created, which lets cursors detect that the entry they point at has been
//! erased (even if the slot was reused by a later insertion).
//!
//! ```text
//!   slots:  [ gen 0: node A ][ gen 3: vacant ][ gen 1: node C ] ...
//!   free:   [ 1 ]
//!
//!   Handle { idx: 1, generation: 2 }  -> stale (slot moved on to gen 3)
//!   Handle { idx: 2, generation: 1 }  -> node C
//! ```

use std::ops::{Index, IndexMut};

/// Position of an occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Idx(u32);

impl Idx {
	#[inline]
	pub(crate) fn slot(self) -> usize {
		self.0 as usize
	}
}

/// A slot index paired with the generation it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Handle {
	idx: Idx,
	generation: u32,
}

struct Slot<T> {
	generation: u32,
	value: Option<T>,
}

/// Slot storage with a free list and per-slot generations.
pub(crate) struct Arena<T> {
	slots: Vec<Slot<T>>,
	/// Indices of vacant slots, reused LIFO.
	free: Vec<u32>,
	len: usize,
}

impl<T> Arena<T> {
	pub(crate) fn new() -> Self {
		Self::with_capacity(0)
	}

	pub(crate) fn with_capacity(capacity: usize) -> Self {
		Arena {
			slots: Vec::with_capacity(capacity),
			free: Vec::new(),
			len: 0,
		}
	}

	/// Number of occupied slots.
	#[inline]
	pub(crate) fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub(crate) fn capacity(&self) -> usize {
		self.slots.capacity()
	}

	/// Stores `value` in a vacant slot (or a new one) and returns its index.
	///
	/// # Panics
	///
	/// Panics if more than `u32::MAX` slots would be needed.
	pub(crate) fn insert(&mut self, value: T) -> Idx {
		self.len += 1;
		if let Some(slot) = self.free.pop() {
			let entry = &mut self.slots[slot as usize];
			debug_assert!(entry.value.is_none(), "free list points at an occupied slot");
			entry.value = Some(value);
			return Idx(slot);
		}

		let slot = u32::try_from(self.slots.len()).expect("arena exceeded u32::MAX slots");
		self.slots.push(Slot {
			generation: 0,
			value: Some(value),
		});
		Idx(slot)
	}

	/// Vacates the slot at `idx`, invalidating every handle issued for it.
	///
	/// A slot whose generation is exhausted is retired instead of reused, so
	/// a stale handle can never match a later occupant.
	pub(crate) fn remove(&mut self, idx: Idx) -> T {
		let entry = &mut self.slots[idx.slot()];
		let value = entry.value.take().expect("removing a vacant arena slot");
		if let Some(next) = entry.generation.checked_add(1) {
			entry.generation = next;
			self.free.push(idx.0);
		}
		self.len -= 1;
		value
	}

	/// Issues a handle for the occupied slot at `idx`.
	#[inline]
	pub(crate) fn handle(&self, idx: Idx) -> Handle {
		Handle {
			idx,
			generation: self.slots[idx.slot()].generation,
		}
	}

	/// Maps a handle back to its slot, or `None` if the slot has been vacated
	/// since the handle was issued.
	pub(crate) fn resolve(&self, handle: Handle) -> Option<Idx> {
		match self.slots.get(handle.idx.slot()) {
			Some(slot) if slot.generation == handle.generation && slot.value.is_some() => {
				Some(handle.idx)
			}
			_ => None,
		}
	}

	/// Releases spare capacity. Vacant slots are kept so that their
	/// generations keep rejecting stale handles.
	pub(crate) fn shrink_to_fit(&mut self) {
		self.slots.shrink_to_fit();
		self.free.shrink_to_fit();
	}

	/// Disjoint mutable references to the occupied slots in `order`, returned
	/// in the same order. Only the requested slots are visited.
	///
	/// # Panics
	///
	/// Panics if `order` repeats an index or names a vacant slot.
	pub(crate) fn get_many_mut(&mut self, order: &[Idx]) -> Vec<&mut T> {
		let mut by_slot: Vec<(usize, usize)> =
			order.iter().enumerate().map(|(pos, idx)| (idx.slot(), pos)).collect();
		by_slot.sort_unstable();

		let mut picked = Vec::with_capacity(order.len());
		let mut rest: &mut [Slot<T>] = &mut self.slots;
		let mut offset = 0;
		for (slot, pos) in by_slot {
			let skip = slot.checked_sub(offset).expect("duplicate index in arena request");
			let (_, tail) = std::mem::take(&mut rest).split_at_mut(skip);
			let (entry, tail) = tail.split_first_mut().expect("arena index out of bounds");
			let value = entry.value.as_mut().expect("requested a vacant arena slot");
			picked.push((pos, value));
			rest = tail;
			offset = slot + 1;
		}

		picked.sort_unstable_by_key(|&(pos, _)| pos);
		picked.into_iter().map(|(_, value)| value).collect()
	}
}

impl<T> Index<Idx> for Arena<T> {
	type Output = T;

	#[inline]
	fn index(&self, idx: Idx) -> &T {
		self.slots[idx.slot()].value.as_ref().expect("link points at a vacant arena slot")
	}
}

impl<T> IndexMut<Idx> for Arena<T> {
	#[inline]
	fn index_mut(&mut self, idx: Idx) -> &mut T {
		self.slots[idx.slot()].value.as_mut().expect("link points at a vacant arena slot")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reuses_vacated_slots() {
		let mut arena = Arena::new();
		let a = arena.insert("a");
		let b = arena.insert("b");
		assert_eq!(arena.len(), 2);

		assert_eq!(arena.remove(a), "a");
		let c = arena.insert("c");
		assert_eq!(c, a, "vacated slot should be reused");
		assert_eq!(arena[c], "c");
		assert_eq!(arena[b], "b");
		assert_eq!(arena.len(), 2);
	}

	#[test]
	fn handles_go_stale_on_removal() {
		let mut arena = Arena::new();
		let a = arena.insert(1);
		let handle = arena.handle(a);
		assert_eq!(arena.resolve(handle), Some(a));

		arena.remove(a);
		assert_eq!(arena.resolve(handle), None);

		// Reusing the slot must not revive the old handle.
		let b = arena.insert(2);
		assert_eq!(b, a);
		assert_eq!(arena.resolve(handle), None);
		assert_eq!(arena.resolve(arena.handle(b)), Some(b));
	}

	#[test]
	fn shrink_keeps_stale_handles_stale() {
		let mut arena = Arena::with_capacity(16);
		let slots: Vec<_> = (0..8).map(|i| arena.insert(i)).collect();
		let last = arena.handle(slots[7]);
		for &idx in &slots[4..] {
			arena.remove(idx);
		}
		arena.shrink_to_fit();
		assert_eq!(arena.len(), 4);

		for i in 0..4 {
			arena.insert(100 + i);
		}
		assert_eq!(arena.resolve(last), None);
		assert_eq!(arena.len(), 8);
	}

	#[test]
	fn exhausted_slot_is_retired() {
		let mut arena = Arena::new();
		let a = arena.insert("a");
		arena.slots[a.slot()].generation = u32::MAX;
		let handle = arena.handle(a);

		assert_eq!(arena.remove(a), "a");
		let b = arena.insert("b");
		assert_ne!(b, a, "exhausted slot must not be reused");
		assert_eq!(arena.resolve(handle), None);
		assert_eq!(arena.len(), 1);
	}

	#[test]
	fn get_many_mut_follows_requested_order() {
		let mut arena = Arena::new();
		let idx: Vec<_> = (0..6).map(|i| arena.insert(i * 10)).collect();
		arena.remove(idx[1]);
		arena.remove(idx[4]);

		let order = [idx[5], idx[0], idx[3], idx[2]];
		for value in arena.get_many_mut(&order) {
			*value += 1;
		}
		assert_eq!(arena[idx[0]], 1);
		assert_eq!(arena[idx[2]], 21);
		assert_eq!(arena[idx[3]], 31);
		assert_eq!(arena[idx[5]], 51);

		let values: Vec<i32> = arena.get_many_mut(&order).into_iter().map(|v| *v).collect();
		assert_eq!(values, vec![51, 1, 31, 21]);
	}

	#[test]
	#[should_panic(expected = "duplicate index")]
	fn get_many_mut_rejects_duplicates() {
		let mut arena = Arena::new();
		let a = arena.insert(1);
		arena.insert(2);
		arena.get_many_mut(&[a, a]);
	}
}
