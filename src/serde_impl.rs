//! Serde support: a tree serializes as a map in ascending key order.
use crate::RedBlackTree;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Upper bound on the preallocation taken from a deserializer's size hint.
const MAX_PREALLOCATED: usize = 4096;

impl<K: Serialize, V: Serialize> Serialize for RedBlackTree<K, V> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.len()))?;
		for (key, value) in self {
			map.serialize_entry(key, value)?;
		}
		map.end()
	}
}

struct TreeVisitor<K, V>(PhantomData<fn() -> RedBlackTree<K, V>>);

impl<'de, K, V> Visitor<'de> for TreeVisitor<K, V>
where
	K: Deserialize<'de> + Ord,
	V: Deserialize<'de>,
{
	type Value = RedBlackTree<K, V>;

	fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
		formatter.write_str("a map")
	}

	/// Later duplicates of a key replace the earlier value.
	fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
		let capacity = access.size_hint().unwrap_or(0).min(MAX_PREALLOCATED);
		let mut tree = RedBlackTree::with_capacity(capacity);
		while let Some((key, value)) = access.next_entry()? {
			tree.insert(key, value);
		}
		Ok(tree)
	}
}

impl<'de, K, V> Deserialize<'de> for RedBlackTree<K, V>
where
	K: Deserialize<'de> + Ord,
	V: Deserialize<'de>,
{
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_map(TreeVisitor(PhantomData))
	}
}
