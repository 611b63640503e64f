//! Test utilities for loading hand-shaped trees from JSON fixtures
//!
//! Fixtures describe a tree node by node, colors included, so tests can start
//! from exactly the shape a rebalancing case needs instead of coaxing it out
//! of an insertion sequence:
//!
//! ```json
//! { "root": { "key": 10, "color": "black",
//!             "left":  { "key": 5,  "color": "black" },
//!             "right": { "key": 20, "color": "red" } } }
//! ```
//!
//! A node's value defaults to ten times its key. The loader does not validate
//! the shape; call `assert_invariants` on the result when the fixture is
//! meant to be a legal red-black tree.
use crate::arena::{Arena, Idx};
use crate::node::{Color, Node, Side};
use crate::{RedBlackTree, TreeId};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
struct FixtureNode {
	key: i64,
	value: Option<i64>,
	color: Color,
	left: Option<Box<FixtureNode>>,
	right: Option<Box<FixtureNode>>,
}

#[derive(Deserialize, Debug)]
struct SampleTree {
	root: Option<FixtureNode>,
}

fn translate_node(
	nodes: &mut Arena<Node<i64, i64>>,
	parent: Option<Idx>,
	fixture: FixtureNode,
) -> Idx {
	let FixtureNode {
		key,
		value,
		color,
		left,
		right,
	} = fixture;

	let mut node = Node::new(parent, key, value.unwrap_or(key * 10));
	node.color = color;
	let idx = nodes.insert(node);

	for (side, child) in [(Side::Left, left), (Side::Right, right)] {
		if let Some(child) = child {
			let child = translate_node(nodes, Some(idx), *child);
			nodes[idx].set_child(side, Some(child));
		}
	}
	idx
}

fn translate_tree(json_tree: SampleTree) -> RedBlackTree<i64, i64> {
	let mut nodes = Arena::new();
	let root = json_tree.root.map(|root| translate_node(&mut nodes, None, root));
	RedBlackTree {
		min: root.map(|root| nodes.subtree_min(root)),
		max: root.map(|root| nodes.subtree_max(root)),
		len: nodes.len(),
		root,
		nodes,
		id: TreeId::fresh(),
	}
}

/// Loads a tree from a JSON fixture file.
pub fn sample_tree<P: AsRef<std::path::Path>>(path: P) -> RedBlackTree<i64, i64> {
	let file = std::fs::File::open(path).expect("failed to find file");
	let json_tree: SampleTree = serde_json::from_reader(file).unwrap();
	translate_tree(json_tree)
}

/// Loads a tree from an inline JSON fixture.
pub fn sample_tree_from_str(json: &str) -> RedBlackTree<i64, i64> {
	let json_tree: SampleTree = serde_json::from_str(json).unwrap();
	translate_tree(json_tree)
}
