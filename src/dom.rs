//! The live node tree.
//!
//! [`Document`] is an arena of element, text and comment nodes addressed by generational [`NodeId`]s. Besides their
//! content, nodes carry [`Markers`]: the identity the reconciler matches on. Markers live next to the node rather than
//! in its attributes, so the binder can clear them without touching what the host sees.

use crate::ordinal::{InstanceId, Ordinal, TemplateRef};
use indexmap::IndexMap;
use tracing::error;

/// Handle of a node in a [`Document`]. Stale handles (of destroyed nodes) are detected and never alias new nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
	index: u32,
	generation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
	Element(ElementData),
	Text(String),
	Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementData {
	pub tag: String,
	pub attributes: IndexMap<String, String>,
}

/// Binding identity of a live node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Markers {
	pub ordinal: Option<Ordinal>,
	/// Set on every root node of a repeated template's instance.
	pub instance: Option<InstanceId>,
	/// Set on placeholder comments.
	pub placeholder: Option<TemplateRef>,
}

impl Markers {
	pub fn clear(&mut self) {
		*self = Self::default();
	}
}

#[derive(Debug)]
struct Node {
	data: NodeData,
	markers: Markers,
	parent: Option<NodeId>,
	first_child: Option<NodeId>,
	last_child: Option<NodeId>,
	previous_sibling: Option<NodeId>,
	next_sibling: Option<NodeId>,
}

#[derive(Debug)]
struct Slot {
	generation: u32,
	node: Option<Node>,
}

#[derive(Debug)]
pub struct Document {
	slots: Vec<Slot>,
	free: Vec<u32>,
	root: NodeId,
}

impl Document {
	/// Creates a document with a single root element called `root_tag`.
	#[must_use]
	pub fn new(root_tag: &str) -> Self {
		let mut document = Self {
			slots: Vec::new(),
			free: Vec::new(),
			root: NodeId { index: 0, generation: 0 },
		};
		document.root = document.create_element(root_tag);
		document
	}

	#[must_use]
	pub fn root(&self) -> NodeId {
		self.root
	}

	/// Whether `id` refers to a node that hasn't been destroyed.
	#[must_use]
	pub fn contains(&self, id: NodeId) -> bool {
		self.node(id).is_some()
	}

	fn node(&self, id: NodeId) -> Option<&Node> {
		self.slots
			.get(id.index as usize)
			.filter(|slot| slot.generation == id.generation)
			.and_then(|slot| slot.node.as_ref())
	}

	fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
		self.slots
			.get_mut(id.index as usize)
			.filter(|slot| slot.generation == id.generation)
			.and_then(|slot| slot.node.as_mut())
	}

	fn allocate(&mut self, data: NodeData) -> NodeId {
		let node = Node {
			data,
			markers: Markers::default(),
			parent: None,
			first_child: None,
			last_child: None,
			previous_sibling: None,
			next_sibling: None,
		};
		if let Some(index) = self.free.pop() {
			let slot = &mut self.slots[index as usize];
			slot.node = Some(node);
			NodeId { index, generation: slot.generation }
		} else {
			#[allow(clippy::cast_possible_truncation)]
			let index = self.slots.len() as u32;
			self.slots.push(Slot { generation: 0, node: Some(node) });
			NodeId { index, generation: 0 }
		}
	}

	#[must_use]
	pub fn create_element(&mut self, tag: &str) -> NodeId {
		self.allocate(NodeData::Element(ElementData {
			tag: tag.to_owned(),
			attributes: IndexMap::new(),
		}))
	}

	#[must_use]
	pub fn create_text(&mut self, text: &str) -> NodeId {
		self.allocate(NodeData::Text(text.to_owned()))
	}

	#[must_use]
	pub fn create_comment(&mut self, comment: &str) -> NodeId {
		self.allocate(NodeData::Comment(comment.to_owned()))
	}

	/// Appends `child` to `parent`'s children, detaching it from its current position first.
	pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
		self.insert_before(parent, child, None);
	}

	/// Inserts `child` before `reference`, or at the end if `reference` is [`None`].
	///
	/// Invalid combinations are logged and ignored.
	pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
		if !self.contains(parent) || !self.contains(child) {
			return error!(?parent, ?child, "Tried to insert a destroyed node or into a destroyed node.");
		}
		if parent == child || self.ancestors(parent).any(|ancestor| ancestor == child) {
			return error!(?parent, ?child, "Tried to insert a node into itself.");
		}
		if let Some(reference) = reference {
			if reference == child {
				return;
			}
			if self.parent(reference) != Some(parent) {
				return error!(?parent, ?reference, "Reference node is not a child of the parent.");
			}
		}

		self.detach(child);

		let previous = match reference {
			Some(reference) => self.previous_sibling(reference),
			None => self.last_child(parent),
		};
		if let Some(node) = self.node_mut(child) {
			node.parent = Some(parent);
			node.previous_sibling = previous;
			node.next_sibling = reference;
		}
		match previous {
			Some(previous) => {
				if let Some(node) = self.node_mut(previous) {
					node.next_sibling = Some(child);
				}
			}
			None => {
				if let Some(node) = self.node_mut(parent) {
					node.first_child = Some(child);
				}
			}
		}
		match reference {
			Some(reference) => {
				if let Some(node) = self.node_mut(reference) {
					node.previous_sibling = Some(child);
				}
			}
			None => {
				if let Some(node) = self.node_mut(parent) {
					node.last_child = Some(child);
				}
			}
		}
	}

	/// Unlinks `node` from its parent. The node and its subtree stay allocated.
	pub fn detach(&mut self, node: NodeId) {
		let (parent, previous, next) = match self.node_mut(node) {
			Some(n) => (n.parent.take(), n.previous_sibling.take(), n.next_sibling.take()),
			None => return,
		};
		let parent = match parent {
			Some(parent) => parent,
			None => return,
		};
		match previous {
			Some(previous) => {
				if let Some(n) = self.node_mut(previous) {
					n.next_sibling = next;
				}
			}
			None => {
				if let Some(n) = self.node_mut(parent) {
					n.first_child = next;
				}
			}
		}
		match next {
			Some(next) => {
				if let Some(n) = self.node_mut(next) {
					n.previous_sibling = previous;
				}
			}
			None => {
				if let Some(n) = self.node_mut(parent) {
					n.last_child = previous;
				}
			}
		}
	}

	/// Detaches `node` and frees it together with its subtree. Handles to any of them become stale.
	pub fn destroy(&mut self, node: NodeId) {
		if node == self.root {
			return error!("Tried to destroy the document root.");
		}
		self.detach(node);
		let mut pending = vec![node];
		while let Some(id) = pending.pop() {
			pending.extend(self.children(id));
			let slot = match self.slots.get_mut(id.index as usize) {
				Some(slot) if slot.generation == id.generation => slot,
				_ => continue,
			};
			if slot.node.take().is_some() {
				slot.generation = slot.generation.wrapping_add(1);
				self.free.push(id.index);
			}
		}
	}

	#[must_use]
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.node(node).and_then(|n| n.parent)
	}

	#[must_use]
	pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
		self.node(node).and_then(|n| n.first_child)
	}

	#[must_use]
	pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
		self.node(node).and_then(|n| n.last_child)
	}

	#[must_use]
	pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
		self.node(node).and_then(|n| n.next_sibling)
	}

	#[must_use]
	pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
		self.node(node).and_then(|n| n.previous_sibling)
	}

	/// A snapshot of `node`'s children.
	#[must_use]
	pub fn children(&self, node: NodeId) -> Vec<NodeId> {
		let mut children = Vec::new();
		let mut current = self.first_child(node);
		while let Some(child) = current {
			children.push(child);
			current = self.next_sibling(child);
		}
		children
	}

	pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		core::iter::successors(self.parent(node), move |&ancestor| self.parent(ancestor))
	}

	/// Whether `node` is connected to the document root.
	#[must_use]
	pub fn is_attached(&self, node: NodeId) -> bool {
		node == self.root || self.ancestors(node).any(|ancestor| ancestor == self.root)
	}

	#[must_use]
	pub fn data(&self, node: NodeId) -> Option<&NodeData> {
		self.node(node).map(|n| &n.data)
	}

	#[must_use]
	pub fn is_element(&self, node: NodeId) -> bool {
		matches!(self.data(node), Some(NodeData::Element(_)))
	}

	#[must_use]
	pub fn is_text(&self, node: NodeId) -> bool {
		matches!(self.data(node), Some(NodeData::Text(_)))
	}

	#[must_use]
	pub fn is_comment(&self, node: NodeId) -> bool {
		matches!(self.data(node), Some(NodeData::Comment(_)))
	}

	#[must_use]
	pub fn tag(&self, node: NodeId) -> Option<&str> {
		match self.data(node)? {
			NodeData::Element(element) => Some(&element.tag),
			_ => None,
		}
	}

	/// Character data of a text or comment node.
	#[must_use]
	pub fn text(&self, node: NodeId) -> Option<&str> {
		match self.data(node)? {
			NodeData::Text(text) | NodeData::Comment(text) => Some(text),
			NodeData::Element(_) => None,
		}
	}

	pub fn set_text(&mut self, node: NodeId, text: &str) {
		match self.node_mut(node).map(|n| &mut n.data) {
			Some(NodeData::Text(data) | NodeData::Comment(data)) => {
				data.clear();
				data.push_str(text);
			}
			_ => error!(?node, "Expected a text or comment node."),
		}
	}

	#[must_use]
	pub fn attributes(&self, node: NodeId) -> Option<&IndexMap<String, String>> {
		match self.data(node)? {
			NodeData::Element(element) => Some(&element.attributes),
			_ => None,
		}
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
		self.attributes(node)?.get(name).map(String::as_str)
	}

	pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
		match self.node_mut(node).map(|n| &mut n.data) {
			Some(NodeData::Element(element)) => {
				element.attributes.insert(name.to_owned(), value.to_owned());
			}
			_ => error!(?node, name, "Expected an element to set an attribute on."),
		}
	}

	pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
		if let Some(NodeData::Element(element)) = self.node_mut(node).map(|n| &mut n.data) {
			element.attributes.shift_remove(name);
		}
	}

	#[must_use]
	pub fn markers(&self, node: NodeId) -> Option<&Markers> {
		self.node(node).map(|n| &n.markers)
	}

	pub fn markers_mut(&mut self, node: NodeId) -> Option<&mut Markers> {
		self.node_mut(node).map(|n| &mut n.markers)
	}

	/// Number of live nodes, including detached ones.
	#[must_use]
	pub fn len(&self) -> usize {
		self.slots.len() - self.free.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sibling_links() {
		let mut document = Document::new("body");
		let root = document.root();
		let a = document.create_text("a");
		let b = document.create_text("b");
		let c = document.create_text("c");
		document.append_child(root, a);
		document.append_child(root, c);
		document.insert_before(root, b, Some(c));
		assert_eq!(document.children(root), [a, b, c]);
		assert_eq!(document.previous_sibling(c), Some(b));

		document.insert_before(root, c, Some(a));
		assert_eq!(document.children(root), [c, a, b]);
		assert_eq!(document.last_child(root), Some(b));

		document.detach(a);
		assert_eq!(document.children(root), [c, b]);
		assert!(document.contains(a));
		assert!(!document.is_attached(a));
	}

	#[test]
	fn destroyed_ids_go_stale() {
		let mut document = Document::new("body");
		let root = document.root();
		let div = document.create_element("div");
		let text = document.create_text("x");
		document.append_child(root, div);
		document.append_child(div, text);
		document.destroy(div);
		assert!(!document.contains(div));
		assert!(!document.contains(text));

		let reused = document.create_comment("y");
		assert_ne!(reused, div);
		assert_ne!(reused, text);
		assert_eq!(document.text(reused), Some("y"));
		assert_eq!(document.len(), 2);
	}

	#[test]
	fn foreign_ids_are_ignored() {
		let mut other = Document::new("body");
		let mut foreign = other.root();
		for _ in 0..4 {
			foreign = other.create_element("p");
		}

		let mut document = Document::new("body");
		let root = document.root();
		let kept = document.create_text("x");
		document.append_child(root, kept);
		document.destroy(foreign);
		assert!(document.contains(kept));
		assert_eq!(document.len(), 2);
	}

	#[test]
	fn refuses_cycles() {
		let mut document = Document::new("body");
		let root = document.root();
		let outer = document.create_element("div");
		let inner = document.create_element("div");
		document.append_child(root, outer);
		document.append_child(outer, inner);
		document.append_child(inner, outer);
		assert_eq!(document.parent(outer), Some(root));
	}
}
