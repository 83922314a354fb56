//! The side-table between data entities and the live nodes that depend on them.

use crate::{
	context::BindingContext,
	data::{CollectionRef, EntityKey},
	dom::NodeId,
	ordinal::TemplateRef,
};
use core::cell::RefCell;
use hashbrown::HashMap;
use indexmap::IndexSet;
use std::rc::Rc;
use tracing::trace;

/// A binding context shared by all root nodes of one template instance.
pub type SharedContext = Rc<RefCell<BindingContext>>;

/// Undoes a behavior's setup.
pub type Teardown = Box<dyn FnOnce()>;

/// Binding of a region root: a view root element or a root node of a template instance.
#[derive(Clone)]
pub struct InstanceBinding {
	pub context: SharedContext,
	/// Key of the context's source, if it can be indexed.
	pub source_key: Option<EntityKey>,
	/// The node's children are the region (as opposed to the node itself).
	pub view_root: bool,
	/// The placeholder the instance was appended at.
	pub anchor: Option<NodeId>,
}

/// Binding of a placeholder to the collection its members come from.
#[derive(Clone)]
pub struct PlaceholderBinding {
	pub template: TemplateRef,
	pub collection: CollectionRef,
	/// Context of the instance the placeholder was rendered in. Its source is the members' parent object.
	pub parent: SharedContext,
}

#[derive(Default)]
pub struct NodeBinding {
	pub instance: Option<InstanceBinding>,
	pub placeholder: Option<PlaceholderBinding>,
	pub teardown: Option<Teardown>,
	indexed_under: IndexSet<EntityKey>,
}

impl NodeBinding {
	/// Keys the node is currently found under as an element.
	pub fn indexed_under(&self) -> impl Iterator<Item = &EntityKey> {
		self.indexed_under.iter()
	}
}

#[derive(Default)]
struct EntityNodes {
	elements: IndexSet<NodeId>,
	placeholders: IndexSet<NodeId>,
}

impl EntityNodes {
	fn is_empty(&self) -> bool {
		self.elements.is_empty() && self.placeholders.is_empty()
	}
}

#[derive(Default)]
pub struct Index {
	entities: HashMap<EntityKey, EntityNodes>,
	bindings: HashMap<NodeId, NodeBinding>,
	/// Instance nodes by the placeholder they were appended at.
	anchored: HashMap<NodeId, IndexSet<NodeId>>,
}

impl Index {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds `node` as a region root and indexes it under `keys`, replacing any earlier instance binding.
	pub fn bind_instance(&mut self, node: NodeId, instance: InstanceBinding, keys: impl IntoIterator<Item = EntityKey>) {
		let previous_anchor = self.bindings.get(&node).and_then(|binding| binding.instance.as_ref()).and_then(|instance| instance.anchor);
		if previous_anchor != instance.anchor {
			if let Some(previous) = previous_anchor {
				self.remove_anchored(previous, node);
			}
		}
		if let Some(anchor) = instance.anchor {
			self.anchored.entry(anchor).or_default().insert(node);
		}
		self.bindings.entry(node).or_default().instance = Some(instance);
		self.reindex(node, keys);
	}

	/// Binds `node` as a placeholder of `placeholder.collection`, replacing any earlier placeholder binding.
	pub fn bind_placeholder(&mut self, node: NodeId, placeholder: PlaceholderBinding) {
		let key = EntityKey::Direct(placeholder.collection.id());
		let binding = self.bindings.entry(node).or_default();
		if let Some(previous) = binding.placeholder.replace(placeholder) {
			let previous = EntityKey::Direct(previous.collection.id());
			if previous != key {
				remove_placeholder(&mut self.entities, previous, node);
			}
		}
		self.entities.entry(key).or_default().placeholders.insert(node);
	}

	/// Replaces the element keys of `node`.
	pub fn reindex(&mut self, node: NodeId, keys: impl IntoIterator<Item = EntityKey>) {
		let keys: IndexSet<EntityKey> = keys.into_iter().collect();
		let binding = match self.bindings.get_mut(&node) {
			Some(binding) => binding,
			None => return trace!(?node, "Not reindexing unbound node."),
		};
		for stale in binding.indexed_under.difference(&keys) {
			remove_element(&mut self.entities, *stale, node);
		}
		for key in &keys {
			self.entities.entry(*key).or_default().elements.insert(node);
		}
		binding.indexed_under = keys;
	}

	pub fn set_teardown(&mut self, node: NodeId, teardown: Teardown) -> Option<Teardown> {
		self.bindings.entry(node).or_default().teardown.replace(teardown)
	}

	/// Removes every registration of `node` and returns its binding.
	///
	/// Instances anchored at `node` stay bound; see [`Index::take_anchored`].
	pub fn unbind(&mut self, node: NodeId) -> Option<NodeBinding> {
		let binding = self.bindings.remove(&node)?;
		for key in &binding.indexed_under {
			remove_element(&mut self.entities, *key, node);
		}
		if let Some(placeholder) = &binding.placeholder {
			remove_placeholder(&mut self.entities, EntityKey::Direct(placeholder.collection.id()), node);
		}
		if let Some(anchor) = binding.instance.as_ref().and_then(|instance| instance.anchor) {
			self.remove_anchored(anchor, node);
		}
		Some(binding)
	}

	/// Removes and returns the instances anchored at `placeholder`.
	pub fn take_anchored(&mut self, placeholder: NodeId) -> IndexSet<NodeId> {
		self.anchored.remove(&placeholder).unwrap_or_default()
	}

	#[must_use]
	pub fn anchored(&self, placeholder: NodeId) -> Option<&IndexSet<NodeId>> {
		self.anchored.get(&placeholder)
	}

	fn remove_anchored(&mut self, anchor: NodeId, node: NodeId) {
		if let Some(members) = self.anchored.get_mut(&anchor) {
			members.shift_remove(&node);
			if members.is_empty() {
				self.anchored.remove(&anchor);
			}
		}
	}

	/// Region roots indexed under `key`, in registration order.
	#[must_use]
	pub fn elements(&self, key: EntityKey) -> Vec<NodeId> {
		self.entities.get(&key).map(|nodes| nodes.elements.iter().copied().collect()).unwrap_or_default()
	}

	/// Placeholders bound to the collection `key`, in registration order.
	#[must_use]
	pub fn placeholders(&self, key: EntityKey) -> Vec<NodeId> {
		self.entities.get(&key).map(|nodes| nodes.placeholders.iter().copied().collect()).unwrap_or_default()
	}

	#[must_use]
	pub fn binding(&self, node: NodeId) -> Option<&NodeBinding> {
		self.bindings.get(&node)
	}

	#[must_use]
	pub fn instance(&self, node: NodeId) -> Option<&InstanceBinding> {
		self.binding(node).and_then(|binding| binding.instance.as_ref())
	}

	#[must_use]
	pub fn placeholder(&self, node: NodeId) -> Option<&PlaceholderBinding> {
		self.binding(node).and_then(|binding| binding.placeholder.as_ref())
	}

	#[must_use]
	pub fn is_bound(&self, node: NodeId) -> bool {
		self.bindings.contains_key(&node)
	}

	/// Number of bound nodes.
	#[must_use]
	pub fn len(&self) -> usize {
		self.bindings.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.bindings.is_empty()
	}
}

fn remove_element(entities: &mut HashMap<EntityKey, EntityNodes>, key: EntityKey, node: NodeId) {
	if let Some(nodes) = entities.get_mut(&key) {
		nodes.elements.shift_remove(&node);
		if nodes.is_empty() {
			entities.remove(&key);
		}
	}
}

fn remove_placeholder(entities: &mut HashMap<EntityKey, EntityNodes>, key: EntityKey, node: NodeId) {
	if let Some(nodes) = entities.get_mut(&key) {
		nodes.placeholders.shift_remove(&node);
		if nodes.is_empty() {
			entities.remove(&key);
		}
	}
}
