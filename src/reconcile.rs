//! The reconciler: patches a live region so it matches a freshly rendered intermediate tree.
//!
//! Live nodes are matched by their [`Markers`] rather than by position. The cursor moves forward sibling by sibling;
//! for each intermediate node it scans ahead for a candidate and removes whatever it had to skip on the way:
//!
//! - An element with an ordinal stops the scan once its ordinal is greater than or equal to the target's.
//! - Text is accepted when searching text, as long as the next ordinal-bearing sibling still lies beyond the target.
//! - Nodes of a repeated template's instance are never consumed. Searching for that template's placeholder jumps
//!   over them to the placeholder; otherwise they count as being at their placeholder's ordinal.
//! - Placeholders match by template identity, plain comments match plain comments.
//! - Unmarked nodes (added by the host, or pending removal) are passed over and never removed.
//!
//! A candidate of a different kind (tag, behavior, node type) or ordinal gets the new node inserted before it.

use crate::{
	data::Value,
	dom::{Document, Markers, NodeData, NodeId},
	materialize::materialize,
	ordinal::{Ordinal, TemplateRef},
	vdom::{VNode, BEHAVIOR_ATTRIBUTE},
};
use core::slice;
use indexmap::IndexMap;
use tracing::{error, level_filters::STATIC_MAX_LEVEL, trace, trace_span, Level};

/// A placeholder reached during reconciliation or materialization.
#[derive(Debug, Clone)]
pub struct PatchPlaceholder {
	pub node: NodeId,
	pub template: TemplateRef,
	/// Source of the context the placeholder was rendered in.
	pub context: Value,
	/// Whether the placeholder node was newly created, in which case it has no members yet.
	pub generated: bool,
}

/// An instance root that had to be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
	pub old: NodeId,
	pub new: NodeId,
}

/// Everything a reconciliation (or materialization) did that the binder needs to follow up on.
#[derive(Debug, Default)]
pub struct Patch {
	/// Roots of newly inserted subtrees.
	pub generated: Vec<NodeId>,
	/// Roots of removed subtrees. They are detached but still allocated, so that their bindings can be torn down.
	pub discarded: Vec<NodeId>,
	pub placeholders: Vec<PatchPlaceholder>,
	/// Newly created elements with a behavior, in post-order.
	pub behaviors: Vec<NodeId>,
	pub replaced: Vec<Replacement>,
	/// Roots of the reconciled instance, in order. Only filled by [`reconcile_instance`].
	pub roots: Vec<NodeId>,
	pub text_updates: usize,
	pub attribute_updates: usize,
}

impl Patch {
	/// Whether the live tree was left untouched.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.generated.is_empty() && self.discarded.is_empty() && self.replaced.is_empty() && self.text_updates == 0 && self.attribute_updates == 0
	}
}

/// Reconciles the children of `parent` (a view's root region) with `nodes`.
pub fn reconcile_children(document: &mut Document, parent: NodeId, nodes: &[VNode]) -> Patch {
	let span = trace_span!("Reconciling children", ?parent, nodes = nodes.len());
	let _enter = span.enter();

	let mut reconciler = Reconciler {
		document,
		stack: Vec::new(),
		patch: Patch::default(),
	};
	reconciler.step_in(parent, nodes);
	reconciler.run();
	reconciler.patch
}

/// Reconciles the root nodes of one template instance with the freshly rendered instance.
///
/// Roots are matched by ordinal, in document order. A rendered root without a live counterpart is inserted after
/// the instance's previous root (or before its first one), and live roots without a rendered counterpart are
/// discarded. [`Patch::roots`] lists the instance's roots afterwards.
pub fn reconcile_instance(document: &mut Document, roots: &[NodeId], nodes: &[VNode]) -> Patch {
	let span = trace_span!("Reconciling instance", roots = roots.len(), nodes = nodes.len());
	let _enter = span.enter();

	let mut reconciler = Reconciler {
		document,
		stack: Vec::new(),
		patch: Patch::default(),
	};

	let parent = match roots.iter().find_map(|&root| reconciler.document.parent(root)) {
		Some(parent) => parent,
		None => {
			error!(roots = roots.len(), "Instance has no attached root; nothing to reconcile.");
			return reconciler.patch;
		}
	};
	let siblings = reconciler.document.children(parent);
	let mut live: Vec<NodeId> = roots.iter().copied().filter(|root| siblings.contains(root)).collect();
	live.sort_by_key(|root| siblings.iter().position(|sibling| sibling == root));
	live.dedup();

	let mut previous: Option<NodeId> = None;
	for target in nodes {
		let matched = live
			.iter()
			.position(|&root| reconciler.document.markers(root).map_or(false, |markers| markers.ordinal.as_ref() == target.ordinal()));
		let root = match matched {
			Some(i) => {
				let root = live.remove(i);
				if reconciler.same_kind(root, target) {
					reconciler.update_matched(root, target);
					reconciler.run();
					root
				} else {
					let new = materialize(reconciler.document, target, &mut reconciler.patch);
					reconciler.document.insert_before(parent, new, Some(root));
					reconciler.patch.generated.push(new);
					reconciler.discard(root);
					reconciler.patch.replaced.push(Replacement { old: root, new });
					new
				}
			}
			None => {
				let reference = match previous {
					Some(previous) => reconciler.document.next_sibling(previous),
					None => live.first().copied(),
				};
				let new = materialize(reconciler.document, target, &mut reconciler.patch);
				reconciler.document.insert_before(parent, new, reference);
				reconciler.patch.generated.push(new);
				new
			}
		};
		reconciler.patch.roots.push(root);
		previous = Some(root);
	}

	for root in live {
		reconciler.discard(root);
	}
	reconciler.patch
}

/// Finds the placeholder of `template` that the instance node `from` belongs to: the first following sibling
/// placeholder for it, before any other ordinal-bearing node of the enclosing region.
#[must_use]
pub fn owning_placeholder(document: &Document, from: NodeId, template: &TemplateRef) -> Option<NodeId> {
	let mut pos = Some(from);
	while let Some(node) = pos {
		let markers = document.markers(node)?;
		if markers.instance.is_none() {
			if markers.placeholder.as_ref() == Some(template) {
				return Some(node);
			}
			if markers.ordinal.is_some() {
				return None;
			}
		}
		pos = document.next_sibling(node);
	}
	None
}

fn reached(live: Option<&Ordinal>, target: Option<&Ordinal>) -> bool {
	match (live, target) {
		(Some(live), Some(target)) => live >= target,
		_ => true,
	}
}

fn behavior(attributes: &IndexMap<String, String>) -> Option<&str> {
	attributes.get(BEHAVIOR_ATTRIBUTE).map(String::as_str).filter(|behavior| !behavior.is_empty())
}

/// Dash-joined ordinals of `node` and its ancestors, for diagnostics.
fn ordinal_path(document: &Document, node: NodeId) -> String {
	let mut segments: Vec<String> = core::iter::once(node)
		.chain(document.ancestors(node))
		.map(|id| document.markers(id).and_then(|markers| markers.ordinal.as_ref()).map_or_else(|| "?".to_owned(), ToString::to_string))
		.collect();
	segments.reverse();
	segments.join("/")
}

struct Frame<'v> {
	parent: NodeId,
	pending: slice::Iter<'v, VNode>,
	current: Option<NodeId>,
}

struct Reconciler<'d, 'v> {
	document: &'d mut Document,
	stack: Vec<Frame<'v>>,
	patch: Patch,
}

impl<'d, 'v> Reconciler<'d, 'v> {
	fn run(&mut self) {
		while let Some(frame) = self.stack.last_mut() {
			match frame.pending.next() {
				Some(target) => self.update(target),
				None => self.step_out(),
			}
		}
	}

	fn step_in(&mut self, parent: NodeId, children: &'v [VNode]) {
		let current = self.document.first_child(parent);
		self.stack.push(Frame {
			parent,
			pending: children.iter(),
			current,
		});
	}

	/// Moves the cursor past `node`.
	fn step_forward(&mut self, node: NodeId) {
		let next = self.document.next_sibling(node);
		if let Some(frame) = self.stack.last_mut() {
			frame.current = next;
		}
	}

	/// Leaves the current scope, removing every marked node that wasn't consumed.
	fn step_out(&mut self) {
		let frame = match self.stack.pop() {
			Some(frame) => frame,
			None => return,
		};
		let mut current = frame.current;
		while let Some(node) = current {
			current = self.document.next_sibling(node);
			if self.document.markers(node).map_or(false, |markers| *markers != Markers::default()) {
				self.discard(node);
			}
		}
	}

	fn discard(&mut self, node: NodeId) {
		if cfg!(feature = "log-paths") && STATIC_MAX_LEVEL >= Level::TRACE {
			trace!(path = %ordinal_path(self.document, node), "Discarding node.");
		}
		self.document.detach(node);
		self.patch.discarded.push(node);
	}

	fn update(&mut self, target: &'v VNode) {
		let span = match target {
			VNode::Element(element) => trace_span!("Reconciling element", tag = %element.tag, ordinal = ?element.ordinal),
			VNode::Text(text) if cfg!(feature = "dangerous-logging") => trace_span!("Reconciling text", text = %text.text, ordinal = ?text.ordinal),
			VNode::Text(text) => trace_span!("Reconciling text", ordinal = ?text.ordinal),
			VNode::Comment(comment) => trace_span!("Reconciling comment", ordinal = ?comment.ordinal),
			VNode::Placeholder(placeholder) => trace_span!("Reconciling placeholder", template = %placeholder.template),
		};
		let _enter = span.enter();

		let (parent, start) = match self.stack.last() {
			Some(frame) => (frame.parent, frame.current),
			None => return,
		};

		let (candidate, skipped) = self.seek(start, target);
		for node in skipped {
			self.discard(node);
		}

		match candidate {
			Some(candidate) if self.same_kind(candidate, target) && self.document.markers(candidate).map_or(false, |markers| markers.instance.is_none()) => {
				self.step_forward(candidate);
				self.update_matched(candidate, target);
			}
			candidate => {
				let new = materialize(self.document, target, &mut self.patch);
				self.document.insert_before(parent, new, candidate);
				self.patch.generated.push(new);
				self.step_forward(new);
			}
		}
	}

	/// Scans forward from `start` for the live node `target` should be matched against or inserted before.
	fn seek(&self, start: Option<NodeId>, target: &VNode) -> (Option<NodeId>, Vec<NodeId>) {
		let document = &*self.document;
		let target_ordinal = target.ordinal();
		let mut skipped = Vec::new();
		let mut pos = start;
		while let Some(node) = pos {
			let markers = match document.markers(node) {
				Some(markers) => markers,
				None => break,
			};
			let next = document.next_sibling(node);

			if *markers == Markers::default() {
				pos = next;
				continue;
			}

			let stop = if let Some(instance) = &markers.instance {
				match (target, owning_placeholder(document, node, &instance.template)) {
					(VNode::Placeholder(placeholder), Some(owner)) if placeholder.template == instance.template => return (Some(owner), skipped),
					(_, Some(owner)) => reached(document.markers(owner).and_then(|markers| markers.ordinal.as_ref()), target_ordinal),
					(_, None) => false,
				}
			} else {
				match document.data(node) {
					Some(NodeData::Element(_)) => reached(markers.ordinal.as_ref(), target_ordinal),
					Some(NodeData::Text(_)) => matches!(target, VNode::Text(_)) && self.next_standard_beyond(node, target_ordinal),
					Some(NodeData::Comment(_)) => match (&markers.placeholder, target) {
						(Some(template), VNode::Placeholder(placeholder)) => *template == placeholder.template || reached(markers.ordinal.as_ref(), target_ordinal),
						(Some(_), _) => reached(markers.ordinal.as_ref(), target_ordinal),
						(None, VNode::Comment(_)) => true,
						(None, _) => false,
					},
					None => false,
				}
			};

			if stop {
				return (Some(node), skipped);
			}
			if cfg!(feature = "log-paths") && STATIC_MAX_LEVEL >= Level::TRACE {
				trace!(path = %ordinal_path(document, node), "Skipping node.");
			}
			skipped.push(node);
			pos = next;
		}
		(None, skipped)
	}

	/// Whether the next ordinal-bearing sibling after `node` (not counting text and instance nodes) lies beyond `target`.
	fn next_standard_beyond(&self, node: NodeId, target: Option<&Ordinal>) -> bool {
		let mut pos = self.document.next_sibling(node);
		while let Some(sibling) = pos {
			if let Some(markers) = self.document.markers(sibling) {
				if markers.instance.is_none() && !self.document.is_text(sibling) {
					if let Some(ordinal) = &markers.ordinal {
						return target.map_or(true, |target| ordinal > target);
					}
				}
			}
			pos = self.document.next_sibling(sibling);
		}
		true
	}

	fn same_kind(&self, node: NodeId, target: &VNode) -> bool {
		let markers = match self.document.markers(node) {
			Some(markers) => markers,
			None => return false,
		};
		match (self.document.data(node), target) {
			(Some(NodeData::Element(live)), VNode::Element(element)) => {
				live.tag.eq_ignore_ascii_case(&element.tag) && behavior(&live.attributes) == behavior(&element.attributes) && markers.ordinal == element.ordinal
			}
			(Some(NodeData::Text(_)), VNode::Text(_)) => true,
			(Some(NodeData::Comment(_)), VNode::Comment(_)) => markers.placeholder.is_none(),
			(Some(NodeData::Comment(_)), VNode::Placeholder(placeholder)) => markers.placeholder.as_ref() == Some(&placeholder.template),
			_ => false,
		}
	}

	fn update_matched(&mut self, node: NodeId, target: &'v VNode) {
		if let Some(markers) = self.document.markers_mut(node) {
			markers.ordinal = target.ordinal().cloned();
			markers.instance = target.instance().cloned();
		}

		match target {
			VNode::Element(element) => {
				self.update_attributes(node, &element.attributes);
				self.step_in(node, &element.children);
			}
			VNode::Text(text) => self.update_text(node, &text.text),
			VNode::Comment(comment) => self.update_text(node, &comment.comment),
			VNode::Placeholder(placeholder) => self.patch.placeholders.push(PatchPlaceholder {
				node,
				template: placeholder.template.clone(),
				context: placeholder.context.clone(),
				generated: false,
			}),
		}
	}

	fn update_text(&mut self, node: NodeId, text: &str) {
		if self.document.text(node) != Some(text) {
			self.document.set_text(node, text);
			self.patch.text_updates += 1;
		}
	}

	/// Sets changed attributes and removes those that are absent or empty.
	fn update_attributes(&mut self, node: NodeId, attributes: &IndexMap<String, String>) {
		let live = match self.document.attributes(node) {
			Some(live) => live.clone(),
			None => return error!(?node, "Expected an element to update attributes on."),
		};
		for name in live.keys() {
			if attributes.get(name).map_or(true, String::is_empty) {
				self.document.remove_attribute(node, name);
				self.patch.attribute_updates += 1;
			}
		}
		for (name, value) in attributes {
			if !value.is_empty() && live.get(name) != Some(value) {
				self.document.set_attribute(node, name, value);
				self.patch.attribute_updates += 1;
			}
		}
	}
}
