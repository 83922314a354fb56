//! Depth-first pre-order walks over live nodes that carry state down into subtrees.

use crate::dom::{Document, NodeId};

/// Visits a subtree in document order.
///
/// Every node is visited with the state of its parent. [`Walker::set`] replaces the state for the current node's
/// descendants only, so siblings never see it. Children are read lazily, when the walk moves past their parent.
pub struct Walker<T> {
	pending: Vec<(NodeId, T)>,
	current: Option<(NodeId, T)>,
}

impl<T: Clone> Walker<T> {
	#[must_use]
	pub fn new(root: NodeId, state: T) -> Self {
		Self {
			pending: vec![(root, state)],
			current: None,
		}
	}

	#[allow(clippy::should_implement_trait)]
	pub fn next(&mut self, document: &Document) -> Option<(NodeId, T)> {
		if let Some((node, state)) = self.current.take() {
			for child in document.children(node).into_iter().rev() {
				self.pending.push((child, state.clone()));
			}
		}
		let (node, state) = self.pending.pop()?;
		self.current = Some((node, state.clone()));
		Some((node, state))
	}

	/// Sets the state the current node's descendants are visited with.
	pub fn set(&mut self, state: T) {
		if let Some((_, current)) = &mut self.current {
			*current = state;
		}
	}

	/// Don't descend into the current node.
	pub fn skip_children(&mut self) {
		self.current = None;
	}
}
