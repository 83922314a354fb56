//! The intermediate tree produced by rendering, consumed by the materializer, reconciler and serializer.

use crate::{
	data::Value,
	ordinal::{InstanceId, Ordinal, TemplateRef},
};
use indexmap::IndexMap;

/// Attribute naming the behavior attached to an element.
pub const BEHAVIOR_ATTRIBUTE: &str = "data-behavior";

#[derive(Debug, Clone)]
pub enum VNode {
	Element(VElement),
	Text(VText),
	Comment(VComment),
	Placeholder(VPlaceholder),
}

#[derive(Debug, Clone, Default)]
pub struct VElement {
	pub tag: String,
	pub attributes: IndexMap<String, String>,
	pub children: Vec<VNode>,
	pub ordinal: Option<Ordinal>,
	/// Set on the root nodes of a repeated template's instance.
	pub instance: Option<InstanceId>,
}

impl VElement {
	#[must_use]
	pub fn new(tag: impl Into<String>) -> Self {
		Self { tag: tag.into(), ..Self::default() }
	}

	#[must_use]
	pub fn behavior(&self) -> Option<&str> {
		self.attributes.get(BEHAVIOR_ATTRIBUTE).map(String::as_str).filter(|behavior| !behavior.is_empty())
	}
}

#[derive(Debug, Clone, Default)]
pub struct VText {
	pub text: String,
	pub ordinal: Option<Ordinal>,
	pub instance: Option<InstanceId>,
}

#[derive(Debug, Clone, Default)]
pub struct VComment {
	pub comment: String,
	pub ordinal: Option<Ordinal>,
	pub instance: Option<InstanceId>,
}

/// Insertion point of a repeated template. Members are instantiated next to it by the binder, never by the renderer.
#[derive(Debug, Clone)]
pub struct VPlaceholder {
	pub template: TemplateRef,
	/// Source of the template instance the placeholder was rendered in; the collection query runs against it.
	pub context: Value,
	pub ordinal: Option<Ordinal>,
	pub instance: Option<InstanceId>,
}

impl VNode {
	#[must_use]
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text(VText {
			text: text.into(),
			..VText::default()
		})
	}

	#[must_use]
	pub fn ordinal(&self) -> Option<&Ordinal> {
		match self {
			Self::Element(element) => element.ordinal.as_ref(),
			Self::Text(text) => text.ordinal.as_ref(),
			Self::Comment(comment) => comment.ordinal.as_ref(),
			Self::Placeholder(placeholder) => placeholder.ordinal.as_ref(),
		}
	}

	pub(crate) fn ordinal_mut(&mut self) -> &mut Option<Ordinal> {
		match self {
			Self::Element(element) => &mut element.ordinal,
			Self::Text(text) => &mut text.ordinal,
			Self::Comment(comment) => &mut comment.ordinal,
			Self::Placeholder(placeholder) => &mut placeholder.ordinal,
		}
	}

	#[must_use]
	pub fn instance(&self) -> Option<&InstanceId> {
		match self {
			Self::Element(element) => element.instance.as_ref(),
			Self::Text(text) => text.instance.as_ref(),
			Self::Comment(comment) => comment.instance.as_ref(),
			Self::Placeholder(placeholder) => placeholder.instance.as_ref(),
		}
	}

	pub(crate) fn instance_mut(&mut self) -> &mut Option<InstanceId> {
		match self {
			Self::Element(element) => &mut element.instance,
			Self::Text(text) => &mut text.instance,
			Self::Comment(comment) => &mut comment.instance,
			Self::Placeholder(placeholder) => &mut placeholder.instance,
		}
	}

	/// Numbers a formatter's output: sibling indices on every level.
	pub fn assign_ordinals(nodes: &mut [VNode]) {
		for (i, node) in nodes.iter_mut().enumerate() {
			*node.ordinal_mut() = Some(Ordinal::new(u32::try_from(i).unwrap_or(u32::MAX)));
			if let Self::Element(element) = node {
				Self::assign_ordinals(&mut element.children);
			}
		}
	}
}
