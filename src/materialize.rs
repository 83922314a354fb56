//! Tree materializer: intermediate nodes → detached live nodes.

use crate::{
	dom::{Document, NodeId},
	reconcile::{Patch, PatchPlaceholder},
	vdom::VNode,
};
use tracing::trace_span;

/// Creates live nodes for `node` and its subtree. The result is detached; the caller inserts it.
///
/// Placeholders and elements with a behavior are recorded in `patch`, behaviors in post-order so that an element's
/// content exists when its behavior runs. Empty attribute values are treated as absent.
pub fn materialize(document: &mut Document, node: &VNode, patch: &mut Patch) -> NodeId {
	match node {
		VNode::Element(element) => {
			let span = trace_span!("Materializing element", tag = %element.tag);
			let _enter = span.enter();

			let id = document.create_element(&element.tag);
			for (name, value) in &element.attributes {
				if !value.is_empty() {
					document.set_attribute(id, name, value);
				}
			}
			for child in &element.children {
				let child = materialize(document, child, patch);
				document.append_child(id, child);
			}
			if let Some(markers) = document.markers_mut(id) {
				markers.ordinal = element.ordinal.clone();
				markers.instance = element.instance.clone();
			}
			if element.behavior().is_some() {
				patch.behaviors.push(id);
			}
			id
		}
		VNode::Text(text) => {
			let id = document.create_text(&text.text);
			if let Some(markers) = document.markers_mut(id) {
				markers.ordinal = text.ordinal.clone();
				markers.instance = text.instance.clone();
			}
			id
		}
		VNode::Comment(comment) => {
			let id = document.create_comment(&comment.comment);
			if let Some(markers) = document.markers_mut(id) {
				markers.ordinal = comment.ordinal.clone();
				markers.instance = comment.instance.clone();
			}
			id
		}
		VNode::Placeholder(placeholder) => {
			let id = document.create_comment(&placeholder.template.to_string());
			if let Some(markers) = document.markers_mut(id) {
				markers.ordinal = placeholder.ordinal.clone();
				markers.instance = placeholder.instance.clone();
				markers.placeholder = Some(placeholder.template.clone());
			}
			patch.placeholders.push(PatchPlaceholder {
				node: id,
				template: placeholder.template.clone(),
				context: placeholder.context.clone(),
				generated: true,
			});
			id
		}
	}
}

/// Materializes `nodes` in order and appends them to `parent`.
pub fn materialize_into(document: &mut Document, parent: NodeId, nodes: &[VNode], patch: &mut Patch) -> Vec<NodeId> {
	nodes
		.iter()
		.map(|node| {
			let id = materialize(document, node, patch);
			document.append_child(parent, id);
			patch.generated.push(id);
			id
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		data::Value,
		ordinal::{Ordinal, TemplateRef},
		vdom::{VElement, VPlaceholder},
	};

	#[test]
	fn records_placeholders_and_behaviors() {
		let mut element = VElement::new("div");
		element.attributes.insert("data-behavior".to_owned(), "clock".to_owned());
		element.attributes.insert("title".to_owned(), String::new());
		element.ordinal = Some(Ordinal::new(2));
		element.children.push(VNode::Placeholder(VPlaceholder {
			template: TemplateRef::new("", "items"),
			context: Value::Null,
			ordinal: Some(Ordinal::new(0)),
			instance: None,
		}));

		let mut document = Document::new("body");
		let mut patch = Patch::default();
		let root = document.root();
		let ids = materialize_into(&mut document, root, &[VNode::Element(element)], &mut patch);

		let div = ids[0];
		assert_eq!(document.attribute(div, "title"), None);
		assert_eq!(document.markers(div).unwrap().ordinal, Some(Ordinal::new(2)));
		assert_eq!(patch.behaviors, [div]);
		assert_eq!(patch.generated, [div]);
		let placeholder = &patch.placeholders[0];
		assert!(placeholder.generated);
		assert_eq!(document.parent(placeholder.node), Some(div));
		assert_eq!(document.text(placeholder.node), Some(":items"));
	}
}
