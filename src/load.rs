//! Snapshots of live nodes as intermediate trees, for serialization and inspection.

use crate::{
	data::Value,
	dom::{Document, NodeData, NodeId},
	html::{self, Metadata},
	vdom::{VComment, VElement, VNode, VPlaceholder, VText},
};
use indexmap::IndexMap;

pub fn load_child_nodes(document: &Document, parent: NodeId) -> Vec<VNode> {
	document.children(parent).into_iter().filter_map(|child| load_node(document, child)).collect()
}

/// Loads `node` and its subtree, markers included. Placeholders load without their context.
pub fn load_node(document: &Document, node: NodeId) -> Option<VNode> {
	let markers = document.markers(node)?;
	Some(match document.data(node)? {
		NodeData::Element(_) => VNode::Element(load_element(document, node)?),
		NodeData::Text(text) => VNode::Text(VText {
			text: text.clone(),
			ordinal: markers.ordinal.clone(),
			instance: markers.instance.clone(),
		}),
		NodeData::Comment(comment) => match &markers.placeholder {
			Some(template) => VNode::Placeholder(VPlaceholder {
				template: template.clone(),
				context: Value::Null,
				ordinal: markers.ordinal.clone(),
				instance: markers.instance.clone(),
			}),
			None => VNode::Comment(VComment {
				comment: comment.clone(),
				ordinal: markers.ordinal.clone(),
				instance: markers.instance.clone(),
			}),
		},
	})
}

pub fn load_element(document: &Document, element: NodeId) -> Option<VElement> {
	let markers = document.markers(element)?;
	Some(VElement {
		tag: document.tag(element)?.to_owned(),
		attributes: load_attributes(document, element),
		children: load_child_nodes(document, element),
		ordinal: markers.ordinal.clone(),
		instance: markers.instance.clone(),
	})
}

pub fn load_attributes(document: &Document, element: NodeId) -> IndexMap<String, String> {
	document.attributes(element).cloned().unwrap_or_default()
}

/// Markup of `parent`'s children.
#[must_use]
pub fn inner_html(document: &Document, parent: NodeId, metadata: Metadata) -> String {
	html::generate(&load_child_nodes(document, parent), metadata)
}

/// Markup of `node` itself.
#[must_use]
pub fn outer_html(document: &Document, node: NodeId, metadata: Metadata) -> String {
	load_node(document, node).map_or_else(String::new, |node| html::generate(&[node], metadata))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn snapshot_keeps_markers() {
		let mut document = Document::new("body");
		let root = document.root();
		let p = document.create_element("p");
		document.set_attribute(p, "class", "note");
		let text = document.create_text("hi");
		document.append_child(p, text);
		document.append_child(root, p);
		document.markers_mut(p).unwrap().ordinal = Some(crate::ordinal::Ordinal::new(4));

		assert_eq!(inner_html(&document, root, Metadata::Include), "<p class=\"note\" data-tx=\"4\">hi</p>");
		assert_eq!(outer_html(&document, text, Metadata::Omit), "hi");
	}
}
