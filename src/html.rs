//! Markup serialization of intermediate trees, for output that isn't bound (like an initial document).

use crate::vdom::{VElement, VNode};

const SELF_CLOSING: &[&str] = &["meta", "img", "link", "input", "area", "base", "col", "br", "hr"];
const BOOLEAN_ATTRIBUTES: &[&str] = &["checked", "disabled", "contenteditable"];

/// Whether ordinals and instance ids are written out as `data-tx` and `data-ti` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metadata {
	Include,
	Omit,
}

#[must_use]
pub fn generate(nodes: &[VNode], metadata: Metadata) -> String {
	let mut out = String::new();
	for node in nodes {
		write_node(&mut out, node, metadata);
	}
	out
}

fn write_node(out: &mut String, node: &VNode, metadata: Metadata) {
	match node {
		VNode::Element(element) => write_element(out, element, metadata),
		VNode::Text(text) => escape_into(out, &text.text, false),
		VNode::Comment(comment) => {
			out.push_str("<!--");
			escape_into(out, &comment.comment, false);
			out.push_str("-->");
		}
		VNode::Placeholder(placeholder) => {
			out.push_str("<!--");
			escape_into(out, &placeholder.template.to_string(), false);
			out.push_str("-->");
		}
	}
}

fn write_element(out: &mut String, element: &VElement, metadata: Metadata) {
	out.push('<');
	out.push_str(&element.tag);
	for (name, value) in &element.attributes {
		if BOOLEAN_ATTRIBUTES.contains(&name.as_str()) {
			if !value.is_empty() {
				out.push(' ');
				out.push_str(name);
			}
		} else {
			write_attribute(out, name, value);
		}
	}
	if metadata == Metadata::Include {
		if let Some(ordinal) = &element.ordinal {
			write_attribute(out, "data-tx", &ordinal.to_string());
		}
		if let Some(instance) = &element.instance {
			write_attribute(out, "data-ti", &instance.to_string());
		}
	}

	if SELF_CLOSING.contains(&element.tag.as_str()) {
		out.push_str(" />");
		return;
	}
	out.push('>');

	if element.tag == "script" {
		for child in &element.children {
			match child {
				VNode::Text(text) => out.push_str(&text.text),
				other => write_node(out, other, metadata),
			}
		}
	} else {
		for child in &element.children {
			write_node(out, child, metadata);
		}
	}

	out.push_str("</");
	out.push_str(&element.tag);
	out.push('>');
}

fn write_attribute(out: &mut String, name: &str, value: &str) {
	out.push(' ');
	out.push_str(name);
	out.push_str("=\"");
	escape_into(out, value, true);
	out.push('"');
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' if attribute => out.push_str("&quot;"),
			c => out.push(c),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		ordinal::{InstanceId, Ordinal, TemplateRef},
		vdom::VText,
	};

	fn element(tag: &str, attributes: &[(&str, &str)], children: Vec<VNode>) -> VNode {
		let mut element = VElement::new(tag);
		element.attributes = attributes.iter().map(|&(k, v)| (k.to_owned(), v.to_owned())).collect();
		element.children = children;
		VNode::Element(element)
	}

	#[test]
	fn escaping() {
		let nodes = [element("a", &[("title", "\"Tom\" & <Jerry>")], vec![VNode::text("1 < 2 && 3 > 2")])];
		assert_eq!(generate(&nodes, Metadata::Omit), "<a title=\"&quot;Tom&quot; &amp; &lt;Jerry&gt;\">1 &lt; 2 &amp;&amp; 3 &gt; 2</a>");
	}

	#[test]
	fn self_closing_and_boolean_attributes() {
		let nodes = [
			element("input", &[("type", "checkbox"), ("checked", "checked"), ("disabled", "")], vec![VNode::text("ignored")]),
			element("br", &[], vec![]),
		];
		assert_eq!(generate(&nodes, Metadata::Omit), "<input type=\"checkbox\" checked /><br />");
	}

	#[test]
	fn raw_script() {
		let nodes = [element("script", &[], vec![VNode::text("if (a < b) {}")])];
		assert_eq!(generate(&nodes, Metadata::Omit), "<script>if (a < b) {}</script>");
	}

	#[test]
	fn metadata_attributes() {
		let mut li = VElement::new("li");
		li.ordinal = Some(Ordinal::from(vec![1, 0]));
		li.instance = Some(InstanceId::new(TemplateRef::new("", "items"), 3));
		li.children.push(VNode::Text(VText {
			text: "x".to_owned(),
			ordinal: Some(Ordinal::new(0)),
			instance: None,
		}));
		let nodes = [VNode::Element(li)];
		assert_eq!(generate(&nodes, Metadata::Include), "<li data-tx=\"1-0\" data-ti=\":items:3\">x</li>");
		assert_eq!(generate(&nodes, Metadata::Omit), "<li>x</li>");
	}
}
