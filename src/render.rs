//! The intermediate tree renderer: template + binding context → [`VNode`]s.

use crate::{
	context::BindingContext,
	data::Value,
	datasource::Datasource,
	error::{QueryError, Result},
	filter,
	ordinal::{Ordinal, TemplateRef},
	template::{Template, TemplateElement, TemplateNode, ViewSet, TRANSPARENT_TAG},
	vdom::{VComment, VElement, VNode, VPlaceholder, VText},
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{instrument, trace};

/// Expands a bound value into nodes, in place of its plain text.
pub type Formatter = Rc<dyn Fn(&Value) -> Vec<VNode>>;

pub type Formatters = HashMap<String, Formatter>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
	/// Record ordinals and instance ids on the rendered nodes. Required for anything that's reconciled later.
	pub binding_metadata: bool,
	/// Render the current members of repeated templates in front of their placeholders.
	pub expand_templates: bool,
}

impl RenderOptions {
	/// Options for re-rendering a bound region.
	#[must_use]
	pub fn bound() -> Self {
		Self {
			binding_metadata: true,
			expand_templates: false,
		}
	}

	/// Options for the initial render of a whole view.
	#[must_use]
	pub fn initial() -> Self {
		Self {
			binding_metadata: true,
			expand_templates: true,
		}
	}
}

/// Everything rendering needs besides the binding context.
#[derive(Clone, Copy)]
pub struct RenderEnv<'a> {
	pub views: &'a ViewSet,
	pub datasource: &'a dyn Datasource,
	pub formatters: &'a Formatters,
}

/// Renders the template `context` is bound to.
///
/// # Errors
///
/// Iff a query that isn't cached by the context fails, or (with [`RenderOptions::expand_templates`]) a member's
/// context can't be created.
#[instrument(skip(env, context), fields(template = %context.template_ref()))]
pub fn render_template(env: RenderEnv<'_>, context: &BindingContext, options: RenderOptions) -> Result<Vec<VNode>> {
	let mut renderer = Renderer {
		env,
		context,
		options,
		frames: Vec::new(),
		current: ViewFrame {
			view: &context.template_ref().view,
			content: None,
		},
	};
	let mut nodes = Vec::new();
	renderer.render_nodes(&context.template().elements, &mut nodes, true)?;
	if nodes.is_empty() && options.binding_metadata {
		if let Some(instance) = context.instance() {
			trace!("Every root was filtered out; rendering an empty text root to keep the instance bound.");
			nodes.push(VNode::Text(VText {
				text: String::new(),
				ordinal: None,
				instance: Some(instance),
			}));
		}
	}
	Ok(nodes)
}

/// Renders the main view against the datasource's root data, including every current collection member.
///
/// # Errors
///
/// Iff a query fails.
pub fn render_view(env: RenderEnv<'_>, options: RenderOptions) -> Result<Vec<VNode>> {
	let context = root_context(env)?;
	render_template(env, &context, options)
}

pub(crate) fn root_context(env: RenderEnv<'_>) -> Result<BindingContext, QueryError> {
	BindingContext::new(env.views, env.datasource, TemplateRef::root(""), env.views.main().root().clone(), env.datasource.data(), None, None, None)
}

/// Where template nodes are currently being taken from.
#[derive(Clone, Copy)]
struct ViewFrame<'r> {
	/// Name of the view, for placeholder identities.
	view: &'r str,
	/// Children of the element that spliced the view in, for `content` elements.
	content: Option<&'r [TemplateNode]>,
}

struct Renderer<'r> {
	env: RenderEnv<'r>,
	context: &'r BindingContext,
	options: RenderOptions,
	frames: Vec<ViewFrame<'r>>,
	current: ViewFrame<'r>,
}

impl<'r> Renderer<'r> {
	fn ordinal(&self, index: usize) -> Option<Ordinal> {
		self.options.binding_metadata.then(|| Ordinal::new(u32::try_from(index).unwrap_or(u32::MAX)))
	}

	/// Values come from the context's cache where possible, so that filters see what dependency tracking saw.
	fn lookup(&self, query: &str) -> Result<Value, QueryError> {
		match self.context.get(query) {
			Some(value) => Ok(value),
			None => self.env.datasource.get(query, &self.context.scope()),
		}
	}

	fn enter(&mut self, frame: ViewFrame<'r>) {
		self.frames.push(self.current);
		self.current = frame;
	}

	fn leave(&mut self) {
		if let Some(frame) = self.frames.pop() {
			self.current = frame;
		}
	}

	fn render_nodes(&mut self, nodes: &'r [TemplateNode], out: &mut Vec<VNode>, root: bool) -> Result<()> {
		for (i, node) in nodes.iter().enumerate() {
			let first = out.len();
			let ordinal = self.ordinal(i);
			match node {
				TemplateNode::Text(text) => {
					if !append_text(out, text) {
						out.push(VNode::Text(VText {
							text: text.clone(),
							ordinal,
							instance: None,
						}));
					}
				}
				TemplateNode::Comment(comment) => out.push(VNode::Comment(VComment {
					comment: comment.clone(),
					ordinal,
					instance: None,
				})),
				TemplateNode::Template(id) => self.render_placeholder(id, out, ordinal)?,
				TemplateNode::Element(element) => self.render_element(element, out, ordinal)?,
			}

			if root && self.options.binding_metadata {
				if let Some(instance) = self.context.instance() {
					for node in &mut out[first..] {
						let marker = node.instance_mut();
						if marker.is_none() {
							*marker = Some(instance.clone());
						}
					}
				}
			}
		}
		Ok(())
	}

	fn render_element(&mut self, element: &'r TemplateElement, out: &mut Vec<VNode>, ordinal: Option<Ordinal>) -> Result<()> {
		if let Some(filters) = &element.filters {
			let mut values = Vec::with_capacity(filters.len());
			for query in filters.keys() {
				values.push(self.lookup(query)?);
			}
			if !filter::check_all(values.iter().zip(filters.values())) {
				trace!(tag = %element.tag, "Filtered out.");
				return Ok(());
			}
		}

		let mut rendered = VElement::new(element.tag.clone());
		rendered.attributes = element.attributes.clone();
		for (attribute, query) in &element.bind_attributes {
			let value = self.lookup(query)?;
			if !value.is_null() {
				rendered.attributes.insert(attribute.clone(), value.to_string());
			}
		}
		rendered.ordinal = ordinal;

		if let Some(bind) = &element.bind {
			let value = self.lookup(bind)?;
			match element.format.as_deref().and_then(|format| self.env.formatters.get(format)) {
				Some(formatter) => {
					let mut nodes = formatter(&value);
					if self.options.binding_metadata {
						VNode::assign_ordinals(&mut nodes);
					}
					rendered.children.extend(nodes);
				}
				None => rendered.children.push(VNode::Text(VText {
					text: value.to_string(),
					ordinal: self.ordinal(0),
					instance: None,
				})),
			}
		} else if let Some(name) = &element.view {
			match self.env.views.view(name) {
				Some(view) => {
					self.enter(ViewFrame {
						view: name,
						content: Some(element.children.as_slice()),
					});
					let result = self.render_nodes(&view.root().elements, &mut rendered.children, false);
					self.leave();
					result?;
				}
				None => trace!(view = %name, "Referenced view is not available."),
			}
		} else if element.content {
			// The projected children belong to the view that spliced the current one in.
			if let (Some(content), Some(&caller)) = (self.current.content, self.frames.last()) {
				self.enter(caller);
				let result = self.render_nodes(content, &mut rendered.children, false);
				self.leave();
				result?;
			}
		} else {
			self.render_nodes(&element.children, &mut rendered.children, false)?;
		}

		if rendered.tag == TRANSPARENT_TAG {
			splice(rendered, out);
		} else {
			out.push(VNode::Element(rendered));
		}
		Ok(())
	}

	fn render_placeholder(&mut self, id: &str, out: &mut Vec<VNode>, ordinal: Option<Ordinal>) -> Result<()> {
		let template_ref = TemplateRef::new(self.current.view, id);
		let template = match self.env.views.template(&template_ref) {
			Some(template) => template,
			None => {
				trace!(template = %template_ref, "Repeated template is not available.");
				return Ok(());
			}
		};

		if self.options.expand_templates {
			self.expand(&template_ref, &template, out)?;
		}

		out.push(VNode::Placeholder(VPlaceholder {
			template: template_ref,
			context: self.context.source().clone(),
			ordinal,
			instance: None,
		}));
		Ok(())
	}

	fn expand(&self, template_ref: &TemplateRef, template: &Rc<Template>, out: &mut Vec<VNode>) -> Result<()> {
		let query = match template.query.as_deref() {
			Some(query) => query,
			None => return Ok(()),
		};
		let collection = match self.lookup(query)? {
			Value::Collection(collection) => collection,
			_ => return Ok(()),
		};
		for (index, item) in collection.items().into_iter().enumerate() {
			let context = BindingContext::new(
				self.env.views,
				self.env.datasource,
				template_ref.clone(),
				template.clone(),
				item,
				Some(self.context.source().clone()),
				Some(collection.clone()),
				Some(index),
			)?;
			out.extend(render_template(self.env, &context, self.options)?);
		}
		Ok(())
	}
}

/// Merges `text` into a directly preceding text node. A lone space is dropped if that text already ends in one.
fn append_text(out: &mut [VNode], text: &str) -> bool {
	match out.last_mut() {
		Some(VNode::Text(last)) if !last.text.is_empty() => {
			if text != " " || !last.text.ends_with(' ') {
				last.text.push_str(text);
			}
			true
		}
		_ => false,
	}
}

/// Replaces a transparent element with its children, prefixing their ordinals with its own.
fn splice(transparent: VElement, out: &mut Vec<VNode>) {
	let VElement { ordinal, instance, children, .. } = transparent;
	for mut child in children {
		if let Some(outer) = &ordinal {
			let nested = child.ordinal().map(|inner| inner.nested_in(outer));
			if nested.is_some() {
				*child.ordinal_mut() = nested;
			}
		}
		if child.instance().is_none() {
			*child.instance_mut() = instance.clone();
		}
		match child {
			VNode::Text(text) if append_text(out, &text.text) => (),
			child => out.push(child),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{datasource::PathDatasource, html, ordinal::InstanceId, template::View};
	use serde_json::json;

	fn render(view: serde_json::Value, data: serde_json::Value, options: RenderOptions) -> Vec<VNode> {
		let views = ViewSet::new(View::from_json_value("", view).unwrap());
		let datasource = PathDatasource::from_json(&data);
		let formatters = Formatters::new();
		let env = RenderEnv {
			views: &views,
			datasource: &datasource,
			formatters: &formatters,
		};
		render_view(env, options).unwrap()
	}

	#[test]
	fn coalesces_text() {
		let nodes = render(json!({"elements": ["a ", " ", "b", {"tag": "t:placeholder", "children": [" c"]}]}), json!({}), RenderOptions::default());
		assert_eq!(html::generate(&nodes, html::Metadata::Omit), "a b c");
	}

	#[test]
	fn transparent_elements_prefix_ordinals() {
		let nodes = render(
			json!({"elements": [{"tag": "p"}, {"tag": "t:placeholder", "children": [{"tag": "i"}, {"tag": "b"}]}]}),
			json!({}),
			RenderOptions::bound(),
		);
		let ordinals: Vec<String> = nodes.iter().map(|node| node.ordinal().unwrap().to_string()).collect();
		assert_eq!(ordinals, ["0", "1-0", "1-1"]);
	}

	#[test]
	fn filters_and_bindings() {
		let view = json!({"elements": [
			{"tag": "b", "filters": {".show": true}, "bind": ".name"},
			{"tag": "a", "bind_attributes": {"href": ".url", "title": ".missing"}},
		]});
		let hidden = render(view.clone(), json!({"show": false, "name": "x", "url": "/x"}), RenderOptions::default());
		assert_eq!(html::generate(&hidden, html::Metadata::Omit), "<a href=\"/x\"></a>");
		let shown = render(view, json!({"show": true, "name": "x", "url": "/x"}), RenderOptions::default());
		assert_eq!(html::generate(&shown, html::Metadata::Omit), "<b>x</b><a href=\"/x\"></a>");
	}

	#[test]
	fn expands_members_before_placeholder() {
		let nodes = render(
			json!({
				"elements": [{"tag": "ul", "children": [{"template": "item"}]}],
				"templates": {"item": {"query": ".items", "elements": [{"tag": "li", "bind": ".name"}]}},
			}),
			json!({"items": [{"name": "a"}, {"name": "b"}]}),
			RenderOptions::initial(),
		);
		assert_eq!(
			html::generate(&nodes, html::Metadata::Include),
			"<ul data-tx=\"0\"><li data-tx=\"0\" data-ti=\":item:0\">a</li><li data-tx=\"0\" data-ti=\":item:1\">b</li><!--:item--></ul>"
		);
	}

	#[test]
	fn fully_filtered_member_keeps_a_root() {
		let nodes = render(
			json!({
				"elements": [{"tag": "ul", "children": [{"template": "item"}]}],
				"templates": {"item": {"query": ".items", "elements": [{"tag": "li", "filters": {".show": true}, "bind": ".name"}]}},
			}),
			json!({"items": [{"name": "a", "show": false}, {"name": "b", "show": true}]}),
			RenderOptions::initial(),
		);
		let members = match &nodes[0] {
			VNode::Element(ul) => &ul.children,
			other => panic!("expected the list, got {:?}", other),
		};
		assert_eq!(members.len(), 3);
		assert!(matches!(&members[0], VNode::Text(text) if text.text.is_empty() && text.ordinal.is_none()));
		assert_eq!(members[0].instance(), Some(&InstanceId::new(TemplateRef::new("", "item"), 0)));
		assert_eq!(html::generate(&nodes, html::Metadata::Omit), "<ul><li>b</li><!--:item--></ul>");
	}

	#[test]
	fn content_projection() {
		let main = View::from_json_value("", json!({"elements": [{"tag": "div", "view": "frame", "children": [{"tag": "b", "bind": ".title"}]}]})).unwrap();
		let frame = View::from_json_value("frame", json!({"elements": [{"tag": "section", "children": [{"tag": "t:content", "content": true}]}]})).unwrap();
		let views = ViewSet::with_views(main, vec![frame]);
		let datasource = PathDatasource::from_json(&json!({"title": "Hi"}));
		let formatters = Formatters::new();
		let env = RenderEnv {
			views: &views,
			datasource: &datasource,
			formatters: &formatters,
		};
		let nodes = render_view(env, RenderOptions::default()).unwrap();
		assert_eq!(html::generate(&nodes, html::Metadata::Omit), "<div><section><t:content><b>Hi</b></t:content></section></div>");
	}
}
