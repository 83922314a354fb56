//! Parsed views: immutable template trees plus the dependency lists derived from them.
//!
//! Views are loaded from JSON (the markup parser's output format). Loading validates everything that would
//! otherwise only fail during rendering, and fills in binding lists the parser didn't state explicitly.

use crate::{error::TemplateError, ordinal::TemplateRef};
use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::Deserialize;
use std::rc::Rc;
use tracing::warn;

/// Tag of elements that render only their children.
pub const TRANSPARENT_TAG: &str = "t:placeholder";

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawNode")]
pub enum TemplateNode {
	Text(String),
	Comment(String),
	/// A repeated sub-template, by id within the current view.
	Template(String),
	Element(TemplateElement),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNode {
	Text(String),
	Template { template: String },
	Comment { comment: String },
	Element(TemplateElement),
}

impl From<RawNode> for TemplateNode {
	fn from(raw: RawNode) -> Self {
		match raw {
			RawNode::Text(text) => Self::Text(text),
			RawNode::Template { template } => Self::Template(template),
			RawNode::Comment { comment } => Self::Comment(comment),
			RawNode::Element(element) => Self::Element(element),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateElement {
	pub tag: String,
	#[serde(default)]
	pub attributes: IndexMap<String, String>,
	/// Attribute name → query.
	#[serde(default)]
	pub bind_attributes: IndexMap<String, String>,
	/// Query → filter pattern. The element renders only if all of them match.
	#[serde(default)]
	pub filters: Option<IndexMap<String, serde_json::Value>>,
	/// Query whose value becomes the element's content.
	#[serde(default)]
	pub bind: Option<String>,
	/// Formatter used to expand [`TemplateElement::bind`]'s value.
	#[serde(default)]
	pub format: Option<String>,
	/// Name of a view rendered as this element's content.
	#[serde(default)]
	pub view: Option<String>,
	/// Marks the spot where a view's caller-supplied children go.
	#[serde(default)]
	pub content: bool,
	#[serde(default)]
	pub children: Vec<TemplateNode>,
}

impl TemplateElement {
	#[must_use]
	pub fn new(tag: impl Into<String>) -> Self {
		Self { tag: tag.into(), ..Self::default() }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Template {
	#[serde(default)]
	pub id: String,
	/// The collection query of a repeated template. [`None`] only for view roots.
	#[serde(default)]
	pub query: Option<String>,
	/// Extra name under which the instance's source can be queried.
	#[serde(default)]
	pub context_as: Option<String>,
	#[serde(default)]
	pub elements: Vec<TemplateNode>,
	/// Queries evaluated for this template, and tracked as dependencies.
	#[serde(default)]
	pub bindings: Vec<String>,
	/// Collection queries of repeated templates placed directly in this one.
	#[serde(default)]
	pub sub_bindings: Vec<String>,
	/// Views spliced in by this template.
	#[serde(default)]
	pub sub_views: Vec<String>,
}

impl Template {
	/// Adds every dependency stated by the element tree that isn't listed yet.
	fn derive_dependencies(&mut self, templates: &IndexMap<String, Template>) {
		fn add(list: &mut Vec<String>, item: &str) {
			if !list.iter().any(|existing| existing == item) {
				list.push(item.to_owned());
			}
		}

		fn visit(nodes: &[TemplateNode], templates: &IndexMap<String, Template>, bindings: &mut Vec<String>, sub_bindings: &mut Vec<String>, sub_views: &mut Vec<String>) {
			for node in nodes {
				match node {
					TemplateNode::Text(_) | TemplateNode::Comment(_) => (),
					TemplateNode::Template(id) => {
						if let Some(query) = templates.get(id).and_then(|template| template.query.as_deref()) {
							add(sub_bindings, query);
						}
					}
					TemplateNode::Element(element) => {
						if let Some(filters) = &element.filters {
							for query in filters.keys() {
								add(bindings, query);
							}
						}
						if let Some(bind) = &element.bind {
							add(bindings, bind);
						}
						for query in element.bind_attributes.values() {
							add(bindings, query);
						}
						if let Some(view) = &element.view {
							add(sub_views, view);
						}
						visit(&element.children, templates, bindings, sub_bindings, sub_views);
					}
				}
			}
		}

		visit(&self.elements, templates, &mut self.bindings, &mut self.sub_bindings, &mut self.sub_views);
	}
}

fn check_placeholders(view: &str, nodes: &[TemplateNode]) -> Result<(), TemplateError> {
	for node in nodes {
		match node {
			TemplateNode::Template(id) if id.is_empty() => return Err(TemplateError::EmptyPlaceholder { view: view.to_owned() }),
			TemplateNode::Element(element) => check_placeholders(view, &element.children)?,
			_ => (),
		}
	}
	Ok(())
}

#[derive(Deserialize)]
struct RawView {
	#[serde(flatten)]
	root: Template,
	#[serde(default)]
	templates: IndexMap<String, Template>,
	#[serde(default)]
	referenced_views: Vec<String>,
}

/// A named root template plus the repeated templates it contains.
#[derive(Debug)]
pub struct View {
	name: Rc<str>,
	root: Rc<Template>,
	templates: HashMap<String, Rc<Template>>,
	referenced_views: Vec<String>,
}

impl View {
	/// Validates and assembles a view.
	///
	/// Template ids are taken from the map keys where the templates themselves don't state one.
	///
	/// # Errors
	///
	/// Iff a repeated template has no id or no query, an id is used twice, or a placeholder names no template.
	pub fn new(name: impl Into<Rc<str>>, mut root: Template, templates: impl IntoIterator<Item = Template>) -> Result<Self, TemplateError> {
		let name = name.into();

		let mut by_id = IndexMap::new();
		for template in templates {
			if template.id.is_empty() {
				return Err(TemplateError::MissingId { view: name.to_string() });
			}
			if template.query.as_deref().map_or(true, str::is_empty) {
				return Err(TemplateError::MissingQuery {
					view: name.to_string(),
					template: template.id,
				});
			}
			if by_id.contains_key(&template.id) {
				return Err(TemplateError::DuplicateId {
					view: name.to_string(),
					template: template.id,
				});
			}
			by_id.insert(template.id.clone(), template);
		}

		check_placeholders(&name, &root.elements)?;
		for template in by_id.values() {
			check_placeholders(&name, &template.elements)?;
		}

		let snapshot = by_id.clone();
		root.derive_dependencies(&snapshot);
		for template in by_id.values_mut() {
			template.derive_dependencies(&snapshot);
		}

		let mut referenced_views: Vec<String> = Vec::new();
		for view in root.sub_views.iter().chain(by_id.values().flat_map(|template| template.sub_views.iter())) {
			if !referenced_views.contains(view) {
				referenced_views.push(view.clone());
			}
		}

		Ok(Self {
			name,
			root: Rc::new(root),
			templates: by_id.into_iter().map(|(id, template)| (id, Rc::new(template))).collect(),
			referenced_views,
		})
	}

	/// Loads a view from the parser's JSON output.
	///
	/// # Errors
	///
	/// Iff the JSON doesn't describe a view or the view fails validation (see [`View::new`]).
	pub fn from_json(name: impl Into<Rc<str>>, json: &str) -> Result<Self, TemplateError> {
		let name = name.into();
		let raw: RawView = serde_json::from_str(json).map_err(|source| TemplateError::Json { view: name.to_string(), source })?;
		Self::from_raw(name, raw)
	}

	/// Like [`View::from_json`], from an already parsed JSON value.
	///
	/// # Errors
	///
	/// Iff the JSON doesn't describe a view or the view fails validation (see [`View::new`]).
	pub fn from_json_value(name: impl Into<Rc<str>>, json: serde_json::Value) -> Result<Self, TemplateError> {
		let name = name.into();
		let raw: RawView = serde_json::from_value(json).map_err(|source| TemplateError::Json { view: name.to_string(), source })?;
		Self::from_raw(name, raw)
	}

	fn from_raw(name: Rc<str>, raw: RawView) -> Result<Self, TemplateError> {
		let RawView { root, templates, referenced_views } = raw;
		let templates = templates.into_iter().map(|(id, template)| if template.id.is_empty() { Template { id, ..template } } else { template });
		let mut view = Self::new(name, root, templates)?;
		for referenced in referenced_views {
			if !view.referenced_views.contains(&referenced) {
				view.referenced_views.push(referenced);
			}
		}
		Ok(view)
	}

	#[must_use]
	pub fn name(&self) -> &Rc<str> {
		&self.name
	}

	#[must_use]
	pub fn root(&self) -> &Rc<Template> {
		&self.root
	}

	#[must_use]
	pub fn template(&self, id: &str) -> Option<&Rc<Template>> {
		self.templates.get(id)
	}

	#[must_use]
	pub fn referenced_views(&self) -> &[String] {
		&self.referenced_views
	}
}

/// The main view together with every view it references, directly or transitively.
#[derive(Debug, Clone)]
pub struct ViewSet {
	main: Rc<View>,
	views: HashMap<Rc<str>, Rc<View>>,
}

impl ViewSet {
	#[must_use]
	pub fn new(main: View) -> Self {
		Self::with_views(main, None)
	}

	/// Keeps only the views reachable from `main`. Missing references are logged and later render as nothing.
	#[must_use]
	pub fn with_views(main: View, views: impl IntoIterator<Item = View>) -> Self {
		let mut available: HashMap<Rc<str>, Rc<View>> = views.into_iter().map(|view| (view.name.clone(), Rc::new(view))).collect();
		let main = Rc::new(main);

		let mut resolved: HashMap<Rc<str>, Rc<View>> = HashMap::new();
		let mut pending: Vec<String> = main.referenced_views.clone();
		while let Some(name) = pending.pop() {
			if resolved.contains_key(name.as_str()) {
				continue;
			}
			match available.remove(name.as_str()) {
				Some(view) => {
					pending.extend(view.referenced_views.iter().cloned());
					resolved.insert(view.name.clone(), view);
				}
				None => warn!(view = %main.name, referenced = %name, "Referenced view is not available."),
			}
		}

		Self { main, views: resolved }
	}

	#[must_use]
	pub fn main(&self) -> &Rc<View> {
		&self.main
	}

	/// The view called `name`. The empty name stands for the main view.
	#[must_use]
	pub fn view(&self, name: &str) -> Option<&Rc<View>> {
		if name.is_empty() {
			Some(&self.main)
		} else {
			self.views.get(name)
		}
	}

	#[must_use]
	pub fn template(&self, template: &TemplateRef) -> Option<Rc<Template>> {
		let view = self.view(&template.view)?;
		if template.is_root() {
			Some(view.root.clone())
		} else {
			view.template(&template.template).cloned()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn derives_dependencies() {
		let view = View::from_json_value(
			"main",
			json!({
				"elements": [
					{"tag": "div", "filters": {".visible": true}, "children": [
						{"tag": "span", "bind": ".name"},
						{"template": "item"},
						{"tag": "a", "bind_attributes": {"href": ".url"}},
					]},
					{"tag": "aside", "view": "sidebar"},
				],
				"templates": {
					"item": {"query": ".items", "elements": [{"tag": "li", "bind": "^.title"}]},
				},
			}),
		)
		.unwrap();
		assert_eq!(view.root().bindings, [".visible", ".name", ".url"]);
		assert_eq!(view.root().sub_bindings, [".items"]);
		assert_eq!(view.referenced_views(), ["sidebar"]);
		let item = view.template("item").unwrap();
		assert_eq!(item.id, "item");
		assert_eq!(item.bindings, ["^.title"]);
	}

	#[test]
	fn rejects_template_without_query() {
		let error = View::from_json_value("main", json!({"elements": [], "templates": {"1": {"elements": []}}})).unwrap_err();
		assert!(matches!(error, TemplateError::MissingQuery { .. }));
	}

	#[test]
	fn rejects_nameless_template() {
		let error = View::new("main", Template::default(), vec![Template { query: Some(".x".to_owned()), ..Template::default() }]).unwrap_err();
		assert!(matches!(error, TemplateError::MissingId { .. }));
	}

	#[test]
	fn rejects_malformed_json() {
		assert!(matches!(View::from_json("main", "{\"elements\": 3}"), Err(TemplateError::Json { .. })));
	}

	#[test]
	fn resolves_views_transitively() {
		let main = View::from_json_value("", json!({"elements": [{"tag": "div", "view": "a"}]})).unwrap();
		let a = View::from_json_value("a", json!({"elements": [{"tag": "div", "view": "b"}]})).unwrap();
		let b = View::from_json_value("b", json!({"elements": ["b"]})).unwrap();
		let unused = View::from_json_value("unused", json!({"elements": []})).unwrap();
		let views = ViewSet::with_views(main, vec![a, b, unused]);
		assert!(views.view("a").is_some());
		assert!(views.view("b").is_some());
		assert!(views.view("unused").is_none());
		assert!(views.template(&TemplateRef::root("b")).is_some());
	}
}
