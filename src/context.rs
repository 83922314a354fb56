//! Binding contexts: one template instance bound to one source.

use crate::{
	data::{CollectionRef, Value},
	datasource::{is_local_key, Datasource, QueryScope},
	error::QueryError,
	ordinal::{InstanceId, TemplateRef},
	template::{Template, ViewSet},
};
use hashbrown::HashMap;
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::{instrument, trace};

/// The evaluated state of one template instance.
///
/// [`BindingContext::refresh`] re-evaluates every query in place; a context keeps its identity for as long as the
/// nodes it was rendered into stay bound.
#[derive(Debug)]
pub struct BindingContext {
	template_ref: TemplateRef,
	template: Rc<Template>,
	source: Value,
	parent: Option<Value>,
	collection: Option<CollectionRef>,
	index: Option<usize>,
	overrides: IndexMap<String, Value>,
	query_values: HashMap<String, Value>,
	references: Vec<Value>,
}

impl BindingContext {
	/// Creates and immediately [`refresh`](`BindingContext::refresh`)es a context.
	///
	/// # Errors
	///
	/// Iff a query fails.
	pub fn new(views: &ViewSet, datasource: &dyn Datasource, template_ref: TemplateRef, template: Rc<Template>, source: Value, parent: Option<Value>, collection: Option<CollectionRef>, index: Option<usize>) -> Result<Self, QueryError> {
		let mut overrides = IndexMap::new();
		if let Some(alias) = &template.context_as {
			overrides.insert(alias.clone(), source.clone());
		}
		let mut context = Self {
			template_ref,
			template,
			source,
			parent,
			collection,
			index,
			overrides,
			query_values: HashMap::new(),
			references: Vec::new(),
		};
		context.refresh(views, datasource)?;
		Ok(context)
	}

	/// Re-evaluates all queries of the template, including those of views it splices in.
	///
	/// # Errors
	///
	/// Iff a query fails. The cache is left partially updated in that case.
	#[instrument(skip(self, views, datasource), fields(template = %self.template_ref))]
	pub fn refresh(&mut self, views: &ViewSet, datasource: &dyn Datasource) -> Result<(), QueryError> {
		let mut queries: Vec<String> = self.template.bindings.clone();
		let mut sub_queries: Vec<String> = self.template.sub_bindings.clone();

		let mut pending: Vec<&str> = self.template.sub_views.iter().map(String::as_str).collect();
		let mut seen: Vec<&str> = Vec::new();
		while let Some(name) = pending.pop() {
			if seen.contains(&name) {
				continue;
			}
			seen.push(name);
			if let Some(view) = views.view(name) {
				let root = view.root();
				add_all(&mut queries, &root.bindings);
				add_all(&mut sub_queries, &root.sub_bindings);
				pending.extend(root.sub_views.iter().map(String::as_str));
			}
		}

		self.references.clear();

		for query in &sub_queries {
			let result = datasource.query(query, &self.scope().forced())?;
			self.query_values.insert(query.clone(), result.value);
		}

		for query in &queries {
			let result = datasource.query(query, &self.scope())?;
			for reference in result.references {
				if !self.references.contains(&reference) {
					self.references.push(reference);
				}
			}
			self.query_values.insert(query.clone(), result.value);
		}

		trace!(queries = queries.len(), sub_queries = sub_queries.len(), references = self.references.len(), "Refreshed binding context.");
		Ok(())
	}

	#[must_use]
	pub fn scope(&self) -> QueryScope<'_> {
		QueryScope {
			source: &self.source,
			parent: self.parent.as_ref(),
			overrides: Some(&self.overrides),
			force: false,
		}
	}

	/// The value of `query` as of the last refresh, or [`None`] if the query isn't one of the template's.
	///
	/// `.` and single-field queries (`.name`) are read live from the source.
	#[must_use]
	pub fn get(&self, query: &str) -> Option<Value> {
		if query == "." {
			Some(self.source.clone())
		} else if is_local_key(query) {
			Some(self.source.field(&query[1..]))
		} else {
			self.query_values.get(query).cloned()
		}
	}

	#[must_use]
	pub fn template_ref(&self) -> &TemplateRef {
		&self.template_ref
	}

	#[must_use]
	pub fn template(&self) -> &Rc<Template> {
		&self.template
	}

	#[must_use]
	pub fn source(&self) -> &Value {
		&self.source
	}

	#[must_use]
	pub fn parent(&self) -> Option<&Value> {
		self.parent.as_ref()
	}

	#[must_use]
	pub fn collection(&self) -> Option<&CollectionRef> {
		self.collection.as_ref()
	}

	#[must_use]
	pub fn index(&self) -> Option<usize> {
		self.index
	}

	/// Entities other than the source itself that influenced the last refresh.
	pub fn references(&self) -> impl Iterator<Item = &Value> {
		self.references.iter().filter(move |reference| **reference != self.source)
	}

	/// The instance id for nodes rendered from this context, if it belongs to a repeated template.
	#[must_use]
	pub fn instance(&self) -> Option<InstanceId> {
		match (self.template_ref.is_root(), self.index) {
			(false, Some(index)) => Some(InstanceId::new(self.template_ref.clone(), index)),
			_ => None,
		}
	}

	/// Moves the context to another collection or position without touching its cache.
	pub fn relocate(&mut self, collection: Option<CollectionRef>, index: Option<usize>) {
		self.collection = collection;
		self.index = index;
	}

	/// Re-reads the source's position within its collection.
	///
	/// A primitive keeps its index as long as the slot still holds an equal value.
	pub fn renumber(&mut self) {
		let collection = match &self.collection {
			Some(collection) => collection,
			None => return,
		};
		if self.source.entity_id().is_none() {
			if let Some(index) = self.index {
				if collection.get(index).as_ref() == Some(&self.source) {
					return;
				}
			}
		}
		if let Some(index) = collection.position(&self.source) {
			self.index = Some(index);
		}
	}
}

fn add_all(list: &mut Vec<String>, items: &[String]) {
	for item in items {
		if !list.contains(item) {
			list.push(item.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{datasource::PathDatasource, template::View};
	use serde_json::json;

	#[test]
	fn refresh_keeps_identity_and_updates_values() {
		let view = View::from_json_value("", json!({"elements": [{"tag": "b", "bind": ".author.name"}]})).unwrap();
		let views = ViewSet::new(view);
		let datasource = PathDatasource::from_json(&json!({"author": {"name": "Ann"}}));
		let data = datasource.data();
		let mut context = BindingContext::new(&views, &datasource, TemplateRef::root(""), views.main().root().clone(), data.clone(), None, None, None).unwrap();
		assert_eq!(context.get(".author.name"), Some(Value::from("Ann")));
		assert_eq!(context.references().count(), 1);

		let author = data.field("author");
		author.as_object().unwrap().set("name", "Bob");
		assert_eq!(context.get(".author.name"), Some(Value::from("Ann")));
		context.refresh(&views, &datasource).unwrap();
		assert_eq!(context.get(".author.name"), Some(Value::from("Bob")));
		assert_eq!(context.references().next(), Some(&author));
	}
}
