//! The query boundary between templates and the data graph.
//!
//! Binding expressions are opaque strings to the rest of the crate. A [`Datasource`] evaluates them and reports
//! which entities it touched along the way, which is what dependency tracking is built on.

use crate::{
	data::{CollectionRef, Value},
	error::QueryError,
};
use indexmap::IndexMap;
use tracing::trace;

/// Where a query is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct QueryScope<'a> {
	/// The object the current template instance is bound to.
	pub source: &'a Value,
	/// The object of the enclosing template instance, if any.
	pub parent: Option<&'a Value>,
	/// Extra names, like a template's `context_as` alias.
	pub overrides: Option<&'a IndexMap<String, Value>>,
	/// Create a missing collection at the end of the path instead of yielding [`Value::Null`].
	pub force: bool,
}

impl<'a> QueryScope<'a> {
	#[must_use]
	pub fn new(source: &'a Value) -> Self {
		Self {
			source,
			parent: None,
			overrides: None,
			force: false,
		}
	}

	#[must_use]
	pub fn forced(self) -> Self {
		Self { force: true, ..self }
	}
}

#[derive(Debug, Clone)]
pub struct QueryResult {
	pub value: Value,
	/// Every object or collection the evaluation passed through, in order, without duplicates.
	pub references: Vec<Value>,
}

pub trait Datasource {
	/// The root of the data graph.
	fn data(&self) -> Value;

	/// Evaluates `query` and reports its dependencies.
	///
	/// # Errors
	///
	/// Iff the query can't be evaluated at all. Missing data is not an error.
	fn query(&self, query: &str, scope: &QueryScope<'_>) -> Result<QueryResult, QueryError>;

	/// Like [`Datasource::query`], discarding the references.
	///
	/// # Errors
	///
	/// Iff the query can't be evaluated at all.
	fn get(&self, query: &str, scope: &QueryScope<'_>) -> Result<Value, QueryError> {
		self.query(query, scope).map(|result| result.value)
	}
}

/// Whether `query` reads a single field of the source directly (`.name`), in which case no evaluation is needed.
#[must_use]
pub fn is_local_key(query: &str) -> bool {
	query.len() > 1 && query.rfind('.') == Some(0) && !query.contains(':') && !query.contains('|')
}

/// A [`Datasource`] over a small path language:
///
/// | Query | Meaning |
/// | --- | --- |
/// | `.` | the source |
/// | `.a.b` | path from the source |
/// | `^`, `^.a` | the parent context |
/// | `~`, `~.a` | the root data |
/// | `name.a` | a scope override, like a `context_as` alias |
///
/// Path segments index into collections numerically, and `length` yields a collection's size.
#[derive(Debug, Clone)]
pub struct PathDatasource {
	data: Value,
}

impl PathDatasource {
	#[must_use]
	pub fn new(data: impl Into<Value>) -> Self {
		Self { data: data.into() }
	}

	#[must_use]
	pub fn from_json(json: &serde_json::Value) -> Self {
		Self::new(Value::from_json(json))
	}
}

impl Datasource for PathDatasource {
	fn data(&self) -> Value {
		self.data.clone()
	}

	fn query(&self, query: &str, scope: &QueryScope<'_>) -> Result<QueryResult, QueryError> {
		let syntax = |reason: &'static str| QueryError::Syntax { query: query.to_owned(), reason };

		let (start, path) = if query == "." {
			(scope.source.clone(), "")
		} else if let Some(path) = query.strip_prefix('^') {
			(scope.parent.cloned().unwrap_or(Value::Null), path)
		} else if let Some(path) = query.strip_prefix('~') {
			(self.data.clone(), path)
		} else if query.starts_with('.') {
			(scope.source.clone(), query)
		} else {
			let end = query.find('.').unwrap_or(query.len());
			let name = &query[..end];
			if name.is_empty() {
				return Err(syntax("empty query"));
			}
			let value = scope.overrides.and_then(|overrides| overrides.get(name)).cloned().ok_or_else(|| QueryError::UnknownName {
				query: query.to_owned(),
				name: name.to_owned(),
			})?;
			(value, &query[end..])
		};

		let segments: Vec<&str> = match path {
			"" => Vec::new(),
			path => match path.strip_prefix('.') {
				Some(path) => path.split('.').collect(),
				None => return Err(syntax("path segments must be separated by '.'")),
			},
		};
		if segments.iter().any(|segment| segment.is_empty()) {
			return Err(syntax("empty path segment"));
		}

		let mut references = Vec::new();
		let mut reference = |value: &Value| {
			if value.entity_id().is_some() && !references.contains(value) {
				references.push(value.clone());
			}
		};

		let mut current = start;
		reference(&current);
		for (i, &segment) in segments.iter().enumerate() {
			let next = match &current {
				Value::Object(object) => object.get(segment),
				Value::Collection(collection) => match segment {
					#[allow(clippy::cast_precision_loss)]
					"length" => Some(Value::Number(collection.len() as f64)),
					index => index.parse().ok().and_then(|index| collection.get(index)),
				},
				_ => None,
			};
			current = match next {
				Some(Value::Null) | None if scope.force && i + 1 == segments.len() => match &current {
					Value::Object(object) => {
						trace!(query, segment, "Forcing missing collection.");
						let collection = Value::Collection(CollectionRef::new());
						object.set(segment, collection.clone());
						collection
					}
					_ => Value::Null,
				},
				Some(next) => next,
				None => Value::Null,
			};
			reference(&current);
			if current.is_null() {
				break;
			}
		}

		Ok(QueryResult { value: current, references })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::data::ObjectRef;
	use serde_json::json;

	#[test]
	fn local_keys() {
		assert!(is_local_key(".name"));
		assert!(!is_local_key("."));
		assert!(!is_local_key(".a.b"));
		assert!(!is_local_key("^.a"));
		assert!(!is_local_key(".a:b"));
	}

	#[test]
	fn paths_report_references() {
		let datasource = PathDatasource::from_json(&json!({"a": {"b": {"c": 1}}}));
		let data = datasource.data();
		let result = datasource.query(".a.b.c", &QueryScope::new(&data)).unwrap();
		assert_eq!(result.value, Value::from(1));
		assert_eq!(result.references.len(), 3);
		assert_eq!(result.references[0], data);
	}

	#[test]
	fn parent_root_and_overrides() {
		let datasource = PathDatasource::from_json(&json!({"title": "root"}));
		let parent = Value::from_json(&json!({"title": "parent"}));
		let source = Value::from_json(&json!({"title": "source"}));
		let mut overrides = IndexMap::new();
		overrides.insert("item".to_owned(), source.clone());
		let scope = QueryScope {
			source: &source,
			parent: Some(&parent),
			overrides: Some(&overrides),
			force: false,
		};
		assert_eq!(datasource.get("^.title", &scope).unwrap(), Value::from("parent"));
		assert_eq!(datasource.get("~.title", &scope).unwrap(), Value::from("root"));
		assert_eq!(datasource.get("item.title", &scope).unwrap(), Value::from("source"));
		assert!(matches!(datasource.get("other.title", &scope), Err(QueryError::UnknownName { .. })));
		assert!(matches!(datasource.get(".a..b", &scope), Err(QueryError::Syntax { .. })));
	}

	#[test]
	fn force_creates_collection() {
		let object = ObjectRef::new();
		let source = Value::from(object.clone());
		let datasource = PathDatasource::new(source.clone());
		assert!(datasource.get(".items", &QueryScope::new(&source)).unwrap().is_null());
		let forced = datasource.get(".items", &QueryScope::new(&source).forced()).unwrap();
		assert!(forced.as_collection().is_some());
		assert_eq!(object.get("items"), Some(forced));
	}

	#[test]
	fn collection_segments() {
		let datasource = PathDatasource::from_json(&json!({"items": ["a", "b"]}));
		let data = datasource.data();
		let scope = QueryScope::new(&data);
		assert_eq!(datasource.get(".items.1", &scope).unwrap(), Value::from("b"));
		assert_eq!(datasource.get(".items.length", &scope).unwrap(), Value::from(2));
	}
}
