//! Filter predicates for conditionally rendered elements.
//!
//! A filter pattern is plain JSON. Keys starting with `$` are operators; everything else is matched structurally:
//!
//! | Pattern | Matches |
//! | --- | --- |
//! | `null` | anything |
//! | `{"$present": true}` / `{"$present": false}` | truthy / falsy values |
//! | `{"$any": true}` | anything |
//! | `{"$contains": [...]}` / `{"$excludes": [...]}` | collections containing all / none of the values |
//! | `[...]` | collections of the same length whose items match element-wise |
//! | `{...}` | objects (or collections, by index) whose fields match key by key |
//! | `{"$matchAny": [{...}, ...]}` | if any alternative, merged over the rest of the pattern, matches |
//! | `{"$only": [...]}` / `{"$not": [...]}` | primitives in / not in the list |
//! | scalar | an equal primitive |

use crate::data::Value;
use serde_json::{Map, Value as Json};

/// Which side's keys have to be accounted for when matching records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
	/// Every non-operator key of the pattern must match.
	#[default]
	Filter,
	/// Every key of the source must be matched by the pattern, unless listed in the pattern's `$optional`.
	Source,
	/// Every key of the source that the pattern mentions must match.
	Any,
}

/// Result of matching a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Pass,
	Fail,
	/// There was no pattern for this value.
	Unspecified,
}

impl Outcome {
	fn from_bool(pass: bool) -> Self {
		if pass {
			Self::Pass
		} else {
			Self::Fail
		}
	}

	#[must_use]
	pub fn passed(self) -> bool {
		self != Self::Fail
	}
}

fn is_meta(key: &str) -> bool {
	key.starts_with('$')
}

/// Matches `source` against `pattern`.
#[must_use]
pub fn check(source: &Value, pattern: Option<&Json>, mode: MatchMode) -> Outcome {
	let pattern = match pattern {
		Some(pattern) => pattern,
		None => return Outcome::Unspecified,
	};

	if let Json::Object(operators) = pattern {
		if let Some(present) = operators.get("$present") {
			return Outcome::from_bool(json_truthy(present) == source.is_truthy());
		}
		if operators.get("$any").map_or(false, json_truthy) {
			return Outcome::Pass;
		}
	}

	match (source, pattern) {
		(_, Json::Null) => Outcome::Pass,

		(Value::Collection(collection), Json::Object(operators)) if operators.contains_key("$contains") || operators.contains_key("$excludes") => {
			let items = collection.items();
			let contains = |needle: &Json| items.iter().any(|item| json_eq(item, needle));
			match (operators.get("$contains"), operators.get("$excludes")) {
				(Some(Json::Array(needles)), _) => Outcome::from_bool(needles.iter().all(contains)),
				(_, Some(Json::Array(needles))) => Outcome::from_bool(!needles.iter().any(contains)),
				_ => Outcome::Fail,
			}
		}

		(Value::Collection(collection), Json::Array(elements)) => Outcome::from_bool(collection.len() == elements.len() && match_keys(source, pattern, mode)),

		(Value::Object(_) | Value::Collection(_), Json::Object(_) | Json::Array(_)) => Outcome::from_bool(match_keys(source, pattern, mode)),

		(Value::Object(_) | Value::Collection(_), _) => Outcome::Fail,

		(primitive, Json::Object(operators)) => match (operators.get("$only"), operators.get("$not")) {
			(Some(Json::Array(allowed)), _) => Outcome::from_bool(allowed.iter().any(|allowed| json_eq(primitive, allowed))),
			(_, Some(Json::Array(denied))) => Outcome::from_bool(!denied.iter().any(|denied| json_eq(primitive, denied))),
			_ => Outcome::Fail,
		},

		(primitive, scalar) => Outcome::from_bool(json_eq(primitive, scalar)),
	}
}

/// Checks each `(query value, pattern)` pair the way an element's filter list is checked.
pub fn check_all<'a>(pairs: impl IntoIterator<Item = (&'a Value, &'a Json)>) -> bool {
	pairs.into_iter().all(|(value, pattern)| check(value, Some(pattern), MatchMode::Filter).passed())
}

fn match_keys(source: &Value, pattern: &Json, mode: MatchMode) -> bool {
	if let Json::Object(operators) = pattern {
		if let Some(Json::Array(alternatives)) = operators.get("$matchAny") {
			return alternatives.iter().any(|alternative| {
				let mut combined: Map<String, Json> = operators.clone();
				combined.remove("$matchAny");
				if let Json::Object(alternative) = alternative {
					for (key, value) in alternative {
						combined.insert(key.clone(), value.clone());
					}
				}
				match_keys(source, &Json::Object(combined), mode)
			});
		}
	}

	match mode {
		MatchMode::Filter => pattern_entries(pattern)
			.into_iter()
			.all(|(key, inner)| check(&source_field(source, &key), Some(inner), MatchMode::Filter).passed()),
		MatchMode::Source => {
			let optional = match pattern {
				Json::Object(operators) => operators.get("$optional").and_then(Json::as_array).cloned().unwrap_or_default(),
				_ => Vec::new(),
			};
			source_keys(source).into_iter().all(|key| {
				let outcome = check(&source_field(source, &key), pattern_field(pattern, &key), MatchMode::Filter);
				if optional.iter().any(|optional| optional.as_str() == Some(key.as_str())) || outcome != Outcome::Unspecified {
					outcome.passed()
				} else {
					false
				}
			})
		}
		MatchMode::Any => source_keys(source)
			.into_iter()
			.all(|key| check(&source_field(source, &key), pattern_field(pattern, &key), MatchMode::Filter).passed()),
	}
}

fn pattern_entries(pattern: &Json) -> Vec<(String, &Json)> {
	match pattern {
		Json::Object(fields) => fields.iter().filter(|(key, _)| !is_meta(key)).map(|(key, value)| (key.clone(), value)).collect(),
		Json::Array(elements) => elements.iter().enumerate().map(|(i, value)| (i.to_string(), value)).collect(),
		_ => Vec::new(),
	}
}

fn pattern_field<'a>(pattern: &'a Json, key: &str) -> Option<&'a Json> {
	match pattern {
		Json::Object(fields) => fields.get(key),
		Json::Array(elements) => key.parse::<usize>().ok().and_then(|i| elements.get(i)),
		_ => None,
	}
}

fn source_keys(source: &Value) -> Vec<String> {
	match source {
		Value::Object(object) => object.fields().keys().filter(|key| !is_meta(key)).cloned().collect(),
		Value::Collection(collection) => (0..collection.len()).map(|i| i.to_string()).collect(),
		_ => Vec::new(),
	}
}

fn source_field(source: &Value, key: &str) -> Value {
	match source {
		Value::Object(object) => object.get(key).unwrap_or(Value::Null),
		Value::Collection(collection) => key.parse::<usize>().ok().and_then(|i| collection.get(i)).unwrap_or(Value::Null),
		_ => Value::Null,
	}
}

fn json_truthy(json: &Json) -> bool {
	match json {
		Json::Null => false,
		&Json::Bool(b) => b,
		Json::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
		Json::String(s) => !s.is_empty(),
		Json::Array(_) | Json::Object(_) => true,
	}
}

/// Strict equality between a primitive and a JSON scalar.
fn json_eq(value: &Value, json: &Json) -> bool {
	match (value, json) {
		(Value::Null, Json::Null) => true,
		(Value::Bool(a), Json::Bool(b)) => a == b,
		(&Value::Number(a), Json::Number(b)) => b.as_f64() == Some(a),
		(Value::String(a), Json::String(b)) => **a == **b,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn passes(source: &serde_json::Value, pattern: &serde_json::Value) -> bool {
		check(&Value::from_json(source), Some(pattern), MatchMode::Filter).passed()
	}

	#[test]
	fn presence() {
		assert!(passes(&json!("x"), &json!({"$present": true})));
		assert!(!passes(&json!(""), &json!({"$present": true})));
		assert!(passes(&json!(null), &json!({"$present": false})));
		assert!(!passes(&json!({"a": 1}), &json!({"$present": false})));
	}

	#[test]
	fn scalars_and_lists() {
		assert!(passes(&json!(3), &json!(3)));
		assert!(!passes(&json!(3), &json!("3")));
		assert!(passes(&json!("b"), &json!({"$only": ["a", "b"]})));
		assert!(!passes(&json!("b"), &json!({"$not": ["a", "b"]})));
		assert!(passes(&json!("anything"), &json!(null)));
		assert!(passes(&json!(1), &json!({"$any": true})));
	}

	#[test]
	fn containment() {
		assert!(passes(&json!(["a", "b", "c"]), &json!({"$contains": ["a", "c"]})));
		assert!(!passes(&json!(["a", "b"]), &json!({"$contains": ["a", "d"]})));
		assert!(passes(&json!(["a", "b"]), &json!({"$excludes": ["d"]})));
		assert!(!passes(&json!(["a", "b"]), &json!({"$excludes": ["b"]})));
	}

	#[test]
	fn structural() {
		assert!(passes(&json!({"a": {"b": 1}, "c": 2}), &json!({"a": {"b": 1}})));
		assert!(!passes(&json!({"a": {"b": 2}}), &json!({"a": {"b": 1}})));
		assert!(passes(&json!([1, 2]), &json!([1, 2])));
		assert!(!passes(&json!([1, 2, 3]), &json!([1, 2])));
		assert!(passes(&json!([1, 2, 3]), &json!({"1": 2})));
		assert!(!passes(&json!({"a": 1}), &json!(1)));
	}

	#[test]
	fn match_any() {
		let pattern = json!({"kind": "post", "$matchAny": [{"state": "draft"}, {"state": "published"}]});
		assert!(passes(&json!({"kind": "post", "state": "published"}), &pattern));
		assert!(!passes(&json!({"kind": "post", "state": "deleted"}), &pattern));
		assert!(!passes(&json!({"kind": "page", "state": "draft"}), &pattern));
	}

	#[test]
	fn source_mode_requires_every_source_key() {
		let source = Value::from_json(&json!({"a": 1, "b": 2}));
		assert!(!check(&source, Some(&json!({"a": 1})), MatchMode::Source).passed());
		assert!(check(&source, Some(&json!({"a": 1, "$optional": ["b"]})), MatchMode::Source).passed());
		assert!(check(&source, Some(&json!({"a": 1, "b": 2})), MatchMode::Source).passed());
		assert!(check(&source, Some(&json!({"a": 1})), MatchMode::Any).passed());
	}
}
