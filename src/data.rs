//! The observable data graph that views are bound against.
//!
//! Objects and collections are shared handles with identity: two handles are equal only if they point at the same
//! entity. The engine never stores anything inside them; everything it needs to find nodes again lives in its own
//! side-table keyed by [`EntityKey`].

use core::{
	cell::{Cell, Ref, RefCell},
	fmt::{self, Debug, Display, Formatter},
};
use indexmap::IndexMap;
use std::rc::Rc;

thread_local! {
	static NEXT_ENTITY_ID: Cell<u64> = Cell::new(0);
}

/// Process-unique identity of an object or collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
	fn next() -> Self {
		NEXT_ENTITY_ID.with(|next| {
			let id = next.get();
			next.set(id + 1);
			Self(id)
		})
	}
}

/// The identity live nodes are indexed under.
///
/// Primitive collection members have no identity of their own, so they are keyed by their slot in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
	Direct(EntityId),
	Primitive { collection: EntityId, index: usize },
}

#[derive(Clone)]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	String(Rc<str>),
	Object(ObjectRef),
	Collection(CollectionRef),
}

impl Value {
	/// Builds a data graph from JSON. Every JSON object and array becomes a fresh entity.
	#[must_use]
	pub fn from_json(json: &serde_json::Value) -> Self {
		match json {
			serde_json::Value::Null => Self::Null,
			&serde_json::Value::Bool(b) => Self::Bool(b),
			serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
			serde_json::Value::String(s) => Self::String(s.as_str().into()),
			serde_json::Value::Array(items) => Self::Collection(CollectionRef::from_items(items.iter().map(Self::from_json))),
			serde_json::Value::Object(fields) => {
				let object = ObjectRef::new();
				for (key, value) in fields {
					object.set(key.as_str(), Self::from_json(value));
				}
				Self::Object(object)
			}
		}
	}

	/// Snapshot of the current state as JSON. Cycles are cut off as `null`.
	#[must_use]
	pub fn to_json(&self) -> serde_json::Value {
		fn to_json(value: &Value, stack: &mut Vec<EntityId>) -> serde_json::Value {
			if let Some(id) = value.entity_id() {
				if stack.contains(&id) {
					return serde_json::Value::Null;
				}
				stack.push(id);
			}
			let json = match value {
				Value::Null => serde_json::Value::Null,
				&Value::Bool(b) => serde_json::Value::Bool(b),
				#[allow(clippy::cast_possible_truncation)]
				&Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => serde_json::Value::from(n as i64),
				&Value::Number(n) => serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number),
				Value::String(s) => serde_json::Value::String(s.to_string()),
				Value::Object(object) => serde_json::Value::Object(object.fields().iter().map(|(k, v)| (k.clone(), to_json(v, stack))).collect()),
				Value::Collection(collection) => serde_json::Value::Array(collection.items().iter().map(|v| to_json(v, stack)).collect()),
			};
			if value.entity_id().is_some() {
				stack.pop();
			}
			json
		}
		to_json(self, &mut Vec::new())
	}

	#[must_use]
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Truthiness as used by `$present` filters: `null`, `false`, `0`, `NaN` and the empty string are absent.
	#[must_use]
	pub fn is_truthy(&self) -> bool {
		match self {
			Self::Null => false,
			&Self::Bool(b) => b,
			&Self::Number(n) => n != 0.0 && !n.is_nan(),
			Self::String(s) => !s.is_empty(),
			Self::Object(_) | Self::Collection(_) => true,
		}
	}

	#[must_use]
	pub fn as_object(&self) -> Option<&ObjectRef> {
		match self {
			Self::Object(object) => Some(object),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_collection(&self) -> Option<&CollectionRef> {
		match self {
			Self::Collection(collection) => Some(collection),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	#[must_use]
	pub fn entity_id(&self) -> Option<EntityId> {
		match self {
			Self::Object(object) => Some(object.id()),
			Self::Collection(collection) => Some(collection.id()),
			_ => None,
		}
	}

	/// The key this value is indexed under when it sits at `index` in `collection`.
	///
	/// Returns [`None`] for a primitive outside of any collection, which can't be indexed.
	#[must_use]
	pub fn key_in(&self, collection: Option<&CollectionRef>, index: Option<usize>) -> Option<EntityKey> {
		match (self.entity_id(), collection, index) {
			(Some(id), _, _) => Some(EntityKey::Direct(id)),
			(None, Some(collection), Some(index)) => Some(EntityKey::Primitive { collection: collection.id(), index }),
			_ => None,
		}
	}

	/// Field lookup on objects; [`Value::Null`] for anything else.
	#[must_use]
	pub fn field(&self, key: &str) -> Value {
		self.as_object().and_then(|object| object.get(key)).unwrap_or(Value::Null)
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Null, Self::Null) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Number(a), Self::Number(b)) => a == b,
			(Self::String(a), Self::String(b)) => a == b,
			(Self::Object(a), Self::Object(b)) => a == b,
			(Self::Collection(a), Self::Collection(b)) => a == b,
			_ => false,
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("Null"),
			Self::Bool(b) => write!(f, "Bool({})", b),
			Self::Number(n) => write!(f, "Number({})", n),
			Self::String(s) => write!(f, "String({:?})", s),
			Self::Object(object) => Debug::fmt(object, f),
			Self::Collection(collection) => Debug::fmt(collection, f),
		}
	}
}

/// Text rendering of a value, as bound text nodes and attributes show it.
impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => Ok(()),
			Self::Bool(b) => write!(f, "{}", b),
			#[allow(clippy::cast_possible_truncation)]
			&Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", n as i64),
			Self::Number(n) => write!(f, "{}", n),
			Self::String(s) => f.write_str(s),
			Self::Object(_) => f.write_str("[object Object]"),
			Self::Collection(collection) => {
				for (i, item) in collection.items().iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					Display::fmt(item, f)?;
				}
				Ok(())
			}
		}
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::String(s.into())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::String(s.into())
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Number(n.into())
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<ObjectRef> for Value {
	fn from(object: ObjectRef) -> Self {
		Self::Object(object)
	}
}

impl From<CollectionRef> for Value {
	fn from(collection: CollectionRef) -> Self {
		Self::Collection(collection)
	}
}

struct ObjectData {
	id: EntityId,
	fields: RefCell<IndexMap<String, Value>>,
}

/// A shared, mutable record of named fields.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectData>);

impl ObjectRef {
	#[must_use]
	pub fn new() -> Self {
		Self(Rc::new(ObjectData {
			id: EntityId::next(),
			fields: RefCell::default(),
		}))
	}

	#[must_use]
	pub fn with_fields<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
		let object = Self::new();
		for (key, value) in fields {
			object.set(key, value);
		}
		object
	}

	#[must_use]
	pub fn id(&self) -> EntityId {
		self.0.id
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<Value> {
		self.0.fields.borrow().get(key).cloned()
	}

	pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		self.0.fields.borrow_mut().insert(key.into(), value.into())
	}

	pub fn remove(&self, key: &str) -> Option<Value> {
		self.0.fields.borrow_mut().shift_remove(key)
	}

	/// Borrows the fields. Don't hold on to this across mutations of the same object.
	#[must_use]
	pub fn fields(&self) -> Ref<'_, IndexMap<String, Value>> {
		self.0.fields.borrow()
	}
}

impl Default for ObjectRef {
	fn default() -> Self {
		Self::new()
	}
}

impl PartialEq for ObjectRef {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for ObjectRef {}

impl Debug for ObjectRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Object#{}", self.0.id.0)
	}
}

struct CollectionData {
	id: EntityId,
	items: RefCell<Vec<Value>>,
}

/// A shared, ordered list of values.
#[derive(Clone)]
pub struct CollectionRef(Rc<CollectionData>);

impl CollectionRef {
	#[must_use]
	pub fn new() -> Self {
		Self::from_items(None)
	}

	#[must_use]
	pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
		Self(Rc::new(CollectionData {
			id: EntityId::next(),
			items: RefCell::new(items.into_iter().collect()),
		}))
	}

	#[must_use]
	pub fn id(&self) -> EntityId {
		self.0.id
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.items.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn get(&self, index: usize) -> Option<Value> {
		self.0.items.borrow().get(index).cloned()
	}

	/// A snapshot of the current items.
	#[must_use]
	pub fn items(&self) -> Vec<Value> {
		self.0.items.borrow().clone()
	}

	/// Index of the first item equal to `value` (identity for objects and collections).
	#[must_use]
	pub fn position(&self, value: &Value) -> Option<usize> {
		self.0.items.borrow().iter().position(|item| item == value)
	}

	pub fn push(&self, value: impl Into<Value>) {
		self.0.items.borrow_mut().push(value.into());
	}

	/// # Panics
	///
	/// Iff `index > len`.
	pub fn insert(&self, index: usize, value: impl Into<Value>) {
		self.0.items.borrow_mut().insert(index, value.into());
	}

	/// Removes the first item equal to `value` and returns where it was.
	pub fn remove(&self, value: &Value) -> Option<usize> {
		let index = self.position(value)?;
		self.0.items.borrow_mut().remove(index);
		Some(index)
	}
}

impl Default for CollectionRef {
	fn default() -> Self {
		Self::new()
	}
}

impl PartialEq for CollectionRef {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for CollectionRef {}

impl Debug for CollectionRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Collection#{}", self.0.id.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn identity_equality() {
		let a = ObjectRef::new();
		let b = ObjectRef::new();
		assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
		assert_ne!(Value::from(a), Value::from(b));
		assert_eq!(Value::from("x"), Value::from("x"));
	}

	#[test]
	fn text_rendering() {
		assert_eq!(Value::from(3).to_string(), "3");
		assert_eq!(Value::from(1.5).to_string(), "1.5");
		assert_eq!(Value::Null.to_string(), "");
		let list = Value::from_json(&json!([1, "a", true]));
		assert_eq!(list.to_string(), "1,a,true");
	}

	#[test]
	fn json_round_trip() {
		let json = json!({"b": 1, "a": {"c": [1, 2]}});
		assert_eq!(Value::from_json(&json).to_json(), json);
	}

	#[test]
	fn primitive_keys_are_slots() {
		let collection = CollectionRef::from_items(vec![Value::from(1), Value::from(2)]);
		let key = Value::from(2).key_in(Some(&collection), Some(1));
		assert_eq!(key, Some(EntityKey::Primitive { collection: collection.id(), index: 1 }));
		assert_eq!(Value::from(2).key_in(None, None), None);
	}
}
