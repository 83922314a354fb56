//! Mutation events of the data graph.
//!
//! The host mutates its data through [`ObjectRef`](`crate::data::ObjectRef`) and [`CollectionRef`] and then reports
//! what happened as a [`Change`], which [`Binder::apply`](`crate::binder::Binder::apply`) translates into node operations.

use crate::data::{CollectionRef, Value};
use core::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	Append,
	Update,
	Remove,
}

impl Display for Action {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Action::Append => "append",
			Action::Update => "update",
			Action::Remove => "remove",
		})
	}
}

/// Position hint: the item's nodes belong directly before another item's nodes, or before the collection's placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum Before {
	Item(Value),
	End,
}

/// Position hint: the item's nodes belong directly after another item's nodes, or before everything else in the collection.
#[derive(Debug, Clone, PartialEq)]
pub enum After {
	Item(Value),
	Start,
}

/// An item entering or leaving a collection as a side effect of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
	pub collection: CollectionRef,
	pub item: Value,
}

impl Membership {
	#[must_use]
	pub fn new(collection: CollectionRef, item: impl Into<Value>) -> Self {
		Self { collection, item: item.into() }
	}
}

#[derive(Debug, Clone)]
pub struct Change {
	pub object: Value,
	pub action: Action,
	pub collection: Option<CollectionRef>,
	pub before: Option<Before>,
	pub after: Option<After>,
	pub added_items: Vec<Membership>,
	pub removed_items: Vec<Membership>,
	/// Set if `object` moved into `collection` from this one.
	pub original_collection: Option<CollectionRef>,
}

impl Change {
	#[must_use]
	pub fn new(action: Action, object: impl Into<Value>) -> Self {
		Self {
			object: object.into(),
			action,
			collection: None,
			before: None,
			after: None,
			added_items: Vec::new(),
			removed_items: Vec::new(),
			original_collection: None,
		}
	}

	/// `object` was added to `collection`.
	#[must_use]
	pub fn append(collection: CollectionRef, object: impl Into<Value>) -> Self {
		Self::new(Action::Append, object).in_collection(collection)
	}

	/// Fields of `object` changed.
	#[must_use]
	pub fn update(object: impl Into<Value>) -> Self {
		Self::new(Action::Update, object)
	}

	/// `object` was taken out of `collection`.
	#[must_use]
	pub fn remove(collection: CollectionRef, object: impl Into<Value>) -> Self {
		Self::new(Action::Remove, object).in_collection(collection)
	}

	#[must_use]
	pub fn in_collection(self, collection: CollectionRef) -> Self {
		Self {
			collection: Some(collection),
			..self
		}
	}

	#[must_use]
	pub fn before(self, before: Before) -> Self {
		Self { before: Some(before), ..self }
	}

	#[must_use]
	pub fn after(self, after: After) -> Self {
		Self { after: Some(after), ..self }
	}

	/// Marks a membership change: `object` now lives in [`Change::collection`] instead of `original`.
	#[must_use]
	pub fn moved_from(self, original: CollectionRef) -> Self {
		Self {
			original_collection: Some(original),
			..self
		}
	}

	#[must_use]
	pub fn with_added(mut self, membership: Membership) -> Self {
		self.added_items.push(membership);
		self
	}

	#[must_use]
	pub fn with_removed(mut self, membership: Membership) -> Self {
		self.removed_items.push(membership);
		self
	}
}
