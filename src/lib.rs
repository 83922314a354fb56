//! Renders declarative views against an observable data graph and keeps the resulting node tree in sync as the data
//! changes, without rebuilding unaffected parts.
//!
//! See [`Binder`] for the entry point.

#![doc(html_root_url = "https://docs.rs/realtime-templates/0.0.1")]
#![warn(clippy::pedantic)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod binder;
pub mod change;
pub mod context;
pub mod data;
pub mod datasource;
pub mod dom;
pub mod error;
pub mod filter;
pub mod html;
pub mod index;
pub mod load;
pub mod materialize;
pub mod ordinal;
pub mod reconcile;
pub mod render;
pub mod template;
mod temp_set;
pub mod vdom;
pub mod walk;

pub use binder::{Binder, BinderEvent, BinderOptions, Removal};
pub use change::{After, Before, Change, Membership};
pub use data::{CollectionRef, ObjectRef, Value};
pub use datasource::{Datasource, PathDatasource};
pub use dom::{Document, NodeId};
pub use error::{Error, QueryError, Result, TemplateError};
pub use template::{View, ViewSet};
