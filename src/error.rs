use crate::{change::Action, dom::NodeId};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors raised while evaluating a binding expression.
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
	#[error("invalid query {query:?}: {reason}")]
	Syntax { query: String, reason: &'static str },

	#[error("unknown name {name:?} in query {query:?}")]
	UnknownName { query: String, name: String },

	/// For [`Datasource`](`crate::datasource::Datasource`) implementations with their own failure modes.
	#[error("query {query:?} failed: {message}")]
	Failed { query: String, message: String },
}

/// Errors raised while loading views. These are programmer errors and surface before anything is rendered.
#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
	#[error("a repeated template in view {view:?} has no id")]
	MissingId { view: String },

	#[error("template {template:?} in view {view:?} has no query")]
	MissingQuery { view: String, template: String },

	#[error("template id {template:?} is used more than once in view {view:?}")]
	DuplicateId { view: String, template: String },

	#[error("a placeholder in view {view:?} names no template")]
	EmptyPlaceholder { view: String },

	#[error("failed to parse view {view:?}: {source}")]
	Json {
		view: String,
		#[source]
		source: serde_json::Error,
	},
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Template(#[from] TemplateError),

	#[error(transparent)]
	Query(#[from] QueryError),

	#[error("{action} change without a collection")]
	MissingCollection { action: Action },

	#[error("mount root {0:?} is not part of the document")]
	InvalidRoot(NodeId),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_is_stable() {
		let error = Error::from(QueryError::Syntax { query: ".a..b".to_owned(), reason: "empty path segment" });
		assert_eq!(error.to_string(), "invalid query \".a..b\": empty path segment");
		let error = Error::MissingCollection { action: Action::Append };
		assert_eq!(error.to_string(), "append change without a collection");
		let error = Error::from(TemplateError::MissingQuery { view: "main".to_owned(), template: "1".to_owned() });
		assert!(error.to_string().contains("has no query"));
	}
}
