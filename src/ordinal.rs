//! Positional and template identity of rendered nodes.
//!
//! Every node rendered from a template element carries an [`Ordinal`]: its sibling index, with one extra
//! segment for each transparent `t:placeholder` boundary it was spliced through.
//! The reconciler uses these as the sole key to decide whether a live node is "the same" node as a freshly
//! rendered one, so comparison is numeric per segment and never lexicographic on text (`10` sorts after `9`).

use core::{
	cmp::Ordering,
	fmt::{self, Display, Formatter},
	num::ParseIntError,
	str::FromStr,
};
use std::rc::Rc;

/// A dash-joined sequence of sibling indices, like `3` or `1-0`.
///
/// # Ordering
///
/// Segment-wise numeric. If one ordinal is a prefix of the other, the shorter (less specific) one sorts after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Ordinal(Vec<u32>);

impl Ordinal {
	#[must_use]
	pub fn new(index: u32) -> Self {
		Self(vec![index])
	}

	#[must_use]
	pub fn segments(&self) -> &[u32] {
		&self.0
	}

	/// Prefixes `self` with `outer`, as happens when a transparent placeholder element splices its children into its parent.
	#[must_use]
	pub fn nested_in(&self, outer: &Ordinal) -> Self {
		let mut segments = Vec::with_capacity(outer.0.len() + self.0.len());
		segments.extend_from_slice(&outer.0);
		segments.extend_from_slice(&self.0);
		Self(segments)
	}
}

impl From<u32> for Ordinal {
	fn from(index: u32) -> Self {
		Self::new(index)
	}
}

impl From<Vec<u32>> for Ordinal {
	fn from(segments: Vec<u32>) -> Self {
		Self(segments)
	}
}

impl Ord for Ordinal {
	fn cmp(&self, other: &Self) -> Ordering {
		for (a, b) in self.0.iter().zip(other.0.iter()) {
			match a.cmp(b) {
				Ordering::Equal => (),
				unequal => return unequal,
			}
		}
		other.0.len().cmp(&self.0.len())
	}
}

impl PartialOrd for Ordinal {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Display for Ordinal {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str("-")?;
			}
			write!(f, "{}", segment)?;
		}
		Ok(())
	}
}

impl FromStr for Ordinal {
	type Err = ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.split('-').map(str::parse).collect::<Result<_, _>>().map(Self)
	}
}

/// Names a template within a view set: `view` is empty for the main view, `template` is empty for a view's root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateRef {
	pub view: Rc<str>,
	pub template: Rc<str>,
}

impl TemplateRef {
	#[must_use]
	pub fn new(view: impl Into<Rc<str>>, template: impl Into<Rc<str>>) -> Self {
		Self {
			view: view.into(),
			template: template.into(),
		}
	}

	/// The root template of `view`.
	#[must_use]
	pub fn root(view: impl Into<Rc<str>>) -> Self {
		Self::new(view, "")
	}

	#[must_use]
	pub fn is_root(&self) -> bool {
		self.template.is_empty()
	}
}

impl Display for TemplateRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.view, self.template)
	}
}

/// Identifies one instantiation of a repeated template: `view:template:index`.
///
/// Only the [`TemplateRef`] part takes part in matching; the index is informative and renumbers freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId {
	pub template: TemplateRef,
	pub index: usize,
}

impl InstanceId {
	#[must_use]
	pub fn new(template: TemplateRef, index: usize) -> Self {
		Self { template, index }
	}
}

impl Display for InstanceId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.template, self.index)
	}
}
