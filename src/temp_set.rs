use core::hash::Hash;
use hashbrown::HashSet;

/// A scratch set whose allocation is reused between operations.
pub struct TempSet<T>(HashSet<T>);
impl<T: Eq + Hash> TempSet<T> {
	pub fn new() -> Self {
		Self(HashSet::new())
	}

	/// Clears the set and lends it out.
	pub fn temp(&mut self) -> &mut HashSet<T> {
		self.0.clear();
		&mut self.0
	}

	/// Retrieves the scratch set's capacity without clearing it first.
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}

impl<T: Eq + Hash> Default for TempSet<T> {
	fn default() -> Self {
		Self::new()
	}
}
