pub mod accumulators;
pub mod definitions;
pub mod render;
pub mod visitor;

pub const ROOT_NAME: &str = "ROOT";

/// Placeholder path for filters inside an $elemMatch that apply to the
/// array element itself rather than to one of its fields.
pub const ELEMENT_SENTINEL: &str = "@<elem>";

/// Group stage field that holds the pushed source documents of each group.
pub const ELEMENTS_FIELD: &str = "_elements";

#[macro_export]
macro_rules! map {
	($($key:expr => $val:expr),* $(,)?) => {
		std::iter::Iterator::collect([
			$({
				($key, $val)
			},)*
		].into_iter())
	};
}
