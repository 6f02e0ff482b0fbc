//! Indexing Pipeline: conversation, code-graph, and documentation ingestion,
//! throttled by one global slot allocator.
//!
//! The conversation sub-pipeline lives in `aimaestro-subconscious` (it reads
//! transcript files the Subconscious already discovered); this crate owns
//! the other two. Code and documentation indexing share the same
//! [`index_project`]/[`index_project_delta`] walk, parameterized by
//! [`IndexOptions`]: code passes source extensions, documentation passes
//! `IndexOptions::docs()`.

mod codegraph;
mod slot;

pub use codegraph::{index_project, index_project_delta, IndexOptions, IndexReport};
pub use slot::{IndexingSlot, IndexingSlotAllocator, DEFAULT_MAX_CONCURRENT_INDEX};

impl IndexOptions {
	/// Options for the documentation sub-pipeline: markdown and similar
	/// prose formats instead of source code.
	#[must_use]
	pub fn docs() -> Self {
		Self {
			extensions: ["md", "mdx", "rst", "adoc"].iter().map(|s| (*s).to_string()).collect(),
			..Self::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn docs_options_use_prose_extensions() {
		let opts = IndexOptions::docs();
		assert!(opts.extensions.contains(&"md".to_string()));
		assert!(!opts.extensions.contains(&"rs".to_string()));
	}
}
