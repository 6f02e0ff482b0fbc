//! Compiles `schema.hql` into a `helix-db` [`Config`] once per process.

use std::sync::LazyLock;

use helix_db::helix_engine::traversal_core::config::{Config, GraphConfig};
use helix_db::helixc::analyzer::analyze;
use helix_db::helixc::analyzer::diagnostic::DiagnosticSeverity;
use helix_db::helixc::parser::types::{Content, HxFile, Source as ParsedSource};
use helix_db::helixc::parser::HelixParser;

const SCHEMA_HQL: &str = include_str!("schema.hql");

/// Helix-db config derived from `schema.hql` at first access.
///
/// Building this is infallible in practice because `schema.hql` is
/// committed, static text; a malformed schema would be a programming error
/// caught the moment any agent database is opened, so this panics rather
/// than threading a parse error through every caller.
pub static SCHEMA_CONFIG: LazyLock<Config> = LazyLock::new(|| {
	let content = Content {
		content: String::new(),
		source: ParsedSource::default(),
		files: vec![HxFile {
			name: "schema.hql".into(),
			content: SCHEMA_HQL.into(),
		}],
	};
	let parsed = HelixParser::parse_source(&content).expect("schema.hql: parse failed");
	let (diags, generated) = analyze(&parsed).expect("schema.hql: analysis failed");

	for d in &diags {
		if matches!(d.severity, DiagnosticSeverity::Error) {
			panic!("schema.hql: {d:?}");
		}
	}

	let _ = generated;

	Config {
		graph_config: Some(GraphConfig {
			secondary_indices: Some(crate::SECONDARY_INDICES.iter().map(|s| (*s).to_string()).collect()),
		}),
		db_max_size_gb: Some(1),
		mcp: Some(false),
		bm25: Some(true),
		..Config::default()
	}
});
