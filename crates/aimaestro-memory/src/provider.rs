//! `LLMProvider`: the narrow interface the consolidator extracts memories
//! through. Concrete backends (which model, which endpoint) are out of
//! scope; what's fixed here is the request/response shape and the
//! local-first-then-remote fallback policy.

use std::time::Duration;

use aimaestro_primitives::{AimaestroError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One candidate memory surfaced by extraction, before dedup/confidence
/// filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCandidate {
	pub category: String,
	pub content: String,
	pub context: String,
	pub confidence: f32,
}

/// Result of one `extract_memories` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionOutcome {
	#[serde(default)]
	pub memories: Vec<MemoryCandidate>,
	#[serde(default)]
	pub conversation_summary: Option<String>,
}

/// Tunables passed to `extract_memories`.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
	pub max_memories: usize,
	pub min_confidence: f32,
	pub categories: Vec<String>,
}

impl Default for ExtractionOptions {
	fn default() -> Self {
		Self {
			max_memories: 10,
			min_confidence: 0.5,
			categories: ["fact", "decision", "preference", "pattern", "insight"].iter().map(|s| (*s).to_string()).collect(),
		}
	}
}

/// The deadline the component design assigns to LLM extraction calls.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Narrow interface over whatever extracts structured memories from
/// conversation text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
	async fn extract_memories(&self, text: &str, opts: &ExtractionOptions) -> Result<ExtractionOutcome>;

	/// Optionally proposes relationships between a new memory and its
	/// nearest neighbors. Default: no relationships (not every provider
	/// supports this).
	async fn propose_relationships(&self, _new_content: &str, _neighbor_contents: &[String]) -> Result<Vec<RelationshipCandidate>> {
		Ok(Vec::new())
	}
}

/// A proposed edge between two memories; only inserted by the caller if
/// `confidence > 0.6`.
#[derive(Debug, Clone)]
pub struct RelationshipCandidate {
	pub neighbor_index: usize,
	pub relationship: String,
	pub confidence: f64,
}

/// A JSON-mode HTTP endpoint, used for both the local and remote providers;
/// they differ only in base URL and optional bearer token.
pub struct HttpJsonProvider {
	client: reqwest::Client,
	endpoint: String,
	bearer: Option<String>,
}

impl HttpJsonProvider {
	#[must_use]
	pub fn new(endpoint: impl Into<String>, bearer: Option<String>) -> Self {
		Self {
			client: reqwest::Client::builder().timeout(EXTRACTION_TIMEOUT).build().unwrap_or_default(),
			endpoint: endpoint.into(),
			bearer,
		}
	}
}

#[async_trait]
impl LlmProvider for HttpJsonProvider {
	async fn extract_memories(&self, text: &str, opts: &ExtractionOptions) -> Result<ExtractionOutcome> {
		let mut req = self.client.post(&self.endpoint).json(&serde_json::json!({
			"text": text,
			"max_memories": opts.max_memories,
			"min_confidence": opts.min_confidence,
			"categories": opts.categories,
		}));
		if let Some(token) = &self.bearer {
			req = req.bearer_auth(token);
		}

		let response = req.send().await.map_err(|e| AimaestroError::TransientRemote(e.to_string()))?;
		if !response.status().is_success() {
			return Err(AimaestroError::TransientRemote(format!("extraction endpoint returned {}", response.status())));
		}
		response.json().await.map_err(|e| AimaestroError::TransientRemote(e.to_string()))
	}
}

/// Tries the local provider first; falls back to remote on any transient
/// failure (unreachable endpoint, non-2xx, malformed body).
pub struct AutoProvider {
	local: Box<dyn LlmProvider>,
	remote: Box<dyn LlmProvider>,
}

impl AutoProvider {
	#[must_use]
	pub fn new(local: Box<dyn LlmProvider>, remote: Box<dyn LlmProvider>) -> Self {
		Self { local, remote }
	}
}

#[async_trait]
impl LlmProvider for AutoProvider {
	async fn extract_memories(&self, text: &str, opts: &ExtractionOptions) -> Result<ExtractionOutcome> {
		match self.local.extract_memories(text, opts).await {
			Ok(outcome) => Ok(outcome),
			Err(e) => {
				tracing::warn!(error = %e, "local provider unavailable; falling back to remote");
				self.remote.extract_memories(text, opts).await
			}
		}
	}

	async fn propose_relationships(&self, new_content: &str, neighbor_contents: &[String]) -> Result<Vec<RelationshipCandidate>> {
		self.local.propose_relationships(new_content, neighbor_contents).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FixedProvider(ExtractionOutcome);

	#[async_trait]
	impl LlmProvider for FixedProvider {
		async fn extract_memories(&self, _text: &str, _opts: &ExtractionOptions) -> Result<ExtractionOutcome> {
			Ok(self.0.clone())
		}
	}

	struct FailingProvider;

	#[async_trait]
	impl LlmProvider for FailingProvider {
		async fn extract_memories(&self, _text: &str, _opts: &ExtractionOptions) -> Result<ExtractionOutcome> {
			Err(AimaestroError::TransientRemote("local endpoint down".into()))
		}
	}

	#[tokio::test]
	async fn auto_provider_falls_back_to_remote_on_local_failure() {
		let remote_outcome = ExtractionOutcome {
			memories: vec![MemoryCandidate {
				category: "fact".into(),
				content: "prefers dark mode".into(),
				context: "settings chat".into(),
				confidence: 0.9,
			}],
			conversation_summary: None,
		};
		let auto = AutoProvider::new(Box::new(FailingProvider), Box::new(FixedProvider(remote_outcome.clone())));

		let outcome = auto.extract_memories("hi", &ExtractionOptions::default()).await.unwrap();
		assert_eq!(outcome.memories.len(), 1);
		assert_eq!(outcome.memories[0].content, remote_outcome.memories[0].content);
	}
}
