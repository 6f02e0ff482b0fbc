//! `EmbeddingProvider`: the narrow interface used to embed memory content
//! for the dedup nearest-neighbor search. Concrete embedding backends are
//! out of scope; [`HashEmbedder`] is a deterministic stand-in suitable for
//! wiring the pipeline together and for tests, not for production recall
//! quality.

use aimaestro_primitives::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
	async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

/// Deterministic, dependency-free embedding: hashes fixed-size shingles of
/// the input into a fixed-length float vector. Stable for dedup testing
/// (same content always embeds identically) without depending on a real
/// model.
pub struct HashEmbedder {
	dims: usize,
}

impl HashEmbedder {
	#[must_use]
	pub fn new(dims: usize) -> Self {
		Self { dims: dims.max(1) }
	}
}

impl Default for HashEmbedder {
	fn default() -> Self {
		Self::new(32)
	}
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f64>> {
		let mut out = vec![0.0_f64; self.dims];
		for (i, word) in text.split_whitespace().enumerate() {
			let digest = Sha256::digest(word.as_bytes());
			let bucket = (digest[0] as usize + i) % self.dims;
			out[bucket] += 1.0;
		}
		let norm = out.iter().map(|v| v * v).sum::<f64>().sqrt();
		if norm > 0.0 {
			for v in &mut out {
				*v /= norm;
			}
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn identical_content_embeds_identically() {
		let embedder = HashEmbedder::default();
		let a = embedder.embed("prefers dark mode in the editor").await.unwrap();
		let b = embedder.embed("prefers dark mode in the editor").await.unwrap();
		assert_eq!(a, b);
	}

	#[tokio::test]
	async fn different_content_usually_differs() {
		let embedder = HashEmbedder::default();
		let a = embedder.embed("prefers dark mode").await.unwrap();
		let b = embedder.embed("hates bright screens at night").await.unwrap();
		assert_ne!(a, b);
	}
}
