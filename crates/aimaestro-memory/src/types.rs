//! `ConsolidationRun`: resumable bookkeeping for one consolidation pass over
//! one conversation.

use aimaestro_primitives::{AgentId, RunId, TimestampMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	Running,
	Completed,
	Failed,
}

/// One row per consolidation attempt against a conversation, keyed by
/// `session_id`. `watermark` is the message timestamp already folded into
/// memories; a resumed run only considers messages newer than it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationRun {
	pub run_id: RunId,
	pub agent_id: AgentId,
	pub session_id: String,
	pub started_at: TimestampMs,
	pub finished_at: Option<TimestampMs>,
	pub status: RunStatus,
	pub memories_created: u32,
	pub memories_reinforced: u32,
	pub error_count: u32,
	pub watermark: TimestampMs,
}

impl ConsolidationRun {
	#[must_use]
	pub fn start(agent_id: AgentId, session_id: String, started_at: TimestampMs, watermark: TimestampMs) -> Self {
		Self {
			run_id: RunId::new(),
			agent_id,
			session_id,
			started_at,
			finished_at: None,
			status: RunStatus::Running,
			memories_created: 0,
			memories_reinforced: 0,
			error_count: 0,
			watermark,
		}
	}
}

/// On-disk shape of `consolidation-runs.json`: one entry per `session_id`,
/// holding only the most recent run for that conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationRunsFile {
	#[serde(default)]
	pub runs: Vec<ConsolidationRun>,
}
