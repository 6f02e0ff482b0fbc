//! Local mailbox delivery: writes a signed envelope into the sender's
//! `sent/` and, for local recipients, the recipient's `inbox/`.
//!
//! Delivery to a non-local recipient (`to` resolves to a peer host or an
//! external AMP provider) is out of scope for this crate per the Non-goals
//! around the transport adapter; [`deliver`] only ever touches this host's
//! own agent directories.

use std::path::Path;

use aimaestro_amp::{Envelope, LocalMetadata, MessageStatus};
use aimaestro_primitives::{now_ms, Result};
use serde::{Deserialize, Serialize};

/// One stored mailbox entry: the signed envelope plus local-only delivery
/// state, matching the shape persisted under `messages/{inbox,sent,archived}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxEntry {
	#[serde(flatten)]
	pub envelope: Envelope,
	pub local: LocalMetadata,
}

async fn write_entry(agent_dir: &Path, mailbox: &str, entry: &MailboxEntry) -> Result<()> {
	let dir = agent_dir.join("messages").join(mailbox);
	tokio::fs::create_dir_all(&dir).await?;
	let path = dir.join(format!("{}.json", entry.envelope.id));
	tokio::fs::write(path, serde_json::to_vec_pretty(entry)?).await?;
	Ok(())
}

/// Records `envelope` in the sender's `sent/` mailbox, and if `recipient_dir`
/// is given (the recipient is a local agent), in its `inbox/` too.
pub async fn deliver(envelope: &Envelope, sender_dir: &Path, recipient_dir: Option<&Path>) -> Result<()> {
	let sent = MailboxEntry {
		envelope: envelope.clone(),
		local: LocalMetadata { status: MessageStatus::Read, queued_at: now_ms(), delivery_attempts: 1 },
	};
	write_entry(sender_dir, "sent", &sent).await?;

	if let Some(recipient_dir) = recipient_dir {
		let received = MailboxEntry {
			envelope: envelope.clone(),
			local: LocalMetadata { status: MessageStatus::Unread, queued_at: now_ms(), delivery_attempts: 1 },
		};
		write_entry(recipient_dir, "inbox", &received).await?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use aimaestro_amp::{create_message, CreateMessageOpts, Payload};

	fn sample_envelope() -> Envelope {
		create_message(
			"alice@forge.aimaestro.local",
			CreateMessageOpts {
				to: "bob@forge.aimaestro.local".into(),
				subject: "hi".into(),
				priority: aimaestro_amp::Priority::Normal,
				in_reply_to: None,
				expires_at: None,
				payload: Payload { kind: "task".into(), message: "hello".into(), context: serde_json::Map::new() },
			},
		)
	}

	#[tokio::test]
	async fn local_delivery_writes_both_sent_and_inbox() {
		let sender = tempfile::tempdir().unwrap();
		let recipient = tempfile::tempdir().unwrap();
		let envelope = sample_envelope();

		deliver(&envelope, sender.path(), Some(recipient.path())).await.unwrap();

		let sent_path = sender.path().join("messages/sent").join(format!("{}.json", envelope.id));
		let inbox_path = recipient.path().join("messages/inbox").join(format!("{}.json", envelope.id));
		assert!(sent_path.is_file());
		assert!(inbox_path.is_file());
	}

	#[tokio::test]
	async fn remote_recipient_only_writes_sent() {
		let sender = tempfile::tempdir().unwrap();
		let envelope = sample_envelope();

		deliver(&envelope, sender.path(), None).await.unwrap();

		let sent_path = sender.path().join("messages/sent").join(format!("{}.json", envelope.id));
		assert!(sent_path.is_file());
	}
}
