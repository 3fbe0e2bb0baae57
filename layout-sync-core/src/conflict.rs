//! Conflict detection and the user-facing resolution protocol.
//!
//! Detection is a pure function of the local record and the remote copy.
//! Resolution is delegated to a [`ConflictPrompter`] supplied by the host
//! (a terminal, a UI dialog, a test). [`ConflictResolver`] guarantees that
//! only one prompt is pending at a time; further conflicts wait their turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::models::{Layout, LayoutId, LayoutPermission, RemoteLayout};

/// How a local layout relates to its remote copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    /// Nothing to do.
    InSync,
    /// Remote is newer and there are no local edits.
    PullRemote,
    /// Local edits over an up-to-date baseline.
    PushLocal,
    /// Local edits and a newer remote version.
    Conflict,
}

/// Compares a local layout against the remote copy with the same id.
pub fn detect(local: &Layout, remote: &RemoteLayout) -> Divergence {
    let remote_is_newer = remote.saved_at > local.baseline.saved_at;
    match (local.has_local_changes(), remote_is_newer) {
        (false, false) => Divergence::InSync,
        (false, true) => Divergence::PullRemote,
        (true, false) => Divergence::PushLocal,
        (true, true) => Divergence::Conflict,
    }
}

/// A choice offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictOption {
    Discard,
    Overwrite,
    Fork,
    Cancel,
}

/// The user's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Drop local edits and adopt the remote version.
    Discard,
    /// Push local edits over the remote version.
    Overwrite,
    /// Keep both: copy local edits into a new personal layout.
    Fork { name: String },
    /// Leave everything as is; retried on the next pass.
    Cancel,
}

impl Resolution {
    fn option(&self) -> ConflictOption {
        match self {
            Resolution::Discard => ConflictOption::Discard,
            Resolution::Overwrite => ConflictOption::Overwrite,
            Resolution::Fork { .. } => ConflictOption::Fork,
            Resolution::Cancel => ConflictOption::Cancel,
        }
    }
}

/// Everything a host needs to render a conflict prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictPrompt {
    pub layout_id: LayoutId,
    pub layout_name: String,
    pub title: String,
    pub local_saved_at: DateTime<Utc>,
    pub remote_saved_at: DateTime<Utc>,
    pub options: Vec<ConflictOption>,
    pub suggested_fork_name: String,
}

/// Computes the options available for a conflict.
///
/// Overwriting needs write access to the remote copy, which read-only shared
/// layouts do not grant.
pub fn required_options(remote: &RemoteLayout) -> Vec<ConflictOption> {
    let mut options = vec![ConflictOption::Discard];
    if remote.permission != LayoutPermission::OrgRead {
        options.push(ConflictOption::Overwrite);
    }
    options.push(ConflictOption::Fork);
    options.push(ConflictOption::Cancel);
    options
}

/// Builds the prompt for a conflicting layout.
pub fn build_prompt(local: &Layout, remote: &RemoteLayout) -> ConflictPrompt {
    ConflictPrompt {
        layout_id: local.id.clone(),
        layout_name: local.name.clone(),
        title: format!("\"{}\" was changed on another device", local.name),
        local_saved_at: local.current().saved_at,
        remote_saved_at: remote.saved_at,
        options: required_options(remote),
        suggested_fork_name: format!("{} (copy)", local.name),
    }
}

/// Host-side implementation of the conflict prompt.
#[async_trait]
pub trait ConflictPrompter: Send + Sync {
    async fn prompt(&self, prompt: ConflictPrompt) -> Resolution;
}

/// A prompt waiting for an answer from the host.
#[derive(Debug)]
pub struct PromptRequest {
    pub prompt: ConflictPrompt,
    respond: oneshot::Sender<Resolution>,
}

impl PromptRequest {
    /// Answers the prompt.
    pub fn resolve(self, resolution: Resolution) {
        let _ = self.respond.send(resolution);
    }
}

/// Prompter that forwards prompts over a channel and waits for the answer.
///
/// If the host drops the receiver or the request without answering, the
/// conflict resolves as [`Resolution::Cancel`].
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    sender: mpsc::Sender<PromptRequest>,
}

impl ChannelPrompter {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PromptRequest>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ConflictPrompter for ChannelPrompter {
    async fn prompt(&self, prompt: ConflictPrompt) -> Resolution {
        let (respond, answer) = oneshot::channel();
        if self.sender.send(PromptRequest { prompt, respond }).await.is_err() {
            return Resolution::Cancel;
        }
        answer.await.unwrap_or(Resolution::Cancel)
    }
}

/// Per-layout state of the resolution protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictState {
    Idle,
    Prompting,
    Resolved(Resolution),
}

/// Routes conflicts to the prompter one at a time.
pub struct ConflictResolver {
    prompter: Arc<dyn ConflictPrompter>,
    turn: tokio::sync::Mutex<()>,
    states: Mutex<HashMap<LayoutId, ConflictState>>,
}

impl ConflictResolver {
    pub fn new(prompter: Arc<dyn ConflictPrompter>) -> Self {
        Self {
            prompter,
            turn: tokio::sync::Mutex::new(()),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, id: &LayoutId) -> ConflictState {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(id).cloned())
            .unwrap_or(ConflictState::Idle)
    }

    fn set_state(&self, id: &LayoutId, state: ConflictState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(id.clone(), state);
        }
    }

    /// Asks the user how to resolve a conflict and waits for the answer.
    ///
    /// Answers that are not among the offered options resolve as
    /// [`Resolution::Cancel`]; a fork without a name gets the suggested one.
    pub async fn resolve(&self, local: &Layout, remote: &RemoteLayout) -> Resolution {
        let _turn = self.turn.lock().await;

        let prompt = build_prompt(local, remote);
        let options = prompt.options.clone();
        let suggested_name = prompt.suggested_fork_name.clone();

        self.set_state(&local.id, ConflictState::Prompting);
        tracing::debug!(id = %local.id, "Prompting for conflict resolution");

        let resolution = match self.prompter.prompt(prompt).await {
            resolution if !options.contains(&resolution.option()) => {
                tracing::warn!(id = %local.id, ?resolution, "Ignoring resolution that was not offered");
                Resolution::Cancel
            }
            Resolution::Fork { name } if name.trim().is_empty() => Resolution::Fork {
                name: suggested_name,
            },
            resolution => resolution,
        };

        self.set_state(&local.id, ConflictState::Resolved(resolution.clone()));
        resolution
    }
}
