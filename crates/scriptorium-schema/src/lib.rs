use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Series-level container owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    pub total_episodes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One episode of a project. `episode_number` is unique within the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub project_id: Uuid,
    pub episode_number: u32,
    pub title: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub setting: Option<String>,
    /// Generated/aggregated script text. None until first generation.
    #[serde(default)]
    pub script: Option<String>,
    pub min_pages: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Visibility state of a message. Deleted messages are retained for audit and
/// never removed from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MessageStatus {
    Active,
    Deleted { at: DateTime<Utc> },
    Muted,
}

impl MessageStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, MessageStatus::Active)
    }
}

/// Per-message generation flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(default)]
    pub script_generated: bool,
    #[serde(default)]
    pub style_dna_used: bool,
    #[serde(default)]
    pub knowledge_graph_used: bool,
    #[serde(default)]
    pub confidence_score: Option<f32>,
}

/// An ordered entry in an episode's conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub project_id: Uuid,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Monotonic integer defining total order within the episode thread.
    pub thread_position: i64,
    pub status: MessageStatus,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    /// Self-reference for edited messages: edits mutate the same document id.
    #[serde(default)]
    pub original_message_id: Option<Uuid>,
    /// Links an assistant response to the user message that triggered it.
    #[serde(default)]
    pub parent_message_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: MessageMetadata,
    pub created_at: DateTime<Utc>,
}

/// Continuity snapshot captured when a thread is mutated: how much context the
/// surviving thread still holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextContinuity {
    pub message_count: usize,
    pub approx_tokens: usize,
}

/// Append-only record of a single edit operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEdit {
    pub id: Uuid,
    pub message_id: Uuid,
    pub episode_id: Uuid,
    pub old_content: String,
    pub new_content: String,
    /// Ids soft-deleted by this edit, in thread order.
    pub invalidated_message_ids: Vec<Uuid>,
    pub continuity: ContextContinuity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    EditMessage,
    DeleteResponses,
    RegenerateResponse,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EditMessage => "edit_message",
            AuditAction::DeleteResponses => "delete_responses",
            AuditAction::RegenerateResponse => "regenerate_response",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditDetails {
    #[serde(default)]
    pub message_id: Option<Uuid>,
    #[serde(default)]
    pub deleted_message_ids: Vec<Uuid>,
    /// Writer-supplied reason for an edit, when one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Append-only log entry: the durable record of what happened to a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor_id: String,
    pub project_id: Uuid,
    pub episode_id: Uuid,
    pub details: AuditDetails,
    pub created_at: DateTime<Utc>,
}

/// Style fingerprint extracted from a reference script. Read-only after
/// creation except for deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleDna {
    pub id: Uuid,
    pub user_id: String,
    pub project_id: Uuid,
    pub script_id: Uuid,
    #[serde(default)]
    pub voice: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub narrative: Vec<String>,
    #[serde(default)]
    pub dialog: Vec<String>,
    /// 0-100.
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphRelationship {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    pub event: String,
    pub order: u32,
}

/// Entities/relationships/timeline extracted from a reference script, used to
/// keep later episodes consistent with established characters and lore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub id: Uuid,
    pub user_id: String,
    pub project_id: Uuid,
    pub script_id: Uuid,
    #[serde(default)]
    pub entities: Vec<GraphEntity>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationship>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default)]
    pub themes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Which derived artifacts a generation run is allowed to fetch and use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationModes {
    #[serde(default)]
    pub style_dna: bool,
    #[serde(default)]
    pub knowledge_graph: bool,
}

impl Default for GenerationModes {
    fn default() -> Self {
        Self {
            style_dna: true,
            knowledge_graph: true,
        }
    }
}

/// Snapshot of an episode script kept for history. Scripts are never versioned
/// in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptVersion {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
