//! Edit-and-regenerate.
//!
//! Editing a message rewrites history: everything after the edit point is
//! invalidated, because it was produced against content that no longer
//! exists. The content mutation, the truncation, the audit entry and the edit
//! record land in one atomic batch. Regeneration is a separate follow-up
//! step; if it fails the edit stands and the failure is reported alongside.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use scriptorium_schema::{
    AuditAction, AuditDetails, AuditLog, ChatMessage, ContextContinuity, GenerationModes,
    MessageEdit,
};
use scriptorium_store::EditBatch;

use crate::context::{thread_tokens, THREAD_WINDOW};
use crate::engine::ScriptEngine;
use crate::longform::ProgressFn;
use crate::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct EditRequest {
    pub project_id: Uuid,
    pub episode_id: Uuid,
    pub message_id: Uuid,
    pub new_content: String,
    pub edit_reason: Option<String>,
    /// Generate a fresh reply to the edited message after truncation.
    pub regenerate_response: bool,
    pub modes: GenerationModes,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub edited_message: ChatMessage,
    /// Present when regeneration was requested and succeeded.
    pub new_response: Option<ChatMessage>,
    pub deleted_message_ids: Vec<Uuid>,
    pub audit_log_id: Uuid,
    /// Size of the context the edit left behind.
    pub continuity: ContextContinuity,
    /// Regeneration failure, if any. The edit itself is never rolled back for
    /// a failed regeneration.
    pub regeneration_error: Option<String>,
}

impl ScriptEngine {
    /// Edit a thread message in place and invalidate everything after it.
    pub async fn edit_message(
        &self,
        actor_id: &str,
        request: EditRequest,
        progress: Option<&ProgressFn>,
    ) -> Result<EditOutcome> {
        let project = self.authorize_project(actor_id, request.project_id).await?;
        let target = self.store.get_message(request.message_id).await?;
        if target.project_id != project.id || target.episode_id != request.episode_id {
            return Err(EngineError::NotFound {
                what: "message",
                id: request.message_id.to_string(),
            });
        }
        if !target.status.is_active() {
            return Err(EngineError::NotFound {
                what: "message",
                id: request.message_id.to_string(),
            });
        }

        // Everything positioned after the target is invalidated, in order.
        let full_thread = self
            .store
            .active_thread(request.episode_id, None, None)
            .await?;
        let deleted_message_ids: Vec<Uuid> = full_thread
            .iter()
            .filter(|m| m.thread_position > target.thread_position)
            .map(|m| m.id)
            .collect();

        // Continuity of what survives the edit: the window up to and
        // including the target, with the new content in place.
        let mut surviving: Vec<ChatMessage> = full_thread
            .into_iter()
            .filter(|m| m.thread_position <= target.thread_position)
            .collect();
        if surviving.len() > THREAD_WINDOW {
            let start = surviving.len() - THREAD_WINDOW;
            surviving = surviving.split_off(start);
        }
        if let Some(last) = surviving.last_mut() {
            last.content = request.new_content.clone();
        }
        let continuity = ContextContinuity {
            message_count: surviving.len(),
            approx_tokens: thread_tokens(&surviving),
        };

        let now = Utc::now();
        let audit = AuditLog {
            id: Uuid::new_v4(),
            action: AuditAction::EditMessage,
            actor_id: actor_id.to_owned(),
            project_id: project.id,
            episode_id: request.episode_id,
            details: AuditDetails {
                message_id: Some(target.id),
                deleted_message_ids: deleted_message_ids.clone(),
                reason: request.edit_reason.clone(),
            },
            created_at: now,
        };
        let audit_log_id = audit.id;
        let edit_record = MessageEdit {
            id: Uuid::new_v4(),
            message_id: target.id,
            episode_id: request.episode_id,
            old_content: target.content.clone(),
            new_content: request.new_content.clone(),
            invalidated_message_ids: deleted_message_ids.clone(),
            continuity: continuity.clone(),
            created_at: now,
        };

        self.store
            .apply_edit(EditBatch {
                message_id: target.id,
                new_content: request.new_content.clone(),
                edited_at: now,
                invalidate: deleted_message_ids.clone(),
                audit,
                edit_record,
            })
            .await?;
        info!(
            message = %target.id,
            invalidated = deleted_message_ids.len(),
            "edit applied"
        );

        let edited_message = self.store.get_message(target.id).await?;

        let (new_response, regeneration_error) = if request.regenerate_response {
            match self
                .regenerate(actor_id, &request, &target, progress)
                .await
            {
                Ok(response) => (Some(response), None),
                Err(err) => {
                    warn!(message = %target.id, error = %err, "regeneration failed, edit stands");
                    (None, Some(err.to_string()))
                }
            }
        } else {
            (None, None)
        };

        Ok(EditOutcome {
            edited_message,
            new_response,
            deleted_message_ids,
            audit_log_id,
            continuity,
            regeneration_error,
        })
    }

    async fn regenerate(
        &self,
        actor_id: &str,
        request: &EditRequest,
        target: &ChatMessage,
        progress: Option<&ProgressFn>,
    ) -> Result<ChatMessage> {
        let ctx = self
            .assembler
            .assemble(
                actor_id,
                request.project_id,
                request.episode_id,
                Some(target.thread_position),
                request.modes,
            )
            .await?;
        let intent = self.classifier.classify(&request.new_content);
        let response = self
            .generate_response(&ctx, &request.new_content, intent, Some(target.id), progress)
            .await?;

        self.store
            .insert_audit_log(AuditLog {
                id: Uuid::new_v4(),
                action: AuditAction::RegenerateResponse,
                actor_id: actor_id.to_owned(),
                project_id: request.project_id,
                episode_id: request.episode_id,
                details: AuditDetails {
                    message_id: Some(response.id),
                    deleted_message_ids: Vec::new(),
                    reason: None,
                },
                created_at: Utc::now(),
            })
            .await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use scriptorium_provider::{ProviderError, StubProvider, TextProvider};
    use scriptorium_schema::{Episode, MessageRole, MessageStatus, Project};
    use scriptorium_store::{NewEpisode, NewProject};

    use crate::engine::SendRequest;

    async fn engine_with_thread() -> (ScriptEngine, Arc<StubProvider>, Project, Episode, Vec<ChatMessage>) {
        let store = scriptorium_store::Store::open_in_memory().unwrap();
        let stub = Arc::new(StubProvider::new());
        let engine = ScriptEngine::new(store, stub.clone() as Arc<dyn TextProvider>);
        let project = engine
            .create_project(NewProject {
                user_id: "user-1".into(),
                title: "Senja di Jakarta".into(),
                genre: Some("drama".into()),
                synopsis: None,
                tone: None,
                total_episodes: 12,
            })
            .await
            .unwrap();
        let episode = engine
            .create_episode(
                "user-1",
                NewEpisode {
                    project_id: project.id,
                    episode_number: 1,
                    title: "Pilot".into(),
                    synopsis: Some("Maya returns.".into()),
                    setting: None,
                    min_pages: 40,
                },
            )
            .await
            .unwrap();

        // Three exchanges: positions 0..5.
        let mut messages = Vec::new();
        for i in 0..3 {
            stub.push_text(format!("Balasan {i}."));
            let outcome = engine
                .send_message(
                    "user-1",
                    SendRequest {
                        project_id: project.id,
                        episode_id: episode.id,
                        content: format!("Pertanyaan {i}?"),
                        modes: GenerationModes::default(),
                    },
                    None,
                )
                .await
                .unwrap();
            messages.push(outcome.user_message);
            messages.push(outcome.response);
        }
        (engine, stub, project, episode, messages)
    }

    #[tokio::test]
    async fn edit_truncates_audits_and_regenerates() {
        let (engine, stub, project, episode, messages) = engine_with_thread().await;
        stub.push_text("Balasan baru untuk pertanyaan yang diubah.");

        // Edit the second user message (position 2); positions 3..5 must go.
        let target = &messages[2];
        let outcome = engine
            .edit_message(
                "user-1",
                EditRequest {
                    project_id: project.id,
                    episode_id: episode.id,
                    message_id: target.id,
                    new_content: "Pertanyaan 1, tapi berbeda?".into(),
                    edit_reason: Some("arah cerita berubah".into()),
                    regenerate_response: true,
                    modes: GenerationModes::default(),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.edited_message.content, "Pertanyaan 1, tapi berbeda?");
        assert!(outcome.edited_message.is_edited);
        assert_eq!(outcome.deleted_message_ids.len(), 3);
        assert!(outcome.regeneration_error.is_none());

        let response = outcome.new_response.expect("regenerated reply");
        assert_eq!(response.role, MessageRole::Assistant);
        assert_eq!(response.parent_message_id, Some(target.id));
        // Next active position after the edit point.
        assert_eq!(response.thread_position, 3);

        // Thread is now: q0, r0, edited q1, new reply.
        let thread = engine.thread("user-1", episode.id).await.unwrap();
        assert_eq!(thread.len(), 4);
        assert_eq!(thread[2].id, target.id);
        assert_eq!(thread[3].id, response.id);

        // The regeneration prompt saw the edited content, not the old one.
        let calls = stub.calls();
        let last_prompt = &calls.last().unwrap().prompt;
        assert!(last_prompt.contains("Pertanyaan 1, tapi berbeda?"));
        assert!(!last_prompt.contains("Balasan 2."));

        // Both the edit and the regeneration are audited.
        let logs = engine.audit_logs("user-1", episode.id).await.unwrap();
        let actions: Vec<AuditAction> = logs.iter().map(|l| l.action).collect();
        assert!(actions.contains(&AuditAction::EditMessage));
        assert!(actions.contains(&AuditAction::RegenerateResponse));
        let edit_log = logs
            .iter()
            .find(|l| l.action == AuditAction::EditMessage)
            .unwrap();
        assert_eq!(edit_log.id, outcome.audit_log_id);
        assert_eq!(edit_log.details.deleted_message_ids, outcome.deleted_message_ids);
        assert_eq!(edit_log.details.reason.as_deref(), Some("arah cerita berubah"));

        // Edit history is queryable.
        let edits = engine.message_edits("user-1", target.id).await.unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].old_content, "Pertanyaan 1?");
        assert_eq!(edits[0].continuity, outcome.continuity);
    }

    #[tokio::test]
    async fn edit_without_regeneration_only_truncates() {
        let (engine, stub, project, episode, messages) = engine_with_thread().await;
        let calls_before = stub.calls().len();

        let target = &messages[0];
        let outcome = engine
            .edit_message(
                "user-1",
                EditRequest {
                    project_id: project.id,
                    episode_id: episode.id,
                    message_id: target.id,
                    new_content: "Pertanyaan 0 diubah?".into(),
                    edit_reason: None,
                    regenerate_response: false,
                    modes: GenerationModes::default(),
                },
                None,
            )
            .await
            .unwrap();

        assert!(outcome.new_response.is_none());
        assert_eq!(outcome.deleted_message_ids.len(), 5);
        assert_eq!(outcome.continuity.message_count, 1);
        assert_eq!(stub.calls().len(), calls_before, "no generation call made");

        let thread = engine.thread("user-1", episode.id).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].content, "Pertanyaan 0 diubah?");
    }

    #[tokio::test]
    async fn failed_regeneration_keeps_the_edit() {
        let (engine, stub, project, episode, messages) = engine_with_thread().await;
        stub.push_error(ProviderError::Api {
            status: 500,
            message: "boom".into(),
            retryable: true,
        });

        let target = &messages[2];
        let outcome = engine
            .edit_message(
                "user-1",
                EditRequest {
                    project_id: project.id,
                    episode_id: episode.id,
                    message_id: target.id,
                    new_content: "Diubah.".into(),
                    edit_reason: None,
                    regenerate_response: true,
                    modes: GenerationModes::default(),
                },
                None,
            )
            .await
            .unwrap();

        assert!(outcome.new_response.is_none());
        let error = outcome.regeneration_error.expect("failure reported");
        assert!(error.contains("boom"));

        // Edit and truncation stand.
        let thread = engine.thread("user-1", episode.id).await.unwrap();
        assert_eq!(thread.len(), 3);
        assert_eq!(thread[2].content, "Diubah.");
        for id in &outcome.deleted_message_ids {
            let msg = engine.store().get_message(*id).await.unwrap();
            assert!(matches!(msg.status, MessageStatus::Deleted { .. }));
        }
    }

    #[tokio::test]
    async fn editing_a_deleted_message_is_not_found() {
        let (engine, _stub, project, episode, messages) = engine_with_thread().await;
        let target = &messages[4];
        engine.store().soft_delete_message(target.id).await.unwrap();

        let err = engine
            .edit_message(
                "user-1",
                EditRequest {
                    project_id: project.id,
                    episode_id: episode.id,
                    message_id: target.id,
                    new_content: "x".into(),
                    edit_reason: None,
                    regenerate_response: false,
                    modes: GenerationModes::default(),
                },
                None,
            )
            .await
            .expect_err("deleted target");
        assert!(matches!(err, EngineError::NotFound { what: "message", .. }));
    }

    #[tokio::test]
    async fn editing_across_episodes_is_not_found() {
        let (engine, _stub, project, _episode, messages) = engine_with_thread().await;
        let other = engine
            .create_episode(
                "user-1",
                NewEpisode {
                    project_id: project.id,
                    episode_number: 2,
                    title: "Second".into(),
                    synopsis: None,
                    setting: None,
                    min_pages: 40,
                },
            )
            .await
            .unwrap();

        let err = engine
            .edit_message(
                "user-1",
                EditRequest {
                    project_id: project.id,
                    episode_id: other.id,
                    message_id: messages[0].id,
                    new_content: "x".into(),
                    edit_reason: None,
                    regenerate_response: false,
                    modes: GenerationModes::default(),
                },
                None,
            )
            .await
            .expect_err("message belongs to another episode");
        assert!(matches!(err, EngineError::NotFound { what: "message", .. }));
    }

    #[tokio::test]
    async fn edit_by_non_owner_is_rejected() {
        let (engine, _stub, project, episode, messages) = engine_with_thread().await;
        let err = engine
            .edit_message(
                "intruder",
                EditRequest {
                    project_id: project.id,
                    episode_id: episode.id,
                    message_id: messages[0].id,
                    new_content: "x".into(),
                    edit_reason: None,
                    regenerate_response: false,
                    modes: GenerationModes::default(),
                },
                None,
            )
            .await
            .expect_err("must be rejected");
        assert!(matches!(err, EngineError::Unauthorized { .. }));
    }
}
