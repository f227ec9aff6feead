//! The co-writing engine: message handling, generation dispatch, and the
//! authorized CRUD surface the server exposes.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use scriptorium_provider::{GenerationRequest, TextProvider};
use scriptorium_schema::{
    AuditLog, ChatMessage, Episode, GenerationModes, MessageEdit, MessageMetadata, MessageRole,
    Project, ScriptVersion,
};
use scriptorium_store::{EpisodePatch, NewEpisode, NewMessage, NewProject, ProjectPatch, Store};

use crate::context::{ContextAssembler, GenerationContext};
use crate::intent::{Intent, IntentClassifier};
use crate::longform::{LongFormGenerator, ProgressFn, DEFAULT_TARGET_PAGES};
use crate::prompts;
use crate::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub project_id: Uuid,
    pub episode_id: Uuid,
    pub content: String,
    pub modes: GenerationModes,
}

/// Result of handling one incoming writer message.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub user_message: ChatMessage,
    pub response: ChatMessage,
    pub intent: Intent,
}

pub struct ScriptEngine {
    pub(crate) store: Store,
    pub(crate) provider: Arc<dyn TextProvider>,
    pub(crate) assembler: ContextAssembler,
    pub(crate) classifier: IntentClassifier,
    pub(crate) longform: LongFormGenerator,
}

impl ScriptEngine {
    pub fn new(store: Store, provider: Arc<dyn TextProvider>) -> Self {
        Self {
            assembler: ContextAssembler::new(store.clone()),
            classifier: IntentClassifier::new(),
            longform: LongFormGenerator::new(Arc::clone(&provider)),
            store,
            provider,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) async fn authorize_project(
        &self,
        actor_id: &str,
        project_id: Uuid,
    ) -> Result<Project> {
        let project = self.store.get_project(project_id).await?;
        if project.user_id != actor_id {
            return Err(EngineError::unauthorized(actor_id, project_id));
        }
        Ok(project)
    }

    /// Handle one incoming writer message: persist it, assemble context,
    /// dispatch on intent and persist the reply.
    pub async fn send_message(
        &self,
        actor_id: &str,
        request: SendRequest,
        progress: Option<&ProgressFn>,
    ) -> Result<SendOutcome> {
        let project = self.authorize_project(actor_id, request.project_id).await?;
        let episode = self.store.get_episode(request.episode_id).await?;
        if episode.project_id != project.id {
            return Err(EngineError::NotFound {
                what: "episode",
                id: episode.id.to_string(),
            });
        }

        let user_message = self
            .store
            .append_message(NewMessage {
                episode_id: episode.id,
                project_id: project.id,
                user_id: project.user_id.clone(),
                role: MessageRole::User,
                content: request.content.clone(),
                parent_message_id: None,
                metadata: MessageMetadata::default(),
            })
            .await?;

        let ctx = self
            .assembler
            .assemble(actor_id, project.id, episode.id, None, request.modes)
            .await?;
        let intent = self.classifier.classify(&request.content);
        info!(episode = %episode.id, ?intent, "handling writer message");

        let response = self
            .generate_response(&ctx, &request.content, intent, Some(user_message.id), progress)
            .await?;

        Ok(SendOutcome {
            user_message,
            response,
            intent,
        })
    }

    /// Generate and persist the assistant reply for an already-assembled
    /// context. Script requests run the long-form path and snapshot the
    /// episode script; everything else is a single call.
    pub(crate) async fn generate_response(
        &self,
        ctx: &GenerationContext,
        user_text: &str,
        intent: Intent,
        parent_message_id: Option<Uuid>,
        progress: Option<&ProgressFn>,
    ) -> Result<ChatMessage> {
        let mut metadata = MessageMetadata {
            script_generated: false,
            style_dna_used: ctx.style_dna.is_some(),
            knowledge_graph_used: ctx.knowledge_graph.is_some(),
            confidence_score: ctx.style_dna.as_ref().map(|dna| dna.confidence),
        };

        let text = if intent == Intent::ScriptRequest {
            let target_pages = self
                .classifier
                .requested_pages(user_text)
                .unwrap_or(DEFAULT_TARGET_PAGES);
            let script = self
                .longform
                .generate(ctx, user_text, target_pages, progress)
                .await?;
            self.store
                .update_episode_script(ctx.episode.id, &script)
                .await?;
            self.store.add_script_version(ctx.episode.id, &script).await?;
            metadata.script_generated = true;
            script
        } else {
            let prompt = prompts::build_generation_prompt(ctx, user_text);
            let request = GenerationRequest::new(prompt).with_system(prompts::SYSTEM_PROMPT);
            self.provider.generate(request).await?.text
        };

        let response = self
            .store
            .append_message(NewMessage {
                episode_id: ctx.episode.id,
                project_id: ctx.project.id,
                user_id: ctx.project.user_id.clone(),
                role: MessageRole::Assistant,
                content: text,
                parent_message_id,
                metadata,
            })
            .await?;
        Ok(response)
    }

    // ------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------

    pub async fn create_project(&self, new: NewProject) -> Result<Project> {
        Ok(self.store.create_project(new).await?)
    }

    pub async fn get_project(&self, actor_id: &str, id: Uuid) -> Result<Project> {
        self.authorize_project(actor_id, id).await
    }

    pub async fn list_projects(&self, actor_id: &str) -> Result<Vec<Project>> {
        Ok(self.store.list_projects(actor_id).await?)
    }

    pub async fn update_project(
        &self,
        actor_id: &str,
        id: Uuid,
        patch: ProjectPatch,
    ) -> Result<Project> {
        self.authorize_project(actor_id, id).await?;
        Ok(self.store.update_project(id, patch).await?)
    }

    pub async fn delete_project(&self, actor_id: &str, id: Uuid) -> Result<()> {
        self.authorize_project(actor_id, id).await?;
        Ok(self.store.delete_project(id).await?)
    }

    // ------------------------------------------------------------
    // Episodes
    // ------------------------------------------------------------

    pub async fn create_episode(&self, actor_id: &str, new: NewEpisode) -> Result<Episode> {
        self.authorize_project(actor_id, new.project_id).await?;
        Ok(self.store.create_episode(new).await?)
    }

    pub async fn get_episode(&self, actor_id: &str, id: Uuid) -> Result<Episode> {
        let episode = self.store.get_episode(id).await?;
        self.authorize_project(actor_id, episode.project_id).await?;
        Ok(episode)
    }

    pub async fn list_episodes(&self, actor_id: &str, project_id: Uuid) -> Result<Vec<Episode>> {
        self.authorize_project(actor_id, project_id).await?;
        Ok(self.store.list_episodes(project_id).await?)
    }

    pub async fn update_episode(
        &self,
        actor_id: &str,
        id: Uuid,
        patch: EpisodePatch,
    ) -> Result<Episode> {
        self.get_episode(actor_id, id).await?;
        Ok(self.store.update_episode(id, patch).await?)
    }

    // ------------------------------------------------------------
    // Thread and history
    // ------------------------------------------------------------

    pub async fn thread(&self, actor_id: &str, episode_id: Uuid) -> Result<Vec<ChatMessage>> {
        let episode = self.get_episode(actor_id, episode_id).await?;
        Ok(self.store.active_thread(episode.id, None, None).await?)
    }

    pub async fn audit_logs(&self, actor_id: &str, episode_id: Uuid) -> Result<Vec<AuditLog>> {
        let episode = self.get_episode(actor_id, episode_id).await?;
        Ok(self.store.audit_logs_for_episode(episode.id).await?)
    }

    pub async fn message_edits(&self, actor_id: &str, message_id: Uuid) -> Result<Vec<MessageEdit>> {
        let message = self.store.get_message(message_id).await?;
        self.authorize_project(actor_id, message.project_id).await?;
        Ok(self.store.edits_for_message(message_id).await?)
    }

    pub async fn script_versions(
        &self,
        actor_id: &str,
        episode_id: Uuid,
    ) -> Result<Vec<ScriptVersion>> {
        let episode = self.get_episode(actor_id, episode_id).await?;
        Ok(self.store.script_versions(episode.id).await?)
    }
}
