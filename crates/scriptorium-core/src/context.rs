//! Prompt-context assembly.
//!
//! Gathers project, episode, thread window, prior episodes and the optional
//! derived artifacts into one `GenerationContext`. First-generation detection
//! is computed from current state at the moment of assembly, never cached: an
//! edit can truncate every assistant message and retroactively turn the next
//! generation back into a first one.

use uuid::Uuid;

use scriptorium_schema::{
    ChatMessage, ContextContinuity, Episode, GenerationModes, KnowledgeGraph, MessageRole,
    Project, StyleDna,
};
use scriptorium_store::Store;

use crate::{EngineError, Result};

/// Trailing window of messages handed to generation.
pub const THREAD_WINDOW: usize = 10;
/// Wider window used by continuation heuristics.
pub const CONTINUATION_WINDOW: usize = 15;
/// Prior episodes carried for series continuity.
pub const PREVIOUS_EPISODES: usize = 3;

/// Approximate token count: ceil(chars / 4).
pub fn approx_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

pub fn thread_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| approx_tokens(&m.content)).sum()
}

#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub project: Project,
    pub episode: Episode,
    /// Trailing window of active messages, ascending by position.
    pub thread: Vec<ChatMessage>,
    pub previous_episodes: Vec<Episode>,
    pub style_dna: Option<StyleDna>,
    pub knowledge_graph: Option<KnowledgeGraph>,
    pub modes: GenerationModes,
    /// True when the episode has no script and the thread holds no assistant
    /// message: generation originates from the synopsis instead of continuing
    /// existing scene work.
    pub is_first_generation: bool,
}

impl GenerationContext {
    pub fn continuity(&self) -> ContextContinuity {
        ContextContinuity {
            message_count: self.thread.len(),
            approx_tokens: thread_tokens(&self.thread),
        }
    }
}

#[derive(Clone)]
pub struct ContextAssembler {
    store: Store,
}

impl ContextAssembler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Build the context for one generation run. `before` bounds the thread to
    /// positions at or below the cutoff (used when regenerating after an
    /// edit). Artifact fetches are skipped entirely when the corresponding
    /// mode flag is off.
    pub async fn assemble(
        &self,
        actor_id: &str,
        project_id: Uuid,
        episode_id: Uuid,
        before: Option<i64>,
        modes: GenerationModes,
    ) -> Result<GenerationContext> {
        let project = self.store.get_project(project_id).await?;
        if project.user_id != actor_id {
            return Err(EngineError::unauthorized(actor_id, project_id));
        }

        let episode = self.store.get_episode(episode_id).await?;
        if episode.project_id != project_id {
            return Err(EngineError::NotFound {
                what: "episode",
                id: episode_id.to_string(),
            });
        }

        let thread = self
            .store
            .active_thread(episode_id, before, Some(THREAD_WINDOW))
            .await?;

        let previous_episodes = self
            .store
            .previous_episodes(project_id, episode.episode_number, PREVIOUS_EPISODES)
            .await?;

        let style_dna = if modes.style_dna {
            self.store.latest_style_dna(project_id).await?
        } else {
            None
        };
        let knowledge_graph = if modes.knowledge_graph {
            self.store.latest_knowledge_graph(project_id).await?
        } else {
            None
        };

        let has_assistant = thread.iter().any(|m| m.role == MessageRole::Assistant);
        let is_first_generation = episode.script.is_none() && !has_assistant;

        Ok(GenerationContext {
            project,
            episode,
            thread,
            previous_episodes,
            style_dna,
            knowledge_graph,
            modes,
            is_first_generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scriptorium_schema::{MessageMetadata, StyleDna};
    use scriptorium_store::{NewEpisode, NewMessage, NewProject};

    async fn setup() -> (Store, Project, Episode) {
        let store = Store::open_in_memory().unwrap();
        let project = store
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
        let episode = store
            .create_episode(NewEpisode {
                project_id: project.id,
                episode_number: 2,
                title: "Rahasia Lama".into(),
                synopsis: Some("An old secret surfaces.".into()),
                setting: None,
                min_pages: 40,
            })
            .await
            .unwrap();
        (store, project, episode)
    }

    fn msg(project: &Project, episode: &Episode, role: MessageRole, content: &str) -> NewMessage {
        NewMessage {
            episode_id: episode.id,
            project_id: project.id,
            user_id: project.user_id.clone(),
            role,
            content: content.into(),
            parent_message_id: None,
            metadata: MessageMetadata::default(),
        }
    }

    #[test]
    fn approx_tokens_is_ceil_of_quarter() {
        assert_eq!(approx_tokens(""), 0);
        assert_eq!(approx_tokens("abc"), 1);
        assert_eq!(approx_tokens("abcd"), 1);
        assert_eq!(approx_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn first_generation_flips_with_thread_state() {
        let (store, project, episode) = setup().await;
        let assembler = ContextAssembler::new(store.clone());
        let modes = GenerationModes::default();

        // No script, no assistant messages: first generation.
        let ctx = assembler
            .assemble("user-1", project.id, episode.id, None, modes)
            .await
            .unwrap();
        assert!(ctx.is_first_generation);

        let user_msg = store
            .append_message(msg(&project, &episode, MessageRole::User, "tulis adegan"))
            .await
            .unwrap();
        let ctx = assembler
            .assemble("user-1", project.id, episode.id, None, modes)
            .await
            .unwrap();
        assert!(ctx.is_first_generation, "user message alone does not flip it");

        let assistant = store
            .append_message(msg(
                &project,
                &episode,
                MessageRole::Assistant,
                "INT. RUMAH - MALAM",
            ))
            .await
            .unwrap();
        let ctx = assembler
            .assemble("user-1", project.id, episode.id, None, modes)
            .await
            .unwrap();
        assert!(!ctx.is_first_generation);

        // Truncating the assistant message flips it back: detection is live.
        store.soft_delete_message(assistant.id).await.unwrap();
        let ctx = assembler
            .assemble("user-1", project.id, episode.id, None, modes)
            .await
            .unwrap();
        assert!(ctx.is_first_generation);
        assert_eq!(ctx.thread.len(), 1);
        assert_eq!(ctx.thread[0].id, user_msg.id);
    }

    #[tokio::test]
    async fn thread_window_is_capped() {
        let (store, project, episode) = setup().await;
        for i in 0..(THREAD_WINDOW + 5) {
            store
                .append_message(msg(
                    &project,
                    &episode,
                    MessageRole::User,
                    &format!("m{i}"),
                ))
                .await
                .unwrap();
        }
        let assembler = ContextAssembler::new(store);
        let ctx = assembler
            .assemble(
                "user-1",
                project.id,
                episode.id,
                None,
                GenerationModes::default(),
            )
            .await
            .unwrap();
        assert_eq!(ctx.thread.len(), THREAD_WINDOW);
        assert_eq!(ctx.thread.last().unwrap().content, "m14");
    }

    #[tokio::test]
    async fn mode_flags_gate_artifact_fetches() {
        let (store, project, episode) = setup().await;
        store
            .save_style_dna(StyleDna {
                id: Uuid::new_v4(),
                user_id: project.user_id.clone(),
                project_id: project.id,
                script_id: Uuid::new_v4(),
                voice: vec!["lyrical".into()],
                themes: vec![],
                characters: vec![],
                narrative: vec![],
                dialog: vec![],
                confidence: 75.0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let assembler = ContextAssembler::new(store);
        let on = assembler
            .assemble(
                "user-1",
                project.id,
                episode.id,
                None,
                GenerationModes {
                    style_dna: true,
                    knowledge_graph: true,
                },
            )
            .await
            .unwrap();
        assert!(on.style_dna.is_some());
        assert!(on.knowledge_graph.is_none());

        let off = assembler
            .assemble(
                "user-1",
                project.id,
                episode.id,
                None,
                GenerationModes {
                    style_dna: false,
                    knowledge_graph: false,
                },
            )
            .await
            .unwrap();
        assert!(off.style_dna.is_none());
    }

    #[tokio::test]
    async fn wrong_actor_is_unauthorized() {
        let (store, project, episode) = setup().await;
        let assembler = ContextAssembler::new(store);
        let err = assembler
            .assemble(
                "intruder",
                project.id,
                episode.id,
                None,
                GenerationModes::default(),
            )
            .await
            .expect_err("must be rejected");
        assert!(matches!(err, EngineError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn episode_from_other_project_is_not_found() {
        let (store, project, _episode) = setup().await;
        let other = store
            .create_project(NewProject {
                user_id: "user-1".into(),
                title: "Other".into(),
                genre: None,
                synopsis: None,
                tone: None,
                total_episodes: 1,
            })
            .await
            .unwrap();
        let foreign = store
            .create_episode(NewEpisode {
                project_id: other.id,
                episode_number: 1,
                title: "Foreign".into(),
                synopsis: None,
                setting: None,
                min_pages: 10,
            })
            .await
            .unwrap();

        let assembler = ContextAssembler::new(store);
        let err = assembler
            .assemble(
                "user-1",
                project.id,
                foreign.id,
                None,
                GenerationModes::default(),
            )
            .await
            .expect_err("cross-project episode must not resolve");
        assert!(matches!(err, EngineError::NotFound { what: "episode", .. }));
    }
}
