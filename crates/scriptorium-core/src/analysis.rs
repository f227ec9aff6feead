//! Script analysis: style profiling, story-world extraction, document text
//! recovery.

use std::sync::Arc;

use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use scriptorium_provider::{
    extract_json, GenerationRequest, InlinePayload, ProviderError, TextProvider,
};
use scriptorium_schema::{
    GraphEntity, GraphRelationship, KnowledgeGraph, StyleDna, TimelineEvent,
};
use scriptorium_store::Store;

use crate::prompts;
use crate::{EngineError, Result};

/// Payload shape expected back from a style analysis call.
#[derive(Debug, Deserialize)]
struct StylePayload {
    #[serde(default)]
    voice: Vec<String>,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    characters: Vec<String>,
    #[serde(default)]
    narrative: Vec<String>,
    #[serde(default)]
    dialog: Vec<String>,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct GraphPayload {
    #[serde(default)]
    entities: Vec<GraphEntity>,
    #[serde(default)]
    relationships: Vec<GraphRelationship>,
    #[serde(default)]
    timeline: Vec<TimelineEvent>,
    #[serde(default)]
    themes: Vec<String>,
}

pub struct ScriptAnalyzer {
    store: Store,
    provider: Arc<dyn TextProvider>,
}

impl ScriptAnalyzer {
    pub fn new(store: Store, provider: Arc<dyn TextProvider>) -> Self {
        Self { store, provider }
    }

    async fn authorize(&self, actor_id: &str, project_id: Uuid) -> Result<String> {
        let project = self.store.get_project(project_id).await?;
        if project.user_id != actor_id {
            return Err(EngineError::unauthorized(actor_id, project_id));
        }
        Ok(project.user_id)
    }

    /// Profile the writing style of a script and persist the result. A reply
    /// without a parseable JSON object fails; nothing is stored.
    pub async fn analyze_style(
        &self,
        actor_id: &str,
        project_id: Uuid,
        script_id: Uuid,
        script: &str,
    ) -> Result<StyleDna> {
        let user_id = self.authorize(actor_id, project_id).await?;

        let request = GenerationRequest::new(prompts::style_analysis_prompt(script))
            .with_system(prompts::SYSTEM_PROMPT);
        let out = self.provider.generate(request).await?;
        let value = extract_json(&out.text)?;
        let payload: StylePayload = serde_json::from_value(value).map_err(|e| {
            ProviderError::MalformedOutput(format!("style payload did not match schema: {e}"))
        })?;

        let dna = StyleDna {
            id: Uuid::new_v4(),
            user_id,
            project_id,
            script_id,
            voice: payload.voice,
            themes: payload.themes,
            characters: payload.characters,
            narrative: payload.narrative,
            dialog: payload.dialog,
            confidence: payload.confidence.clamp(0.0, 100.0),
            created_at: Utc::now(),
        };
        self.store.save_style_dna(dna.clone()).await?;
        Ok(dna)
    }

    /// Extract the story world (entities, relationships, timeline) from a
    /// script and persist it.
    pub async fn analyze_graph(
        &self,
        actor_id: &str,
        project_id: Uuid,
        script_id: Uuid,
        script: &str,
    ) -> Result<KnowledgeGraph> {
        let user_id = self.authorize(actor_id, project_id).await?;

        let request = GenerationRequest::new(prompts::graph_analysis_prompt(script))
            .with_system(prompts::SYSTEM_PROMPT);
        let out = self.provider.generate(request).await?;
        let value = extract_json(&out.text)?;
        let payload: GraphPayload = serde_json::from_value(value).map_err(|e| {
            ProviderError::MalformedOutput(format!("graph payload did not match schema: {e}"))
        })?;

        let graph = KnowledgeGraph {
            id: Uuid::new_v4(),
            user_id,
            project_id,
            script_id,
            entities: payload.entities,
            relationships: payload.relationships,
            timeline: payload.timeline,
            themes: payload.themes,
            created_at: Utc::now(),
        };
        self.store.save_knowledge_graph(graph.clone()).await?;
        Ok(graph)
    }

    /// Pull plain text out of an uploaded document via the provider. When the
    /// provider is rate limited the text is recovered locally from the payload
    /// bytes instead of failing the upload.
    pub async fn extract_document_text(&self, payload: &InlinePayload) -> Result<String> {
        let request = GenerationRequest::new(prompts::document_extraction_prompt())
            .with_inline_data(payload.mime_type.clone(), payload.data.clone());
        match self.provider.generate(request).await {
            Ok(out) => Ok(out.text),
            Err(err) if err.is_rate_limited() => {
                warn!(mime_type = %payload.mime_type, "provider rate limited, extracting locally");
                Ok(fallback_extract(&payload.data))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Local extraction: decode the payload and keep whatever reads as text.
fn fallback_extract(data: &str) -> String {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .unwrap_or_else(|_| data.as_bytes().to_vec());
    let text = String::from_utf8_lossy(&bytes);
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}
