//! Long-form script generation.
//!
//! A full episode exceeds what one model call can produce, so the script is
//! written as a fixed sequence of bounded sections. Each call carries the base
//! context plus the tail of what was already written. Sections run strictly in
//! order; a failure on any section fails the whole run and nothing of it is
//! persisted.

use std::sync::Arc;

use tracing::{debug, info};

use scriptorium_provider::{GenerationOptions, GenerationRequest, TextProvider};

use crate::context::GenerationContext;
use crate::prompts;
use crate::scriptfmt;
use crate::{EngineError, Result};

pub const DEFAULT_TARGET_PAGES: u32 = 80;
pub const PAGES_PER_SECTION: u32 = 10;
/// Characters of already-written script carried into the next section call.
pub const CONTINUITY_TAIL_CHARS: usize = 1200;

const SECTION_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: Some(0.85),
    max_output_tokens: Some(8192),
    top_p: Some(0.95),
    top_k: None,
};

/// Progress of a running long-form generation. Sections are numbered from 1.
#[derive(Debug, Clone)]
pub struct LongFormProgress {
    pub section: usize,
    pub total: usize,
    pub label: String,
}

pub type ProgressFn = dyn Fn(LongFormProgress) + Send + Sync;

/// How many sections a run of `target_pages` needs.
pub fn section_count(target_pages: u32) -> usize {
    target_pages.div_ceil(PAGES_PER_SECTION).max(1) as usize
}

pub struct LongFormGenerator {
    provider: Arc<dyn TextProvider>,
}

impl LongFormGenerator {
    pub fn new(provider: Arc<dyn TextProvider>) -> Self {
        Self { provider }
    }

    /// Generate a complete script of roughly `target_pages` pages. Returns the
    /// stitched, normalized script text.
    pub async fn generate(
        &self,
        ctx: &GenerationContext,
        user_request: &str,
        target_pages: u32,
        progress: Option<&ProgressFn>,
    ) -> Result<String> {
        let total = section_count(target_pages);
        let base = prompts::build_generation_prompt(ctx, user_request);
        info!(
            episode = %ctx.episode.id,
            sections = total,
            target_pages,
            "starting long-form generation"
        );

        let mut sections: Vec<String> = Vec::with_capacity(total);
        for i in 0..total {
            let section = i + 1;
            if let Some(report) = progress {
                report(LongFormProgress {
                    section,
                    total,
                    label: format!("Writing section {section} of {total}"),
                });
            }

            let tail = sections
                .last()
                .map(|prev| continuity_tail(prev, CONTINUITY_TAIL_CHARS));
            let instruction = prompts::section_instruction(section, total);
            let prompt = prompts::section_prompt(&base, tail, &instruction);

            let request = GenerationRequest::new(prompt)
                .with_system(prompts::SYSTEM_PROMPT)
                .with_options(SECTION_OPTIONS);
            let out = self
                .provider
                .generate(request)
                .await
                .map_err(|source| EngineError::SectionFailed {
                    section,
                    total,
                    source,
                })?;
            debug!(section, total, chars = out.text.len(), "section written");
            sections.push(out.text);
        }

        Ok(scriptfmt::stitch_sections(&sections))
    }
}

/// Last `max` bytes of `text`, nudged forward to a char boundary.
fn continuity_tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use scriptorium_provider::{ProviderError, StubProvider};
    use scriptorium_schema::{Episode, GenerationModes, Project};

    fn ctx() -> GenerationContext {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            title: "Senja di Jakarta".into(),
            genre: Some("drama".into()),
            synopsis: None,
            tone: None,
            total_episodes: 12,
            created_at: now,
            updated_at: now,
        };
        let episode = Episode {
            id: Uuid::new_v4(),
            project_id: project.id,
            episode_number: 1,
            title: "Pilot".into(),
            synopsis: Some("Maya returns home.".into()),
            setting: None,
            script: None,
            min_pages: 40,
            created_at: now,
            updated_at: now,
        };
        GenerationContext {
            project,
            episode,
            thread: vec![],
            previous_episodes: vec![],
            style_dna: None,
            knowledge_graph: None,
            modes: GenerationModes::default(),
            is_first_generation: true,
        }
    }

    #[test]
    fn eighty_pages_is_eight_sections() {
        assert_eq!(section_count(80), 8);
        assert_eq!(section_count(81), 9);
        assert_eq!(section_count(10), 1);
        assert_eq!(section_count(5), 1);
        assert_eq!(section_count(0), 1);
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(continuity_tail("abcdef", 10), "abcdef");
        assert_eq!(continuity_tail("abcdef", 3), "def");
        // Multi-byte char straddling the cut point.
        let s = "xxé";
        let t = continuity_tail(s, 1);
        assert!(s.ends_with(t));
    }

    #[tokio::test]
    async fn sections_run_in_order_with_tails() {
        let stub = Arc::new(StubProvider::new());
        for i in 1..=8 {
            stub.push_text(format!("INT. TEMPAT {i} - PAGI\n\nAdegan nomor {i}."));
        }
        let gen = LongFormGenerator::new(stub.clone());

        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen_inner = Arc::clone(&seen);
        let progress = move |p: LongFormProgress| {
            seen_inner.lock().unwrap().push(p.label);
        };

        let script = gen
            .generate(&ctx(), "tulis naskah lengkap", 80, Some(&progress as &ProgressFn))
            .await
            .unwrap();

        let calls = stub.calls();
        assert_eq!(calls.len(), 8);
        assert!(calls[0].prompt.contains("section 1 of 8"));
        assert!(calls[0].prompt.contains("Open strong"));
        assert!(!calls[0].prompt.contains("Continue seamlessly"));
        // Every later call carries the previous section's tail.
        for (i, call) in calls.iter().enumerate().skip(1) {
            assert!(call.prompt.contains(&format!("section {} of 8", i + 1)));
            assert!(call.prompt.contains(&format!("Adegan nomor {i}.")));
            assert!(call.prompt.contains("Continue seamlessly"));
        }
        assert!(calls[7].prompt.contains("final section"));

        // Stitched output holds every section in order.
        let mut last = 0;
        for i in 1..=8 {
            let pos = script
                .find(&format!("Adegan nomor {i}."))
                .unwrap_or_else(|| panic!("section {i} missing from script"));
            assert!(pos >= last);
            last = pos;
        }
        let labels = seen.lock().unwrap();
        assert_eq!(labels.len(), 8);
        assert_eq!(labels[0], "Writing section 1 of 8");
        assert_eq!(labels[7], "Writing section 8 of 8");
    }

    #[tokio::test]
    async fn failure_mid_run_reports_the_section() {
        let stub = Arc::new(StubProvider::new());
        stub.push_text("SECTION ONE");
        stub.push_text("SECTION TWO");
        stub.push_error(ProviderError::Api {
            status: 500,
            message: "boom".into(),
            retryable: true,
        });
        let gen = LongFormGenerator::new(stub.clone());

        let err = gen
            .generate(&ctx(), "tulis naskah", 80, None)
            .await
            .expect_err("third section fails");
        match err {
            EngineError::SectionFailed { section, total, .. } => {
                assert_eq!(section, 3);
                assert_eq!(total, 8);
            }
            other => panic!("expected section failure, got {other:?}"),
        }
        // No further sections were attempted.
        assert_eq!(stub.calls().len(), 3);
    }
}
