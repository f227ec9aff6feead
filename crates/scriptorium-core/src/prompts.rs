//! Prompt construction for generation and analysis calls.
//!
//! Everything here is pure string assembly over a `GenerationContext`, so the
//! exact prompt shape is testable without touching a provider.

use std::fmt::Write;

use scriptorium_schema::{ChatMessage, Episode, KnowledgeGraph, MessageRole, StyleDna};

use crate::context::GenerationContext;

pub const SYSTEM_PROMPT: &str = "You are an experienced Indonesian television drama \
screenwriter. You write in standard screenplay format: scene headings (INT./EXT.), \
action lines, character names in caps, dialogue. You reply in the language the \
writer uses with you.";

/// Base prompt for one generation run. Long-form section prompts layer their
/// own instructions on top of this.
pub fn build_generation_prompt(ctx: &GenerationContext, user_request: &str) -> String {
    let mut p = String::new();

    let _ = writeln!(p, "PROJECT: {}", ctx.project.title);
    if let Some(genre) = &ctx.project.genre {
        let _ = writeln!(p, "Genre: {genre}");
    }
    if let Some(tone) = &ctx.project.tone {
        let _ = writeln!(p, "Tone: {tone}");
    }
    if let Some(synopsis) = &ctx.project.synopsis {
        let _ = writeln!(p, "Series synopsis: {synopsis}");
    }

    let _ = writeln!(
        p,
        "\nEPISODE {}: {}",
        ctx.episode.episode_number, ctx.episode.title
    );
    if let Some(synopsis) = &ctx.episode.synopsis {
        let _ = writeln!(p, "Episode synopsis: {synopsis}");
    }
    if let Some(setting) = &ctx.episode.setting {
        let _ = writeln!(p, "Setting: {setting}");
    }

    if !ctx.previous_episodes.is_empty() {
        let _ = writeln!(p, "\nPREVIOUS EPISODES (for continuity):");
        for ep in &ctx.previous_episodes {
            p.push_str(&render_previous_episode(ep));
        }
    }

    if let Some(dna) = &ctx.style_dna {
        p.push_str(&render_style_dna(dna));
    }
    if let Some(graph) = &ctx.knowledge_graph {
        p.push_str(&render_knowledge_graph(graph));
    }

    if !ctx.thread.is_empty() {
        let _ = writeln!(p, "\nCONVERSATION SO FAR:");
        for msg in &ctx.thread {
            p.push_str(&render_message(msg));
        }
    }

    if ctx.is_first_generation {
        let _ = writeln!(
            p,
            "\nThis episode has no script yet. Develop the script from the synopsis above."
        );
    } else {
        let _ = writeln!(
            p,
            "\nContinue from the scene work already present in the conversation. Stay \
consistent with established characters, locations and events."
        );
    }

    let _ = writeln!(p, "\nWRITER'S REQUEST:\n{user_request}");
    p
}

fn render_previous_episode(ep: &Episode) -> String {
    let mut s = format!("- Episode {}: {}", ep.episode_number, ep.title);
    if let Some(synopsis) = &ep.synopsis {
        let _ = write!(s, " -- {synopsis}");
    }
    s.push('\n');
    s
}

fn render_message(msg: &ChatMessage) -> String {
    let speaker = match msg.role {
        MessageRole::User => "WRITER",
        MessageRole::Assistant => "CO-WRITER",
    };
    format!("[{speaker}] {}\n", msg.content)
}

fn render_style_dna(dna: &StyleDna) -> String {
    let mut s = String::from("\nWRITING STYLE PROFILE (match this voice):\n");
    let mut section = |label: &str, items: &[String]| {
        if !items.is_empty() {
            let _ = writeln!(s, "{label}: {}", items.join(", "));
        }
    };
    section("Voice", &dna.voice);
    section("Themes", &dna.themes);
    section("Character approach", &dna.characters);
    section("Narrative", &dna.narrative);
    section("Dialogue", &dna.dialog);
    s
}

fn render_knowledge_graph(graph: &KnowledgeGraph) -> String {
    let mut s = String::from("\nSTORY WORLD (established facts, do not contradict):\n");
    for entity in &graph.entities {
        let _ = write!(s, "- {} ({})", entity.name, entity.entity_type);
        if let Some(desc) = &entity.description {
            let _ = write!(s, ": {desc}");
        }
        s.push('\n');
    }
    for rel in &graph.relationships {
        let _ = writeln!(s, "- {} -> {}: {}", rel.from, rel.relation, rel.to);
    }
    if !graph.timeline.is_empty() {
        s.push_str("Timeline:\n");
        for event in &graph.timeline {
            let _ = writeln!(s, "{}. {}", event.order, event.event);
        }
    }
    s
}

/// Pacing instruction for one section of a long-form run. Sections are
/// numbered from 1.
pub fn section_instruction(section: usize, total: usize) -> String {
    if section == 1 {
        format!(
            "Write section 1 of {total}. Open strong: establish the world and the central \
tension within the first scenes. End the section mid-momentum, not on a resolution."
        )
    } else if section == total {
        format!(
            "Write section {section} of {total}, the final section. Bring the episode's arcs \
to their climax and close on a hook for the next episode."
        )
    } else {
        format!(
            "Write section {section} of {total}. Escalate from where the previous section \
left off and end on an unresolved beat. Vary your scene transitions; do not open every \
scene the same way."
        )
    }
}

/// Full prompt for one long-form section: base context, the tail of what was
/// already written, and the pacing instruction.
pub fn section_prompt(base: &str, previous_tail: Option<&str>, instruction: &str) -> String {
    let mut p = String::from(base);
    if let Some(tail) = previous_tail {
        let _ = write!(
            p,
            "\nEND OF WHAT YOU HAVE WRITTEN SO FAR:\n{tail}\n\nContinue seamlessly from \
this point. Do not repeat or summarize it.\n"
        );
    }
    let _ = write!(p, "\n{instruction}\n\nWrite only screenplay text, no commentary.");
    p
}

/// Style analysis over a finished script. The reply must embed a JSON object.
pub fn style_analysis_prompt(script: &str) -> String {
    format!(
        "Analyze the writing style of the following script. Respond with a JSON object \
with string-array fields \"voice\", \"themes\", \"characters\", \"narrative\", \"dialog\" \
and a numeric field \"confidence\" between 0 and 100.\n\nSCRIPT:\n{script}"
    )
}

/// Knowledge-graph extraction over a finished script.
pub fn graph_analysis_prompt(script: &str) -> String {
    format!(
        "Extract the story world from the following script. Respond with a JSON object \
with fields \"entities\" (array of {{\"name\", \"type\", \"description\"}}), \
\"relationships\" (array of {{\"from\", \"to\", \"type\"}}), \"timeline\" (array of \
{{\"event\", \"order\"}}) and \"themes\" (array of strings).\n\nSCRIPT:\n{script}"
    )
}

/// Plain-text extraction from an uploaded document.
pub fn document_extraction_prompt() -> String {
    "Extract the complete text content of the attached document. Return only the text, \
preserving line breaks. No commentary."
        .to_string()
}
