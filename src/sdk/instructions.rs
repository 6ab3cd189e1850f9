use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::persona::Persona;
use crate::protocol::models::ArbitraryJson;

/// How the agent relates to the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentationMode {
    /// The agent leads and narrates each slide.
    #[default]
    Presenter,
    /// The agent and the user take turns discussing each slide.
    Dialogue,
    /// The agent stays quiet until asked.
    Assistant,
}

/// Metadata of the slide on screen. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideContext {
    pub id: String,
    pub index: usize,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub speaker_notes: Option<String>,
    /// Optional engagement material (questions, prompts); passed through untouched.
    #[serde(default)]
    pub engagement: Option<ArbitraryJson>,
}

impl SlideContext {
    #[must_use]
    pub fn new(id: impl Into<String>, index: usize, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index,
            title: title.into(),
            summary: None,
            speaker_notes: None,
            engagement: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideSummary {
    pub index: usize,
    pub title: String,
}

/// Everything an instruction synthesizer may draw on.
#[derive(Debug, Clone, Copy)]
pub struct InstructionContext<'a> {
    pub mode: PresentationMode,
    pub persona: Option<&'a Persona>,
    pub slide: Option<&'a SlideContext>,
    pub overview: &'a [SlideSummary],
}

/// Opaque producer of instruction text.
pub trait InstructionSynthesizer: Send + Sync {
    /// Instructions for the main, slide-aware session.
    fn session_instructions(&self, ctx: &InstructionContext<'_>) -> String;

    /// A short script for a persona preview that speaks first.
    fn audition_script(&self, persona: &Persona) -> String;
}

/// Plain-prose instructions built from the current state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInstructions;

impl InstructionSynthesizer for DefaultInstructions {
    fn session_instructions(&self, ctx: &InstructionContext<'_>) -> String {
        let mut out = String::new();

        match ctx.persona {
            Some(p) => {
                let _ = writeln!(out, "You are {}, a voice presenter. Your tone is {}.", p.name, p.tone);
            }
            None => out.push_str("You are a voice presenter.\n"),
        }

        out.push_str(match ctx.mode {
            PresentationMode::Presenter => {
                "Lead the presentation: explain each slide in a few sentences, then call next_slide when you are done.\n"
            }
            PresentationMode::Dialogue => {
                "Discuss each slide with the user. Keep turns short and invite their view before moving on.\n"
            }
            PresentationMode::Assistant => {
                "Stay silent unless the user asks something. Answer briefly, using the slide on screen as context.\n"
            }
        });
        out.push_str(
            "Use next_slide and previous_slide only when the conversation calls for moving through the deck. \
             Messages starting with [CONTEXT UPDATE] describe what changed on screen; do not answer them aloud.\n",
        );

        if !ctx.overview.is_empty() {
            out.push_str("\nDeck outline:\n");
            for s in ctx.overview {
                let _ = writeln!(out, "{}. {}", s.index + 1, s.title);
            }
        }

        if let Some(slide) = ctx.slide {
            let _ = writeln!(out, "\nCurrent slide ({}): {}", slide.index + 1, slide.title);
            if let Some(summary) = &slide.summary {
                let _ = writeln!(out, "Summary: {summary}");
            }
            if let Some(notes) = &slide.speaker_notes {
                let _ = writeln!(out, "Speaker notes: {notes}");
            }
        }

        out
    }

    fn audition_script(&self, persona: &Persona) -> String {
        format!(
            "You are {name}. Your tone is {tone}. Introduce yourself in two or three sentences \
             as a possible presenter, so the listener can hear your voice and style. \
             Speak first without waiting for the user, then stop.",
            name = persona.name,
            tone = persona.tone,
        )
    }
}
