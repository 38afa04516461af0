//! Named instruction presets and the `Instructions` source type.
//!
//! A caller names a preset or supplies literal text. [`Instructions::lookup`]
//! decides which it is once, against the table for a given [`PresetKind`];
//! text that is not a known name is kept as a literal template.

use serde::{Deserialize, Serialize};

use crate::error::{DeliberationError, DeliberationResult};

/// Which preset table a name is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetKind {
    /// How a participant should use previous responses.
    Combination,
    /// Wraps a persona description into system instructions.
    PersonaTemplate,
    /// Moderator persona / system instructions.
    ModeratorPersona,
    /// How the moderator should merge the final responses.
    ModeratorCombination,
}

impl PresetKind {
    pub const ALL: [PresetKind; 4] = [
        PresetKind::Combination,
        PresetKind::PersonaTemplate,
        PresetKind::ModeratorPersona,
        PresetKind::ModeratorCombination,
    ];

    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            PresetKind::Combination => COMBINATION,
            PresetKind::PersonaTemplate => PERSONA_TEMPLATE,
            PresetKind::ModeratorPersona => MODERATOR_PERSONA,
            PresetKind::ModeratorCombination => MODERATOR_COMBINATION,
        }
    }
}

impl std::fmt::Display for PresetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PresetKind::Combination => "combination_instructions",
            PresetKind::PersonaTemplate => "persona_template",
            PresetKind::ModeratorPersona => "moderator_persona",
            PresetKind::ModeratorCombination => "moderator_combination_instructions",
        };
        write!(f, "{s}")
    }
}

const COMBINATION: &[(&str, &str)] = &[
    (
        "default",
        "USE PREVIOUS RESPONSES TO COMPLETE THE TASK\n\
         Here are the previous responses: \n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "chain",
        "INSTRUCTIONS\n\
         Earlier participants have already worked on this task. Read their responses, \
         keep what holds up, fix what does not, and add what is missing. \
         Do not simply repeat them.\n\
         PREVIOUS RESPONSES\n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "debate",
        "You are in a debate with another participant. Below is the exchange so far. \
         Respond directly to the other participant's latest points, defend your own \
         position where it is sound, and concede where it is not. \
         Do not restate the labels.\n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "voting",
        "VOTING INSTRUCTIONS\n\
         Other participants have cast votes with reasons. Consider their reasoning, \
         then cast your own vote. Begin your answer with your vote, then give one \
         sentence of justification.\n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "jury",
        "DELIBERATION INSTRUCTIONS\n\
         You are one juror among several. Reexamine your views in light of what the \
         other jurors argued, but do not defer to them just because they spoke first. \
         State clearly whether your position changed and why.\n\
         PREVIOUS JUROR RESPONSES\n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "first_wave",
        "COLLABORATION INSTRUCTIONS\n\
         Respect each other’s viewpoints. Acknowledge the strongest points made by \
         others, then build on them with your own perspective.\n\
         PREVIOUS RESPONSES\n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "second_wave",
        "COLLABORATION INSTRUCTIONS\n\
         Respect each other’s viewpoints, and pay particular attention to viewpoints \
         that differ from the majority. Make sure underrepresented perspectives are \
         carried forward.\n\
         PREVIOUS RESPONSES\n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "critique_revise",
        "REVISION INSTRUCTIONS\n\
         Critique the previous responses: list their concrete weaknesses, then write \
         a revised answer that fixes them.\n\
         PREVIOUS RESPONSES\n <start>\n ${previous_responses}\n <end>",
    ),
];

const PERSONA_TEMPLATE: &[(&str, &str)] = &[
    (
        "default",
        "When drafting your response, adopt the following persona: ${persona}",
    ),
    (
        "empathetic",
        "INSTRUCTIONS\n\
         When answering questions or performing tasks, write from the perspective of \
         the following persona, drawing on its values and lived experience: ${persona}\n\
         Speak in your own voice and do not mention that you were given a persona.",
    ),
    (
        "second_wave",
        "INSTRUCTIONS\n\
         Adopt the following persona, paying attention to how your identity and \
         circumstances shape your view of the task: ${persona}\n\
         Be candid about disagreements with the majority.",
    ),
];

const MODERATOR_PERSONA: &[(&str, &str)] = &[
    (
        "default",
        "You are a neutral moderator overseeing a discussion about the following task: ${task}.",
    ),
    (
        "voting",
        "You are a neutral moderator overseeing a vote on the following task: ${task}. \
         You tally the votes faithfully and do not add your own.",
    ),
    (
        "first_wave",
        "You are a moderator overseeing a discussion about the following task: ${task}. \
         Your job is to find common ground while keeping every distinct viewpoint visible.",
    ),
];

const MODERATOR_COMBINATION: &[(&str, &str)] = &[
    (
        "default",
        "Below are the responses from the participants. Combine them into one final \
         answer to the task, keeping the strongest points and resolving \
         contradictions.\n <start>\n ${previous_responses}\n <end>",
    ),
    (
        "voting",
        "Below are the participants' votes. Report the majority outcome and the \
         vote count, then summarise the main reason behind it.\n\
         <start>\n ${previous_responses}\n <end>",
    ),
    (
        "first_wave",
        "Below are the responses from the participants. Write a final answer that \
         reflects the shared ground and notes any remaining disagreement.\n\
         <start>\n ${previous_responses}\n <end>",
    ),
];

/// Look up the text of a preset, if `name` is a preset of `kind`.
pub fn lookup(kind: PresetKind, name: &str) -> Option<&'static str> {
    kind.table()
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
}

/// All preset names of `kind`, in table order.
pub fn names(kind: PresetKind) -> Vec<&'static str> {
    kind.table().iter().map(|(n, _)| *n).collect()
}

/// A source of instruction text: a named preset or a literal template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Instructions {
    Preset(String),
    Literal(String),
}

impl Instructions {
    /// Classify `text`: a preset if it names one of `kind`, else a literal.
    pub fn lookup(kind: PresetKind, text: impl Into<String>) -> Self {
        let text = text.into();
        if lookup(kind, &text).is_some() {
            Instructions::Preset(text)
        } else {
            Instructions::Literal(text)
        }
    }

    pub fn preset(name: impl Into<String>) -> Self {
        Instructions::Preset(name.into())
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Instructions::Literal(text.into())
    }

    /// The `default` preset.
    pub fn default_preset() -> Self {
        Instructions::Preset("default".to_string())
    }

    /// Resolve to template text against the table for `kind`.
    ///
    /// Returns [`DeliberationError::UnknownPreset`] for an explicit preset
    /// name that the table does not contain.
    pub fn resolve(&self, kind: PresetKind) -> DeliberationResult<String> {
        match self {
            Instructions::Literal(text) => Ok(text.clone()),
            Instructions::Preset(name) => lookup(kind, name).map(str::to_string).ok_or_else(|| {
                DeliberationError::UnknownPreset {
                    kind: kind.to_string(),
                    name: name.clone(),
                }
            }),
        }
    }

    pub fn is_preset(&self) -> bool {
        matches!(self, Instructions::Preset(_))
    }
}
