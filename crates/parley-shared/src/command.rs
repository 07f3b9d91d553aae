//! Parsing of raw send-box input into a tagged command.
//!
//! Every outgoing line is classified exactly once, before the send path
//! runs, so moderation commands and assistant invocations are never
//! re-detected by ad hoc string matching downstream.

use crate::constants::{ASSISTANT_MARKER, COMMAND_PREFIX};

/// Moderation verbs an administrator can issue from the send box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModAction {
    Kick,
    Ban,
    Mute,
}

impl ModAction {
    /// Past-tense verb used in the persisted confirmation message.
    pub fn past_tense(self) -> &'static str {
        match self {
            ModAction::Kick => "kicked",
            ModAction::Ban => "banned",
            ModAction::Mute => "muted",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModAction::Kick => "kick",
            ModAction::Ban => "ban",
            ModAction::Mute => "mute",
        }
    }
}

/// Classification of one line of outgoing input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Chat text to seal and append. If the assistant marker is present,
    /// `assistant_prompt` carries the prompt to forward after the user's
    /// own message has been appended.
    Chat {
        text: String,
        assistant_prompt: Option<String>,
    },

    /// A moderation command: `/kick`, `/ban` or `/mute` plus a username.
    Moderation { action: ModAction, target: String },

    /// A slash command this client does not understand.
    Unknown { command: String },
}

impl Outgoing {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.starts_with(COMMAND_PREFIX) {
            return Self::parse_command(trimmed);
        }

        let assistant_prompt = if contains_marker(trimmed) {
            Some(trimmed.to_string())
        } else {
            None
        };

        Outgoing::Chat {
            text: trimmed.to_string(),
            assistant_prompt,
        }
    }

    fn parse_command(input: &str) -> Self {
        let mut parts = input.split_whitespace();
        let command = parts.next().unwrap_or(input);
        let target = parts.next();

        let action = match command {
            "/kick" => Some(ModAction::Kick),
            "/ban" => Some(ModAction::Ban),
            "/mute" => Some(ModAction::Mute),
            _ => None,
        };

        match (action, target) {
            (Some(action), Some(target)) => Outgoing::Moderation {
                action,
                target: target.to_string(),
            },
            _ => Outgoing::Unknown {
                command: command.to_string(),
            },
        }
    }
}

/// True when the assistant marker appears as its own word.
fn contains_marker(text: &str) -> bool {
    text.split_whitespace().any(|word| {
        word.trim_matches(|c: char| c.is_ascii_punctuation() && c != '@') == ASSISTANT_MARKER
    })
}
