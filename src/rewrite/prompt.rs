// src/rewrite/prompt.rs
//! Persona prompts and variant parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Hard length limit of a post.
pub const MAX_VARIANT_CHARS: usize = 280;

/// Leading list markers: `1.`, `2)`, `-`, `*`, `•`, `Variant 3:`.
static RE_LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\s*(?:(?i:variant|option|take|reply)\s*\d+\s*[:.)-]|\d{1,2}[.):](?:\s|$)|[-*•](?:\s|$)))+\s*",
    )
        .expect("list marker regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Fresh takes on the same debate in the persona's voice.
    Rewrite,
    /// Replies to the post.
    Reply,
}

impl RewriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteMode::Rewrite => "rewrite",
            RewriteMode::Reply => "reply",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub voice: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Mile High Debater".to_string(),
            voice: "A lifelong Denver sports fan. Confident, punchy, a little sarcastic, \
                    backs takes with one concrete stat or moment. No hashtag spam, at most one emoji."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub mode: RewriteMode,
    pub count: usize,
    pub text: String,
    pub author: String,
}

pub fn system_prompt(persona: &Persona) -> String {
    format!(
        "You write posts for X as \"{}\". Voice: {} \
         Every line you output must stand alone as a post of at most {MAX_VARIANT_CHARS} characters.",
        persona.name, persona.voice
    )
}

pub fn user_prompt(req: &RewriteRequest) -> String {
    let task = match req.mode {
        RewriteMode::Rewrite => format!(
            "Write {} different original takes on the debate in this post. \
             Do not copy its wording and do not mention its author.",
            req.count
        ),
        RewriteMode::Reply => format!(
            "Write {} different replies to this post by @{} that push the debate forward.",
            req.count, req.author
        ),
    };
    format!(
        "{task}\nOutput exactly one variant per line, no numbering, no quotes.\n\nPost:\n{}",
        req.text
    )
}

/// Truncate to `max` chars on a word boundary when one is close enough.
pub fn clamp_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(i) if i > max / 2 => cut[..i].trim_end().to_string(),
        _ => cut,
    }
}

fn clean_line(line: &str) -> String {
    let stripped = RE_LIST_MARKER.replace(line, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let unquoted = collapsed
        .trim_matches(|c| matches!(c, '"' | '\u{201C}' | '\u{201D}'))
        .trim();
    clamp_chars(unquoted, MAX_VARIANT_CHARS)
}

/// One variant per non-empty line, list markers and wrapping quotes removed,
/// duplicates dropped, at most `max`.
pub fn parse_variants(raw: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in raw.lines() {
        if out.len() >= max {
            break;
        }
        let v = clean_line(line);
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markers_quotes_and_blank_lines() {
        let raw = "1. \"Bo Nix is fine, the line is not.\"\n\n2) Payton's  play calling   is the problem\n- Variant 3: Trade for a WR already\n• last one";
        let v = parse_variants(raw, 10);
        assert_eq!(
            v,
            vec![
                "Bo Nix is fine, the line is not.",
                "Payton's play calling is the problem",
                "Trade for a WR already",
                "last one",
            ]
        );
    }

    #[test]
    fn caps_count_and_drops_duplicates() {
        let raw = "a take\na take\nb take\nc take\nd take";
        assert_eq!(parse_variants(raw, 2), vec!["a take", "b take"]);
    }

    #[test]
    fn long_lines_are_clamped() {
        let long = "word ".repeat(100);
        let v = parse_variants(&long, 1);
        assert!(v[0].chars().count() <= MAX_VARIANT_CHARS);
        assert!(v[0].ends_with("word"));
    }

    #[test]
    fn numbers_inside_text_survive() {
        let v = parse_variants("Jokic had 30 points and 12 boards", 1);
        assert_eq!(v, vec!["Jokic had 30 points and 12 boards"]);
    }

    #[test]
    fn reply_prompt_names_author() {
        let req = RewriteRequest {
            mode: RewriteMode::Reply,
            count: 4,
            text: "Bo Nix is overrated".into(),
            author: "milehighmike".into(),
        };
        let p = user_prompt(&req);
        assert!(p.contains("@milehighmike"));
        assert!(p.contains("4 different replies"));
        assert!(system_prompt(&Persona::default()).contains("280"));
    }
}
