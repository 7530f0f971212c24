//! Transcript helpers shared by the generator and the signal extractor.

use serde::Deserialize;

/// One exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Turn {
    pub role: String,
    #[serde(alias = "Content", alias = "text")]
    pub content: String,
}

/// Canonical speaker role, `None` if unrecognized.
pub fn canonical_role(role: &str) -> Option<&'static str> {
    match role.trim().to_ascii_lowercase().as_str() {
        "spm" | "manager" | "partner manager" => Some("SPM"),
        "creator" | "talent" => Some("Creator"),
        _ => None,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a raw transcript into turns.
///
/// Accepts either a JSON array of `{role, content}` objects or plain lines of
/// `Role: text`. Lines without a recognized role prefix continue the previous
/// turn. Whitespace inside each turn is collapsed; empty turns are dropped.
pub fn parse_turns(raw: &str) -> Vec<Turn> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(turns) = serde_json::from_str::<Vec<Turn>>(trimmed) {
            return turns
                .into_iter()
                .filter_map(|t| {
                    let content = collapse_whitespace(&t.content);
                    let role = canonical_role(&t.role).map(str::to_string).unwrap_or(t.role);
                    (!content.is_empty()).then_some(Turn { role, content })
                })
                .collect();
        }
    }

    let mut turns: Vec<Turn> = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let prefixed = line
            .split_once(':')
            .and_then(|(role, rest)| canonical_role(role).map(|r| (r, rest)));
        if let Some((role, rest)) = prefixed {
            turns.push(Turn {
                role: role.to_string(),
                content: collapse_whitespace(rest),
            });
        } else if let Some(last) = turns.last_mut() {
            if !last.content.is_empty() {
                last.content.push(' ');
            }
            last.content.push_str(&collapse_whitespace(line));
        } else {
            turns.push(Turn {
                role: "Unknown".to_string(),
                content: collapse_whitespace(line),
            });
        }
    }
    turns.retain(|t| !t.content.is_empty());
    turns
}

pub fn render_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sentiment polarity of a creator tone in [-1, 1].
pub fn tone_polarity(tone: &str) -> Option<f64> {
    match tone.trim().to_ascii_lowercase().as_str() {
        "positive" | "enthusiastic" => Some(1.0),
        "neutral" | "mixed" => Some(0.0),
        "concerned" => Some(-0.5),
        "frustrated" | "negative" => Some(-1.0),
        _ => None,
    }
}

/// BCP-47 style casing: `EN_us` → `en-US`, `FR` → `fr`.
pub fn normalize_language(code: &str) -> String {
    let code = code.trim().replace('_', "-");
    match code.split_once('-') {
        Some((lang, region)) => format!("{}-{}", lang.to_ascii_lowercase(), region.to_ascii_uppercase()),
        None => code.to_ascii_lowercase(),
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
