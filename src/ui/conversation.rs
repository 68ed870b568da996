use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};

use crate::transcript::{Transcript, TranscriptEntry};

/// Compact JSON bodies longer than this are cut.
const MAX_JSON_CHARS: usize = 400;

fn role_style(role: &str) -> Style {
    let color = match role {
        "user" => Color::Cyan,
        "assistant" => Color::LightGreen,
        "tool" | "tool_use" | "tool_result" => Color::Yellow,
        "system" => Color::LightMagenta,
        _ => Color::LightBlue,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn title_for(entry: &TranscriptEntry) -> String {
    let role = if entry.role.is_empty() {
        "EVENT".to_string()
    } else {
        entry.role.to_uppercase()
    };
    let mut title = match &entry.model {
        Some(model) => format!("{role} ({model})"),
        None => role,
    };
    if let Some(time) = entry.created_at.as_deref().and_then(clock_time) {
        title.push_str(&format!("  {time}"));
    }
    title
}

fn clock_time(stamp: &str) -> Option<String> {
    chrono::DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|t| t.format("%H:%M:%S").to_string())
}

fn body_for(entry: &TranscriptEntry) -> String {
    if let Some(text) = entry.text() {
        return text;
    }
    if entry.payload.is_null() {
        return String::new();
    }
    let json = entry.payload.to_string();
    if json.chars().count() > MAX_JSON_CHARS {
        let cut: String = json.chars().take(MAX_JSON_CHARS).collect();
        format!("{cut}…")
    } else {
        json
    }
}

/// Render the transcript as styled lines, one title line per entry followed
/// by its indented body.
pub fn render_transcript(transcript: &Transcript) -> Text<'static> {
    if transcript.is_empty() {
        return Text::from(Line::from(Span::styled(
            "No messages yet.",
            Style::default().add_modifier(Modifier::DIM),
        )));
    }

    let body = Style::default();
    let dim = Style::default().add_modifier(Modifier::DIM);
    let mut lines: Vec<Line<'static>> = Vec::new();

    for entry in transcript.iter() {
        if !lines.is_empty() {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            title_for(entry),
            role_style(&entry.role),
        )));
        let text = body_for(entry);
        let style = if entry.text().is_some() { body } else { dim };
        for line in text.lines() {
            lines.push(Line::from(Span::styled(format!("  {line}"), style)));
        }
    }

    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{empty_transcript, reconcile};
    use serde_json::json;

    fn plain(text: &Text<'_>) -> String {
        text.lines
            .iter()
            .map(|l| {
                l.spans
                    .iter()
                    .map(|s| s.content.as_ref())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn transcript(entries: Vec<TranscriptEntry>) -> Transcript {
        reconcile(&empty_transcript(), &entries)
    }

    #[test]
    fn empty_transcript_shows_placeholder() {
        assert_eq!(plain(&render_transcript(&empty_transcript())), "No messages yet.");
    }

    #[test]
    fn renders_titles_and_bodies() {
        let t = transcript(vec![
            TranscriptEntry::new("user", json!({"text": "Fix the bug"})),
            TranscriptEntry::new("assistant", json!("On it.\nDone."))
                .with_model("opus")
                .with_created_at("2024-05-01T10:05:09Z"),
        ]);
        let rendered = plain(&render_transcript(&t));
        assert_eq!(
            rendered,
            "USER\n  Fix the bug\n\nASSISTANT (opus)  10:05:09\n  On it.\n  Done."
        );
    }

    #[test]
    fn content_parts_are_joined() {
        let t = transcript(vec![TranscriptEntry::new(
            "assistant",
            json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}),
        )]);
        assert!(plain(&render_transcript(&t)).contains("  a\n  b"));
    }

    #[test]
    fn structured_payload_falls_back_to_json() {
        let t = transcript(vec![TranscriptEntry::new(
            "tool",
            json!({"name": "Edit", "path": "src/main.rs"}),
        )]);
        let rendered = plain(&render_transcript(&t));
        assert!(rendered.starts_with("TOOL\n"));
        assert!(rendered.contains(r#""name":"Edit""#));
    }

    #[test]
    fn huge_json_is_truncated() {
        let big = "x".repeat(2000);
        let t = transcript(vec![TranscriptEntry::new("tool", json!({ "blob": big }))]);
        let rendered = plain(&render_transcript(&t));
        assert!(rendered.ends_with('…'));
        assert!(rendered.chars().count() < 500);
    }

    #[test]
    fn missing_role_gets_generic_title() {
        let t = transcript(vec![TranscriptEntry::default()]);
        assert_eq!(plain(&render_transcript(&t)), "EVENT");
    }
}
