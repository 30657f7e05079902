//! UI rendering with ratatui.
//!
//! Layout: a header bar, the transcript, the input box and a status bar.

use parley_core::{Message, MessageId, PayloadCategory, Placement, Role, SidePayload};
use parley_session::{ScrollTarget, ViewModel};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use serde_json::Value;

use crate::app::App;
use crate::markdown::render_markdown;

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App, view: &ViewModel) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header bar
            Constraint::Min(5),    // Transcript
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_header_bar(frame, app, view, layout[0]);
    render_transcript(frame, app, view, layout[1]);
    render_input(frame, app, view, layout[2]);
    render_status_bar(frame, app, view, layout[3]);
}

fn render_header_bar(frame: &mut Frame, app: &App, view: &ViewModel, area: Rect) {
    let title = "PARLEY";
    let right = match view.conversation {
        Some(id) => format!("{} · {id}", app.model()),
        None => format!("{} · new conversation", app.model()),
    };
    let pad = usize::from(area.width).saturating_sub(title.len() + right.chars().count());

    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(pad)),
        Span::raw(right),
    ]);
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

fn render_transcript(frame: &mut Frame, app: &App, view: &ViewModel, area: Rect) {
    let block = Block::default()
        .title(" Conversation ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);

    let transcript = Transcript::build(view, app.spinner_char(), usize::from(inner.width));
    let offset = transcript.offset(
        view.scroll,
        usize::from(inner.height),
        app.scroll_from_bottom,
    );

    let paragraph = Paragraph::new(transcript.lines)
        .block(block)
        .scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, area);
}

fn render_input(frame: &mut Frame, app: &App, view: &ViewModel, area: Rect) {
    let title = if view.is_streaming {
        " Message (answering…) "
    } else {
        " Message "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);

    // Keep the cursor visible on long input.
    let width = usize::from(inner.width.max(1));
    let skip = app.cursor_position.saturating_sub(width - 1);
    let visible: String = app.input.chars().skip(skip).collect();
    frame.render_widget(Paragraph::new(visible).block(block), area);

    let x = inner.x + u16::try_from(app.cursor_position - skip).unwrap_or(inner.width);
    frame.set_cursor_position((x, inner.y));
}

fn render_status_bar(frame: &mut Frame, app: &App, view: &ViewModel, area: Rect) {
    let line = if let Some(error) = app.error_message.as_ref().or(view.error.as_ref()) {
        Line::from(vec![
            Span::styled(
                " ERROR ",
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
            Span::styled("  (Esc to dismiss)", Style::default().fg(Color::DarkGray)),
        ])
    } else if let Some(status) = &app.status_message {
        Line::from(Span::styled(status.clone(), Style::default().fg(Color::Gray)))
    } else {
        Line::from(Span::styled(
            "Enter send · /show <text> note · PgUp/PgDn scroll · Ctrl+N new · Ctrl+C quit",
            Style::default().fg(Color::DarkGray),
        ))
    };
    frame.render_widget(Paragraph::new(line), area);
}

// =============================================================================
// Transcript
// =============================================================================

/// Transcript lines hard-wrapped to the panel width, with the first line of
/// every committed message recorded for pinning.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Wrapped lines.
    pub lines: Vec<Line<'static>>,
    /// First line index of each message.
    pub anchors: Vec<(MessageId, usize)>,
}

impl Transcript {
    /// Build the transcript for `view`.
    pub fn build(view: &ViewModel, spinner: &str, width: usize) -> Self {
        let mut transcript = Self::default();
        let width = width.max(1);

        for message in &view.messages {
            transcript.anchors.push((message.id, transcript.lines.len()));
            transcript.push_all(message_lines(message), width);
        }

        if view.is_streaming || !view.in_flight_text.is_empty() {
            let mut lines = vec![Line::from(vec![
                role_span(Role::Assistant),
                Span::styled(format!(" {spinner}"), Style::default().fg(Color::Cyan)),
            ])];
            for (category, body) in &view.in_flight_slots {
                lines.push(payload_line(&SidePayload::new(*category, body.clone())));
            }
            lines.extend(render_markdown(&view.in_flight_text));
            if let Some(status) = &view.status {
                lines.push(Line::styled(
                    status.clone(),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                ));
            }
            if view.stalled {
                lines.push(Line::styled(
                    "… still working",
                    Style::default().fg(Color::DarkGray),
                ));
            }
            transcript.push_all(lines, width);
        }

        transcript
    }

    fn push_all(&mut self, lines: Vec<Line<'static>>, width: usize) {
        for line in lines {
            self.lines.extend(hard_wrap(line, width));
        }
        self.lines.push(Line::default());
    }

    /// Scroll offset from the top for a panel `height` lines tall.
    #[must_use]
    pub fn offset(&self, target: ScrollTarget, height: usize, from_bottom: usize) -> usize {
        let bottom = self.lines.len().saturating_sub(height);
        match target {
            ScrollTarget::FollowBottom => bottom,
            ScrollTarget::Hold => bottom.saturating_sub(from_bottom),
            ScrollTarget::PinTop(id) => self
                .anchors
                .iter()
                .find(|(anchor, _)| *anchor == id)
                .map_or(bottom, |(_, line)| *line),
        }
    }
}

fn role_span(role: Role) -> Span<'static> {
    let (label, color) = match role {
        Role::User => ("you", Color::Green),
        Role::Assistant => ("assistant", Color::Cyan),
    };
    Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )
}

fn message_lines(message: &Message) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(role_span(message.role))];

    let attachment = message.attachment.as_ref().map(payload_line);
    let before = matches!(message.placement, Some(Placement::Before));
    if before {
        lines.extend(attachment.clone());
    }
    match message.role {
        Role::Assistant => lines.extend(render_markdown(&message.content)),
        Role::User => lines.extend(message.content.lines().map(|l| Line::raw(l.to_string()))),
    }
    if !before {
        lines.extend(attachment);
    }
    lines
}

fn payload_line(payload: &SidePayload) -> Line<'static> {
    let count = payload.item_count();
    let mut text = format!(
        "▸ {} ({count} item{})",
        payload.category.label(),
        if count == 1 { "" } else { "s" }
    );
    let names = item_names(&payload.body);
    if !names.is_empty() {
        text.push_str(": ");
        text.push_str(&names.join(", "));
    }
    Line::styled(text, Style::default().fg(category_color(payload.category)))
}

fn item_names(body: &Value) -> Vec<String> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("items")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
        _ => &[],
    };
    items
        .iter()
        .filter_map(|item| {
            ["title", "name"]
                .iter()
                .find_map(|key| item.get(key).and_then(Value::as_str))
        })
        .take(3)
        .map(String::from)
        .collect()
}

const fn category_color(category: PayloadCategory) -> Color {
    match category {
        PayloadCategory::Marketplace => Color::Green,
        PayloadCategory::RealEstate => Color::Magenta,
        PayloadCategory::CuratedGrid => Color::Blue,
        PayloadCategory::Apparel => Color::Yellow,
    }
}

/// Split a line into pieces at most `width` characters wide.
fn hard_wrap(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if line.width() <= width {
        return vec![line];
    }
    let mut out = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut used = 0;
    for span in line.spans {
        let mut rest: &str = &span.content;
        while !rest.is_empty() {
            let room = width - used;
            let split = rest
                .char_indices()
                .nth(room)
                .map_or(rest.len(), |(i, _)| i);
            let (head, tail) = rest.split_at(split);
            used += head.chars().count();
            current.push(Span::styled(head.to_string(), span.style));
            rest = tail;
            if used == width {
                out.push(Line::from(std::mem::take(&mut current)));
                used = 0;
            }
        }
    }
    if !current.is_empty() {
        out.push(Line::from(current));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parley_core::DraftMessage;
    use serde_json::json;

    use super::*;

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn view(messages: Vec<Message>) -> ViewModel {
        ViewModel {
            conversation: None,
            messages,
            in_flight_text: String::new(),
            in_flight_slots: BTreeMap::new(),
            status: None,
            is_streaming: false,
            stalled: false,
            error: None,
            scroll: ScrollTarget::FollowBottom,
        }
    }

    fn message(id: u64, draft: DraftMessage) -> Message {
        Message::from_draft(MessageId::new(id), draft)
    }

    #[test]
    fn hard_wrap_splits_on_character_boundaries() {
        let lines = hard_wrap(Line::raw("ééééé"), 2);
        let texts: Vec<_> = lines.iter().map(text).collect();
        assert_eq!(texts, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn attachment_respects_placement() {
        let payload = SidePayload::new(PayloadCategory::RealEstate, json!([{"title": "T2 Croix-Rousse"}]));
        let before = message(
            1,
            DraftMessage::assistant("Two flats")
                .with_attachment(payload.clone())
                .with_placement(Placement::Before),
        );
        let lines = message_lines(&before);
        assert!(text(&lines[1]).contains("T2 Croix-Rousse"));
        assert_eq!(text(&lines[2]), "Two flats");

        let after = message(2, DraftMessage::assistant("Two flats").with_attachment(payload));
        let lines = message_lines(&after);
        assert_eq!(text(&lines[1]), "Two flats");
        assert!(text(&lines[2]).contains("1 item"));
    }

    #[test]
    fn in_flight_shows_slots_status_and_stall() {
        let mut v = view(vec![]);
        v.is_streaming = true;
        v.in_flight_text = "Searching".into();
        v.in_flight_slots
            .insert(PayloadCategory::CuratedGrid, json!({"items": [{"name": "Lamp"}, {"name": "Rug"}]}));
        v.status = Some("looking up listings".into());
        v.stalled = true;

        let transcript = Transcript::build(&v, "⠋", 80);
        let texts: Vec<_> = transcript.lines.iter().map(text).collect();
        assert!(texts[0].starts_with("assistant"));
        assert!(texts[1].contains("Lamp, Rug"));
        assert!(texts.contains(&"Searching".to_string()));
        assert!(texts.contains(&"looking up listings".to_string()));
        assert!(texts.contains(&"… still working".to_string()));
    }

    #[test]
    fn offsets_follow_hold_and_pin() {
        let messages = (1..=5)
            .map(|i| message(i, DraftMessage::user(format!("line {i}"))))
            .collect();
        let v = view(messages);
        let transcript = Transcript::build(&v, "", 40);
        // Each message is a role line, a text line and a blank line.
        assert_eq!(transcript.lines.len(), 15);

        assert_eq!(transcript.offset(ScrollTarget::FollowBottom, 6, 0), 9);
        assert_eq!(transcript.offset(ScrollTarget::Hold, 6, 4), 5);
        assert_eq!(transcript.offset(ScrollTarget::Hold, 6, 100), 0);
        assert_eq!(
            transcript.offset(ScrollTarget::PinTop(MessageId::new(3)), 6, 0),
            6
        );
    }
}
