//! Markdown to ratatui text conversion.
//!
//! Assistant answers arrive as markdown. This renders the subset that reads
//! well in a terminal: emphasis, headings, lists, inline code and fenced
//! blocks. Links keep their text only.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Convert markdown text to styled lines.
///
/// Works on partial input; an unterminated code fence renders as code.
pub fn render_markdown(text: &str) -> Vec<Line<'static>> {
    let mut renderer = MarkdownRenderer::new();
    for event in Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH) {
        renderer.handle(event);
    }
    renderer.finish()
}

struct MarkdownRenderer {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    in_code_block: bool,
    list_stack: Vec<Option<u64>>,
}

impl MarkdownRenderer {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            current: Vec::new(),
            styles: vec![Style::default()],
            in_code_block: false,
            list_stack: Vec::new(),
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, style: Style) {
        let next = self.style().patch(style);
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.current)));
        }
    }

    fn blank(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|l| l.width() > 0) {
            self.lines.push(Line::default());
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_code_block {
            let gutter = Span::styled("│ ", Style::default().fg(Color::DarkGray));
            for line in text.lines() {
                self.lines.push(Line::from(vec![
                    gutter.clone(),
                    Span::styled(line.to_string(), Style::default().fg(Color::Yellow)),
                ]));
            }
            return;
        }
        let style = self.style();
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.flush();
            }
            if !part.is_empty() {
                self.current.push(Span::styled(part.to_string(), style));
            }
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.current.push(Span::styled(
                code.into_string(),
                Style::default().fg(Color::Yellow),
            )),
            Event::SoftBreak => self.current.push(Span::raw(" ")),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.blank();
                self.lines.push(Line::styled(
                    "─".repeat(24),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { .. } => {
                self.blank();
                self.push_style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                );
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT));
            }
            Tag::CodeBlock(_) => {
                self.blank();
                self.in_code_block = true;
            }
            Tag::List(start) => {
                if self.list_stack.is_empty() {
                    self.blank();
                } else {
                    self.flush();
                }
                self.list_stack.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.list_stack.len().saturating_sub(1);
                let marker = match self.list_stack.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.current.push(Span::raw("  ".repeat(depth)));
                self.current
                    .push(Span::styled(marker, Style::default().fg(Color::DarkGray)));
            }
            Tag::Paragraph if self.list_stack.is_empty() => self.blank(),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush();
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.lines.push(Line::default());
            }
            TagEnd::List(_) => {
                self.flush();
                self.list_stack.pop();
            }
            TagEnd::Item | TagEnd::Paragraph => self.flush(),
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        while self.lines.first().is_some_and(|l| l.width() == 0) {
            self.lines.remove(0);
        }
        while self.lines.last().is_some_and(|l| l.width() == 0) {
            self.lines.pop();
        }
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn paragraphs_are_separated_by_a_blank_line() {
        let lines = render_markdown("First.\n\nSecond.");
        assert_eq!(plain(&lines), vec!["First.", "", "Second."]);
    }

    #[test]
    fn bullet_and_ordered_lists() {
        let lines = render_markdown("- Lyon\n- Paris\n\n3. a\n4. b");
        let text = plain(&lines);
        assert!(text.contains(&"• Lyon".to_string()));
        assert!(text.contains(&"3. a".to_string()));
        assert!(text.contains(&"4. b".to_string()));
    }

    #[test]
    fn strong_text_is_bold() {
        let lines = render_markdown("a **b** c");
        let bold = &lines[0].spans[1];
        assert_eq!(bold.content, "b");
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unterminated_fence_renders_as_code() {
        let lines = render_markdown("```\nlet x = 1;");
        assert_eq!(plain(&lines), vec!["│ let x = 1;"]);
    }
}
