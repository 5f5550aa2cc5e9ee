use eyre::Result;
use ratatui::{
    layout::Rect,
    widgets::{Paragraph, Wrap},
    Frame,
};

/// The current record's description. Wraps, and whatever doesn't fit in the area is cut off.
#[derive(Debug, Clone, Copy)]
pub struct Description<'a> {
    pub text: &'a str,
}

impl Description<'_> {
    pub fn draw(self, ui: &super::Ui, frame: &mut Frame, area: Rect) -> Result<()> {
        frame.render_widget(
            Paragraph::new(self.text).style(ui.theme.description).wrap(Wrap { trim: true }),
            area,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ui::{test_support::*, PlayerView, Ui};

    #[test]
    fn long_descriptions_are_cut_to_the_line_limit() {
        let view = PlayerView {
            queue_size: 1,
            current_index: Some(0),
            description: "one two three four five six seven eight nine ten",
            current_seconds: 0,
            total_seconds: 0,
        };
        let (buffer, layout) = render(&Ui::default(), &view, 16, 16);
        let area = layout.description.unwrap();
        assert_eq!(area.height, 2);
        assert!(row_text(&buffer, area.y).contains("one"));
        let text = all_text(&buffer);
        assert!(!text.contains("ten"), "{text}");
    }
}
