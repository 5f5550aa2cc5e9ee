use eyre::Result;
use ratatui::{layout::Rect, widgets::Paragraph, Frame};

/// Shows how big the queue is and where in it we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePosition {
    pub size: usize,
    pub current_index: Option<usize>,
}

impl QueuePosition {
    pub fn text(&self) -> String {
        match self.current_index {
            Some(index) => format!("{} / {}", index + 1, self.size),
            None => "Queue is empty".to_owned(),
        }
    }

    pub fn draw(self, ui: &super::Ui, frame: &mut Frame, area: Rect) -> Result<()> {
        frame.render_widget(Paragraph::new(self.text()).style(ui.theme.text), area);
        Ok(())
    }
}
