use eyre::Result;
use ratatui::{
    layout::{Alignment, Rect},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::Ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlButton {
    Rewind,
    PlayPause,
    Next,
}

impl ControlButton {
    pub fn label(self, ui: &Ui) -> String {
        match self {
            ControlButton::Rewind => format!("« {}", ui.rewind_seconds),
            ControlButton::PlayPause => "▶ ‖".into(),
            ControlButton::Next => "»|".into(),
        }
    }
}

/// Rewind, play/pause and next, as three bordered buttons centered in a row.
pub struct PlaybackControls;

impl PlaybackControls {
    pub const HEIGHT: u16 = 3;
    const GAP: u16 = 2;
    /// Label plus a space on either side plus the border.
    const BUTTON_WIDTH: u16 = 8;

    fn button_width(ui: &Ui, button: ControlButton) -> u16 {
        (button.label(ui).width() as u16 + 4).max(Self::BUTTON_WIDTH)
    }

    /// Splits `row` into the rects for rewind, play/pause and next.
    pub fn layout(ui: &Ui, row: Rect) -> [Rect; 3] {
        let buttons = [ControlButton::Rewind, ControlButton::PlayPause, ControlButton::Next];
        let widths = buttons.map(|button| Self::button_width(ui, button));
        let total: u16 = widths.iter().sum::<u16>() + 2 * Self::GAP;
        let mut x = row.x + row.width.saturating_sub(total) / 2;
        widths.map(|width| {
            let width = width.min(row.right().saturating_sub(x));
            let rect = Rect::new(x, row.y, width, row.height.min(Self::HEIGHT));
            x = (x + width + Self::GAP).min(row.right());
            rect
        })
    }

    pub fn draw_button(
        ui: &Ui,
        frame: &mut Frame,
        area: Rect,
        button: ControlButton,
    ) -> Result<()> {
        if area.width < 3 || area.height < Self::HEIGHT {
            return Ok(());
        }
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(ui.theme.button);
        frame.render_widget(
            Paragraph::new(button.label(ui))
                .style(ui.theme.button)
                .alignment(Alignment::Center)
                .block(block),
            area,
        );
        Ok(())
    }
}
