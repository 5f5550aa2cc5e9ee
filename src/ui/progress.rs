use eyre::Result;
use ratatui::{
    layout::Rect,
    symbols,
    widgets::{LineGauge, Paragraph},
    Frame,
};

use super::format_time;

/// The scrub bar, with elapsed and total time underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current_seconds: u64,
    pub total_seconds: u64,
}

impl Progress {
    /// How full the bar is. An unknown (zero) total draws an empty bar.
    pub fn ratio(&self) -> f64 {
        if self.total_seconds == 0 {
            return 0.0;
        }
        (self.current_seconds as f64 / self.total_seconds as f64).clamp(0.0, 1.0)
    }

    /// Elapsed time on the left and total time on the right of a `width`-wide line.
    pub fn times_line(&self, width: u16) -> String {
        let elapsed = format_time(self.current_seconds);
        let total = format_time(self.total_seconds);
        let gap = (width as usize).saturating_sub(elapsed.len() + total.len()).max(1);
        format!("{elapsed}{:gap$}{total}", "")
    }

    pub fn draw(self, ui: &super::Ui, frame: &mut Frame, bar: Rect, times: Rect) -> Result<()> {
        let theme = &ui.theme;
        frame.render_widget(
            LineGauge::default()
                .ratio(self.ratio())
                .label("")
                .line_set(symbols::line::THICK)
                .style(theme.text)
                .gauge_style(theme.progress_filled),
            bar,
        );
        frame.render_widget(Paragraph::new(self.times_line(times.width)).style(theme.text), times);
        Ok(())
    }
}
