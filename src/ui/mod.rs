pub(crate) mod controls;
pub(crate) mod description;
pub(crate) mod progress;
pub(crate) mod queue;

use eyre::Result;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    widgets::{Block, Padding},
    Frame,
};

use crate::config::{Settings, StyleSettings};

use self::{
    controls::{ControlButton, PlaybackControls},
    description::Description,
    progress::Progress,
    queue::QueuePosition,
};

#[derive(Debug, Clone)]
pub struct Ui {
    pub theme: Theme,
    pub hide_queue: bool,
    pub hide_description: bool,
    pub description_lines: u16,
    /// Shown on the rewind button.
    pub rewind_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub background: Style,
    pub text: Style,
    pub description: Style,
    pub progress_filled: Style,
    pub button: Style,
    pub padding: u16,
}

impl Theme {
    pub fn new(style: &StyleSettings) -> Self {
        let base = Style::default().bg(style.background).fg(style.foreground);
        Self {
            background: base,
            text: base,
            description: base.add_modifier(Modifier::BOLD),
            progress_filled: base.fg(style.accent),
            button: base.fg(style.accent),
            padding: style.padding,
        }
    }
}

impl Ui {
    pub fn new(settings: &Settings) -> Self {
        let ui = &settings.ui;
        Self {
            theme: Theme::new(&ui.style),
            hide_queue: ui.hide_queue,
            hide_description: ui.hide_description,
            description_lines: ui.description_lines,
            rewind_seconds: settings.player.rewind_seconds,
        }
    }
}

impl Default for Ui {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

/// Everything the widget needs to draw a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView<'a> {
    pub queue_size: usize,
    pub current_index: Option<usize>,
    pub description: &'a str,
    pub current_seconds: u64,
    pub total_seconds: u64,
}

/// Where each part of the widget goes. Used both for drawing and for figuring out what a mouse
/// click landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerLayout {
    pub queue: Option<Rect>,
    pub description: Option<Rect>,
    /// The bar itself; the elapsed/total line goes underneath it.
    pub progress: Rect,
    pub times: Rect,
    pub rewind: Rect,
    pub play_pause: Rect,
    pub next: Rect,
}

/// What a click landed on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    /// Fraction of the way along the progress bar, in `[0, 1]`.
    Progress(f64),
    Rewind,
    PlayPause,
    Next,
}

impl PlayerLayout {
    pub fn new(ui: &Ui, area: Rect) -> Self {
        let inner = Block::default().padding(Padding::uniform(ui.theme.padding)).inner(area);

        // hidden parts take up no space at all, including the gap in front of them
        let mut constraints = vec![];
        if !ui.hide_queue {
            constraints.extend([Constraint::Length(1), Constraint::Length(1)]);
        }
        if !ui.hide_description {
            constraints.extend([Constraint::Length(ui.description_lines), Constraint::Length(1)]);
        }
        constraints.extend([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(PlaybackControls::HEIGHT),
            Constraint::Min(0),
        ]);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(inner);

        let mut rows = rows.iter().copied();
        let mut take = || rows.next().unwrap_or_default();
        let queue = (!ui.hide_queue).then(|| {
            let row = take();
            take();
            row
        });
        let description = (!ui.hide_description).then(|| {
            let row = take();
            take();
            row
        });
        let progress = take();
        let times = take();
        take();
        let [rewind, play_pause, next] = PlaybackControls::layout(ui, take());

        Self { queue, description, progress, times, rewind, play_pause, next }
    }

    pub fn hit(&self, column: u16, row: u16) -> Option<Hit> {
        let contains = |rect: Rect| {
            column >= rect.x && column < rect.right() && row >= rect.y && row < rect.bottom()
        };
        if contains(self.progress) {
            let span = self.progress.width.saturating_sub(1).max(1);
            let fraction = f64::from(column - self.progress.x) / f64::from(span);
            return Some(Hit::Progress(fraction.clamp(0.0, 1.0)));
        }
        [(self.rewind, Hit::Rewind), (self.play_pause, Hit::PlayPause), (self.next, Hit::Next)]
            .into_iter()
            .find(|(rect, _)| contains(*rect))
            .map(|(_, hit)| hit)
    }
}

impl Ui {
    /// Draws the whole widget into `area`, returning the layout that was used.
    pub fn draw(&self, frame: &mut Frame, area: Rect, view: &PlayerView) -> Result<PlayerLayout> {
        let layout = PlayerLayout::new(self, area);
        frame.render_widget(Block::default().style(self.theme.background), area);

        if let Some(area) = layout.queue {
            QueuePosition { size: view.queue_size, current_index: view.current_index }
                .draw(self, frame, area)?;
        }
        if let Some(area) = layout.description {
            Description { text: view.description }.draw(self, frame, area)?;
        }
        Progress { current_seconds: view.current_seconds, total_seconds: view.total_seconds }
            .draw(self, frame, layout.progress, layout.times)?;
        for (button, area) in [
            (ControlButton::Rewind, layout.rewind),
            (ControlButton::PlayPause, layout.play_pause),
            (ControlButton::Next, layout.next),
        ] {
            PlaybackControls::draw_button(self, frame, area, button)?;
        }
        Ok(layout)
    }
}

/// Formats seconds as `mm:ss`.
pub fn format_time(seconds: u64) -> String {
    let mins = seconds / 60;
    let secs = seconds % 60;
    format!("{mins:0>2}:{secs:0>2}")
}
