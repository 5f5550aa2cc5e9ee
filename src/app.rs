use std::{collections::VecDeque, io::Stdout};

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use educe::Educe;
use eyre::Result;
use log::{debug, error, info};
use ratatui::{backend::CrosstermBackend, prelude::Backend, Terminal};
use tokio::{
    pin,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};

use crate::{
    audio::{Output, Sound, SoundStatus},
    config::Settings,
    player::{Action, Effect, PlayerState},
    queue::{Queue, Record},
    ui::{Hit, PlayerLayout, PlayerView, Ui},
};

pub struct App {
    player: PlayerState,
    output: Output,
    /// The sound that's attached to the output, along with its generation.
    sound: Option<(u64, Sound)>,
    /// A sound that just finished loading and is waiting for the player to say whether it's
    /// still wanted.
    incoming: Option<(u64, Sound)>,
    settings: Settings,
    ui: Ui,
    /// Layout from the last draw, for mapping mouse clicks.
    layout: Option<PlayerLayout>,
    should_quit: bool,

    tx_message: UnboundedSender<Message>,
    rx_message: Option<UnboundedReceiver<Message>>,
}

impl App {
    /// Creates an app playing through the default audio device.
    pub fn new(queue: Queue, settings: Settings) -> Result<Self> {
        Ok(Self::with_output(queue, settings, Output::new()?))
    }

    pub fn with_output(queue: Queue, settings: Settings, output: Output) -> Self {
        let (tx_message, rx_message) = unbounded_channel::<Message>();
        let placeholder = Record::placeholder(settings.player.placeholder_uri.clone());
        let player = PlayerState::new(queue, placeholder, settings.player.rewind_seconds);

        Self {
            player,
            output,
            sound: None,
            incoming: None,
            ui: Ui::new(&settings),
            settings,
            layout: None,
            should_quit: false,

            tx_message,
            rx_message: Some(rx_message),
        }
    }

    pub async fn run(
        mut self,
        terminal_events: impl Stream<Item = Event> + Send + Sync + 'static,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> Result<()> {
        pin!(terminal_events);
        let rx_message = self.rx_message.take().expect("run() called twice");
        let mut event_stream = AppEvent::stream(terminal_events, rx_message);

        self.apply(Action::LoadRecord);
        self.draw(terminal)?;
        while let Some(event) = event_stream.next().await {
            let message = match event {
                AppEvent::Terminal(terminal_event) => self.lookup_binding(terminal_event),
                AppEvent::Message(message) => Some(message),
            };
            if let Some(message) = message {
                debug!("Received message {message:?}");
                self.dispatch(message);
            }
            if self.should_quit {
                break;
            }
            self.draw(terminal)?;
        }

        self.apply(Action::Teardown);
        Ok(())
    }

    pub fn draw<T: Backend>(&mut self, terminal: &mut Terminal<T>) -> Result<()> {
        let record = self.player.record();
        let view = PlayerView {
            queue_size: self.player.queue().len(),
            current_index: self.player.current_record_index(),
            description: &record.description,
            current_seconds: self.player.current_time(),
            total_seconds: self.player.total_duration(),
        };
        let mut layout = None;
        terminal.draw(|f| {
            let area = f.size();
            layout = Some(self.ui.draw(f, area, &view).expect("failed to render app"))
        })?;
        self.layout = layout;
        Ok(())
    }

    fn lookup_binding(&self, ev: Event) -> Option<Message> {
        let command = match ev {
            Event::Key(KeyEvent { code, kind: KeyEventKind::Press, .. }) => {
                key_to_command(code, &self.settings)
            }
            Event::Mouse(MouseEvent {
                kind: MouseEventKind::Down(MouseButton::Left), column, row, ..
            }) => self.click_to_command(column, row),
            _ => None,
        };
        command.map(Message::Command)
    }

    fn click_to_command(&self, column: u16, row: u16) -> Option<Command> {
        let command = match self.layout?.hit(column, row)? {
            Hit::Progress(fraction) => {
                Command::Scrub(fraction * self.player.total_duration() as f64)
            }
            Hit::Rewind => Command::Rewind,
            Hit::PlayPause => Command::PlayPause,
            Hit::Next => Command::Next,
        };
        Some(command)
    }
}

/// A [`Message`] is anything the event loop reacts to.
#[derive(Debug)]
pub enum Message {
    Command(Command),
    Sound(SoundMessage),
}

/// Things the audio engine tells us, tagged with the generation of the sound they're about.
#[derive(Educe)]
#[educe(Debug)]
pub enum SoundMessage {
    Loaded {
        generation: u64,
        #[educe(Debug(ignore))]
        result: Result<Sound>,
    },
    Status {
        generation: u64,
        status: SoundStatus,
    },
}

/// A [`Command`] corresponds to a single user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Rewind,
    PlayPause,
    Next,
    /// Scrub to the given second.
    Scrub(f64),
    /// Scrub relative to the current position.
    ScrubBy(i64),
    Quit,
}

pub fn key_to_command(key: KeyCode, settings: &Settings) -> Option<Command> {
    let scrub = settings.player.scrub_seconds as i64;
    let command = match key {
        KeyCode::Char('z') => Command::Rewind,
        KeyCode::Char('x') | KeyCode::Char(' ') => Command::PlayPause,
        KeyCode::Char('c') | KeyCode::Char('n') => Command::Next,
        KeyCode::Left => Command::ScrubBy(-scrub),
        KeyCode::Right => Command::ScrubBy(scrub),
        KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
        _ => return None,
    };
    Some(command)
}

impl App {
    fn dispatch(&mut self, message: Message) {
        match message {
            Message::Command(command) => self.dispatch_command(command),
            Message::Sound(SoundMessage::Loaded { generation, result: Ok(sound) }) => {
                let duration = sound.status().duration;
                self.incoming = Some((generation, sound));
                self.apply(Action::ResourceReady { generation, duration });
                // the player didn't want it
                if let Some((_, sound)) = self.incoming.take() {
                    sound.unload();
                }
            }
            Message::Sound(SoundMessage::Loaded { generation, result: Err(e) }) => {
                self.apply(Action::ResourceFailed { generation, error: format!("{e:#}") });
            }
            Message::Sound(SoundMessage::Status { generation, status }) => {
                self.apply(Action::Tick { generation, status });
            }
        }
    }

    fn dispatch_command(&mut self, command: Command) {
        let action = match command {
            Command::Rewind => Action::Rewind,
            Command::PlayPause => Action::PlayPause,
            Command::Next => Action::Next,
            Command::Scrub(seconds) => Action::Scrub(seconds),
            Command::ScrubBy(delta) => {
                Action::Seek(self.player.current_time().saturating_add_signed(delta))
            }
            Command::Quit => {
                self.should_quit = true;
                return;
            }
        };
        self.apply(action);
    }

    /// Runs `action` through the player and carries out whatever it asks for, along with any
    /// actions that carrying it out produced.
    fn apply(&mut self, action: Action) {
        let mut actions = VecDeque::from([action]);
        while let Some(action) = actions.pop_front() {
            for effect in self.player.dispatch(action) {
                actions.extend(self.execute(effect));
            }
        }
    }

    /// Carries out `effect`. Returns an action if the audio engine's answer has to go back to
    /// the player right away.
    fn execute(&mut self, effect: Effect) -> Option<Action> {
        match effect {
            Effect::Load { generation, uri, start_at } => {
                info!("Loading sound {generation} from {uri}");
                let tx_message = self.tx_message.clone();
                tokio::spawn(async move {
                    let result = Sound::load(uri, start_at).await;
                    let message = Message::Sound(SoundMessage::Loaded { generation, result });
                    let _ = tx_message.send(message);
                });
            }
            Effect::Attach { generation } => {
                let (incoming, sound) = self.incoming.take()?;
                if incoming != generation {
                    self.incoming = Some((incoming, sound));
                    return None;
                }
                let tx_message = self.tx_message.clone();
                sound.set_on_status_update(move |status| {
                    let message = Message::Sound(SoundMessage::Status { generation, status });
                    let _ = tx_message.send(message);
                });
                if let Some(previous) = self.output.attach(sound.clone()) {
                    // the player always unloads before loading, so this shouldn't happen
                    error!("Sound {generation} replaced a sound that was never unloaded");
                    previous.unload();
                }
                self.sound = Some((generation, sound));
            }
            Effect::Discard { generation } => {
                if let Some(sound) = take_generation(&mut self.incoming, generation) {
                    debug!("Discarding stale sound {generation}");
                    sound.unload();
                }
            }
            Effect::Unload { generation } => {
                if let Some(sound) = take_generation(&mut self.sound, generation) {
                    info!("Unloading sound {generation}");
                    self.output.detach();
                    sound.unload();
                }
            }
            Effect::Seek { generation, to } => {
                let sound = self.current_sound(generation)?;
                if let Err(e) = sound.seek(to) {
                    return Some(Action::SeekFailed {
                        generation,
                        position: sound.status().position,
                        error: format!("couldn't seek to {to:?}: {e:#}"),
                    });
                }
            }
            Effect::TogglePlayback { generation } => {
                let sound = self.current_sound(generation)?;
                let status = sound.status();
                if !status.is_loaded {
                    info!("Not loaded yet, cannot play");
                    return None;
                }
                let verb = if status.is_playing { "Pausing" } else { "Playing" };
                info!("{verb} sound {generation}");
                if let Err(e) = sound.set_playing(!status.is_playing) {
                    error!("Toggling sound {generation} failed: {e:#}");
                }
            }
            Effect::Report(diagnostic) => diagnostic.log(),
        }
        None
    }

    fn current_sound(&self, generation: u64) -> Option<&Sound> {
        self.sound.as_ref().filter(|(current, _)| *current == generation).map(|(_, sound)| sound)
    }
}

/// Empties `slot` if it holds the sound for `generation`.
fn take_generation(slot: &mut Option<(u64, Sound)>, generation: u64) -> Option<Sound> {
    match slot {
        Some((current, _)) if *current == generation => slot.take().map(|(_, sound)| sound),
        _ => None,
    }
}

enum AppEvent {
    Terminal(Event),
    Message(Message),
}

impl AppEvent {
    fn stream(
        terminal_events: impl Stream<Item = Event>,
        rx_message: UnboundedReceiver<Message>,
    ) -> impl Stream<Item = Self> {
        UnboundedReceiverStream::new(rx_message)
            .map(AppEvent::Message)
            .merge(terminal_events.map(AppEvent::Terminal))
    }
}
