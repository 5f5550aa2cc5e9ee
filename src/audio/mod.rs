use std::{
    collections::VecDeque,
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample, Stream,
};
use eyre::{eyre, Result};
use fragile::Fragile;
use log::{debug, error};
use symphonia::core::audio::SampleBuffer;

use self::reader::SymphoniaReader;

mod reader;

#[cfg(test)]
pub(crate) use self::reader::test_wav;

/// Snapshot of a [`Sound`]'s playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoundStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
}

type StatusCallback = Box<dyn Fn(SoundStatus) + Send + Sync + 'static>;

/// A loaded audio resource. Cloning gives another handle to the same resource; whoever attached
/// it to the [`Output`] is responsible for calling [`Sound::unload`].
#[derive(Clone)]
pub struct Sound {
    inner: Arc<SoundInner>,
}

struct SoundInner {
    /// Lock order: `pending` before `reader`.
    reader: Mutex<Option<SymphoniaReader>>,
    /// Interleaved samples decoded but not yet handed to the output.
    pending: Mutex<VecDeque<f32>>,
    loaded: AtomicBool,
    playing: AtomicBool,
    position_ms: AtomicU64,
    /// [`shown_secs`] of the last status update we sent, so we only notify on change.
    notified_secs: AtomicU64,
    duration: Option<Duration>,
    on_status: Mutex<Option<StatusCallback>>,
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound").field("status", &self.status()).finish()
    }
}

impl Sound {
    /// Opens and decodes the header of the file at `path` off the async runtime. The sound starts
    /// paused at `start_at`.
    pub async fn load(path: impl Into<PathBuf>, start_at: Duration) -> Result<Self> {
        let path = path.into();
        tokio::task::spawn_blocking(move || Self::load_blocking(&path, start_at)).await?
    }

    fn load_blocking(path: &Path, start_at: Duration) -> Result<Self> {
        let mut reader = SymphoniaReader::from_path(path)?;
        if !start_at.is_zero() {
            reader.seek(start_at)?;
        }
        debug!("Loaded {} at {:?}", path.display(), start_at);
        Ok(Self::from_reader(reader, start_at))
    }

    fn from_reader(reader: SymphoniaReader, position: Duration) -> Self {
        let duration = reader.duration();
        Self {
            inner: Arc::new(SoundInner {
                reader: Mutex::new(Some(reader)),
                pending: Mutex::new(VecDeque::new()),
                loaded: AtomicBool::new(true),
                playing: AtomicBool::new(false),
                position_ms: AtomicU64::new(position.as_millis() as u64),
                notified_secs: AtomicU64::new(shown_secs(position)),
                duration,
                on_status: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> SoundStatus {
        let inner = &self.inner;
        SoundStatus {
            is_loaded: inner.loaded.load(Ordering::Acquire),
            is_playing: inner.playing.load(Ordering::Acquire),
            position: Duration::from_millis(inner.position_ms.load(Ordering::Acquire)),
            duration: inner.duration,
        }
    }

    /// Registers the callback invoked whenever the status changes in a way the UI cares about:
    /// the position rounded up to whole seconds changes, playback starts or stops, a seek lands, or the
    /// resource becomes unloaded because decoding failed. Replaces any previous callback.
    pub fn set_on_status_update(&self, callback: impl Fn(SoundStatus) + Send + Sync + 'static) {
        *self.inner.on_status.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn set_playing(&self, playing: bool) -> Result<()> {
        if !self.inner.loaded.load(Ordering::Acquire) {
            return Err(eyre!("sound is not loaded"));
        }
        if self.inner.playing.swap(playing, Ordering::AcqRel) != playing {
            self.notify();
        }
        Ok(())
    }

    pub fn seek(&self, target: Duration) -> Result<()> {
        let mut pending = self.inner.pending.lock().unwrap();
        let mut reader = self.inner.reader.lock().unwrap();
        let Some(reader) = reader.as_mut() else {
            return Err(eyre!("sound is not loaded"));
        };
        reader.seek(target)?;
        pending.clear();
        self.set_position(target);
        drop(pending);
        self.notify();
        Ok(())
    }

    /// Releases the decoder and any buffered audio. Unloading twice is a no-op.
    pub fn unload(&self) {
        if !self.inner.loaded.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.playing.store(false, Ordering::Release);
        let mut pending = self.inner.pending.lock().unwrap();
        pending.clear();
        *self.inner.reader.lock().unwrap() = None;
        // nobody should hear about a resource that's been released on purpose
        *self.inner.on_status.lock().unwrap() = None;
    }

    /// Whether both handles refer to the same resource.
    #[cfg(test)]
    pub(crate) fn same_as(&self, other: &Sound) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn set_position(&self, position: Duration) {
        self.inner.position_ms.store(position.as_millis() as u64, Ordering::Release);
    }

    fn notify(&self) {
        let status = self.status();
        self.inner.notified_secs.store(shown_secs(status.position), Ordering::Release);
        if let Some(callback) = self.inner.on_status.lock().unwrap().as_ref() {
            callback(status);
        }
    }

    /// Writes the next samples into `data`, decoding as needed. Writes silence when paused.
    fn fill(&self, data: &mut [f32]) {
        if !self.inner.playing.load(Ordering::Acquire) {
            data.fill(f32::EQUILIBRIUM);
            return;
        }

        let mut pending = self.inner.pending.lock().unwrap();
        let mut changed = false;
        while pending.len() < data.len() {
            let next = match self.inner.reader.lock().unwrap().as_mut() {
                Some(reader) => reader.next_fragment(),
                None => break,
            };
            match next {
                Ok(Some(fragment)) => {
                    let buffer = &fragment.buffer;
                    let mut samples = SampleBuffer::new(buffer.capacity() as u64, *buffer.spec());
                    samples.copy_interleaved_typed(buffer);
                    pending.extend(samples.samples());
                    self.set_position(fragment.timestamp);
                    if shown_secs(fragment.timestamp)
                        != self.inner.notified_secs.load(Ordering::Acquire)
                    {
                        changed = true;
                    }
                }
                Ok(None) => {
                    self.inner.playing.store(false, Ordering::Release);
                    changed = true;
                    break;
                }
                Err(e) => {
                    error!("Error while decoding audio: {e}");
                    self.inner.playing.store(false, Ordering::Release);
                    self.inner.loaded.store(false, Ordering::Release);
                    *self.inner.reader.lock().unwrap() = None;
                    changed = true;
                    break;
                }
            }
        }

        let available = pending.len().min(data.len());
        for (dst, src) in data.iter_mut().zip(pending.drain(..available)) {
            *dst = src;
        }
        data[available..].fill(f32::EQUILIBRIUM);
        drop(pending);

        if changed {
            self.notify();
        }
    }
}

/// A position in whole seconds, rounded up the same way the player displays it.
fn shown_secs(position: Duration) -> u64 {
    position.as_millis().div_ceil(1000) as u64
}

/// Total length of the audio file at `path`, if the container says.
pub fn probe_duration(path: &Path) -> Result<Option<Duration>> {
    Ok(SymphoniaReader::from_path(path)?.duration())
}

/// Streams audio to the underlying OS audio library. We set the stream up once and never change
/// it; attaching a [`Sound`] just changes what the stream pulls samples from.
pub struct Output {
    current: Arc<Mutex<Option<Sound>>>,
    /// Wrapped in [`Fragile`] since `Stream` isn't `Send` on every platform. `None` when nothing
    /// is pulling from the output.
    _stream: Option<Fragile<Stream>>,
}

impl Output {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device =
            host.default_output_device().ok_or_else(|| eyre!("no default output device"))?;
        let current: Arc<Mutex<Option<Sound>>> = Arc::new(Mutex::new(None));
        let current_clone = Arc::clone(&current);

        let config = device.default_output_config()?.config();
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _| match current_clone.lock().unwrap().as_ref() {
                Some(sound) => sound.fill(data),
                // no data, so just zero the entire thing
                None => data.fill(f32::EQUILIBRIUM),
            },
            |e| {
                error!("Error while streaming audio out: {e}");
            },
            None,
        )?;
        stream.play()?;
        Ok(Self { current, _stream: Some(Fragile::new(stream)) })
    }

    /// An output with no device behind it. Sounds can be attached but are never played.
    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        Self { current: Arc::default(), _stream: None }
    }

    #[cfg(test)]
    pub(crate) fn attached(&self) -> Option<Sound> {
        self.current.lock().unwrap().clone()
    }

    /// Makes `sound` the thing we're playing, returning whatever was attached before.
    pub fn attach(&self, sound: Sound) -> Option<Sound> {
        self.current.lock().unwrap().replace(sound)
    }

    pub fn detach(&self) -> Option<Sound> {
        self.current.lock().unwrap().take()
    }
}
