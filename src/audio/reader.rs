use std::{fs::File, io::ErrorKind, path::Path, time::Duration};

use eyre::{bail, eyre, Result};
use symphonia::{
    core::{
        audio::AudioBuffer,
        codecs::{Decoder, DecoderOptions},
        errors::Error as SymphoniaError,
        formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
        units::Time,
    },
    default::get_probe,
};

/// Reads out decoded fragments from a file using Symphonia.
pub struct SymphoniaReader {
    decoder: Box<dyn Decoder>,
    format: Box<dyn FormatReader>,
    duration: Option<Duration>,
}

/// A decoded audio buffer with some extra context information.
pub struct Fragment {
    pub buffer: AudioBuffer<f32>,
    /// Timestamp of the end of this fragment within the song.
    pub timestamp: Duration,
}

/// Give up after this many consecutive decode errors.
const MAX_DECODE_ERRORS: usize = 3;

impl SymphoniaReader {
    pub(super) fn new(mss: MediaSourceStream, extension: Option<&str>) -> Result<Self> {
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }
        let format_opts: FormatOptions = FormatOptions { enable_gapless: true, ..Default::default() };
        let metadata_opts: MetadataOptions = Default::default();
        let probed = get_probe().format(&hint, mss, &format_opts, &metadata_opts)?;

        let stream = match probed.format.default_track() {
            Some(stream) => stream,
            None => bail!("couldn't find a default track"),
        };

        let params = &stream.codec_params;
        let duration = params.time_base.zip(params.n_frames).map(|(time_base, frames)| {
            let time = time_base.calc_time(frames);
            Duration::from_secs_f64(time.seconds as f64 + time.frac)
        });

        let decoder =
            symphonia::default::get_codecs().make(params, &DecoderOptions { verify: true })?;

        Ok(Self { decoder, format: probed.format, duration })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        Self::new(mss, path.as_ref().extension().and_then(|ext| ext.to_str()))
    }

    /// Total length of the stream, if the container tells us.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Try to decode a single packet.
    fn try_decode(&mut self) -> Result<Fragment, SymphoniaError> {
        let packet = self.format.next_packet()?;

        // compute timestamp
        let time_base = self
            .decoder
            .codec_params()
            .time_base
            .ok_or(SymphoniaError::DecodeError("stream has no time base"))?;
        let timestamp = time_base.calc_time(packet.ts + packet.dur);
        let timestamp = Duration::from_secs_f64(timestamp.seconds as f64 + timestamp.frac);

        let decoded = self.decoder.decode(&packet)?;
        let mut buffer = decoded.make_equivalent::<f32>();
        decoded.convert(&mut buffer);

        Ok(Fragment { buffer, timestamp })
    }

    /// Decodes the next fragment. `Ok(None)` means we hit the end of the stream; an error means
    /// decoding failed several times in a row and the stream is unusable.
    pub fn next_fragment(&mut self) -> Result<Option<Fragment>> {
        let mut last_error = None;
        for _ in 0..MAX_DECODE_ERRORS {
            match self.try_decode() {
                Ok(out) => return Ok(Some(out)),
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None)
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.map_or_else(|| eyre!("decoding failed"), Into::into))
    }

    pub(super) fn seek(&mut self, target: Duration) -> Result<()> {
        let target = Time::new(target.as_secs(), target.as_secs_f64().fract());
        self.format.seek(SeekMode::Accurate, SeekTo::Time { time: target, track_id: None })?;
        self.decoder.reset();
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(seconds: u32) -> SymphoniaReader {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(test_wav::square_wave(seconds))),
            Default::default(),
        );
        SymphoniaReader::new(mss, Some("wav")).unwrap()
    }

    #[test]
    fn test_timestamp() {
        let mut reader = reader(3);
        let mut last = None;
        while let Some(fragment) = reader.next_fragment().unwrap() {
            last = Some(fragment.timestamp);
        }
        assert_eq!(last, Some(Duration::from_secs(3)));
    }

    #[test]
    fn duration_comes_from_container() {
        assert_eq!(reader(2).duration(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn end_of_stream_is_not_an_error() {
        let mut reader = reader(1);
        while reader.next_fragment().unwrap().is_some() {}
        assert!(reader.next_fragment().unwrap().is_none());
    }

    #[test]
    fn seek_to_exact_end_is_in_range() {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(test_wav::square_wave_millis(2_500))),
            Default::default(),
        );
        let mut reader = SymphoniaReader::new(mss, Some("wav")).unwrap();
        assert_eq!(reader.duration(), Some(Duration::from_millis(2_500)));
        reader.seek(Duration::from_millis(2_500)).unwrap();
        assert!(reader.seek(Duration::from_secs(3)).is_err());
    }

    #[test]
    fn seek_moves_timestamps() {
        let mut reader = reader(3);
        reader.seek(Duration::from_secs(2)).unwrap();
        let fragment = reader.next_fragment().unwrap().unwrap();
        assert!(fragment.timestamp > Duration::from_secs(2));
    }
}
