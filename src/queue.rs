use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{eyre, Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::audio;

/// One playable track. Immutable once it's in a [`Queue`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Record {
    pub description: String,
    /// Declared length in seconds. Only used until the resource reports its own duration.
    pub duration: f64,
    /// Where to load the audio from. Usually a path on disk.
    pub uri: String,
}

impl Record {
    /// The record shown when nothing is selected (i.e., the queue is empty).
    pub fn placeholder(uri: impl Into<String>) -> Self {
        Self { description: "-".into(), duration: 5.0, uri: uri.into() }
    }

    /// Builds a record for an audio file on disk. The description is the file stem and the
    /// duration is whatever the container claims. Paths that aren't valid UTF-8 can't be stored
    /// as a uri and are rejected.
    pub fn probe(path: &Path) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| eyre!("{} is not a valid UTF-8 path", path.display()))?
            .to_owned();
        let duration = audio::probe_duration(path)
            .wrap_err_with(|| format!("couldn't probe {}", path.display()))?
            .map_or(0.0, |d| d.as_secs_f64());
        let description = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| eyre!("{} has no file name", path.display()))?;
        Ok(Self { description, duration, uri })
    }

    /// Declared duration rounded up to whole seconds. Negative and NaN durations are 0.
    pub fn duration_secs(&self) -> u64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            self.duration.ceil() as u64
        } else {
            0
        }
    }
}

/// Ordered list of records handed to the player. Read-only from the player's point of view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Queue {
    records: Vec<Record>,
}

impl Queue {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Loads a queue file, which is a JSON array of records. Relative uris are resolved against
    /// the directory the queue file lives in.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read(path).wrap_err_with(|| format!("couldn't read queue {}", path.display()))?;
        let records: Vec<Record> = serde_json::from_slice(&contents)
            .wrap_err_with(|| format!("{} is not a valid queue", path.display()))?;
        let base = path.parent().unwrap_or(Path::new(""));
        let records = records
            .into_iter()
            .map(|record| Record { uri: resolve_uri(base, &record.uri), ..record })
            .collect_vec();
        Ok(Self { records })
    }

    /// Builds a queue out of audio files, in the given order.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let records = paths.iter().map(|path| Record::probe(path)).collect::<Result<_>>()?;
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }
}

impl FromIterator<Record> for Queue {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// uris with a scheme and absolute paths are left alone
fn resolve_uri(base: &Path, uri: &str) -> String {
    if uri.is_empty() || uri.contains("://") || Path::new(uri).is_absolute() {
        uri.to_owned()
    } else {
        base.join(uri).to_string_lossy().into_owned()
    }
}
