// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Take serialization and Standard MIDI file output.
//!
//! This module provides:
//! - The take serializer (captured events to notes and advances)
//! - Standard MIDI file encoding
//! - The file sink the session hands finished takes to

pub mod export;
pub mod serialise;
pub mod track;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::info;

pub use export::{MidiExportEvent, MidiFile, MidiFileFormat};
pub use serialise::{
    SerialiseSettings, SerialisedTake, TakeSerialiser, DRUM_CHANNEL, DRUM_NOTE_TICKS,
    EVENTS_TRACK_NAME, METADATA_TRACK_NAME, WHOLE_NOTE_TICKS,
};
pub use track::{TrackOp, TrackWriter};

use crate::capture::{CapturedEvent, Take};

/// Errors raised while turning a take into a file
#[derive(Debug, Error)]
pub enum SerialiseError {
    #[error("cannot serialise at tempo {0} BPM")]
    InvalidTempo(f64),
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SerialiseError {
    fn io(path: &Path, source: io::Error) -> Self {
        SerialiseError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File name for a take that ended at `ended_at`, e.g. `2026-17-10--21-04-09.mid`
pub fn take_file_name(ended_at: &DateTime<Local>) -> String {
    ended_at.format("%Y-%d-%-m--%H-%M-%S.mid").to_string()
}

/// Create `dir/name`, or `dir/stem-N.mid` if that file already exists.
///
/// Creation is exclusive: an existing take is never overwritten.
pub fn create_unique(dir: &Path, name: &str) -> Result<(PathBuf, File), SerialiseError> {
    let stem = name.trim_end_matches(".mid");
    let mut attempt = 0u32;
    loop {
        let path = if attempt == 0 {
            dir.join(name)
        } else {
            dir.join(format!("{}-{}.mid", stem, attempt))
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(SerialiseError::io(&path, e)),
        }
    }
}

/// Serialize `events` and write them to `path`, replacing any existing file
pub fn write_take_file(
    path: &Path,
    events: &[CapturedEvent],
    bpm: f64,
    settings: SerialiseSettings,
) -> Result<SerialisedTake, SerialiseError> {
    let serialised = TakeSerialiser::new(settings).serialise(events, bpm)?;
    let file = File::create(path).map_err(|e| SerialiseError::io(path, e))?;
    write_serialised(file, path, &serialised)?;
    Ok(serialised)
}

fn write_serialised(
    file: File,
    path: &Path,
    serialised: &SerialisedTake,
) -> Result<(), SerialiseError> {
    let mut writer = BufWriter::new(file);
    serialised
        .to_midi_file()
        .write(&mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| SerialiseError::io(path, e))
}

/// Destination for finished takes
pub trait TakeSink: Send + Sync {
    /// Persist a take, returning where it went
    fn write_take(&self, take: &Take) -> Result<PathBuf, SerialiseError>;
}

/// Writes each take to its own file in an output directory
#[derive(Debug, Clone)]
pub struct FileTakeSink {
    output_dir: PathBuf,
    settings: SerialiseSettings,
}

impl FileTakeSink {
    /// An empty `output_dir` means the current directory
    pub fn new(output_dir: impl Into<PathBuf>, settings: SerialiseSettings) -> Self {
        Self {
            output_dir: output_dir.into(),
            settings,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl TakeSink for FileTakeSink {
    fn write_take(&self, take: &Take) -> Result<PathBuf, SerialiseError> {
        if !self.output_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.output_dir)
                .map_err(|e| SerialiseError::io(&self.output_dir, e))?;
        }
        let serialised = TakeSerialiser::new(self.settings).serialise(&take.events, take.bpm)?;
        let (path, file) = create_unique(&self.output_dir, &take_file_name(&take.ended_at))?;

        info!("Saving {} events at {} BPM to {:?}", take.len(), take.bpm, path);
        write_serialised(file, &path, &serialised)?;
        info!(
            "Saved {:?}: {} notes, {} ticks",
            path,
            serialised.notes_written(),
            serialised.total_ticks()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_take_file_name_pattern() {
        let ended_at = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(take_file_name(&ended_at), "2026-07-3--09-05-02.mid");
    }

    #[test]
    fn test_create_unique_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_unique(dir.path(), "take.mid").unwrap();
        assert_eq!(first, dir.path().join("take.mid"));

        let (second, _) = create_unique(dir.path(), "take.mid").unwrap();
        assert_eq!(second, dir.path().join("take-1.mid"));
        let (third, _) = create_unique(dir.path(), "take.mid").unwrap();
        assert_eq!(third, dir.path().join("take-2.mid"));
    }

    #[test]
    fn test_same_second_takes_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileTakeSink::new(dir.path(), SerialiseSettings::default());
        let ended_at = Local::now();
        let take = Take::new(vec![CapturedEvent::note_on(1, 0, 0, 60, 100)], 120.0, ended_at);

        let first = sink.write_take(&take).unwrap();
        let second = sink.write_take(&take).unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_file_sink_writes_take() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("takes");
        let sink = FileTakeSink::new(&out, SerialiseSettings::default());
        let take = Take::new(
            vec![
                CapturedEvent::note_on(1, 0, 0, 60, 100),
                CapturedEvent::note_off(2, 500_000, 0, 60),
            ],
            120.0,
            Local::now(),
        );

        let path = sink.write_take(&take).unwrap();
        assert!(path.starts_with(&out));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("take.mid");
        let result = write_take_file(&path, &[], 120.0, SerialiseSettings::default());
        assert!(matches!(result, Err(SerialiseError::Io { .. })));
    }
}
