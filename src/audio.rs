use crate::alert::DispatchRequest;
use crate::notify::Notifier;
use anyhow::{Context, Result};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Plays an alert sound on the default output device for a fixed time
pub struct AudioNotifier {
    sound_file: PathBuf,
    duration: Duration,
    volume: f32,
}

impl AudioNotifier {
    pub fn new(sound_file: impl Into<PathBuf>, duration: Duration) -> Self {
        Self {
            sound_file: sound_file.into(),
            duration,
            volume: 1.0,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}

impl Notifier for AudioNotifier {
    fn name(&self) -> &str {
        "audio"
    }

    fn notify(&self, request: &DispatchRequest) -> Result<()> {
        tracing::debug!(zone = %request.zone_name, file = %self.sound_file.display(), "playing alert sound");
        play_for(&self.sound_file, self.duration, self.volume)
    }
}

/// Loops the sound file until `duration` has elapsed, then stops on its own
pub fn play_for(sound_file: &Path, duration: Duration, volume: f32) -> Result<()> {
    if duration.is_zero() {
        return Ok(());
    }

    let file = File::open(sound_file)
        .with_context(|| format!("Failed to open alert sound {}", sound_file.display()))?;
    let source = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to decode alert sound {}", sound_file.display()))?;

    // the stream must outlive playback
    let (_stream, stream_handle) =
        OutputStream::try_default().context("No audio output device available")?;
    let sink = Sink::try_new(&stream_handle).context("Failed to open audio sink")?;
    sink.set_volume(volume);

    sink.append(source.repeat_infinite().take_duration(duration));
    sink.sleep_until_end();

    Ok(())
}
