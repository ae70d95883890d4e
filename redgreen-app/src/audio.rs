use crate::config::AudioConfig;
use redgreen_core::SyncSignal;
use redgreen_experiment::ToneSpec;
use rodio::source::{SineWave, Source};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct Output {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

/// Start/end tones. The output stream opens on the first key press; until
/// then, and if opening fails, signals are silent.
pub struct SyncTones {
    config: AudioConfig,
    output: Option<Output>,
    start_clip: Option<Arc<[u8]>>,
    end_clip: Option<Arc<[u8]>>,
    opened: bool,
}

impl SyncTones {
    pub fn new(config: AudioConfig) -> Self {
        let start_clip = config.start_file.as_deref().and_then(read_clip);
        let end_clip = config.end_file.as_deref().and_then(read_clip);
        Self {
            config,
            output: None,
            start_clip,
            end_clip,
            opened: false,
        }
    }

    /// Opens the output device once.
    pub fn ensure_open(&mut self) {
        if !self.config.enabled || std::mem::replace(&mut self.opened, true) {
            return;
        }
        match OutputStream::try_default() {
            Ok((stream, handle)) => {
                debug!("audio output opened");
                self.output = Some(Output {
                    _stream: stream,
                    handle,
                });
            }
            Err(e) => warn!("audio disabled: {e}"),
        }
    }

    pub fn play(&self, signal: SyncSignal) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        let sink = match Sink::try_new(&output.handle) {
            Ok(sink) => sink,
            Err(e) => {
                warn!("could not play {signal:?} tone: {e}");
                return;
            }
        };
        sink.set_volume(self.config.volume);

        let clip = match signal {
            SyncSignal::Start => self.start_clip.as_ref(),
            SyncSignal::End => self.end_clip.as_ref(),
        };
        if let Some(bytes) = clip {
            match Decoder::new(Cursor::new(Arc::clone(bytes))) {
                Ok(source) => sink.append(source),
                Err(e) => {
                    warn!("could not decode {signal:?} clip: {e}");
                    return;
                }
            }
        } else {
            let tone = self.tone(signal);
            sink.append(SineWave::new(tone.frequency_hz).take_duration(tone.duration));
        }
        sink.detach();
    }

    fn tone(&self, signal: SyncSignal) -> ToneSpec {
        let frequency_hz = match signal {
            SyncSignal::Start => self.config.start_hz,
            SyncSignal::End => self.config.end_hz,
        };
        ToneSpec {
            frequency_hz,
            duration: Duration::from_millis(self.config.tone_ms),
        }
    }
}

fn read_clip(path: &Path) -> Option<Arc<[u8]>> {
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes.into()),
        Err(e) => {
            warn!("could not read audio clip {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tones_follow_config() {
        let tones = SyncTones::new(AudioConfig {
            end_hz: 440.0,
            tone_ms: 80,
            ..AudioConfig::default()
        });
        assert_eq!(tones.tone(SyncSignal::Start).frequency_hz, 1000.0);
        let end = tones.tone(SyncSignal::End);
        assert_eq!(end.frequency_hz, 440.0);
        assert_eq!(end.duration, Duration::from_millis(80));
    }

    #[test]
    fn silent_until_opened() {
        let tones = SyncTones::new(AudioConfig::default());
        // No device has been opened yet, so this is a no-op.
        tones.play(SyncSignal::Start);
        assert!(tones.output.is_none());
    }

    #[test]
    fn missing_clip_falls_back_to_tone() {
        let tones = SyncTones::new(AudioConfig {
            start_file: Some("/nonexistent/start.wav".into()),
            ..AudioConfig::default()
        });
        assert!(tones.start_clip.is_none());
    }
}
