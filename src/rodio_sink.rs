//! Local output sink backed by rodio.
//!
//! Rodio's output stream lives on a dedicated thread. The scheduler talks
//! to it through a command channel, and the thread fires the finished
//! callback itself once the sink drains.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;

use crate::audio::{FinishedCallback, OutputSink};
use crate::track::Track;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

enum SinkCommand {
    Play {
        source: SamplesBuffer,
        serial: u64,
        on_finished: FinishedCallback,
    },
    Stop,
    Pause,
    Resume,
    Volume(f32),
}

/// Serial of the `play` the device is busy with, 0 when idle. The output
/// thread only clears the serial whose end it observed.
#[derive(Default)]
struct ActivePlay {
    current: AtomicU64,
    issued: AtomicU64,
}

impl ActivePlay {
    fn begin(&self) -> u64 {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(serial, Ordering::SeqCst);
        serial
    }

    fn finish(&self, serial: u64) {
        let _ = self
            .current
            .compare_exchange(serial, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.current.store(0, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.current.load(Ordering::SeqCst) != 0
    }
}

pub struct RodioSink {
    commands: mpsc::Sender<SinkCommand>,
    active: Arc<ActivePlay>,
    paused: AtomicBool,
    volume_bits: AtomicU32,
}

impl RodioSink {
    /// Open the default output device on a new output thread.
    pub fn open() -> Result<Self, String> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SinkCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let active = Arc::new(ActivePlay::default());
        let thread_active = active.clone();

        std::thread::Builder::new()
            .name("guild-dj-output".to_string())
            .spawn(move || {
                use rodio::{stream::OutputStreamBuilder, Sink};
                let stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to open audio output: {e}")));
                        return;
                    }
                };
                let sink = Sink::connect_new(stream.mixer());
                let _ = ready_tx.send(Ok(()));
                crate::dlog!("[Output] Rodio sink ready");
                run_output_loop(&sink, cmd_rx, &thread_active);
                crate::dlog!("[Output] Output thread ended");
            })
            .map_err(|e| format!("Failed to spawn output thread: {e}"))?;

        ready_rx
            .recv()
            .map_err(|_| "Output thread exited during startup".to_string())??;

        Ok(Self {
            commands: cmd_tx,
            active,
            paused: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
        })
    }

    fn send(&self, command: SinkCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("[Output] Output thread is gone, command dropped");
        }
    }
}

fn run_output_loop(sink: &rodio::Sink, commands: mpsc::Receiver<SinkCommand>, active: &ActivePlay) {
    let mut pending: Option<(u64, FinishedCallback)> = None;
    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(SinkCommand::Play {
                source,
                serial,
                on_finished,
            }) => {
                sink.stop();
                sink.append(source);
                sink.play();
                pending = Some((serial, on_finished));
            }
            Ok(SinkCommand::Stop) => {
                sink.stop();
                pending = None;
            }
            Ok(SinkCommand::Pause) => sink.pause(),
            Ok(SinkCommand::Resume) => sink.play(),
            Ok(SinkCommand::Volume(volume)) => sink.set_volume(volume),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if pending.is_some() && sink.empty() {
            if let Some((serial, on_finished)) = pending.take() {
                active.finish(serial);
                on_finished(None);
            }
        }
    }
    sink.stop();
}

fn pcm_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

impl OutputSink for RodioSink {
    fn play(&self, track: &Track, on_finished: FinishedCallback) -> Result<(), String> {
        let audio = track
            .audio()
            .ok_or_else(|| format!("No decoded audio for '{}'", track.title()))?;
        let source =
            SamplesBuffer::new(audio.channels, audio.sample_rate, pcm_to_f32(&audio.samples));
        self.paused.store(false, Ordering::SeqCst);
        let serial = self.active.begin();
        self.send(SinkCommand::Play {
            source,
            serial,
            on_finished,
        });
        Ok(())
    }

    fn stop(&self) {
        self.active.clear();
        self.paused.store(false, Ordering::SeqCst);
        self.send(SinkCommand::Stop);
    }

    fn is_playing(&self) -> bool {
        self.active.is_active() && !self.paused.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.send(SinkCommand::Pause);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.send(SinkCommand::Resume);
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
        self.send(SinkCommand::Volume(volume));
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_conversion_stays_in_range() {
        let converted = pcm_to_f32(&[i16::MIN, 0, 16384, i16::MAX]);
        assert_eq!(converted[0], -1.0);
        assert_eq!(converted[1], 0.0);
        assert_eq!(converted[2], 0.5);
        assert!(converted[3] < 1.0 && converted[3] > 0.99);
    }

    #[test]
    fn drained_track_does_not_idle_the_next_play() {
        let active = ActivePlay::default();
        let first = active.begin();
        active.clear();
        let second = active.begin();

        active.finish(first);
        assert!(active.is_active());

        active.finish(second);
        assert!(!active.is_active());
    }

    #[test]
    fn stop_idles_until_next_play() {
        let active = ActivePlay::default();
        assert!(!active.is_active());
        let serial = active.begin();
        active.clear();
        assert!(!active.is_active());
        active.finish(serial);
        assert!(!active.is_active());
        active.begin();
        assert!(active.is_active());
    }
}
