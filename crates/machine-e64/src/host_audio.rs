//! Host audio output through cpal.
//!
//! The sound chip's output is pushed into a shared sample queue that the cpal
//! callback drains. The stream stays paused until the scheduler decides
//! enough audio is buffered.

use std::collections::VecDeque;
use std::mem::size_of;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, warn};

use crate::audio::AudioQueue;
use crate::error::{MachineError, Result};

const AUDIO_CHANNELS: u16 = 1;
/// Queue cap, in seconds of audio.
const AUDIO_QUEUE_SECONDS: usize = 2;

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

/// Mono f32 output on the default device.
pub struct CpalAudioQueue {
    stream: cpal::Stream,
    queue: SampleQueue,
    max_samples: usize,
    started: bool,
}

impl CpalAudioQueue {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MachineError::Audio("no default audio output device".into()))?;

        let desired = device
            .supported_output_configs()
            .map_err(|e| MachineError::Audio(format!("failed to query output configs: {e}")))?
            .filter(|cfg| cfg.channels() == AUDIO_CHANNELS)
            .find(|cfg| {
                cfg.min_sample_rate().0 <= sample_rate && sample_rate <= cfg.max_sample_rate().0
            })
            .ok_or_else(|| {
                MachineError::Audio(format!("no mono output config supports {sample_rate} Hz"))
            })?;

        let sample_format = desired.sample_format();
        let config = desired
            .with_sample_rate(cpal::SampleRate(sample_rate))
            .config();

        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
        let callback_queue = Arc::clone(&queue);
        let on_error = |err: cpal::StreamError| error!("audio stream error: {err}");
        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| fill_f32(data, &callback_queue),
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _| fill_i16(data, &callback_queue),
                on_error,
                None,
            ),
            other => {
                return Err(MachineError::Audio(format!(
                    "unsupported audio sample format: {other:?}"
                )));
            }
        }
        .map_err(|e| MachineError::Audio(format!("failed to build audio stream: {e}")))?;

        if let Err(e) = stream.pause() {
            warn!("cannot pause audio stream: {e}");
        }

        Ok(Self {
            stream,
            queue,
            max_samples: sample_rate as usize * AUDIO_QUEUE_SECONDS,
            started: false,
        })
    }

    /// Queue samples for playback. The oldest samples are dropped past the cap.
    pub fn push_samples(&self, samples: &[f32]) {
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        queue.extend(samples.iter().copied());
        while queue.len() > self.max_samples {
            let _ = queue.pop_front();
        }
    }
}

impl AudioQueue for CpalAudioQueue {
    fn queued_bytes(&self) -> usize {
        self.queue
            .lock()
            .map_or(0, |queue| queue.len() * size_of::<f32>())
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        match self.stream.play() {
            Ok(()) => {
                self.started = true;
                debug!("audio playback started");
            }
            Err(e) => warn!("cannot start audio stream: {e}"),
        }
    }
}

fn fill_f32(data: &mut [f32], queue: &SampleQueue) {
    let Ok(mut guard) = queue.lock() else {
        data.fill(0.0);
        return;
    };
    for sample in data {
        *sample = guard.pop_front().unwrap_or(0.0);
    }
}

fn fill_i16(data: &mut [i16], queue: &SampleQueue) {
    let Ok(mut guard) = queue.lock() else {
        data.fill(0);
        return;
    };
    for sample in data {
        let value = guard.pop_front().unwrap_or(0.0).clamp(-1.0, 1.0);
        *sample = (value * f32::from(i16::MAX)) as i16;
    }
}
