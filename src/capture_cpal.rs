use std::sync::{Arc, Mutex};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::services::AudioCaptureDevice;

/// Default system microphone via cpal
///
/// Captured audio is downmixed to mono and handed over as raw little-endian
/// `f32` PCM at [`CpalCaptureDevice::sample_rate`].
pub struct CpalCaptureDevice {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl CpalCaptureDevice {
    pub fn new() -> anyhow::Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .context("No input device available")?;

        let default_config = device
            .default_input_config()
            .context("Failed to get default input config")?;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            channels = default_config.channels(),
            sample_rate = default_config.sample_rate().0,
            "using audio input device"
        );

        Ok(CpalCaptureDevice {
            device,
            config: default_config.into(),
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl AudioCaptureDevice for CpalCaptureDevice {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::Busy);
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let buffer = Arc::clone(&self.buffer);
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut buf) = buffer.lock() else {
                        return;
                    };
                    if channels == 1 {
                        buf.extend_from_slice(data);
                    } else {
                        for frame in data.chunks(channels) {
                            buf.push(frame.iter().sum::<f32>() / channels as f32);
                        }
                    }
                },
                |err| warn!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|e| CaptureError::Device(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| CaptureError::Device(format!("failed to start input stream: {e}")))?;

        self.stream = Some(stream);
        debug!("recording started");
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        // Dropping the stream stops the callback
        self.stream.take();

        let samples = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => return Err(CaptureError::Device("capture buffer poisoned".to_string())),
        };

        debug!(
            samples = samples.len(),
            seconds = samples.len() as f32 / self.sample_rate() as f32,
            "recording stopped"
        );

        Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
    }
}

impl Drop for CpalCaptureDevice {
    fn drop(&mut self) {
        self.stream.take();
    }
}
