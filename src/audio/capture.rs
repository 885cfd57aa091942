use crate::config::AudioConfig;
use crate::error::{Result, ScopeError};
use crate::processor::{FreeRunningTransport, PhaseProcessor};
use audio_thread_priority::RtPriorityHandle;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Names of the default host's input devices.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| ScopeError::AudioDevice(format!("{}", e)))?;
    Ok(devices
        .filter_map(|device| device.description().ok())
        .map(|desc| desc.name().to_string())
        .collect())
}

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    let Some(name) = name else {
        return host
            .default_input_device()
            .ok_or_else(|| ScopeError::AudioDevice("No input device found".into()));
    };
    host.input_devices()
        .map_err(|e| ScopeError::AudioDevice(format!("{}", e)))?
        .find(|device| {
            device
                .description()
                .map(|desc| desc.name() == name)
                .unwrap_or(false)
        })
        .ok_or_else(|| ScopeError::AudioDevice(format!("Input device not found: {}", name)))
}

/// Live input driving a [`PhaseProcessor`] from the device callback.
///
/// The callback deinterleaves into scratch buffers allocated up front and
/// runs the processor with a free-running transport at a fixed tempo.
pub struct AudioCapture {
    stream: cpal::Stream,
    _rt_handle: Option<RtPriorityHandle>,
}

impl AudioCapture {
    pub fn new(
        config: &AudioConfig,
        device_name: Option<&str>,
        mut processor: PhaseProcessor,
        bpm: f64,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_input_device(&host, device_name)?;

        match device.description() {
            Ok(desc) => log::info!("Input device: {:?}", desc),
            Err(_) => log::info!("Input device: Unknown"),
        }

        let channels = config.channels.clamp(1, 2) as usize;
        let stream_config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size as u32),
        };

        processor.prepare(config.sample_rate as f64);
        let mut transport = FreeRunningTransport::new(bpm);
        let block_frames = config.buffer_size.max(1);
        let mut scratch = [vec![0.0f32; block_frames], vec![0.0f32; block_frames]];

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // hosts may deliver more than the requested buffer size
                    for chunk in data.chunks(block_frames * channels) {
                        let frames = chunk.len() / channels;
                        let [left, right] = &mut scratch;
                        for (i, frame) in chunk.chunks_exact(channels).enumerate() {
                            left[i] = frame[0];
                            right[i] = frame[channels - 1];
                        }
                        let mut blocks: [&mut [f32]; 2] =
                            [&mut left[..frames], &mut right[..frames]];
                        processor.process_block(
                            &mut blocks[..channels],
                            Some(transport.advance(frames)),
                        );
                    }
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| ScopeError::AudioStream(format!("{}", e)))?;

        let rt_handle = audio_thread_priority::promote_current_thread_to_real_time(
            config.buffer_size as u32,
            config.sample_rate,
        );

        let rt_handle = match rt_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Could not set real-time priority: {}", e);
                None
            }
        };

        stream
            .play()
            .map_err(|e| ScopeError::AudioStream(format!("{}", e)))?;

        log::info!(
            "Capturing {} channel(s) at {} Hz, {} BPM",
            channels,
            config.sample_rate,
            bpm
        );

        Ok(Self {
            stream,
            _rt_handle: rt_handle,
        })
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        let _ = self.stream.pause();
    }
}
