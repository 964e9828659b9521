//! cpal-backed driver.
//!
//! Loopback capture builds an input stream on an output device, which cpal
//! maps to WASAPI loopback on Windows. cpal streams are not `Send` on every
//! host, so each stream lives on its own thread and is controlled through a
//! command channel.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use ::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ::cpal::{
    BufferSize, Device, Host, HostId, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedBufferSize, SupportedStreamConfig,
};
use crossbeam_channel::Sender;

use super::{
    endpoint_volume, AudioDriver, CaptureStream, DataCallback, DeviceEnumerator, OutputDevice,
    OutputOptions, ShareMode,
};
use crate::endpoint::AudioEndpoint;
use crate::format::{AudioFormat, SampleFormat};
use crate::pipeline::ChannelRouter;
use crate::DriverError;

/// Driver for real audio hardware.
///
/// Endpoints are identified by device name; cpal exposes no stable endpoint
/// id.
#[derive(Debug, Clone, Copy)]
pub struct CpalDriver {
    host: HostId,
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self {
            host: ::cpal::default_host().id(),
        }
    }
}

impl CpalDriver {
    /// Creates a driver on the platform's default host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver on a specific cpal host.
    pub fn with_host(host: HostId) -> Self {
        Self { host }
    }

    /// Returns the cpal host this driver opens devices on.
    pub fn host_id(&self) -> HostId {
        self.host
    }
}

fn open_host(id: HostId) -> Result<Host, DriverError> {
    ::cpal::host_from_id(id).map_err(DriverError::backend)
}

fn find_output_device(host: HostId, name: &str) -> Result<Device, DriverError> {
    let host = open_host(host)?;
    let mut devices = host.output_devices().map_err(DriverError::backend)?;
    devices
        .find(|device| device.name().is_ok_and(|n| n == name))
        .ok_or_else(|| DriverError::backend(format!("output device '{name}' not found")))
}

fn endpoint_of(device: &Device) -> Option<AudioEndpoint> {
    let name = device.name().ok()?;
    Some(AudioEndpoint::new(name.as_str(), name.as_str()))
}

fn sample_format_of(format: ::cpal::SampleFormat) -> Result<SampleFormat, DriverError> {
    match format {
        ::cpal::SampleFormat::I16 => Ok(SampleFormat::I16),
        ::cpal::SampleFormat::I32 => Ok(SampleFormat::I32),
        ::cpal::SampleFormat::F32 => Ok(SampleFormat::F32),
        other => Err(DriverError::unsupported(format!(
            "sample format {other:?}"
        ))),
    }
}

fn capture_format(config: &SupportedStreamConfig) -> Result<AudioFormat, DriverError> {
    Ok(AudioFormat::new(
        config.sample_rate().0,
        config.channels(),
        sample_format_of(config.sample_format())?,
    ))
}

fn log_stream_error(err: ::cpal::StreamError) {
    tracing::error!("audio stream error: {}", err);
}

/// A sample type the pipe can move through its byte buffers.
trait PcmSample: SizedSample + Send + 'static {
    const WIDTH: usize;

    fn write_ne(self, out: &mut [u8]);

    fn read_ne(bytes: &[u8]) -> Self;
}

macro_rules! pcm_sample {
    ($($ty:ty => $width:literal),* $(,)?) => {
        $(
            impl PcmSample for $ty {
                const WIDTH: usize = $width;

                fn write_ne(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                fn read_ne(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; $width];
                    raw.copy_from_slice(bytes);
                    Self::from_ne_bytes(raw)
                }
            }
        )*
    };
}

pcm_sample!(i16 => 2, i32 => 4, f32 => 4);

type Reply = Sender<Result<(), DriverError>>;

enum StreamCommand {
    Play(Reply),
    Pause(Reply),
}

/// Owns a cpal stream on a dedicated thread.
///
/// Dropping the handle closes the command channel; the thread then drops the
/// stream and exits.
struct StreamThread {
    commands: Option<Sender<StreamCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    fn spawn<F>(name: String, build: F) -> Result<Self, DriverError>
    where
        F: FnOnce() -> Result<Stream, DriverError> + Send + 'static,
    {
        let (commands, inbox) = crossbeam_channel::unbounded::<StreamCommand>();
        let (ready_tx, ready) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for command in inbox {
                    match command {
                        StreamCommand::Play(reply) => {
                            let _ = reply.send(stream.play().map_err(DriverError::backend));
                        }
                        StreamCommand::Pause(reply) => {
                            let _ = reply.send(stream.pause().map_err(DriverError::backend));
                        }
                    }
                }
            })
            .map_err(|e| DriverError::backend(format!("failed to spawn stream thread: {e}")))?;

        let ready = ready
            .recv()
            .unwrap_or_else(|_| Err(DriverError::backend("stream thread exited during setup")));
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        Ok(Self {
            commands: Some(commands),
            handle: Some(handle),
        })
    }

    fn request(&self, command: fn(Reply) -> StreamCommand) -> Result<(), DriverError> {
        let gone = || DriverError::backend("stream thread is gone");
        let commands = self.commands.as_ref().ok_or_else(gone)?;

        let (reply, response) = crossbeam_channel::bounded(1);
        commands.send(command(reply)).map_err(|_| gone())?;
        response.recv().map_err(|_| gone())?
    }

    fn play(&self) -> Result<(), DriverError> {
        self.request(StreamCommand::Play)
    }

    fn pause(&self) -> Result<(), DriverError> {
        self.request(StreamCommand::Pause)
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("audio stream thread panicked");
            }
        }
    }
}

struct CpalCapture {
    host: HostId,
    device_name: String,
    config: SupportedStreamConfig,
    format: AudioFormat,
    stream: Option<StreamThread>,
}

impl CpalCapture {
    fn build_stream<T: PcmSample>(
        device: &Device,
        config: &StreamConfig,
        mut callback: DataCallback,
    ) -> Result<Stream, DriverError> {
        let mut block = Vec::new();
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &::cpal::InputCallbackInfo| {
                    block.resize(data.len() * T::WIDTH, 0);
                    for (&sample, out) in data.iter().zip(block.chunks_exact_mut(T::WIDTH)) {
                        sample.write_ne(out);
                    }
                    callback(&block);
                },
                log_stream_error,
                None,
            )
            .map_err(DriverError::backend)
    }
}

impl CaptureStream for CpalCapture {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn set_data_callback(&mut self, callback: DataCallback) -> Result<(), DriverError> {
        // Replacing a running stream is not supported; the old one is released first
        self.stream.take();

        let host = self.host;
        let name = self.device_name.clone();
        let config: StreamConfig = self.config.config();
        let sample_format = self.format.sample_format;

        let stream = StreamThread::spawn("stereo-split-capture".to_string(), move || {
            let device = find_output_device(host, &name)?;
            match sample_format {
                SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, callback),
                SampleFormat::I32 => Self::build_stream::<i32>(&device, &config, callback),
                SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, callback),
            }
        })?;

        tracing::debug!(device = %self.device_name, format = ?self.format, "loopback stream built");
        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DriverError> {
        self.stream
            .as_ref()
            .ok_or(DriverError::NotInitialized)?
            .play()
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        match &self.stream {
            Some(stream) => stream.pause(),
            None => Ok(()),
        }
    }
}

struct CpalOutput {
    host: HostId,
    device_name: String,
    channels: u16,
    buffer_size: SupportedBufferSize,
    latency: Duration,
    stream: Option<StreamThread>,
}

impl CpalOutput {
    fn stream_config(&self, format: AudioFormat) -> StreamConfig {
        let frames = u32::try_from(format.frames_for(self.latency)).unwrap_or(u32::MAX);
        let buffer_size = match self.buffer_size {
            SupportedBufferSize::Range { min, max } if (min..=max).contains(&frames) => {
                BufferSize::Fixed(frames)
            }
            _ => BufferSize::Default,
        };

        StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size,
        }
    }

    fn build_stream<T: PcmSample>(
        device: &Device,
        config: &StreamConfig,
        mut router: ChannelRouter,
    ) -> Result<Stream, DriverError> {
        let channels = usize::from(config.channels).max(1);
        let mut mono = Vec::new();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &::cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / channels * T::WIDTH, 0);
                    router.read(&mut mono);
                    for (frame, sample) in data
                        .chunks_exact_mut(channels)
                        .zip(mono.chunks_exact(T::WIDTH))
                    {
                        frame.fill(T::read_ne(sample));
                    }
                },
                log_stream_error,
                None,
            )
            .map_err(DriverError::backend)
    }
}

impl OutputDevice for CpalOutput {
    fn init(&mut self, source: ChannelRouter) -> Result<(), DriverError> {
        self.stream.take();

        let format = source.format();
        let config = self.stream_config(format);
        let host = self.host;
        let name = self.device_name.clone();
        let role = source.role();

        tracing::debug!(
            device = %self.device_name,
            %role,
            channels = config.channels,
            sample_rate = format.sample_rate,
            buffer_size = ?config.buffer_size,
            "building output stream"
        );

        let stream = StreamThread::spawn(format!("stereo-split-output-{role}"), move || {
            let device = find_output_device(host, &name)?;
            match format.sample_format {
                SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, source),
                SampleFormat::I32 => Self::build_stream::<i32>(&device, &config, source),
                SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, source),
            }
        })?;

        self.stream = Some(stream);
        Ok(())
    }

    fn play(&mut self) -> Result<(), DriverError> {
        self.stream
            .as_ref()
            .ok_or(DriverError::NotInitialized)?
            .play()
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        match &self.stream {
            Some(stream) => stream.pause(),
            None => Ok(()),
        }
    }
}

impl AudioDriver for CpalDriver {
    fn open_loopback_capture(
        &self,
        endpoint: &AudioEndpoint,
    ) -> Result<Box<dyn CaptureStream>, DriverError> {
        let device = find_output_device(self.host, endpoint.id().as_str())?;
        // Loopback captures the mix in the endpoint's output format
        let config = device
            .default_output_config()
            .map_err(DriverError::backend)?;
        let format = capture_format(&config)?;

        Ok(Box::new(CpalCapture {
            host: self.host,
            device_name: endpoint.id().as_str().to_string(),
            config,
            format,
            stream: None,
        }))
    }

    fn open_output(
        &self,
        endpoint: &AudioEndpoint,
        options: &OutputOptions,
    ) -> Result<Box<dyn OutputDevice>, DriverError> {
        if options.share_mode == ShareMode::Exclusive {
            return Err(DriverError::unsupported(
                "exclusive mode output through cpal",
            ));
        }

        let device = find_output_device(self.host, endpoint.id().as_str())?;
        let config = device
            .default_output_config()
            .map_err(DriverError::backend)?;

        Ok(Box::new(CpalOutput {
            host: self.host,
            device_name: endpoint.id().as_str().to_string(),
            channels: config.channels(),
            buffer_size: config.buffer_size().clone(),
            latency: options.latency,
            stream: None,
        }))
    }

    fn is_muted(&self, endpoint: &AudioEndpoint) -> Result<bool, DriverError> {
        endpoint_volume::is_muted(endpoint.name())
    }

    fn set_muted(&self, endpoint: &AudioEndpoint, muted: bool) -> Result<(), DriverError> {
        endpoint_volume::set_muted(endpoint.name(), muted)
    }
}

impl DeviceEnumerator for CpalDriver {
    fn output_endpoints(&self) -> Result<Vec<AudioEndpoint>, DriverError> {
        let host = open_host(self.host)?;
        let devices = host.output_devices().map_err(DriverError::backend)?;
        Ok(devices.filter_map(|device| endpoint_of(&device)).collect())
    }

    fn default_output_endpoint(&self) -> Result<Option<AudioEndpoint>, DriverError> {
        let host = open_host(self.host)?;
        Ok(host
            .default_output_device()
            .and_then(|device| endpoint_of(&device)))
    }
}
