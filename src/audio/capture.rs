//! cpal-backed capture
//!
//! The cpal stream is built and kept alive on its own thread because
//! streams are not `Send` on every platform. The handle given to the
//! session drives that thread over a command channel and reads frames
//! from the sample queue filled by the data callback.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::audio::buffer::{sample_queue, FrameReader, SampleWriter};
use crate::audio::device::{
    get_cpal_input_device, list_cpal_input_devices, CaptureBackend, CaptureStream,
    DeviceDescriptor, StreamParams,
};
use crate::constants::DEFAULT_QUEUE_CAPACITY;
use crate::error::DeviceError;

/// Capture backend using the default cpal host
pub struct CpalBackend {
    queue_capacity: usize,
}

impl CpalBackend {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl CaptureBackend for CpalBackend {
    fn list_input_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        list_cpal_input_devices()
    }

    fn open_stream(
        &self,
        device: &DeviceDescriptor,
        params: &StreamParams,
    ) -> Result<Box<dyn CaptureStream>, DeviceError> {
        let stream = CpalCaptureStream::open(&device.id, params, self.queue_capacity)?;
        Ok(Box::new(stream))
    }
}

enum Command {
    Play(Sender<Result<(), DeviceError>>),
    Pause(Sender<Result<(), DeviceError>>),
    Close,
}

/// Handle to a cpal input stream living on a dedicated thread
pub struct CpalCaptureStream {
    commands: Sender<Command>,
    reader: FrameReader,
    error_rx: Receiver<DeviceError>,
    params: StreamParams,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalCaptureStream {
    /// Build the input stream; it stays paused until `start`
    pub fn open(
        device_id: &str,
        params: &StreamParams,
        queue_capacity: usize,
    ) -> Result<Self, DeviceError> {
        let device = get_cpal_input_device(device_id)?;
        let sample_format = device
            .default_input_config()
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?
            .sample_format();

        let config = StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (writer, reader) = sample_queue(queue_capacity);
        let (error_tx, error_rx) = bounded::<DeviceError>(16);
        let (command_tx, command_rx) = bounded::<Command>(4);
        let (ready_tx, ready_rx) = bounded::<Result<(), DeviceError>>(1);

        let handle = thread::Builder::new()
            .name("cpal-capture".to_string())
            .spawn(move || {
                let stream = match build_for_format(&device, &config, sample_format, writer, error_tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for command in command_rx.iter() {
                    match command {
                        Command::Play(reply) => {
                            let _ = reply.send(
                                stream.play().map_err(|e| DeviceError::StartFailed(e.to_string())),
                            );
                        }
                        Command::Pause(reply) => {
                            let _ = reply.send(
                                stream.pause().map_err(|e| DeviceError::StopFailed(e.to_string())),
                            );
                        }
                        Command::Close => break,
                    }
                }
                // Stream is dropped here, releasing the device
            })
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(DeviceError::OpenFailed("capture thread exited".to_string()));
            }
        }

        Ok(Self {
            commands: command_tx,
            reader,
            error_rx,
            params: *params,
            thread_handle: Some(handle),
        })
    }

    fn request(
        &self,
        make: fn(Sender<Result<(), DeviceError>>) -> Command,
        on_lost: fn(String) -> DeviceError,
    ) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| on_lost("capture thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| on_lost("capture thread did not reply".to_string()))?
    }

    fn shutdown_thread(&mut self) -> Result<(), DeviceError> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        let _ = self.commands.send(Command::Close);
        handle
            .join()
            .map_err(|_| DeviceError::CloseFailed("capture thread panicked".to_string()))
    }
}

impl CaptureStream for CpalCaptureStream {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.request(Command::Play, DeviceError::StartFailed)
    }

    fn read_into(&mut self, frame: &mut [i16]) -> Result<(), DeviceError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }
        self.reader.read_frame(frame, self.params.read_timeout)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.request(Command::Pause, DeviceError::StopFailed)
    }

    fn close(mut self: Box<Self>) -> Result<(), DeviceError> {
        self.shutdown_thread()
    }
}

impl Drop for CpalCaptureStream {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_thread() {
            tracing::warn!("Capture thread shutdown: {}", e);
        }
    }
}

fn build_for_format(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    writer: SampleWriter,
    error_tx: Sender<DeviceError>,
) -> Result<cpal::Stream, DeviceError> {
    match format {
        SampleFormat::I16 => build_stream::<i16>(device, config, writer, error_tx),
        SampleFormat::I32 => build_stream::<i32>(device, config, writer, error_tx),
        SampleFormat::U16 => build_stream::<u16>(device, config, writer, error_tx),
        SampleFormat::F32 => build_stream::<f32>(device, config, writer, error_tx),
        SampleFormat::F64 => build_stream::<f64>(device, config, writer, error_tx),
        other => Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    writer: SampleWriter,
    error_tx: Sender<DeviceError>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Overflow is counted by the queue and surfaced on read
                let _ = writer.push(data.iter().map(|&s| i16::from_sample(s)).collect());
            },
            move |err| {
                let mapped = match err {
                    cpal::StreamError::DeviceNotAvailable => DeviceError::Disconnected,
                    other => DeviceError::StreamError(other.to_string()),
                };
                let _ = error_tx.try_send(mapped);
            },
            None,
        )
        .map_err(|e| DeviceError::OpenFailed(e.to_string()))
}
