//! Simulated capture device
//!
//! Produces scripted frames, a test tone or silence without audio
//! hardware. Every stream call is recorded in a shared [`StreamProbe`]
//! so callers can check what happened to the device.

use parking_lot::Mutex;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::device::{CaptureBackend, CaptureStream, DeviceDescriptor, StreamParams};
use crate::error::DeviceError;

/// Identifier of the single simulated device
pub const SIMULATED_DEVICE_ID: &str = "sim:0";

/// What a simulated stream yields
#[derive(Debug, Clone)]
pub enum SimulatedSource {
    /// These frames in order, then reads block until their timeout
    Script(Vec<Vec<i16>>),
    /// A sine tone paced at real time
    Tone { frequency: f64, amplitude: i16 },
}

/// Calls made against simulated streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCall {
    Open,
    Start,
    Stop,
    Close,
}

/// Shared record of stream activity
#[derive(Debug, Default)]
pub struct StreamProbe {
    calls: Mutex<Vec<StreamCall>>,
    frames_read: AtomicUsize,
}

impl StreamProbe {
    fn record(&self, call: StreamCall) {
        self.calls.lock().push(call);
    }

    /// All calls in the order they were made
    pub fn calls(&self) -> Vec<StreamCall> {
        self.calls.lock().clone()
    }

    /// Frames handed out by successful reads
    pub fn frames_read(&self) -> usize {
        self.frames_read.load(Ordering::SeqCst)
    }
}

/// Capture backend with one simulated input device
pub struct SimulatedBackend {
    device: DeviceDescriptor,
    source: SimulatedSource,
    fail_open: Option<DeviceError>,
    fail_start: Option<DeviceError>,
    fail_stop: Option<DeviceError>,
    disconnect_when_exhausted: bool,
    open_delay: Duration,
    probe: Arc<StreamProbe>,
}

impl SimulatedBackend {
    /// Backend whose streams yield `frames` and then block
    pub fn scripted(frames: Vec<Vec<i16>>) -> Self {
        Self::with_source(SimulatedSource::Script(frames))
    }

    /// Backend whose streams play a tone forever
    pub fn tone(frequency: f64, amplitude: i16) -> Self {
        Self::with_source(SimulatedSource::Tone { frequency, amplitude })
    }

    fn with_source(source: SimulatedSource) -> Self {
        Self {
            device: DeviceDescriptor {
                id: SIMULATED_DEVICE_ID.to_string(),
                name: "Simulated Microphone".to_string(),
                max_input_channels: 2,
                default_input_latency: Some(Duration::from_millis(10)),
                is_default: true,
            },
            source,
            fail_open: None,
            fail_start: None,
            fail_stop: None,
            disconnect_when_exhausted: false,
            open_delay: Duration::ZERO,
            probe: Arc::new(StreamProbe::default()),
        }
    }

    /// Make `open_stream` fail
    pub fn fail_open(mut self, err: DeviceError) -> Self {
        self.fail_open = Some(err);
        self
    }

    /// Make `start` fail on opened streams
    pub fn fail_start(mut self, err: DeviceError) -> Self {
        self.fail_start = Some(err);
        self
    }

    /// Make `stop` fail on opened streams
    pub fn fail_stop(mut self, err: DeviceError) -> Self {
        self.fail_stop = Some(err);
        self
    }

    /// Report the device as unplugged once the script runs out
    pub fn disconnect_when_exhausted(mut self) -> Self {
        self.disconnect_when_exhausted = true;
        self
    }

    /// Make `open_stream` take this long, like a slow audio driver
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn probe(&self) -> Arc<StreamProbe> {
        self.probe.clone()
    }

    pub fn device(&self) -> DeviceDescriptor {
        self.device.clone()
    }
}

impl CaptureBackend for SimulatedBackend {
    fn list_input_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        Ok(vec![self.device.clone()])
    }

    fn open_stream(
        &self,
        device: &DeviceDescriptor,
        params: &StreamParams,
    ) -> Result<Box<dyn CaptureStream>, DeviceError> {
        if device.id != self.device.id {
            return Err(DeviceError::NotFound(device.id.clone()));
        }
        if !self.open_delay.is_zero() {
            thread::sleep(self.open_delay);
        }
        if let Some(err) = &self.fail_open {
            return Err(err.clone());
        }
        self.probe.record(StreamCall::Open);

        Ok(Box::new(SimulatedStream {
            source: self.source.clone(),
            params: *params,
            fail_start: self.fail_start.clone(),
            fail_stop: self.fail_stop.clone(),
            disconnect_when_exhausted: self.disconnect_when_exhausted,
            probe: self.probe.clone(),
            started: false,
            position: 0,
            next_deadline: None,
        }))
    }
}

/// Stream handed out by [`SimulatedBackend`]
pub struct SimulatedStream {
    source: SimulatedSource,
    params: StreamParams,
    fail_start: Option<DeviceError>,
    fail_stop: Option<DeviceError>,
    disconnect_when_exhausted: bool,
    probe: Arc<StreamProbe>,
    started: bool,
    /// Script index, or running sample-frame counter for tones
    position: usize,
    next_deadline: Option<Instant>,
}

impl SimulatedStream {
    fn fill_tone(&mut self, frame: &mut [i16], frequency: f64, amplitude: i16) {
        let channels = self.params.channels.max(1) as usize;
        let rate = self.params.sample_rate.max(1) as f64;

        for (i, chunk) in frame.chunks_mut(channels).enumerate() {
            let t = (self.position + i) as f64 / rate;
            let value = (TAU * frequency * t).sin() * amplitude as f64;
            chunk.fill(value as i16);
        }
        self.position += frame.len() / channels;
    }

    /// Sleep so tone frames come out at the device's real-time rate
    fn pace(&mut self) {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline.max(now) + self.params.frame_duration());
    }
}

impl CaptureStream for SimulatedStream {
    fn start(&mut self) -> Result<(), DeviceError> {
        if let Some(err) = &self.fail_start {
            return Err(err.clone());
        }
        self.probe.record(StreamCall::Start);
        self.started = true;
        Ok(())
    }

    fn read_into(&mut self, frame: &mut [i16]) -> Result<(), DeviceError> {
        if !self.started {
            return Err(DeviceError::StreamError("stream not started".to_string()));
        }

        let tone = match &self.source {
            SimulatedSource::Script(frames) => {
                let Some(next) = frames.get(self.position) else {
                    if self.disconnect_when_exhausted {
                        return Err(DeviceError::Disconnected);
                    }
                    thread::sleep(self.params.read_timeout);
                    return Err(DeviceError::ReadTimeout);
                };
                let n = next.len().min(frame.len());
                frame[..n].copy_from_slice(&next[..n]);
                frame[n..].fill(0);
                None
            }
            SimulatedSource::Tone { frequency, amplitude } => Some((*frequency, *amplitude)),
        };

        match tone {
            Some((frequency, amplitude)) => {
                self.pace();
                self.fill_tone(frame, frequency, amplitude);
            }
            None => self.position += 1,
        }

        self.probe.frames_read.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.probe.record(StreamCall::Stop);
        self.started = false;
        match &self.fail_stop {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn close(self: Box<Self>) -> Result<(), DeviceError> {
        self.probe.record(StreamCall::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StreamParams {
        StreamParams {
            sample_rate: 8000,
            channels: 2,
            frame_length: 4,
            read_timeout: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_script_then_timeout() {
        let backend = SimulatedBackend::scripted(vec![vec![1, 2, 3, 4], vec![5, 6]]);
        let mut stream = backend.open_stream(&backend.device(), &params()).unwrap();
        stream.start().unwrap();

        let mut frame = [0i16; 4];
        stream.read_into(&mut frame).unwrap();
        assert_eq!(frame, [1, 2, 3, 4]);
        stream.read_into(&mut frame).unwrap();
        assert_eq!(frame, [5, 6, 0, 0]);
        assert_eq!(stream.read_into(&mut frame), Err(DeviceError::ReadTimeout));

        stream.stop().unwrap();
        stream.close().unwrap();

        assert_eq!(backend.probe().frames_read(), 2);
        assert_eq!(
            backend.probe().calls(),
            vec![StreamCall::Open, StreamCall::Start, StreamCall::Stop, StreamCall::Close]
        );
    }

    #[test]
    fn test_tone_is_interleaved() {
        let backend = SimulatedBackend::tone(440.0, 1000);
        let mut stream = backend.open_stream(&backend.device(), &params()).unwrap();
        stream.start().unwrap();

        let mut frame = [0i16; 8];
        stream.read_into(&mut frame).unwrap();
        assert_eq!(frame[0], 0);
        assert_eq!(frame[2], frame[3]);
        assert!(frame.iter().all(|s| s.abs() <= 1000));
    }

    #[test]
    fn test_unknown_device_rejected() {
        let backend = SimulatedBackend::scripted(vec![]);
        let mut device = backend.device();
        device.id = "sim:9".into();
        assert!(matches!(
            backend.open_stream(&device, &params()),
            Err(DeviceError::NotFound(_))
        ));
    }
}
