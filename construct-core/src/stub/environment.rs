//! Synthetic environment

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::lock;
use crate::error::{ConstructError, Result};
use crate::model::Frame;
use crate::session::{EnvironmentClient, EnvironmentProvider, FrameSink, StreamRequest};

/// How the stub hands rendered frames to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameDelivery {
    /// Push before the triggering call returns
    #[default]
    Immediate,
    /// Push from a tokio task after a delay
    Delayed(Duration),
    /// Push from a plain OS thread after a delay
    ForeignThread(Duration),
    /// Never render
    Never,
}

/// Lifecycle calls observed by a [`StubEnvironment`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StubStats {
    pub clients_created: usize,
    pub connect_calls: usize,
    pub start_stream_calls: usize,
    pub end_stream_calls: usize,
    pub disconnect_calls: usize,
    /// Commands received through `interact`, in order
    pub commands: Vec<String>,
    pub stream_requests: Vec<StreamRequest>,
    pub frames_delivered: usize,
}

#[derive(Debug, Clone, Default)]
struct Failures {
    connect: Option<String>,
    start_stream: Option<String>,
    interact: Option<String>,
    end_stream: Option<String>,
    disconnect: Option<String>,
}

#[derive(Debug, Clone)]
struct StubSettings {
    width: u32,
    height: u32,
    delivery: FrameDelivery,
    frame_on_interact: bool,
    failures: Failures,
}

#[derive(Default)]
struct StubState {
    sink: Option<FrameSink>,
    rendered: u32,
    stats: StubStats,
}

/// In-memory environment rendering solid-colour frames.
///
/// Frame `n` (counting from zero) is filled with `[n % 256, n / 256 % 256, 0]`,
/// so tests can tell which render they observed.
#[derive(Clone)]
pub struct StubEnvironment {
    settings: StubSettings,
    state: Arc<Mutex<StubState>>,
}

impl StubEnvironment {
    pub fn new() -> Self {
        Self {
            settings: StubSettings {
                width: 8,
                height: 6,
                delivery: FrameDelivery::Immediate,
                frame_on_interact: true,
                failures: Failures::default(),
            },
            state: Arc::new(Mutex::new(StubState::default())),
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.settings.width = width;
        self.settings.height = height;
        self
    }

    pub fn with_delivery(mut self, delivery: FrameDelivery) -> Self {
        self.settings.delivery = delivery;
        self
    }

    /// Render on `start_stream` only
    pub fn without_frame_on_interact(mut self) -> Self {
        self.settings.frame_on_interact = false;
        self
    }

    pub fn fail_connect(mut self, message: impl Into<String>) -> Self {
        self.settings.failures.connect = Some(message.into());
        self
    }

    pub fn fail_start_stream(mut self, message: impl Into<String>) -> Self {
        self.settings.failures.start_stream = Some(message.into());
        self
    }

    pub fn fail_interact(mut self, message: impl Into<String>) -> Self {
        self.settings.failures.interact = Some(message.into());
        self
    }

    pub fn fail_end_stream(mut self, message: impl Into<String>) -> Self {
        self.settings.failures.end_stream = Some(message.into());
        self
    }

    pub fn fail_disconnect(mut self, message: impl Into<String>) -> Self {
        self.settings.failures.disconnect = Some(message.into());
        self
    }

    pub fn frame_width(&self) -> u32 {
        self.settings.width
    }

    pub fn frame_height(&self) -> u32 {
        self.settings.height
    }

    /// New client sharing this environment's state and counters
    pub fn client(&self) -> Arc<dyn EnvironmentClient> {
        lock(&self.state).stats.clients_created += 1;
        Arc::new(StubClient {
            settings: self.settings.clone(),
            state: Arc::clone(&self.state),
        })
    }

    /// Push a frame to the connected sink, bypassing the delivery mode
    pub fn push_frame(&self, frame: Frame) {
        let sink = lock(&self.state).sink.clone();
        if let Some(sink) = sink {
            sink.push(frame);
            lock(&self.state).stats.frames_delivered += 1;
        }
    }

    pub fn stats(&self) -> StubStats {
        lock(&self.state).stats.clone()
    }
}

impl Default for StubEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentProvider for StubEnvironment {
    fn new_client(&self) -> Result<Arc<dyn EnvironmentClient>> {
        Ok(self.client())
    }
}

struct StubClient {
    settings: StubSettings,
    state: Arc<Mutex<StubState>>,
}

impl StubClient {
    fn render(&self) {
        let (sink, index) = {
            let mut state = lock(&self.state);
            let index = state.rendered;
            state.rendered += 1;
            (state.sink.clone(), index)
        };
        let Some(sink) = sink else {
            return;
        };

        let frame = Frame::solid(
            self.settings.width,
            self.settings.height,
            [(index % 256) as u8, (index / 256 % 256) as u8, 0],
        );
        let state = Arc::clone(&self.state);
        let deliver = move || {
            sink.push(frame);
            lock(&state).stats.frames_delivered += 1;
        };

        match self.settings.delivery {
            FrameDelivery::Immediate => deliver(),
            FrameDelivery::Delayed(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    deliver();
                });
            }
            FrameDelivery::ForeignThread(delay) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    deliver();
                });
            }
            FrameDelivery::Never => {}
        }
    }
}

#[async_trait]
impl EnvironmentClient for StubClient {
    async fn connect(&self, frames: FrameSink) -> Result<()> {
        let mut state = lock(&self.state);
        state.stats.connect_calls += 1;
        if let Some(message) = &self.settings.failures.connect {
            return Err(ConstructError::Connection(message.clone()));
        }
        state.sink = Some(frames);
        Ok(())
    }

    async fn start_stream(&self, request: &StreamRequest) -> Result<String> {
        let stream_number = {
            let mut state = lock(&self.state);
            state.stats.start_stream_calls += 1;
            state.stats.stream_requests.push(request.clone());
            if let Some(message) = &self.settings.failures.start_stream {
                return Err(ConstructError::Session(message.clone()));
            }
            state.stats.start_stream_calls
        };

        self.render();
        Ok(format!("stub-stream-{}", stream_number))
    }

    async fn interact(&self, command: &str) -> Result<()> {
        {
            let mut state = lock(&self.state);
            state.stats.commands.push(command.to_string());
            if let Some(message) = &self.settings.failures.interact {
                return Err(ConstructError::Session(message.clone()));
            }
        }

        if self.settings.frame_on_interact {
            self.render();
        }
        Ok(())
    }

    async fn end_stream(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.stats.end_stream_calls += 1;
        match &self.settings.failures.end_stream {
            Some(message) => Err(ConstructError::Session(message.clone())),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.stats.disconnect_calls += 1;
        state.sink = None;
        match &self.settings.failures.disconnect {
            Some(message) => Err(ConstructError::Session(message.clone())),
            None => Ok(()),
        }
    }
}
