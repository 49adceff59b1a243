//! Environment session: connection lifecycle and frame synchronisation
//!
//! An [`EnvironmentClient`] is the raw transport to a remote or simulated
//! environment. [`EnvironmentSession`] wraps one client for the duration of a
//! single run, tracks the freshest frame and guarantees that a connected
//! client is ended and disconnected on every exit path.

mod frame_sync;

pub use frame_sync::FrameSink;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ConstructError, Result};
use crate::model::{Frame, ImageSource};
use frame_sync::FrameSlot;

/// Parameters for starting an environment stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub prompt: String,
    pub portrait: bool,
    pub image: Option<ImageSource>,
}

impl StreamRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            portrait: true,
            image: None,
        }
    }

    pub fn portrait(mut self, portrait: bool) -> Self {
        self.portrait = portrait;
        self
    }

    pub fn image(mut self, image: Option<ImageSource>) -> Self {
        self.image = image;
        self
    }
}

/// Transport to an environment that renders frames in response to commands.
///
/// Implementations push every decoded frame into the [`FrameSink`] received
/// in [`connect`](EnvironmentClient::connect), from any thread.
#[async_trait]
pub trait EnvironmentClient: Send + Sync {
    /// Establish the transport and register the frame sink
    async fn connect(&self, frames: FrameSink) -> Result<()>;

    /// Start a stream, returning its identifier
    async fn start_stream(&self, request: &StreamRequest) -> Result<String>;

    /// Send a command to the running stream
    async fn interact(&self, command: &str) -> Result<()>;

    async fn end_stream(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Creates one fresh environment client per run
pub trait EnvironmentProvider: Send + Sync {
    fn new_client(&self) -> Result<Arc<dyn EnvironmentClient>>;
}

impl<F> EnvironmentProvider for F
where
    F: Fn() -> Result<Arc<dyn EnvironmentClient>> + Send + Sync,
{
    fn new_client(&self) -> Result<Arc<dyn EnvironmentClient>> {
        self()
    }
}

/// One run's view of an environment client
pub struct EnvironmentSession {
    client: Arc<dyn EnvironmentClient>,
    frames: FrameSlot,
    connected: bool,
    streaming: bool,
    stream_id: Option<String>,
}

impl EnvironmentSession {
    pub fn new(client: Arc<dyn EnvironmentClient>) -> Self {
        Self {
            client,
            frames: FrameSlot::new(),
            connected: false,
            streaming: false,
            stream_id: None,
        }
    }

    /// Connect the transport; a no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the transport cannot be established.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        self.client
            .connect(self.frames.sink())
            .await
            .map_err(|e| match e {
                ConstructError::Connection(_) | ConstructError::Timeout(_) => e,
                other => ConstructError::Connection(other.to_string()),
            })?;

        self.connected = true;
        tracing::debug!("Environment connected");
        Ok(())
    }

    /// Start the stream for this run.
    ///
    /// # Errors
    ///
    /// Returns `Session` when not connected or when the environment refuses
    /// the stream.
    pub async fn start_stream(&mut self, request: &StreamRequest) -> Result<String> {
        if !self.connected {
            return Err(ConstructError::Session(
                "cannot start a stream before connecting".to_string(),
            ));
        }

        let stream_id = self.client.start_stream(request).await?;
        self.streaming = true;
        self.stream_id = Some(stream_id.clone());
        tracing::debug!(stream_id = %stream_id, portrait = request.portrait, "Stream started");
        Ok(stream_id)
    }

    /// Send a command; frames that arrived before this call are no longer fresh.
    pub async fn interact(&mut self, command: &str) -> Result<()> {
        if !self.streaming {
            return Err(ConstructError::Session(
                "cannot interact without an active stream".to_string(),
            ));
        }

        self.frames.invalidate();
        self.client.interact(command).await
    }

    /// Wait up to `timeout` for a fresh frame
    pub async fn wait_for_frame(&mut self, timeout: Duration) -> Result<Frame> {
        self.wait_for_frame_until(Instant::now() + timeout).await
    }

    /// Wait until `deadline` for a fresh frame.
    ///
    /// Returns at once if a fresh frame is already present.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if no fresh frame arrives before the deadline.
    pub async fn wait_for_frame_until(&mut self, deadline: Instant) -> Result<Frame> {
        self.frames.wait_until(deadline).await
    }

    pub fn has_fresh_frame(&self) -> bool {
        self.frames.is_fresh()
    }

    /// Newest frame received, fresh or not
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.latest()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// End the stream if one is running
    pub async fn end_stream(&mut self) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        self.client.end_stream().await
    }

    /// Disconnect if connected
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.client.disconnect().await?;
        tracing::debug!("Environment disconnected");
        Ok(())
    }

    /// End the stream and disconnect, attempting both
    ///
    /// # Errors
    ///
    /// Returns the first failure after both steps were attempted.
    pub async fn close(&mut self) -> Result<()> {
        let ended = self.end_stream().await;
        let disconnected = self.disconnect().await;
        ended.and(disconnected)
    }
}

impl Drop for EnvironmentSession {
    fn drop(&mut self) {
        if !self.connected && !self.streaming {
            return;
        }

        let client = Arc::clone(&self.client);
        let streaming = self.streaming;
        let connected = self.connected;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Session dropped while open, scheduling cleanup");
                handle.spawn(async move {
                    if streaming {
                        if let Err(e) = client.end_stream().await {
                            tracing::warn!(error = %e, "Ending stream failed during session cleanup");
                        }
                    }
                    if connected {
                        if let Err(e) = client.disconnect().await {
                            tracing::warn!(error = %e, "Disconnect failed during session cleanup");
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Session dropped outside a tokio runtime, environment left open");
            }
        }
    }
}
