use crate::core::errors::BybitError;
use crate::core::kernel::codec::StreamCodec;
use crate::core::kernel::service::KeyedStreamService;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timings for the driving loop
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// Interval between ping frames
    pub heartbeat_interval: Duration,
    /// How long to wait for the read task after the close frame is sent
    pub shutdown_grace: Duration,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl EventLoopConfig {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Drives one streaming session: a read task feeding dispatch, a heartbeat
/// timer and a cancellation path.
pub struct EventLoop<C: StreamCodec> {
    service: Arc<KeyedStreamService<C>>,
    config: EventLoopConfig,
}

impl<C: StreamCodec> EventLoop<C> {
    pub fn new(service: Arc<KeyedStreamService<C>>, config: EventLoopConfig) -> Self {
        Self { service, config }
    }

    /// Run until the read task ends, a heartbeat fails, or `token` is cancelled.
    ///
    /// The read task never observes the token: cancellation sends a close
    /// frame and the read task exits when the closure surfaces from its
    /// blocked read. If that takes longer than the grace period the task is
    /// left behind and this returns anyway. Registrations are dropped on exit.
    pub async fn start(self, token: CancellationToken) -> Result<(), BybitError> {
        let reader = Arc::clone(&self.service);
        let mut read_task = tokio::spawn(async move { reader.read_loop().await });

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                joined = &mut read_task => {
                    if let Err(e) = joined {
                        error!(error = %e, "read task failed");
                    }
                    debug!("read task finished");
                    break Ok(());
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.service.ping().await {
                        warn!(error = %e, "heartbeat failed");
                        break Err(e);
                    }
                }
                () = token.cancelled() => {
                    info!(
                        url = %self.service.session().url(),
                        "shutdown requested, closing stream"
                    );
                    if let Err(e) = self.service.close().await {
                        warn!(error = %e, "failed to send close frame");
                    }

                    let grace = self.config.shutdown_grace;
                    if tokio::time::timeout(grace, &mut read_task).await.is_err() {
                        let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
                        warn!(grace_ms, "read task still running after grace period");
                    }
                    break Ok(());
                }
            }
        };

        self.service.registry().clear();
        result
    }
}
