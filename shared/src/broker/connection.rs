// ============================================================================
// Connection Manager
// ============================================================================
//
// Owns the single broker channel of a process. `ensure_channel` hands out the
// cached channel while it is open and otherwise connects, opens a channel and
// declares the durable topic exchange before caching it.
//
// There is no background reconnect loop: every publish and every
// (re)subscribe calls `ensure_channel`, which is where reconnection happens.
//
// ============================================================================

use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::channel::{BrokerChannel, Connector};
use super::error::BrokerError;

pub struct ConnectionManager<C: Connector> {
    connector: C,
    exchange: String,
    connect_timeout: Duration,
    /// Held across connect so concurrent callers share one connection
    channel: Mutex<Option<C::Channel>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, exchange: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            exchange: exchange.into(),
            connect_timeout,
            channel: Mutex::new(None),
        }
    }

    /// Name of the topic exchange this manager declares
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Return a live channel, connecting first if needed.
    ///
    /// # Errors
    /// `BrokerError::Unavailable` when the broker cannot be reached within the
    /// connect timeout or rejects the exchange declaration.
    pub async fn ensure_channel(&self) -> Result<C::Channel, BrokerError> {
        let mut slot = self.channel.lock().await;

        if let Some(channel) = slot.as_ref() {
            if channel.is_open() {
                return Ok(channel.clone());
            }
            warn!(exchange = %self.exchange, "Cached broker channel is closed, reconnecting");
        }
        if let Some(stale) = slot.take() {
            stale.close().await;
        }

        let channel = tokio::time::timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| {
                BrokerError::Unavailable(format!(
                    "connect timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })??;

        info!(exchange = %self.exchange, "Broker channel established");
        *slot = Some(channel.clone());
        Ok(channel)
    }

    /// Close and drop the cached channel if it is still `failed`, so the
    /// next `ensure_channel` reconnects. Called by a publisher or consumer
    /// that saw `failed` misbehave; a channel another caller has already
    /// re-established is left alone.
    pub async fn invalidate(&self, failed: &C::Channel) {
        let mut slot = self.channel.lock().await;
        match slot.as_ref() {
            Some(current) if current.same_channel(failed) => {
                if let Some(stale) = slot.take() {
                    warn!(exchange = %self.exchange, "Broker channel invalidated");
                    stale.close().await;
                }
            }
            _ => debug!(exchange = %self.exchange, "Channel already replaced, nothing to invalidate"),
        }
    }

    /// Whether a live channel is currently cached (health checks)
    pub async fn is_connected(&self) -> bool {
        self.channel
            .lock()
            .await
            .as_ref()
            .map(|c| c.is_open())
            .unwrap_or(false)
    }

    async fn open(&self) -> Result<C::Channel, BrokerError> {
        let channel = self.connector.connect().await.map_err(|e| match e {
            e @ BrokerError::Unavailable(_) => e,
            other => BrokerError::Unavailable(other.to_string()),
        })?;
        channel
            .declare_exchange(&self.exchange)
            .await
            .map_err(|e| BrokerError::Unavailable(format!("exchange declaration failed: {}", e)))?;
        Ok(channel)
    }
}
