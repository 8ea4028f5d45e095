use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Creates a privacy-preserving identifier for logging.
///
/// Uses a salted SHA256 hash to prevent correlation attacks. Returns the
/// first 8 hex characters (4 bytes), enough to follow one owner through the
/// logs without exposing the raw id.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    hex::encode(&hash[..4])
}

/// Stable id for a payload that arrived without one.
///
/// Redeliveries of the same message hash to the same value, so the
/// redelivery counter still converges.
pub fn content_fingerprint(routing_key: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(routing_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    format!("sha256-{}", hex::encode(&hasher.finalize()[..16]))
}

/// Cancel `shutdown` on SIGTERM or Ctrl-C
pub async fn shutdown_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, initiating graceful shutdown...");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("SIGINT received, initiating graceful shutdown...");
                    }
                    _ = shutdown.cancelled() => return,
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, listening for Ctrl-C only");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl-C received, initiating graceful shutdown...");
                    }
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, initiating graceful shutdown...");
            }
            _ = shutdown.cancelled() => return,
        }
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_safe_id_is_salted_and_short() {
        let a = log_safe_id("user-1", "salt-a");
        let b = log_safe_id("user-1", "salt-b");
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
        assert_eq!(a, log_safe_id("user-1", "salt-a"));
    }

    #[test]
    fn test_content_fingerprint_depends_on_routing_key() {
        let payload = br#"{"content_id":"p1"}"#;
        assert_eq!(
            content_fingerprint("post.deleted", payload),
            content_fingerprint("post.deleted", payload)
        );
        assert_ne!(
            content_fingerprint("post.deleted", payload),
            content_fingerprint("post.created", payload)
        );
    }
}
