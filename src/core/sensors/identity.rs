//! Default sensor identity.

use std::path::Path;

use tracing::{debug, warn};

const KERNEL_HOSTNAME: &str = "/proc/sys/kernel/hostname";
const FALLBACK_HOSTNAME: &str = "localhost";

/// Resolves the hostname used as the default `mqtt_id`.
///
/// An explicit override wins; otherwise the first label of the kernel
/// hostname is used (`pi1.lan` becomes `pi1`).
pub async fn resolve_hostname(configured: Option<&str>) -> String {
    if let Some(name) = configured.map(str::trim).filter(|n| !n.is_empty()) {
        debug!("Using configured hostname '{}'", name);
        return name.to_string();
    }
    read_hostname(Path::new(KERNEL_HOSTNAME)).await
}

async fn read_hostname(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => match short_hostname(&raw) {
            Some(name) => name.to_string(),
            None => {
                warn!("Empty hostname in {}, using '{}'", path.display(), FALLBACK_HOSTNAME);
                FALLBACK_HOSTNAME.to_string()
            }
        },
        Err(e) => {
            warn!(
                "Could not read {}: {}, using '{}'",
                path.display(),
                e,
                FALLBACK_HOSTNAME
            );
            FALLBACK_HOSTNAME.to_string()
        }
    }
}

/// First dot-separated label of `raw`.
pub fn short_hostname(raw: &str) -> Option<&str> {
    raw.trim().split('.').next().filter(|label| !label.is_empty())
}
