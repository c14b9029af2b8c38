//! Process-environment probing for proxy configuration.
//!
//! The driver fills unset proxy fields from the orchestrator-provided
//! environment, so operators behind an egress proxy get working clones and
//! worker traffic without repeating themselves in the config file.

use crate::config::ProxyConfig;

pub fn http_proxy() -> Option<String> {
    first_nonempty(&["http_proxy", "HTTP_PROXY"])
}

pub fn https_proxy() -> Option<String> {
    first_nonempty(&["https_proxy", "HTTPS_PROXY"])
}

/// Fill unset proxy fields from the environment. Explicit config wins.
pub fn fill_proxy_defaults(proxy: &mut ProxyConfig) {
    if proxy.http.is_none() {
        proxy.http = http_proxy();
    }
    if proxy.https.is_none() {
        proxy.https = https_proxy();
    }
}

fn first_nonempty(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
}
