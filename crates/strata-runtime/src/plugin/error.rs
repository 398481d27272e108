//! Plugin subsystem errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from spawning, handshaking with, or calling a plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unable to start plugin {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("timeout while waiting for plugin {path} to start")]
    HandshakeTimeout { path: PathBuf },

    #[error("error reading handshake of plugin {path}: {message}")]
    HandshakeRead { path: PathBuf, message: String },

    #[error("plugin {path} uses unsupported protocol {version}")]
    ProtocolMismatch { path: PathBuf, version: i64 },

    #[error("plugin {path} does not export {kind} function '{name}'")]
    MissingFunction {
        path: PathBuf,
        kind: &'static str,
        name: String,
    },

    /// The per-call deadline elapsed. The wording is part of the contract:
    /// callers match on "canceled".
    #[error("request canceled: GET {url} exceeded {timeout_ms} ms")]
    RequestCanceled { url: String, timeout_ms: u64 },

    #[error("{url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} {status}: {body}")]
    CallFailed {
        url: String,
        status: String,
        body: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}
