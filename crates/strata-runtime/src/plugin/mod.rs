//! Out-of-process data provider plugins.
//!
//! A plugin is an executable that is spawned with the magic cookie in its
//! environment and announces itself by writing a single JSON object to
//! stdout within three seconds:
//!
//! ```json
//! {"version":1,"address":"127.0.0.1:4040","functions":{"lookup_key":["my_fn"]}}
//! ```
//!
//! After the handshake the engine talks to the plugin over HTTP:
//! `GET http://{address}/{data_hash|data_dig|lookup_key}/{name}` with the
//! key and serialized options as query parameters. Each call has a hard
//! 500 ms deadline. `200` bodies decode as the value, `404` is the
//! not-found sentinel, anything else is an error carrying the status line
//! and body.
//!
//! The registry is scoped to a session; plugin processes live until the
//! session shuts down, which sends an interrupt and escalates to a kill
//! after a three second grace period.

mod error;

pub use error::PluginError;

use crate::config::FunctionKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strata_types::{Map, Value};
use tracing::{debug, warn};

/// Pre-shared secret handed to plugin children via the environment.
pub const MAGIC_COOKIE: u32 = 2_579_511_339;

/// Environment variable carrying [`MAGIC_COOKIE`].
pub const MAGIC_COOKIE_KEY: &str = "HIERA_MAGIC_COOKIE";

/// The handshake protocol version this engine speaks.
pub const PROTOCOL_VERSION: i64 = 1;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
const CALL_TIMEOUT_MS: u64 = 500;

/// A running plugin process plus its announced HTTP endpoint.
pub struct Plugin {
    path: PathBuf,
    address: String,
    functions: HashMap<String, Vec<String>>,
    child: Mutex<Option<Child>>,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("path", &self.path)
            .field("address", &self.address)
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

impl Plugin {
    fn spawn(path: &Path) -> Result<Self, PluginError> {
        let mut child = Command::new(path)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PluginError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        // Everything the plugin writes on stderr goes to the host logger.
        if let Some(stderr) = child.stderr.take() {
            let plugin = path.display().to_string();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => warn!(target: "plugin", plugin = %plugin, "{line}"),
                        Err(_) => break,
                    }
                }
            });
        }

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(PluginError::HandshakeRead {
                path: path.to_path_buf(),
                message: "no stdout pipe".to_owned(),
            });
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let handshake = serde_json::Deserializer::from_reader(&mut reader)
                .into_iter::<Value>()
                .next();
            let _ = tx.send(match handshake {
                Some(Ok(meta)) => Ok(meta),
                Some(Err(e)) => Err(e.to_string()),
                None => Err("plugin closed stdout before the handshake".to_owned()),
            });
            // Drain remaining stdout so the child never blocks on a full pipe.
            let mut sink = [0u8; 4096];
            loop {
                match reader.read(&mut sink) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        let meta = match rx.recv_timeout(HANDSHAKE_TIMEOUT) {
            Ok(Ok(meta)) => meta,
            Ok(Err(message)) => {
                let _ = child.kill();
                return Err(PluginError::HandshakeRead {
                    path: path.to_path_buf(),
                    message,
                });
            }
            Err(_) => {
                let _ = child.kill();
                return Err(PluginError::HandshakeTimeout {
                    path: path.to_path_buf(),
                });
            }
        };

        match Self::from_handshake(path, &meta, child) {
            Ok(plugin) => {
                debug!(plugin = %path.display(), address = %plugin.address, "Plugin started");
                Ok(plugin)
            }
            Err((mut child, err)) => {
                let _ = child.kill();
                Err(err)
            }
        }
    }

    fn from_handshake(
        path: &Path,
        meta: &Value,
        child: Child,
    ) -> Result<Self, (Child, PluginError)> {
        let bad = |message: &str| PluginError::HandshakeRead {
            path: path.to_path_buf(),
            message: message.to_owned(),
        };

        let Some(meta) = meta.as_map() else {
            return Err((child, bad("handshake is not a JSON object")));
        };

        let version = meta.get("version").and_then(Value::as_int).unwrap_or(-1);
        if version != PROTOCOL_VERSION {
            return Err((
                child,
                PluginError::ProtocolMismatch {
                    path: path.to_path_buf(),
                    version,
                },
            ));
        }

        let Some(address) = meta.get("address").and_then(Value::as_str) else {
            return Err((child, bad("handshake did not provide a valid address")));
        };

        let Some(function_map) = meta.get("functions").and_then(Value::as_map) else {
            return Err((child, bad("handshake did not provide a valid functions map")));
        };
        let mut functions = HashMap::with_capacity(function_map.len());
        for (kind, names) in function_map {
            let names = names
                .as_array()
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect();
            functions.insert(kind.clone(), names);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(CALL_TIMEOUT_MS))
            .build()
            .map_err(|source| PluginError::Transport {
                url: address.to_owned(),
                source,
            });
        let client = match client {
            Ok(c) => c,
            Err(e) => return Err((child, e)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            address: address.to_owned(),
            functions,
            child: Mutex::new(Some(child)),
            client,
        })
    }

    /// Whether the plugin announced `name` under the given function kind.
    #[must_use]
    pub fn exports(&self, kind: FunctionKind, name: &str) -> bool {
        self.functions
            .get(kind.as_str())
            .is_some_and(|names| names.iter().any(|n| n == name))
    }

    /// Issues one RPC. `key` is the pre-encoded key query parameter (absent
    /// for `data_hash`). Returns `None` for the 404 not-found sentinel.
    pub fn call(
        &self,
        kind: FunctionKind,
        name: &str,
        key: Option<String>,
        options: &Map,
    ) -> Result<Option<Value>, PluginError> {
        let url = format!("http://{}/{}/{}", self.address, kind.as_str(), name);

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(key) = key {
            query.push(("key", key));
        }
        if !options.is_empty() {
            let encoded = serde_json::to_string(&Value::Map(options.clone())).map_err(|e| {
                PluginError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                }
            })?;
            query.push(("options", encoded));
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                PluginError::RequestCanceled {
                    url: url.clone(),
                    timeout_ms: CALL_TIMEOUT_MS,
                }
            } else {
                PluginError::Transport {
                    url: url.clone(),
                    source: e,
                }
            }
        };

        let response = self.client.get(&url).query(&query).send().map_err(classify)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == reqwest::StatusCode::OK {
            let body = response.bytes().map_err(classify)?;
            let value = serde_json::from_slice::<Value>(&body).map_err(|e| {
                PluginError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                }
            })?;
            return Ok(Some(value));
        }

        let status_line = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        );
        let body = response.text().unwrap_or_default();
        Err(PluginError::CallFailed {
            url,
            status: status_line,
            body,
        })
    }

    /// Stops the plugin process: interrupt, wait up to the grace period,
    /// then kill. On platforms without signals it kills immediately.
    pub fn stop(&self) {
        let Some(mut child) = self.child.lock().take() else {
            return;
        };

        #[cfg(unix)]
        {
            let graceful =
                unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) } == 0;
            if graceful {
                let deadline = Instant::now() + SHUTDOWN_GRACE;
                loop {
                    match child.try_wait() {
                        Ok(Some(_)) => return,
                        Ok(None) => {
                            if Instant::now() >= deadline {
                                break;
                            }
                            thread::sleep(Duration::from_millis(25));
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Tracks plugin processes by absolute executable path.
///
/// [`PluginRegistry::start`] is idempotent per path: the first call spawns
/// and handshakes, later calls return the already running plugin.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Mutex<HashMap<PathBuf, Arc<Plugin>>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the plugin at `path`, spawning it on first use.
    pub fn start(&self, path: &Path) -> Result<Arc<Plugin>, PluginError> {
        let mut plugins = self.plugins.lock();
        if let Some(plugin) = plugins.get(path) {
            return Ok(Arc::clone(plugin));
        }
        let plugin = Arc::new(Plugin::spawn(path)?);
        plugins.insert(path.to_path_buf(), Arc::clone(&plugin));
        Ok(plugin)
    }

    /// Stops every plugin and empties the registry.
    pub fn shutdown(&self) {
        let plugins: Vec<_> = self.plugins.lock().drain().map(|(_, p)| p).collect();
        for plugin in plugins {
            plugin.stop();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::net::TcpListener;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_plugin(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Serves exactly one HTTP request on `listener`, optionally sleeping
    /// first, and reports the request line back through the channel.
    fn serve_once(listener: TcpListener, delay: Duration, response: String) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                    break;
                }
            }
            let _ = tx.send(request_line.trim_end().to_owned());
            thread::sleep(delay);
            stream.write_all(response.as_bytes()).unwrap();
        });
        rx
    }

    fn handshake_plugin(dir: &Path, addr: &str) -> PathBuf {
        // The child checks the cookie, announces the test server's address
        // and lingers so shutdown has something to interrupt.
        write_plugin(
            dir,
            "my_plugin",
            &format!(
                "[ \"$HIERA_MAGIC_COOKIE\" = \"{MAGIC_COOKIE}\" ] || exit 1\n\
                 echo '{{\"version\":1,\"address\":\"{addr}\",\"functions\":{{\"lookup_key\":[\"my_plugin\"]}}}}'\n\
                 sleep 5"
            ),
        )
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn handshake_and_lookup_key_call() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let requests = serve_once(
            listener,
            Duration::ZERO,
            response("200 OK", "\"option a\""),
        );

        let registry = PluginRegistry::new();
        let plugin = registry
            .start(&handshake_plugin(tmp.path(), &addr))
            .unwrap();
        assert!(plugin.exports(FunctionKind::LookupKey, "my_plugin"));
        assert!(!plugin.exports(FunctionKind::DataHash, "my_plugin"));

        let mut options = Map::new();
        options.insert("answer".into(), Value::from("option a"));
        let value = plugin
            .call(FunctionKind::LookupKey, "my_plugin", Some("a".into()), &options)
            .unwrap();
        assert_eq!(value, Some(Value::from("option a")));

        let request = requests.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(
            request,
            "GET /lookup_key/my_plugin?key=a&options=%7B%22answer%22%3A%22option+a%22%7D HTTP/1.1"
        );

        registry.shutdown();
    }

    #[test]
    fn registry_start_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let registry = PluginRegistry::new();
        let path = handshake_plugin(tmp.path(), &addr);
        let first = registry.start(&path).unwrap();
        let second = registry.start(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        registry.shutdown();
    }

    #[test]
    fn slow_response_is_canceled() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _requests = serve_once(
            listener,
            Duration::from_millis(900),
            response("200 OK", "\"late\""),
        );

        let registry = PluginRegistry::new();
        let plugin = registry
            .start(&handshake_plugin(tmp.path(), &addr))
            .unwrap();
        let err = plugin
            .call(FunctionKind::LookupKey, "my_plugin", Some("a".into()), &Map::new())
            .unwrap_err();
        assert!(err.to_string().contains("canceled"), "{err}");
        registry.shutdown();
    }

    #[test]
    fn not_found_is_a_normal_miss() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _requests = serve_once(
            listener,
            Duration::ZERO,
            response("404 Not Found", ""),
        );

        let registry = PluginRegistry::new();
        let plugin = registry
            .start(&handshake_plugin(tmp.path(), &addr))
            .unwrap();
        let value = plugin
            .call(FunctionKind::LookupKey, "my_plugin", Some("a".into()), &Map::new())
            .unwrap();
        assert_eq!(value, None);
        registry.shutdown();
    }

    #[test]
    fn error_status_carries_status_line_and_body() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _requests = serve_once(
            listener,
            Duration::ZERO,
            response("500 Internal Server Error", "dit dit dit"),
        );

        let registry = PluginRegistry::new();
        let plugin = registry
            .start(&handshake_plugin(tmp.path(), &addr))
            .unwrap();
        let err = plugin
            .call(FunctionKind::LookupKey, "my_plugin", Some("a".into()), &Map::new())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("500 Internal Server Error"), "{message}");
        assert!(message.contains("dit dit dit"), "{message}");
        registry.shutdown();
    }

    #[test]
    fn protocol_mismatch_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = write_plugin(
            tmp.path(),
            "old_plugin",
            "echo '{\"version\":2,\"address\":\"127.0.0.1:1\",\"functions\":{}}'",
        );
        let registry = PluginRegistry::new();
        let err = registry.start(&path).unwrap_err();
        assert!(matches!(err, PluginError::ProtocolMismatch { version: 2, .. }));
    }

    #[test]
    fn garbage_handshake_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_plugin(tmp.path(), "bad_plugin", "echo 'not json at all'");
        let registry = PluginRegistry::new();
        let err = registry.start(&path).unwrap_err();
        assert!(matches!(err, PluginError::HandshakeRead { .. }));
    }

    #[test]
    fn silent_plugin_times_out() {
        let tmp = TempDir::new().unwrap();
        let path = write_plugin(tmp.path(), "mute_plugin", "sleep 10");
        let registry = PluginRegistry::new();
        let started = Instant::now();
        let err = registry.start(&path).unwrap_err();
        assert!(matches!(err, PluginError::HandshakeTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn shutdown_interrupts_children() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let registry = PluginRegistry::new();
        registry
            .start(&handshake_plugin(tmp.path(), &addr))
            .unwrap();
        let started = Instant::now();
        registry.shutdown();
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
