use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::runtime::config::HttpManagementConfig;

/// Diagnostic-only snapshot of the Orchestrator's state, published after
/// every cycle. Not part of the core contract.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: String,
    pub rule_counter: u64,
    pub current_root_count: usize,
}

pub struct MgmtServer {
    snapshot: Arc<RwLock<StatusSnapshot>>,
}

impl MgmtServer {
    pub fn start(initial: StatusSnapshot, cfg: &HttpManagementConfig) -> Result<Self> {
        let snapshot = Arc::new(RwLock::new(initial));

        if cfg.enabled {
            spawn_http_server(Arc::clone(&snapshot), cfg.bind_address.clone(), cfg.port)?;
            info!(
                "sr-routingd management HTTP started on {}:{}",
                cfg.bind_address, cfg.port
            );
        }

        Ok(Self { snapshot })
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = snapshot;
        }
    }
}

fn spawn_http_server(
    snapshot: Arc<RwLock<StatusSnapshot>>,
    bind_address: String,
    port: u16,
) -> Result<()> {
    let listener = TcpListener::bind((bind_address.as_str(), port)).with_context(|| {
        format!("failed to bind management HTTP server at {bind_address}:{port}")
    })?;
    listener
        .set_nonblocking(true)
        .context("failed to set HTTP listener non-blocking")?;

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(err) = handle_http_stream(stream, &snapshot) {
                    debug!("management HTTP request failed: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(80));
            }
            Err(err) => {
                warn!("management HTTP accept error: {err}");
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Ok(())
}

fn handle_http_stream(mut stream: TcpStream, snapshot: &Arc<RwLock<StatusSnapshot>>) -> Result<()> {
    let mut buf = [0_u8; 4096];
    let n = stream
        .read(&mut buf)
        .context("failed to read HTTP request from management socket")?;
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    let first_line = request.lines().next().unwrap_or_default();
    let path = first_line.split_whitespace().nth(1).unwrap_or("/");

    let (status_line, body) = match path {
        "/healthz" => ("HTTP/1.1 200 OK", json!({"status": "ok"})),
        "/v1/status" => {
            let state = snapshot
                .read()
                .map_err(|_| anyhow::anyhow!("management state lock poisoned"))?
                .clone();
            ("HTTP/1.1 200 OK", serde_json::to_value(state).unwrap_or_else(|_| json!({"status": "encode_error"})))
        }
        _ => ("HTTP/1.1 404 Not Found", json!({"error": "not_found", "path": path})),
    };

    let payload = serde_json::to_vec(&body).unwrap_or_else(|_| b"{\"error\":\"encode\"}".to_vec());
    let response = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    );
    stream
        .write_all(response.as_bytes())
        .context("failed to write HTTP headers")?;
    stream
        .write_all(&payload)
        .context("failed to write HTTP body")?;
    Ok(())
}
