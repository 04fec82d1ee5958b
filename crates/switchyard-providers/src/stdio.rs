//! Child-process transport speaking newline-delimited JSON-RPC.

use crate::error::ProviderError;
use crate::transport::{Connector, ProviderTransport};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use switchyard_protocol::ProviderDescriptor;
use switchyard_protocol::wire::{RpcRequest, RpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Spawns descriptors as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioConnector;

#[async_trait]
impl Connector for StdioConnector {
    async fn open(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<Box<dyn ProviderTransport>, ProviderError> {
        Ok(Box::new(StdioTransport::spawn(descriptor)?))
    }
}

struct Channel {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// One running provider process.
///
/// Requests are serialized: the channel lock is held from writing a request
/// until its response line has been read.
pub struct StdioTransport {
    name: String,
    channel: Mutex<Channel>,
    child: Mutex<Child>,
    next_id: AtomicU64,
}

impl StdioTransport {
    pub fn spawn(descriptor: &ProviderDescriptor) -> Result<Self, ProviderError> {
        debug!(
            "spawning provider (name={}, command={}, args_len={})",
            descriptor.name,
            descriptor.command,
            descriptor.args.len()
        );
        let mut command = Command::new(&descriptor.command);
        command
            .args(&descriptor.args)
            .envs(&descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(ProviderError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Protocol("provider stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Protocol("provider stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            let name = descriptor.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("provider stderr (name={}): {}", name, line);
                }
            });
        }

        Ok(Self {
            name: descriptor.name.clone(),
            channel: Mutex::new(Channel {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
        })
    }

    async fn write_line(channel: &mut Channel, request: &RpcRequest) -> Result<(), ProviderError> {
        let mut line = serde_json::to_string(request)
            .map_err(|err| ProviderError::Protocol(err.to_string()))?;
        line.push('\n');
        channel.stdin.write_all(line.as_bytes()).await?;
        channel.stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ProviderTransport for StdioTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        let mut channel = self.channel.lock().await;
        Self::write_line(&mut channel, &request).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = channel.stdout.read_line(&mut line).await?;
            if read == 0 {
                return Err(ProviderError::Closed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<RpcResponse>(trimmed) {
                Ok(response) if response.answers(id) => response,
                _ => {
                    debug!(
                        "skipping unrelated provider line (name={}, pending_id={})",
                        self.name, id
                    );
                    continue;
                }
            };
            if let Some(error) = response.error {
                return Err(ProviderError::Remote {
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    async fn notify(&self, method: &str) -> Result<(), ProviderError> {
        let mut channel = self.channel.lock().await;
        Self::write_line(&mut channel, &RpcRequest::notification(method)).await
    }

    async fn close(&self) {
        let mut child = self.child.lock().await;
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Err(err) = child.kill().await {
            warn!("failed to stop provider (name={}, err={})", self.name, err);
        }
    }
}
