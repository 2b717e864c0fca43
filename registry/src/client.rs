//! RPC client used by wrappers and hooks to talk to the registry
//! daemon.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::time::timeout;

use slackline_protocol::RegistryRequest;
use slackline_protocol::RegistryResponse;
use slackline_protocol::SessionRecord;
use slackline_protocol::SessionStatus;
use slackline_protocol::registry_rpc::RegisterExistingParams;
use slackline_protocol::registry_rpc::RegisterParams;

use crate::error::Result;

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RegistryClient {
    socket_path: PathBuf,
}

impl RegistryClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// True when the daemon's socket is present on disk. Cheap check
    /// before paying a connect timeout.
    pub fn available(&self) -> bool {
        self.socket_path.exists()
    }

    pub async fn call(&self, request: &RegistryRequest) -> Result<RegistryResponse> {
        let io = async {
            let mut stream = UnixStream::connect(&self.socket_path).await?;
            let mut payload = serde_json::to_string(request)?;
            payload.push('\n');
            stream.write_all(payload.as_bytes()).await?;

            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            Ok::<RegistryResponse, crate::error::RegistryError>(serde_json::from_str(
                line.trim_end(),
            )?)
        };
        timeout(RPC_TIMEOUT, io).await.map_err(|_| {
            crate::error::RegistryError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "registry rpc timed out",
            ))
        })?
    }

    pub async fn register(&self, params: RegisterParams) -> Result<RegistryResponse> {
        self.call(&RegistryRequest::Register(params)).await
    }

    pub async fn register_simple(&self, params: RegisterParams) -> Result<RegistryResponse> {
        self.call(&RegistryRequest::RegisterSimple(params)).await
    }

    pub async fn register_existing(
        &self,
        params: RegisterExistingParams,
    ) -> Result<RegistryResponse> {
        self.call(&RegistryRequest::RegisterExisting(params)).await
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let response = self
            .call(&RegistryRequest::Get {
                session_id: session_id.to_string(),
            })
            .await?;
        Ok(response.session)
    }

    pub async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<SessionRecord>> {
        let response = self.call(&RegistryRequest::List { status }).await?;
        Ok(response.sessions.unwrap_or_default())
    }

    pub async fn unregister(&self, session_id: &str) -> Result<bool> {
        let response = self
            .call(&RegistryRequest::Unregister {
                session_id: session_id.to_string(),
            })
            .await?;
        Ok(response.success)
    }
}
