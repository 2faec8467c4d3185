//! SSH 传输层
//!
//! `RemoteShell` / `RemoteProcess` 把会话与具体的 SSH 实现隔开；
//! 默认实现 `RusshShell` 基于 russh，每条命令使用独立的 session 通道。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use secrecy::ExposeSecret;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{ConnectionConfig, Credential, TransportOptions};
use crate::error::{ConnectionError, Error, Result};
use crate::ssh::host_key::HostKeyVerifier;

/// SSH_EXTENDED_DATA_STDERR
const EXTENDED_DATA_STDERR: u32 = 1;

/// 远程命令的原始输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// 通道关闭前未收到 exit-status 时为 None
    pub exit_status: Option<u32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn is_success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// 已建立的远程命令执行端点
#[async_trait]
pub trait RemoteShell: Send {
    /// 提交命令，立即返回进程句柄而不等待结束
    async fn launch(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>>;

    /// 断开连接
    async fn disconnect(&mut self) -> Result<()>;
}

/// 已提交的远程命令
#[async_trait]
pub trait RemoteProcess: Send {
    /// 等待命令结束并收集全部输出
    ///
    /// 命令结束前连接中断时返回 `Error::Disconnected`。
    async fn wait(&mut self) -> Result<ProcessOutput>;

    /// 不再等待，释放本地通道；远程进程继续运行，之后的输出被丢弃
    async fn detach(&mut self) -> Result<()>;
}

/// 基于 russh 的远程 shell
pub struct RusshShell {
    handle: Handle<ClientHandler>,
    target: String,
}

impl RusshShell {
    /// 建立连接并完成认证，整个过程受 connect_timeout 约束
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let target = config.target();
        let credential = config.credential()?;
        let client_config = Arc::new(client_config(&config.transport));
        let handler = ClientHandler {
            verifier: HostKeyVerifier::from_config(config),
            host: config.host.clone(),
            port: config.port,
        };

        debug!(remote = %target, "Connecting to SSH server");

        let establish = async {
            let mut handle =
                client::connect(client_config, (config.host.as_str(), config.port), handler)
                    .await
                    .map_err(|e| connect_error(&target, e))?;

            authenticate(&mut handle, &config.username, credential, &target).await?;
            Ok::<_, Error>(handle)
        };

        let handle = timeout(config.connect_timeout(), establish)
            .await
            .map_err(|_| ConnectionError::Timeout {
                target: target.clone(),
                secs: config.connect_timeout_secs,
            })??;

        info!(remote = %target, "SSH session established");

        Ok(Self { handle, target })
    }
}

#[async_trait]
impl RemoteShell for RusshShell {
    async fn launch(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>> {
        let mut channel = self.handle.channel_open_session().await.map_err(|e| {
            error!(remote = %self.target, error = %e, "Failed to open SSH channel");
            Error::channel(format!("failed to open session channel on {}: {}", self.target, e))
        })?;

        channel.exec(true, command).await.map_err(|e| {
            error!(remote = %self.target, error = %e, "Failed to submit command");
            Error::channel(format!("failed to submit command on {}: {}", self.target, e))
        })?;

        Ok(Box::new(RusshProcess {
            channel,
            target: self.target.clone(),
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| Error::channel(format!("failed to disconnect from {}: {}", self.target, e)))
    }
}

struct RusshProcess {
    channel: Channel<Msg>,
    target: String,
}

#[async_trait]
impl RemoteProcess for RusshProcess {
    async fn wait(&mut self) -> Result<ProcessOutput> {
        let mut output = ProcessOutput::default();
        let mut closed = false;

        // exit-status 可能先于剩余数据到达，读到通道关闭为止
        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    output.stdout.extend_from_slice(data);
                }
                ChannelMsg::ExtendedData { ref data, ext } if ext == EXTENDED_DATA_STDERR => {
                    output.stderr.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    output.exit_status = Some(exit_status);
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    warn!(signal = ?signal_name, "Remote command terminated by signal");
                }
                ChannelMsg::Close => {
                    closed = true;
                    break;
                }
                _ => {}
            }
        }

        finish(output, closed, &self.target)
    }

    async fn detach(&mut self) -> Result<()> {
        // 不关闭的话服务端会一直保留该通道，直到占满 MaxSessions
        self.channel
            .close()
            .await
            .map_err(|e| Error::channel(format!("failed to close channel on {}: {}", self.target, e)))
    }
}

/// 通道消息流结束时的收尾
///
/// 未收到 Close 且没有退出码，说明消息流是因为连接中断而结束的。
fn finish(output: ProcessOutput, closed: bool, target: &str) -> Result<ProcessOutput> {
    if closed || output.exit_status.is_some() {
        return Ok(output);
    }

    error!(remote = %target, "SSH connection lost while waiting for command");
    Err(Error::Disconnected(format!(
        "connection to {} lost before the command finished",
        target
    )))
}

/// SSH 客户端会话处理器
struct ClientHandler {
    verifier: HostKeyVerifier,
    host: String,
    port: u16,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self
            .verifier
            .verify(&self.host, self.port, server_public_key))
    }
}

fn client_config(options: &TransportOptions) -> Config {
    Config {
        inactivity_timeout: options.inactivity_timeout_secs.map(Duration::from_secs),
        keepalive_interval: options.keepalive_interval_secs.map(Duration::from_secs),
        keepalive_max: options.keepalive_max,
        ..Default::default()
    }
}

fn connect_error(target: &str, e: russh::Error) -> Error {
    error!(remote = %target, error = %e, "SSH connection failed");
    match e {
        russh::Error::UnknownKey => ConnectionError::HostKeyRejected {
            target: target.to_string(),
        },
        other => ConnectionError::Unreachable {
            target: target.to_string(),
            reason: other.to_string(),
        },
    }
    .into()
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    credential: Credential<'_>,
    target: &str,
) -> Result<()> {
    let authenticated = match credential {
        Credential::Password(password) => {
            handle
                .authenticate_password(username, password.expose_secret())
                .await
        }
        Credential::PrivateKeyFile { path, passphrase } => {
            let key = russh_keys::load_secret_key(
                path,
                passphrase.map(|p| p.expose_secret().as_str()),
            )
            .map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to load SSH private key");
                ConnectionError::KeyLoad {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

            handle
                .authenticate_publickey(username, Arc::new(key))
                .await
        }
    }
    .map_err(|e| ConnectionError::Unreachable {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    if !authenticated {
        error!(remote = %target, user = %username, "SSH authentication failed");
        return Err(ConnectionError::Authentication {
            target: target.to_string(),
            user: username.to_string(),
        }
        .into());
    }

    debug!(remote = %target, "SSH authentication succeeded");
    Ok(())
}
