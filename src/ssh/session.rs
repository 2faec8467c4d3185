//! SSH 会话
//!
//! 会话在构造时建立一次连接，之后所有命令复用同一个连接。
//! 不会自动重连：连接断开后，后续的命令调用会返回错误，由调用方处理。
//!
//! 资源释放：优先调用 [`Session::close`] 优雅断开；直接 drop 也会释放底层连接
//! （russh 的会话任务在句柄被丢弃后结束），但不会发送 disconnect 消息。

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::ssh::transport::{RemoteShell, RusshShell};

/// 一个已建立的远程命令执行会话
///
/// 同一时刻只能有一个调用方使用（方法需要 `&mut self`）；
/// 跨任务共享需要外部加锁，例如 `tokio::sync::Mutex<Session>`。
pub struct Session {
    target: String,
    shell: Option<Box<dyn RemoteShell>>,
    default_timeout: Option<Duration>,
}

impl Session {
    /// 连接远程主机并完成认证
    ///
    /// 失败时返回 `Error::Connection`（配置不完整时返回 `Error::Config`），
    /// 不会返回未完成初始化的会话。
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let shell = RusshShell::connect(config).await?;

        Ok(Self {
            target: config.target(),
            shell: Some(Box::new(shell)),
            default_timeout: config.command_timeout(),
        })
    }

    /// 使用自定义的 `RemoteShell` 实现构造会话
    pub fn from_shell(target: impl Into<String>, shell: impl RemoteShell + 'static) -> Self {
        Self {
            target: target.into(),
            shell: Some(Box::new(shell)),
            default_timeout: None,
        }
    }

    /// 设置命令执行默认超时，调用时显式传入的超时优先
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn is_open(&self) -> bool {
        self.shell.is_some()
    }

    /// 优雅断开连接
    pub async fn close(mut self) -> Result<()> {
        match self.shell.take() {
            Some(mut shell) => {
                let result = shell.disconnect().await;
                info!(remote = %self.target, "SSH session closed");
                result
            }
            None => Ok(()),
        }
    }

    pub(crate) fn shell_mut(&mut self) -> Result<&mut (dyn RemoteShell + 'static)> {
        self.shell.as_deref_mut().ok_or(Error::SessionClosed)
    }

    /// 断开并标记为已关闭，之后的调用返回 `Error::SessionClosed`
    pub(crate) async fn teardown(&mut self) {
        if let Some(mut shell) = self.shell.take() {
            if let Err(e) = shell.disconnect().await {
                warn!(remote = %self.target, error = %e, "Failed to disconnect SSH session");
            }
            warn!(remote = %self.target, "SSH session torn down");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("open", &self.is_open())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.shell.is_some() {
            debug!(remote = %self.target, "SSH session dropped without close()");
        }
    }
}
