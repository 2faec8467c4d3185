//! 统一错误模型
//! 定义连接、命令执行与配置相关的错误类型

use std::string::FromUtf8Error;
use std::time::Duration;

use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 建立会话失败的原因
///
/// 会话构造失败时总是返回此类错误，不会返回半初始化的会话。
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("SSH connection to {target} failed: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("SSH connection to {target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },

    #[error("host key for {target} was rejected by the verification policy")]
    HostKeyRejected { target: String },

    #[error("SSH authentication failed for user {user} on {target}")]
    Authentication { target: String, user: String },

    #[error("failed to load private key {path}: {reason}")]
    KeyLoad { path: String, reason: String },
}

/// 应用错误类型
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// 远程命令以非零状态退出，消息即远程标准错误输出原文
    #[error("{stderr}")]
    CommandExecution {
        stderr: String,
        /// 通道关闭前未收到退出码时为 None
        exit_status: Option<u32>,
    },

    /// 远程输出不是合法的 UTF-8
    #[error("remote {stream} is not valid UTF-8: {source}")]
    Decode {
        stream: &'static str,
        #[source]
        source: FromUtf8Error,
    },

    #[error("command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("SSH session is closed")]
    SessionClosed,

    /// 命令执行期间连接中断
    #[error("SSH connection lost: {0}")]
    Disconnected(String),

    /// 远程命令输出不符合预期格式
    #[error("unexpected output from `{command}`: {line:?}")]
    UnexpectedOutput { command: String, line: String },

    #[error("SSH channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// 是否为建立连接阶段的错误
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// 是否为远程命令非零退出
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Error::CommandExecution { .. })
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Error::Channel(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
