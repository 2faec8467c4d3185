//! 远程 SSH 终端
//!
//! 建立一次 SSH 会话并在其上执行命令：成功时返回标准输出的各行，
//! 非零退出时返回携带标准错误原文的错误。另提供清理远程 Docker 容器的便捷方法。

pub mod config;
pub mod containers;
pub mod error;
pub mod output;
pub mod ssh;
pub mod telemetry;

pub use config::{ConnectionConfig, Credential, LoggingConfig, Settings, TransportOptions};
pub use error::{ConnectionError, Error, Result};
pub use ssh::{HostKeyPolicy, ProcessOutput, RemoteProcess, RemoteShell, Session};
