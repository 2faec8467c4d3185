//! SSH 执行模块
//! 会话管理、命令执行与主机密钥验证

pub mod executor;
pub mod host_key;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::is_backgrounded;
pub use host_key::{HostKeyPolicy, HostKeyVerifier, KnownHostsLookup, Verdict};
pub use session::Session;
pub use transport::{ProcessOutput, RemoteProcess, RemoteShell, RusshShell};
