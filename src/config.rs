//! 配置系统
//! 从环境变量加载 SSH 连接与日志配置，使用 Secret 包装敏感信息

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment};
use secrecy::Secret;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ssh::host_key::HostKeyPolicy;

/// 环境变量前缀，例如 `SSH_TERMINAL_SSH__HOST`
pub const ENV_PREFIX: &str = "SSH_TERMINAL";

/// 透传给底层 SSH 传输层的选项
#[derive(Debug, Clone, Deserialize)]
pub struct TransportOptions {
    /// 连接空闲超时（秒），None 表示不限制
    #[serde(default)]
    pub inactivity_timeout_secs: Option<u64>,
    /// keepalive 发送间隔（秒），None 表示不发送
    #[serde(default)]
    pub keepalive_interval_secs: Option<u64>,
    /// 连续无响应的 keepalive 次数上限
    #[serde(default = "default_keepalive_max")]
    pub keepalive_max: usize,
}

fn default_keepalive_max() -> usize {
    3
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: None,
            keepalive_interval_secs: None,
            keepalive_max: default_keepalive_max(),
        }
    }
}

/// 认证凭据（借用自配置）
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    Password(&'a Secret<String>),
    PrivateKeyFile {
        path: &'a Path,
        passphrase: Option<&'a Secret<String>>,
    },
}

/// SSH 连接配置
///
/// 创建后不再修改；会话只在构造期间借用它。
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// 主机地址
    pub host: String,

    /// 端口
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// 用户名
    pub username: String,

    /// 密码（使用 Secret 包装，防止日志泄露）
    #[serde(default)]
    pub password: Option<Secret<String>>,

    /// 私钥文件路径，设置后优先于密码
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,

    /// 私钥密码
    #[serde(default)]
    pub private_key_passphrase: Option<Secret<String>>,

    /// 连接 + 认证超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// 命令执行默认超时（秒），None 表示无限等待
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    /// 主机密钥验证策略
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    /// known_hosts 文件路径，None 时使用 ~/.ssh/known_hosts
    #[serde(default)]
    pub known_hosts_file: Option<PathBuf>,

    /// Pinned 策略使用的指纹（SHA256:...）
    #[serde(default)]
    pub pinned_fingerprint: Option<String>,

    /// 首次信任时是否把新密钥写入 known_hosts
    #[serde(default)]
    pub learn_host_keys: bool,

    /// 透传的传输层选项
    #[serde(default)]
    pub transport: TransportOptions,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

impl ConnectionConfig {
    fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            password: None,
            private_key_file: None,
            private_key_passphrase: None,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: None,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_file: None,
            pinned_fingerprint: None,
            learn_host_keys: false,
            transport: TransportOptions::default(),
        }
    }

    /// 创建使用密码认证的配置
    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut config = Self::new(host, username);
        config.password = Some(Secret::new(password.into()));
        config
    }

    /// 创建使用私钥文件认证的配置
    pub fn with_private_key_file(
        host: impl Into<String>,
        username: impl Into<String>,
        path: impl Into<PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        let mut config = Self::new(host, username);
        config.private_key_file = Some(path.into());
        config.private_key_passphrase = passphrase.map(Secret::new);
        config
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout_secs: u64) -> Self {
        self.connect_timeout_secs = timeout_secs;
        self
    }

    pub fn with_command_timeout(mut self, timeout_secs: u64) -> Self {
        self.command_timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn with_known_hosts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_file = Some(path.into());
        self
    }

    /// 设置固定指纹并切换到 Pinned 策略
    pub fn with_pinned_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.pinned_fingerprint = Some(fingerprint.into());
        self.host_key_policy = HostKeyPolicy::Pinned;
        self
    }

    pub fn with_learn_host_keys(mut self, learn: bool) -> Self {
        self.learn_host_keys = learn;
        self
    }

    pub fn with_transport_options(mut self, options: TransportOptions) -> Self {
        self.transport = options;
        self
    }

    /// 获取目标地址字符串
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// 解析认证凭据：私钥文件优先，其次密码
    pub fn credential(&self) -> Result<Credential<'_>> {
        if let Some(path) = &self.private_key_file {
            return Ok(Credential::PrivateKeyFile {
                path,
                passphrase: self.private_key_passphrase.as_ref(),
            });
        }

        self.password
            .as_ref()
            .map(Credential::Password)
            .ok_or_else(|| {
                Error::config(format!(
                    "no credential configured for {}: set a password or a private key file",
                    self.target()
                ))
            })
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("SSH host must not be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(Error::config("SSH username must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("SSH port must be non-zero"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::config("connect timeout must be at least one second"));
        }
        if self.host_key_policy == HostKeyPolicy::Pinned && self.pinned_fingerprint.is_none() {
            return Err(Error::config(
                "pinned host key policy requires pinned_fingerprint",
            ));
        }
        self.credential()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, compact
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(Error::config(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.level
                )))
            }
        }

        match self.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => Ok(()),
            _ => Err(Error::config(format!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.format
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ssh: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// 从环境变量加载配置（会先读取当前目录下的 .env）
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Self::load(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load(source: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("ssh.port", 22)?
            .set_default("ssh.connect_timeout_secs", 10)?
            .set_default("ssh.host_key_policy", "trust_on_first_use")?
            .set_default("ssh.learn_host_keys", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "compact")?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<()> {
        self.ssh.validate()?;
        self.logging.validate()
    }
}
