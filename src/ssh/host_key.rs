//! 主机密钥验证
//!
//! 验证策略可插拔：严格匹配 known_hosts、首次信任（TOFU）、固定指纹。
//!
//! 默认策略为首次信任：未知主机会被自动接受。这是为测试环境保留的宽松策略，
//! 存在中间人风险，生产环境应使用 `Strict` 或 `Pinned`。

use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;

const FINGERPRINT_PREFIX: &str = "SHA256:";

/// 主机密钥验证策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// 严格模式：只接受 known_hosts 中已有且匹配的密钥
    Strict,
    /// 首次信任：已知密钥必须匹配，未知主机直接接受
    #[default]
    #[serde(alias = "tofu", alias = "accept")]
    TrustOnFirstUse,
    /// 固定指纹：服务器密钥指纹必须与配置一致
    Pinned,
}

impl std::str::FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "tofu" | "trust_on_first_use" | "accept" => Ok(Self::TrustOnFirstUse),
            "pinned" => Ok(Self::Pinned),
            _ => Err(format!("Unknown host key policy: {}", s)),
        }
    }
}

/// known_hosts 查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHostsLookup {
    Match,
    /// 记录存在但密钥不同，`line` 为 known_hosts 中的行号
    Mismatch { line: usize },
    Unknown,
}

/// 验证结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// 接受并写入 known_hosts
    Learn,
    Reject,
}

/// 主机密钥验证器
#[derive(Debug, Clone)]
pub struct HostKeyVerifier {
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
    pinned: Option<String>,
    learn: bool,
}

impl HostKeyVerifier {
    pub fn new(policy: HostKeyPolicy) -> Self {
        Self {
            policy,
            known_hosts: None,
            pinned: None,
            learn: false,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            policy: config.host_key_policy,
            known_hosts: config.known_hosts_file.clone(),
            pinned: config.pinned_fingerprint.clone(),
            learn: config.learn_host_keys,
        }
    }

    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn with_pinned(mut self, fingerprint: impl Into<String>) -> Self {
        self.pinned = Some(fingerprint.into());
        self
    }

    pub fn with_learn(mut self, learn: bool) -> Self {
        self.learn = learn;
        self
    }

    pub fn policy(&self) -> HostKeyPolicy {
        self.policy
    }

    /// 根据策略、known_hosts 查询结果和指纹给出结论
    pub fn decide(&self, lookup: KnownHostsLookup, fingerprint: &str) -> Verdict {
        match self.policy {
            HostKeyPolicy::Strict => match lookup {
                KnownHostsLookup::Match => Verdict::Accept,
                _ => Verdict::Reject,
            },
            HostKeyPolicy::TrustOnFirstUse => match lookup {
                KnownHostsLookup::Match => Verdict::Accept,
                KnownHostsLookup::Mismatch { .. } => Verdict::Reject,
                KnownHostsLookup::Unknown if self.learn => Verdict::Learn,
                KnownHostsLookup::Unknown => Verdict::Accept,
            },
            HostKeyPolicy::Pinned => match &self.pinned {
                Some(pinned) if same_fingerprint(pinned, fingerprint) => Verdict::Accept,
                _ => Verdict::Reject,
            },
        }
    }

    /// 验证服务器公钥，返回是否接受
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        let fingerprint = fingerprint(key);
        let lookup = match self.policy {
            HostKeyPolicy::Pinned => KnownHostsLookup::Unknown,
            _ => self.lookup(host, port, key),
        };

        match self.decide(lookup, &fingerprint) {
            Verdict::Accept => {
                if lookup == KnownHostsLookup::Match {
                    debug!(host = %host, port = port, "Host key verified");
                } else {
                    info!(
                        host = %host,
                        port = port,
                        algorithm = key.name(),
                        fingerprint = %fingerprint,
                        policy = ?self.policy,
                        "Accepting host key"
                    );
                }
                true
            }
            Verdict::Learn => {
                info!(
                    host = %host,
                    port = port,
                    fingerprint = %fingerprint,
                    "First time connecting - learning host key"
                );
                self.learn_key(host, port, key);
                true
            }
            Verdict::Reject => {
                match lookup {
                    KnownHostsLookup::Mismatch { line } => error!(
                        host = %host,
                        port = port,
                        fingerprint = %fingerprint,
                        known_hosts_line = line,
                        "Host key mismatch - REJECTING CONNECTION"
                    ),
                    _ => error!(
                        host = %host,
                        port = port,
                        fingerprint = %fingerprint,
                        policy = ?self.policy,
                        "Host key not trusted - rejecting connection"
                    ),
                }
                false
            }
        }
    }

    fn lookup(&self, host: &str, port: u16, key: &PublicKey) -> KnownHostsLookup {
        let result = match &self.known_hosts {
            Some(path) if !path.exists() => return KnownHostsLookup::Unknown,
            Some(path) => russh_keys::check_known_hosts_path(host, port, key, path),
            None => russh_keys::check_known_hosts(host, port, key),
        };

        match result {
            Ok(true) => KnownHostsLookup::Match,
            Ok(false) => KnownHostsLookup::Unknown,
            Err(russh_keys::Error::KeyChanged { line }) => KnownHostsLookup::Mismatch { line },
            Err(e) => {
                warn!(host = %host, error = %e, "Failed to read known_hosts");
                KnownHostsLookup::Unknown
            }
        }
    }

    fn learn_key(&self, host: &str, port: u16, key: &PublicKey) {
        let result = match &self.known_hosts {
            Some(path) => russh_keys::learn_known_hosts_path(host, port, key, path),
            None => russh_keys::learn_known_hosts(host, port, key),
        };

        if let Err(e) = result {
            warn!(host = %host, error = %e, "Failed to record host key");
        }
    }
}

/// 计算 OpenSSH 格式的 SHA256 指纹
pub fn fingerprint(key: &PublicKey) -> String {
    let encoded = key.public_key_base64();
    let blob = general_purpose::STANDARD
        .decode(&encoded)
        .unwrap_or_else(|_| encoded.into_bytes());
    fingerprint_of_blob(&blob)
}

/// 对公钥原始数据计算指纹
pub fn fingerprint_of_blob(blob: &[u8]) -> String {
    let digest = Sha256::digest(blob);
    format!(
        "{}{}",
        FINGERPRINT_PREFIX,
        general_purpose::STANDARD_NO_PAD.encode(digest)
    )
}

fn same_fingerprint(a: &str, b: &str) -> bool {
    let strip = |s: &str| s.trim().trim_start_matches(FINGERPRINT_PREFIX).to_string();
    strip(a) == strip(b)
}
