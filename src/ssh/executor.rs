//! SSH 命令执行器
//!
//! 在已建立的会话上执行单条命令：
//! - 以 `&` 结尾的命令视为后台命令，提交后立即返回空结果，不检查退出码，
//!   后台命令的失败对调用方不可见；
//! - 其余命令等待结束，退出码为 0 时返回标准输出的各行（去掉行尾空白），
//!   否则返回携带标准错误原文的 `Error::CommandExecution`。
//!
//! 超时或连接中断后会话会被断开，之后的调用返回 `Error::SessionClosed`。

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::output::redact;
use crate::ssh::session::Session;
use crate::ssh::transport::ProcessOutput;

const BACKGROUND_MARKER: char = '&';

impl Session {
    /// 执行命令并返回标准输出的各行
    ///
    /// `timeout` 为 None 时使用会话默认超时；两者都没有时无限等待。
    pub async fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<Vec<String>> {
        let start_time = Instant::now();
        let backgrounded = is_backgrounded(command);

        debug!(
            remote = %self.target(),
            command = %redact(command),
            backgrounded = backgrounded,
            "Executing SSH command"
        );

        let mut process = self.shell_mut()?.launch(command).await?;

        if backgrounded {
            // 只释放通道，远程进程继续运行
            if let Err(e) = process.detach().await {
                warn!(remote = %self.target(), error = %e, "Failed to release background channel");
            }
            info!(
                remote = %self.target(),
                command = %redact(command),
                "Command detached; exit status will not be checked"
            );
            return Ok(Vec::new());
        }

        let waited = match timeout.or(self.default_timeout()) {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, process.wait()).await;
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        drop(process);
                        warn!(
                            remote = %self.target(),
                            command = %redact(command),
                            timeout_secs = limit.as_secs_f64(),
                            "Command timed out, tearing down session"
                        );
                        self.teardown().await;
                        return Err(Error::Timeout {
                            command: redact(command),
                            timeout: limit,
                        });
                    }
                }
            }
            None => process.wait().await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(Error::Disconnected(reason)) => {
                self.teardown().await;
                return Err(Error::Disconnected(reason));
            }
            Err(e) => return Err(e),
        };

        info!(
            remote = %self.target(),
            exit_status = ?output.exit_status,
            duration_secs = start_time.elapsed().as_secs_f64(),
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Command executed"
        );

        output_lines(output)
    }
}

/// 命令去掉行尾空白后是否以 `&` 结尾
pub fn is_backgrounded(command: &str) -> bool {
    command.trim_end().ends_with(BACKGROUND_MARKER)
}

/// 将原始输出转换为结果：成功时返回 stdout 各行，失败时返回 stderr 原文
pub(crate) fn output_lines(output: ProcessOutput) -> Result<Vec<String>> {
    if !output.is_success() {
        let stderr = decode("stderr", output.stderr)?;
        return Err(Error::CommandExecution {
            stderr,
            exit_status: output.exit_status,
        });
    }

    let stdout = decode("stdout", output.stdout)?;
    Ok(stdout
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect())
}

fn decode(stream: &'static str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|source| Error::Decode { stream, source })
}
