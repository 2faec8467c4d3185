//! 单元测试用的脚本化远程 shell

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::ssh::transport::{ProcessOutput, RemoteProcess, RemoteShell};

enum Script {
    Output(ProcessOutput),
    Hang,
    Disconnect,
    LaunchError(String),
}

/// 按提交顺序返回预设结果；脚本用完后返回空输出、退出码 0
pub(crate) struct ScriptedShell {
    scripts: VecDeque<Script>,
    launched: Arc<Mutex<Vec<String>>>,
    waited: Arc<Mutex<Vec<String>>>,
    detached: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<AtomicUsize>,
}

impl ScriptedShell {
    pub(crate) fn new() -> Self {
        Self {
            scripts: VecDeque::new(),
            launched: Arc::new(Mutex::new(Vec::new())),
            waited: Arc::new(Mutex::new(Vec::new())),
            detached: Arc::new(Mutex::new(Vec::new())),
            disconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn respond(mut self, exit_status: Option<u32>, stdout: &[u8], stderr: &[u8]) -> Self {
        self.scripts.push_back(Script::Output(ProcessOutput {
            exit_status,
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        }));
        self
    }

    pub(crate) fn hang(mut self) -> Self {
        self.scripts.push_back(Script::Hang);
        self
    }

    /// 等待时连接中断
    pub(crate) fn disconnect_midway(mut self) -> Self {
        self.scripts.push_back(Script::Disconnect);
        self
    }

    pub(crate) fn fail_launch(mut self, reason: &str) -> Self {
        self.scripts.push_back(Script::LaunchError(reason.to_string()));
        self
    }

    pub(crate) fn launched(&self) -> Arc<Mutex<Vec<String>>> {
        self.launched.clone()
    }

    pub(crate) fn waited(&self) -> Arc<Mutex<Vec<String>>> {
        self.waited.clone()
    }

    pub(crate) fn detached(&self) -> Arc<Mutex<Vec<String>>> {
        self.detached.clone()
    }

    pub(crate) fn disconnects(&self) -> Arc<AtomicUsize> {
        self.disconnects.clone()
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn launch(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>> {
        let script = self
            .scripts
            .pop_front()
            .unwrap_or_else(|| Script::Output(ProcessOutput {
                exit_status: Some(0),
                ..Default::default()
            }));

        if let Script::LaunchError(reason) = script {
            return Err(Error::channel(reason));
        }

        self.launched.lock().unwrap().push(command.to_string());
        Ok(Box::new(ScriptedProcess {
            script: Some(script),
            command: command.to_string(),
            waited: self.waited.clone(),
            detached: self.detached.clone(),
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedProcess {
    script: Option<Script>,
    command: String,
    waited: Arc<Mutex<Vec<String>>>,
    detached: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RemoteProcess for ScriptedProcess {
    async fn wait(&mut self) -> Result<ProcessOutput> {
        self.waited.lock().unwrap().push(self.command.clone());
        match self.script.take() {
            Some(Script::Output(output)) => Ok(output),
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Disconnect) => Err(Error::Disconnected(format!(
                "connection lost while running `{}`",
                self.command
            ))),
            _ => Err(Error::channel("process already waited")),
        }
    }

    async fn detach(&mut self) -> Result<()> {
        self.detached.lock().unwrap().push(self.command.clone());
        Ok(())
    }
}
