//! 测试公共模块
//! 提供脚本化的远程 shell，按提交顺序返回预设输出

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ssh_terminal::{ProcessOutput, RemoteProcess, RemoteShell, Result, Session};

/// 记录所有提交的命令以及哪些命令被等待过
#[derive(Clone, Default)]
pub struct Journal {
    pub launched: Arc<Mutex<Vec<String>>>,
    pub waited: Arc<Mutex<Vec<String>>>,
    pub detached: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub fn waited(&self) -> Vec<String> {
        self.waited.lock().unwrap().clone()
    }

    pub fn detached(&self) -> Vec<String> {
        self.detached.lock().unwrap().clone()
    }
}

pub struct FakeShell {
    outputs: VecDeque<ProcessOutput>,
    by_command: HashMap<String, ProcessOutput>,
    journal: Journal,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            outputs: VecDeque::new(),
            by_command: HashMap::new(),
            journal: Journal::default(),
        }
    }

    pub fn reply(mut self, exit_status: u32, stdout: &str, stderr: &str) -> Self {
        self.outputs.push_back(ProcessOutput {
            exit_status: Some(exit_status),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        });
        self
    }

    /// 为指定命令预设输出，不受提交顺序影响
    pub fn reply_to(mut self, command: &str, exit_status: u32, stdout: &str, stderr: &str) -> Self {
        self.by_command.insert(
            command.to_string(),
            ProcessOutput {
                exit_status: Some(exit_status),
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            },
        );
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn into_session(self) -> (Session, Journal) {
        let journal = self.journal();
        (Session::from_shell("tester@fake-host:22", self), journal)
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn launch(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>> {
        self.journal.launched.lock().unwrap().push(command.to_string());
        let output = match self.by_command.remove(command) {
            Some(output) => output,
            None => self.outputs.pop_front().unwrap_or(ProcessOutput {
                exit_status: Some(0),
                ..Default::default()
            }),
        };

        Ok(Box::new(FakeProcess {
            command: command.to_string(),
            output,
            journal: self.journal.clone(),
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

struct FakeProcess {
    command: String,
    output: ProcessOutput,
    journal: Journal,
}

#[async_trait]
impl RemoteProcess for FakeProcess {
    async fn wait(&mut self) -> Result<ProcessOutput> {
        self.journal.waited.lock().unwrap().push(self.command.clone());
        Ok(std::mem::take(&mut self.output))
    }

    async fn detach(&mut self) -> Result<()> {
        self.journal.detached.lock().unwrap().push(self.command.clone());
        Ok(())
    }
}
