//! 远程 Docker 容器清理
//!
//! 注意：这里删除的是远程主机上的全部容器（包括运行中的），
//! 不区分是否由当前测试创建，调用方需要清楚影响范围。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::{Error, Result};
use crate::ssh::session::Session;

/// 列出全部容器 ID（含已停止的）
pub const LIST_CONTAINERS_COMMAND: &str = "docker ps -aq";

/// 强制删除容器（先停止再删除），同时删除匿名卷
const REMOVE_CONTAINERS_COMMAND: &str = "docker container rm -fv";

static CONTAINER_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{12,64}$").expect("container id pattern is valid")
});

impl Session {
    /// 删除远程主机上的全部容器，返回删除的数量
    ///
    /// 列表为空时不会执行删除命令。
    pub async fn delete_all_containers(&mut self) -> Result<usize> {
        let listed = self.execute(LIST_CONTAINERS_COMMAND, None).await?;
        let ids = container_ids(&listed)?;

        if ids.is_empty() {
            info!(remote = %self.target(), "No containers to remove");
            return Ok(0);
        }

        self.execute(&remove_command(&ids), None).await?;

        info!(
            remote = %self.target(),
            count = ids.len(),
            "Removed all containers"
        );
        Ok(ids.len())
    }
}

/// 从列表输出中提取容器 ID，拒绝任何不像容器 ID 的内容
pub fn container_ids(lines: &[String]) -> Result<Vec<&str>> {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            if CONTAINER_ID.is_match(line) {
                Ok(line)
            } else {
                Err(Error::UnexpectedOutput {
                    command: LIST_CONTAINERS_COMMAND.to_string(),
                    line: line.to_string(),
                })
            }
        })
        .collect()
}

fn remove_command(ids: &[&str]) -> String {
    format!("{} {}", REMOVE_CONTAINERS_COMMAND, ids.join(" "))
}
