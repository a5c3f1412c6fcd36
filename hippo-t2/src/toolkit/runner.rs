//! 外部程序调用.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use itertools::Itertools;

use crate::{PipelineError, Result, Stage};

/// 错误信息中最多保留的 stderr 行数.
const STDERR_TAIL_LINES: usize = 8;

/// 在 `dir` 下定位工具 `tool`. `dir` 为 `None` 时交给 `PATH` 查找.
#[inline]
pub fn locate(dir: Option<&Path>, tool: &str) -> PathBuf {
    dir.map_or_else(|| PathBuf::from(tool), |d| d.join(tool))
}

/// 一次同步阻塞的外部工具调用. 没有超时.
#[derive(Debug)]
pub struct ToolCommand {
    stage: Stage,
    tool: String,
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
}

impl ToolCommand {
    /// 在 `stage` 阶段调用 `program`. `tool` 为错误信息中展示的名字.
    pub fn new(stage: Stage, tool: &str, program: PathBuf) -> Self {
        Self {
            stage,
            tool: tool.to_string(),
            program,
            args: vec![],
            cwd: None,
            envs: vec![],
        }
    }

    /// 追加一个参数.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// 追加一组参数.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// 设置工作目录.
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// 设置环境变量.
    pub fn env<K: AsRef<OsStr>, V: AsRef<OsStr>>(mut self, key: K, val: V) -> Self {
        self.envs
            .push((key.as_ref().to_owned(), val.as_ref().to_owned()));
        self
    }

    /// 用于日志的完整命令行.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy())
            .join(" ")
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// 运行并等待结束. 非零退出状态返回 `ExternalTool` 错误.
    pub fn run(self) -> Result<Output> {
        log::debug!("[{}] {}", self.stage, self.command_line());
        let output = self
            .build()
            .output()
            .map_err(|e| PipelineError::ToolSpawn(self.stage, self.tool.clone(), e))?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(PipelineError::ExternalTool(
                self.stage,
                self.tool,
                output.status,
                stderr_tail(&output.stderr),
            ))
        }
    }

    /// 运行并返回 stdout 与 stderr 合并后的文本 (去除首尾空白).
    pub fn run_text(self) -> Result<String> {
        let output = self.run()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text.trim().to_string())
    }
}

/// stderr 的最后几行.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}

/// 确认工具确实产生了 `path`, 否则返回 `MissingToolOutput` 错误.
pub fn expect_output(stage: Stage, tool: &str, path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::MissingToolOutput(stage, tool.to_string(), path))
    }
}
