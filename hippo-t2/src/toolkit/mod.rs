//! 外部工具后端: 颅骨剥离, 刚性配准与重采样.
//!
//! 流水线只通过 [`BrainExtractor`] 和 [`Registrar`] 两个 trait 与外部工具交互,
//! 测试中可替换为不启动任何进程的实现.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{PipelineError, Result};

pub mod runner;

mod bet;
mod flirt;
mod niftyreg;

pub use bet::Bet;
pub use flirt::FlirtRegistrar;
pub use niftyreg::PsfRegistrar;

/// 无法查询工具版本时, 报告中使用的版本描述.
pub const UNKNOWN_VERSION: &str = "(version unknown)";

/// 配准与重采样策略.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegistrationStrategy {
    /// FSL `flirt` 配准, `flirt` 三线性插值直接重采样.
    DirectInterpolation,

    /// FSL `flirt` 配准, NiftyReg `reg_resample -psf` 点扩散函数重采样.
    #[default]
    PsfResampling,
}

impl RegistrationStrategy {
    /// 所有策略.
    pub const ALL: [RegistrationStrategy; 2] = [Self::PsfResampling, Self::DirectInterpolation];

    /// 命令行中使用的短名.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::DirectInterpolation => "direct",
            Self::PsfResampling => "psf",
        }
    }
}

impl fmt::Display for RegistrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectInterpolation => "direct-interpolation",
            Self::PsfResampling => "psf-resampling",
        })
    }
}

impl FromStr for RegistrationStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "psf" | "psf-resampling" | "niftyreg" => Ok(Self::PsfResampling),
            "direct" | "direct-interpolation" | "fsl" | "flirt" => Ok(Self::DirectInterpolation),
            _ => Err(PipelineError::InvalidArgument("-reg", s.to_string())),
        }
    }
}

/// 外部工具包的安装位置. 目录为 `None` 时通过 `PATH` 查找.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToolPaths {
    /// FSL 可执行文件所在目录 (通常为 `$FSLDIR/bin`).
    pub fsl_bin: Option<PathBuf>,

    /// NiftyReg 可执行文件所在目录.
    pub niftyreg_bin: Option<PathBuf>,
}

impl ToolPaths {
    /// FSL 工具 `tool` 的路径.
    #[inline]
    pub fn fsl(&self, tool: &str) -> PathBuf {
        runner::locate(self.fsl_bin.as_deref(), tool)
    }

    /// NiftyReg 工具 `tool` 的路径.
    #[inline]
    pub fn niftyreg(&self, tool: &str) -> PathBuf {
        runner::locate(self.niftyreg_bin.as_deref(), tool)
    }
}

/// 颅骨剥离的产物.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrainExtraction {
    /// 只含脑组织的 T1 图像.
    pub brain: PathBuf,

    /// 脑组织二值掩膜.
    pub mask: PathBuf,
}

/// 刚性变换. 由配准后端以文件形式保存, 只能被同一后端使用.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RigidTransform {
    /// 变换文件路径.
    pub path: PathBuf,

    /// 产生该变换的策略.
    pub strategy: RegistrationStrategy,
}

/// 颅骨剥离.
pub trait BrainExtractor: Sync {
    /// 从 `t1` 中提取脑组织, 产物写入 `workdir`.
    fn extract(&self, t1: &Path, workdir: &Path) -> Result<BrainExtraction>;
}

/// 刚性配准与重采样.
///
/// 所有实现都以互信息为配准代价.
pub trait Registrar: Sync {
    /// 该后端实现的策略.
    fn strategy(&self) -> RegistrationStrategy;

    /// 工具名称与版本, 用于报告. 查询失败时不报错.
    fn identity(&self) -> String;

    /// 以 `floating_mask` 为权重, 计算 `floating` 到 `reference` 的 6 自由度刚性变换.
    fn register(
        &self,
        reference: &Path,
        floating: &Path,
        floating_mask: &Path,
        workdir: &Path,
    ) -> Result<RigidTransform>;

    /// 用 `transform` 将 `floating` 重采样到 `reference` 的体素网格, 写入 `output`.
    fn resample(
        &self,
        reference: &Path,
        floating: &Path,
        transform: &RigidTransform,
        output: &Path,
        workdir: &Path,
    ) -> Result<PathBuf>;
}

/// 根据策略构造真实的配准后端.
pub fn registrar_for(strategy: RegistrationStrategy, paths: &ToolPaths) -> Box<dyn Registrar> {
    match strategy {
        RegistrationStrategy::DirectInterpolation => Box::new(FlirtRegistrar::new(paths)),
        RegistrationStrategy::PsfResampling => Box::new(PsfRegistrar::new(paths)),
    }
}

/// 报告中 "Registration" 一行的内容.
pub fn describe(registrar: &dyn Registrar) -> String {
    format!("{} [{}]", registrar.identity(), registrar.strategy())
}

/// 从版本查询输出中取出第一行非空文本.
fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// 查询版本失败时记录警告并退回到 [`UNKNOWN_VERSION`].
fn version_or_unknown(tool: &str, queried: Result<String>) -> String {
    match queried.map(|t| first_line(&t)) {
        Ok(Some(line)) => line,
        Ok(None) => format!("{tool} {UNKNOWN_VERSION}"),
        Err(e) => {
            log::warn!("Cannot query `{tool}` version: {e}");
            format!("{tool} {UNKNOWN_VERSION}")
        }
    }
}
