//! 运行时错误.

use crate::{Hemisphere, Idx3d};
use quick_error::quick_error;
use std::fmt;
use std::io::Error as IoError;
use std::path::PathBuf;
use std::process::ExitStatus;

/// 流水线阶段. 外部工具错误会携带它, 以便指出是哪个阶段失败.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    /// 输入解析.
    Resolve,

    /// 空间对齐 (颅骨剥离, 配准, 重采样).
    Alignment,

    /// 污染校正.
    Correction,

    /// 统计.
    Statistics,

    /// 报告输出.
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolve => "input resolution",
            Self::Alignment => "spatial alignment",
            Self::Correction => "contamination correction",
            Self::Statistics => "statistics",
            Self::Report => "report",
        };
        f.write_str(name)
    }
}

quick_error! {
    /// 流水线的所有错误. 所有错误都是致命的, 不会重试.
    #[derive(Debug)]
    pub enum PipelineError {
        /// 缺少必需参数. 携带缺失的参数名与全部必需参数名.
        MissingInput(missing: Vec<&'static str>, required: &'static [&'static str]) {
            display("missing {} (required: {})", missing.join(", "), required.join(", "))
        }

        /// 必需输入不是已存在的文件.
        InputNotFound(role: &'static str, path: PathBuf) {
            display("{} not found: {}", role, path.display())
        }

        /// 可选参数取值不合法.
        InvalidArgument(name: &'static str, value: String) {
            display("invalid value for {}: `{}`", name, value)
        }

        /// 外部工具以非零状态退出.
        ExternalTool(stage: Stage, tool: String, status: ExitStatus, stderr: String) {
            display("{} stage: `{}` failed with {}{}", stage, tool, status,
                if stderr.is_empty() { String::new() } else { format!(": {}", stderr) })
        }

        /// 外部工具无法启动.
        ToolSpawn(stage: Stage, tool: String, err: IoError) {
            display("{} stage: cannot run `{}`: {}", stage, tool, err)
            source(err)
        }

        /// 外部工具正常退出, 但没有产生预期的输出文件.
        MissingToolOutput(stage: Stage, tool: String, path: PathBuf) {
            display("{} stage: `{}` produced no output at {}", stage, tool, path.display())
        }

        /// 校正后的掩膜为空, 平均 T2 无定义.
        EmptyMask(hemisphere: Hemisphere) {
            display("{} corrected mask contains no voxels, mean T2 is undefined", hemisphere)
        }

        /// 体素网格形状不一致.
        ShapeMismatch(what: String, expected: Idx3d, found: Idx3d) {
            display("{}: expected grid {:?} (z, h, w), found {:?}", what, expected, found)
        }

        /// nii 文件读写错误.
        Nifti(err: nifti::NiftiError) {
            from()
            display("NIfTI error: {}", err)
            source(err)
        }

        /// 其他底层 I/O 错误.
        Io(err: IoError) {
            from()
            display("I/O error: {}", err)
            source(err)
        }
    }
}

impl PipelineError {
    /// 是否是命令行用法错误 (此时应打印用法说明).
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::MissingInput(..) | Self::InputNotFound(..) | Self::InvalidArgument(..)
        )
    }

    /// 错误所属阶段. 不携带阶段信息的错误返回 `None`.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::MissingInput(..) | Self::InputNotFound(..) | Self::InvalidArgument(..) => {
                Some(Stage::Resolve)
            }
            Self::ExternalTool(stage, ..)
            | Self::ToolSpawn(stage, ..)
            | Self::MissingToolOutput(stage, ..) => Some(*stage),
            Self::EmptyMask(..) => Some(Stage::Statistics),
            _ => None,
        }
    }
}

/// 流水线运行时结果.
pub type Result<T> = std::result::Result<T, PipelineError>;
