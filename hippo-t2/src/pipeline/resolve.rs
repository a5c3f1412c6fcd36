//! 输入解析: 校验必需输入, 规范化路径, 建立输出目录与临时目录.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::PipelineConfig;
use crate::consts::{DEFAULT_TEMP_DIR_NAME, REQUIRED_FLAGS, RUN_DIR_PREFIX};
use crate::{PipelineError, Result};

/// 命令行给出的原始输入. 必需输入可能缺失, 路径可能是相对路径.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputSet {
    /// T1 结构像 (`-T1`).
    pub t1: Option<PathBuf>,

    /// T2 弛豫图 (`-T2map`).
    pub t2map: Option<PathBuf>,

    /// 左侧海马分割掩膜 (`-seg_L`).
    pub seg_l: Option<PathBuf>,

    /// 右侧海马分割掩膜 (`-seg_R`).
    pub seg_r: Option<PathBuf>,
}

/// 校验通过的输入. 所有路径均为绝对路径, 且指向已存在的普通文件.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedInputs {
    /// T1 结构像.
    pub t1: PathBuf,

    /// T2 弛豫图.
    pub t2map: PathBuf,

    /// 左侧海马分割掩膜.
    pub seg_l: PathBuf,

    /// 右侧海马分割掩膜.
    pub seg_r: PathBuf,
}

/// 单次运行的目录布局.
///
/// 工作目录 (`<tmp>/hippo_t2.XXXXXX`) 为本次运行独占, 在 `drop` 或 [`RunLayout::finish`]
/// 时删除.
#[derive(Debug)]
pub struct RunLayout {
    output_dir: PathBuf,
    temp_dir: PathBuf,
    created_temp: bool,
    workdir: TempDir,
}

impl RunLayout {
    /// 输出目录 (绝对路径).
    #[inline]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 临时目录 (绝对路径).
    #[inline]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// 本次运行独占的工作目录. 外部工具均在此目录下运行.
    #[inline]
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// 删除工作目录. 若临时目录是本次运行创建的且已经为空, 一并删除.
    pub fn finish(self) -> Result<()> {
        let Self {
            temp_dir,
            created_temp,
            workdir,
            ..
        } = self;
        workdir.close()?;
        if created_temp && fs::read_dir(&temp_dir)?.next().is_none() {
            fs::remove_dir(&temp_dir)?;
            log::debug!("Removed temporary directory {}", temp_dir.display());
        }
        Ok(())
    }
}

/// 相对路径以当前工作目录为基准转为绝对路径.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// 校验必需输入. 不创建任何文件或目录.
///
/// 任一必需输入缺失时返回 `MissingInput`, 其中列出缺失的参数和全部必需参数;
/// 路径不是已存在的普通文件时返回 `InputNotFound`.
pub fn resolve_inputs(inputs: &InputSet) -> Result<ResolvedInputs> {
    let (Some(t1), Some(t2map), Some(seg_l), Some(seg_r)) =
        (&inputs.t1, &inputs.t2map, &inputs.seg_l, &inputs.seg_r)
    else {
        let given = [&inputs.t1, &inputs.seg_l, &inputs.seg_r, &inputs.t2map];
        let missing = REQUIRED_FLAGS
            .iter()
            .zip(given)
            .filter(|(_, p)| p.is_none())
            .map(|(flag, _)| *flag)
            .collect();
        return Err(PipelineError::MissingInput(missing, &REQUIRED_FLAGS));
    };

    let existing = |role: &'static str, p: &Path| -> Result<PathBuf> {
        let p = absolutize(p)?;
        if p.is_file() {
            Ok(p)
        } else {
            Err(PipelineError::InputNotFound(role, p))
        }
    };

    Ok(ResolvedInputs {
        t1: existing("T1 image", t1)?,
        seg_l: existing("left segmentation", seg_l)?,
        seg_r: existing("right segmentation", seg_r)?,
        t2map: existing("T2 map", t2map)?,
    })
}

/// 校验可选参数. 不创建任何文件或目录.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    let thr = config.csf_threshold_ms;
    if !(thr.is_finite() && thr > 0.0) {
        return Err(PipelineError::InvalidArgument("-T2_thr", thr.to_string()));
    }
    let frac = config.binarize_fraction;
    if !(frac > 0.0 && frac <= 1.0) {
        return Err(PipelineError::InvalidArgument(
            "binarize fraction",
            frac.to_string(),
        ));
    }
    Ok(())
}

/// 建立输出目录, 临时目录和本次运行独占的工作目录.
///
/// 应当在所有校验通过之后调用.
pub fn prepare_layout(config: &PipelineConfig) -> Result<RunLayout> {
    let output_dir = match &config.output_dir {
        Some(p) => absolutize(p)?,
        None => std::env::current_dir()?,
    };
    fs::create_dir_all(&output_dir)?;

    let temp_dir = match &config.temp_dir {
        Some(p) => absolutize(p)?,
        None => output_dir.join(DEFAULT_TEMP_DIR_NAME),
    };
    let created_temp = !temp_dir.exists();
    fs::create_dir_all(&temp_dir)?;

    let workdir = tempfile::Builder::new()
        .prefix(RUN_DIR_PREFIX)
        .tempdir_in(&temp_dir)?;
    log::debug!("Working directory: {}", workdir.path().display());

    Ok(RunLayout {
        output_dir,
        temp_dir,
        created_temp,
        workdir,
    })
}
