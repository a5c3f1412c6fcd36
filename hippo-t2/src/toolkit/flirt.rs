//! FSL `flirt` 配准与直接插值重采样.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use super::bet::FSL_OUTPUT_TYPE;
use super::runner::{expect_output, ToolCommand};
use super::{version_or_unknown, Registrar, RegistrationStrategy, RigidTransform, ToolPaths};
use crate::{Result, Stage};

const TOOL: &str = "flirt";

/// 配准得到的仿射矩阵文件名.
const MATRIX_FILE: &str = "T1_to_T2map.mat";

/// 配准后的 T1 图像, 仅用于排查.
const REGISTERED_FILE: &str = "T1_in_T2map.nii.gz";

/// `flirt -dof 6 -cost mutualinfo` 配准, `-applyxfm -interp trilinear` 重采样.
#[derive(Debug)]
pub struct FlirtRegistrar {
    program: PathBuf,
    identity: OnceCell<String>,
}

impl FlirtRegistrar {
    /// 在 `paths` 指定的 FSL 安装中查找 `flirt`.
    pub fn new(paths: &ToolPaths) -> Self {
        Self {
            program: paths.fsl(TOOL),
            identity: OnceCell::new(),
        }
    }

    fn command(&self, workdir: Option<&Path>) -> ToolCommand {
        let cmd = ToolCommand::new(Stage::Alignment, TOOL, self.program.clone())
            .env(FSL_OUTPUT_TYPE.0, FSL_OUTPUT_TYPE.1);
        match workdir {
            Some(dir) => cmd.current_dir(dir),
            None => cmd,
        }
    }

    pub(super) fn register_args(
        reference: &Path,
        floating: &Path,
        floating_mask: &Path,
        workdir: &Path,
    ) -> Vec<OsString> {
        vec![
            "-in".into(),
            floating.into(),
            "-ref".into(),
            reference.into(),
            "-dof".into(),
            "6".into(),
            "-cost".into(),
            "mutualinfo".into(),
            "-inweight".into(),
            floating_mask.into(),
            "-omat".into(),
            workdir.join(MATRIX_FILE).into(),
            "-out".into(),
            workdir.join(REGISTERED_FILE).into(),
        ]
    }

    fn resample_args(
        reference: &Path,
        floating: &Path,
        transform: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        vec![
            "-in".into(),
            floating.into(),
            "-ref".into(),
            reference.into(),
            "-applyxfm".into(),
            "-init".into(),
            transform.into(),
            "-interp".into(),
            "trilinear".into(),
            "-out".into(),
            output.into(),
        ]
    }

    /// 计算刚性变换, 返回 FSL 格式的矩阵文件.
    pub(super) fn estimate(
        &self,
        reference: &Path,
        floating: &Path,
        floating_mask: &Path,
        workdir: &Path,
    ) -> Result<PathBuf> {
        self.command(Some(workdir))
            .args(Self::register_args(reference, floating, floating_mask, workdir))
            .run()?;
        expect_output(Stage::Alignment, TOOL, workdir.join(MATRIX_FILE))
    }
}

impl Registrar for FlirtRegistrar {
    fn strategy(&self) -> RegistrationStrategy {
        RegistrationStrategy::DirectInterpolation
    }

    fn identity(&self) -> String {
        self.identity
            .get_or_init(|| version_or_unknown(TOOL, self.command(None).arg("-version").run_text()))
            .clone()
    }

    fn register(
        &self,
        reference: &Path,
        floating: &Path,
        floating_mask: &Path,
        workdir: &Path,
    ) -> Result<RigidTransform> {
        Ok(RigidTransform {
            path: self.estimate(reference, floating, floating_mask, workdir)?,
            strategy: self.strategy(),
        })
    }

    fn resample(
        &self,
        reference: &Path,
        floating: &Path,
        transform: &RigidTransform,
        output: &Path,
        workdir: &Path,
    ) -> Result<PathBuf> {
        debug_assert_eq!(transform.strategy, self.strategy());
        self.command(Some(workdir))
            .args(Self::resample_args(reference, floating, &transform.path, output))
            .run()?;
        expect_output(Stage::Alignment, TOOL, output.to_path_buf())
    }
}
