//! `flirt` 互信息配准, NiftyReg `reg_resample -psf` 重采样.
//!
//! `flirt` 给出的矩阵先由 `reg_transform -flirtAff2NR` 转换为 NiftyReg 仿射格式.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use super::flirt::FlirtRegistrar;
use super::runner::{expect_output, ToolCommand};
use super::{
    first_line, version_or_unknown, Registrar, RegistrationStrategy, RigidTransform, ToolPaths,
};
use crate::{Result, Stage};

const CONVERT_TOOL: &str = "reg_transform";
const RESAMPLE_TOOL: &str = "reg_resample";

/// 转换后的仿射矩阵文件名 (NiftyReg 文本格式).
const AFFINE_FILE: &str = "T1_to_T2map.txt";

/// `flirt -dof 6 -cost mutualinfo` 配准, `reg_resample -inter 1 -psf` 重采样.
#[derive(Debug)]
pub struct PsfRegistrar {
    flirt: FlirtRegistrar,
    convert: PathBuf,
    resample: PathBuf,
    identity: OnceCell<String>,
}

impl PsfRegistrar {
    /// 在 `paths` 中查找 FSL `flirt` 与 NiftyReg `reg_transform`, `reg_resample`.
    pub fn new(paths: &ToolPaths) -> Self {
        Self {
            flirt: FlirtRegistrar::new(paths),
            convert: paths.niftyreg(CONVERT_TOOL),
            resample: paths.niftyreg(RESAMPLE_TOOL),
            identity: OnceCell::new(),
        }
    }

    pub(super) fn register_args(
        reference: &Path,
        floating: &Path,
        floating_mask: &Path,
        workdir: &Path,
    ) -> Vec<OsString> {
        FlirtRegistrar::register_args(reference, floating, floating_mask, workdir)
    }

    fn convert_args(
        reference: &Path,
        floating: &Path,
        matrix: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        vec![
            "-ref".into(),
            reference.into(),
            "-flirtAff2NR".into(),
            matrix.into(),
            reference.into(),
            floating.into(),
            output.into(),
        ]
    }

    fn resample_args(
        reference: &Path,
        floating: &Path,
        transform: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        vec![
            "-ref".into(),
            reference.into(),
            "-flo".into(),
            floating.into(),
            "-trans".into(),
            transform.into(),
            "-res".into(),
            output.into(),
            "-inter".into(),
            "1".into(),
            "-psf".into(),
        ]
    }
}

impl Registrar for PsfRegistrar {
    fn strategy(&self) -> RegistrationStrategy {
        RegistrationStrategy::PsfResampling
    }

    fn identity(&self) -> String {
        self.identity
            .get_or_init(|| {
                let queried =
                    ToolCommand::new(Stage::Alignment, RESAMPLE_TOOL, self.resample.clone())
                        .arg("--version")
                        .run_text()
                        .map(|v| {
                            first_line(&v)
                                .map(|l| format!("{RESAMPLE_TOOL} {l}"))
                                .unwrap_or_default()
                        });
                format!(
                    "{}, {}",
                    self.flirt.identity(),
                    version_or_unknown(RESAMPLE_TOOL, queried)
                )
            })
            .clone()
    }

    fn register(
        &self,
        reference: &Path,
        floating: &Path,
        floating_mask: &Path,
        workdir: &Path,
    ) -> Result<RigidTransform> {
        let matrix = self.flirt.estimate(reference, floating, floating_mask, workdir)?;
        let affine = workdir.join(AFFINE_FILE);
        ToolCommand::new(Stage::Alignment, CONVERT_TOOL, self.convert.clone())
            .args(Self::convert_args(reference, floating, &matrix, &affine))
            .current_dir(workdir)
            .run()?;
        Ok(RigidTransform {
            path: expect_output(Stage::Alignment, CONVERT_TOOL, affine)?,
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
        ToolCommand::new(Stage::Alignment, RESAMPLE_TOOL, self.resample.clone())
            .args(Self::resample_args(reference, floating, &transform.path, output))
            .current_dir(workdir)
            .run()?;
        expect_output(Stage::Alignment, RESAMPLE_TOOL, output.to_path_buf())
    }
}
