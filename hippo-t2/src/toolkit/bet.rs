//! FSL `bet` 颅骨剥离.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::runner::{expect_output, ToolCommand};
use super::{BrainExtraction, BrainExtractor, ToolPaths};
use crate::{Result, Stage};

/// FSL 输出格式环境变量.
pub(crate) const FSL_OUTPUT_TYPE: (&str, &str) = ("FSLOUTPUTTYPE", "NIFTI_GZ");

const TOOL: &str = "bet";

/// 产物前缀. `bet` 输出 `<prefix>.nii.gz` 与 `<prefix>_mask.nii.gz`.
const BRAIN_PREFIX: &str = "T1_brain";

/// 调用 FSL `bet -m` 的颅骨剥离.
#[derive(Clone, Debug)]
pub struct Bet {
    program: PathBuf,
}

impl Bet {
    /// 在 `paths` 指定的 FSL 安装中查找 `bet`.
    pub fn new(paths: &ToolPaths) -> Self {
        Self {
            program: paths.fsl(TOOL),
        }
    }

    fn args(t1: &Path, workdir: &Path) -> Vec<OsString> {
        vec![
            t1.into(),
            workdir.join(BRAIN_PREFIX).into(),
            "-m".into(),
        ]
    }
}

impl BrainExtractor for Bet {
    fn extract(&self, t1: &Path, workdir: &Path) -> Result<BrainExtraction> {
        ToolCommand::new(Stage::Alignment, TOOL, self.program.clone())
            .args(Self::args(t1, workdir))
            .env(FSL_OUTPUT_TYPE.0, FSL_OUTPUT_TYPE.1)
            .current_dir(workdir)
            .run()?;

        let brain = workdir.join(format!("{BRAIN_PREFIX}.nii.gz"));
        let mask = workdir.join(format!("{BRAIN_PREFIX}_mask.nii.gz"));
        Ok(BrainExtraction {
            brain: expect_output(Stage::Alignment, TOOL, brain)?,
            mask: expect_output(Stage::Alignment, TOOL, mask)?,
        })
    }
}
