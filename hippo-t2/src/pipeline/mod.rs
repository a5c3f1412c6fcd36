//! 流水线: 输入解析 → 空间对齐 → 污染校正 → 统计 → 报告.
//!
//! 控制流是线性的, 唯一的分支是配准策略的选择.

use std::path::PathBuf;

use crate::consts::{DEFAULT_CSF_THRESHOLD_MS, MASK_BINARIZE_FRACTION};
use crate::correction::{correct, CorrectedMask, CorrectionParams};
use crate::report::{mask_paths, ReportRecord};
use crate::stats::HemisphereStats;
use crate::toolkit::{
    describe, registrar_for, Bet, BrainExtractor, Registrar, RegistrationStrategy, ToolPaths,
};
use crate::viewer::{self, DEFAULT_VIEWER};
use crate::{Hemisphere, Hemispheres, NiftiHeaderAttr, Result, ScalarVolume};

mod alignment;
mod resolve;

pub use alignment::{align, Aligned};
pub use resolve::{
    absolutize, prepare_layout, resolve_inputs, validate_config, InputSet, ResolvedInputs,
    RunLayout,
};

/// 流水线配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// 输出目录. `None` 时为当前工作目录.
    pub output_dir: Option<PathBuf>,

    /// 临时目录. `None` 时为 `<输出目录>/tmp`.
    pub temp_dir: Option<PathBuf>,

    /// CSF 排除阈值 (ms).
    pub csf_threshold_ms: f32,

    /// 重采样掩膜的二值化阈值.
    pub binarize_fraction: f32,

    /// 完成后是否启动查看器.
    pub visualize: bool,

    /// 查看器程序.
    pub viewer: PathBuf,

    /// 配准策略.
    pub strategy: RegistrationStrategy,

    /// 外部工具位置.
    pub tools: ToolPaths,

    /// 任一侧没有样本时是否视为错误 (报告仍会写出).
    pub require_samples: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            temp_dir: None,
            csf_threshold_ms: DEFAULT_CSF_THRESHOLD_MS,
            binarize_fraction: MASK_BINARIZE_FRACTION,
            visualize: false,
            viewer: PathBuf::from(DEFAULT_VIEWER),
            strategy: RegistrationStrategy::default(),
            tools: ToolPaths::default(),
            require_samples: false,
        }
    }
}

impl PipelineConfig {
    /// 污染校正参数.
    #[inline]
    pub fn correction_params(&self) -> CorrectionParams {
        CorrectionParams {
            binarize_fraction: self.binarize_fraction,
            csf_threshold_ms: self.csf_threshold_ms,
        }
    }
}

/// 一次成功运行的结果.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// 报告内容.
    pub record: ReportRecord,

    /// 报告文件路径.
    pub report_path: PathBuf,

    /// 校正后掩膜的保存路径.
    pub mask_paths: Hemispheres<PathBuf>,
}

impl PipelineOutcome {
    /// 严格模式 (`config.require_samples`) 下, 任一侧没有样本时返回 `EmptyMask`.
    ///
    /// 报告在此之前已经写出.
    pub fn check(&self, config: &PipelineConfig) -> Result<()> {
        if config.require_samples {
            for hemi in Hemisphere::REPORT_ORDER {
                self.record.stats(hemi).mean_t2()?;
            }
        }
        Ok(())
    }
}

/// 对单侧做污染校正与统计.
fn measure_hemisphere(
    hemisphere: Hemisphere,
    resampled: &ScalarVolume,
    t2map: &ScalarVolume,
    params: &CorrectionParams,
) -> Result<(CorrectedMask, HemisphereStats)> {
    let corrected = correct(resampled, t2map, params)?;
    let stats = HemisphereStats::from_correction(hemisphere, &corrected);
    log::debug!(
        "{hemisphere}: binarized {}, eroded {}, corrected {} voxels",
        corrected.binarized.count(),
        corrected.eroded.count(),
        corrected.corrected.count()
    );
    if stats.is_empty() {
        log::warn!("{hemisphere} corrected mask is empty, reporting no samples");
    }
    Ok((corrected, stats))
}

/// 左右两侧分别校正与统计. 开启 `rayon` 时两侧并行, 结果与串行一致.
fn measure_both(
    masks: &Hemispheres<ScalarVolume>,
    t2map: &ScalarVolume,
    params: &CorrectionParams,
) -> Result<Hemispheres<(CorrectedMask, HemisphereStats)>> {
    let (right, left) = {
        let right = || measure_hemisphere(Hemisphere::Right, &masks.right, t2map, params);
        let left = || measure_hemisphere(Hemisphere::Left, &masks.left, t2map, params);

        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                rayon::join(right, left)
            } else {
                (right(), left())
            }
        }
    };
    Ok(Hemispheres::new(left?, right?))
}

/// 流水线. 外部工具由调用方注入.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    extractor: &'a dyn BrainExtractor,
    registrar: &'a dyn Registrar,
}

impl<'a> Pipeline<'a> {
    /// 以 `config` 和给定的外部工具构造流水线.
    pub fn new(
        config: PipelineConfig,
        extractor: &'a dyn BrainExtractor,
        registrar: &'a dyn Registrar,
    ) -> Self {
        Self {
            config,
            extractor,
            registrar,
        }
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 完整运行一次. 没有样本不视为错误, 见 [`PipelineOutcome::check`].
    ///
    /// 校验失败时不创建任何目录. 无论成功与否, 本次运行的工作目录都会被删除.
    pub fn run(&self, inputs: &InputSet) -> Result<PipelineOutcome> {
        let resolved = resolve_inputs(inputs)?;
        validate_config(&self.config)?;
        let layout = prepare_layout(&self.config)?;

        let outcome = self.run_in(resolved, &layout);
        let cleaned = layout.finish();
        let outcome = outcome?;
        cleaned?;

        if self.config.visualize {
            viewer::launch(&self.config.viewer, &outcome.record.inputs.t2map, &outcome.mask_paths);
        }
        Ok(outcome)
    }

    fn run_in(&self, inputs: ResolvedInputs, layout: &RunLayout) -> Result<PipelineOutcome> {
        let t2map = ScalarVolume::open(&inputs.t2map)?;
        log::info!(
            "T2 map grid {:?} (z, h, w), voxel {:.3} mm^3",
            t2map.shape(),
            t2map.voxel()
        );

        let aligned = align(
            &inputs,
            &t2map,
            self.extractor,
            self.registrar,
            layout.workdir(),
        )?;

        log::info!(
            "Correcting masks (binarize >= {}, T2 <= {} ms)",
            self.config.binarize_fraction,
            self.config.csf_threshold_ms
        );
        let measured = measure_both(&aligned.masks, &t2map, &self.config.correction_params())?;

        let paths = mask_paths(layout.output_dir(), &inputs.t2map);
        for hemi in Hemisphere::REPORT_ORDER {
            let path = paths.get(hemi);
            measured.get(hemi).0.corrected.save(path)?;
            log::debug!("Saved {hemi} corrected mask to {}", path.display());
        }

        let stats = measured.map(|_, (_, st)| st);
        let record = ReportRecord::new(inputs, describe(self.registrar), stats);
        let report_path = record.write(layout.output_dir())?;
        log::info!("Report written to {}", report_path.display());

        Ok(PipelineOutcome {
            record,
            report_path,
            mask_paths: paths,
        })
    }
}

/// 使用真实外部工具 (`bet` 与 `config.strategy` 对应的配准后端) 运行流水线.
///
/// 样本检查留给调用方 ([`PipelineOutcome::check`]), 以便先输出报告.
pub fn run(config: PipelineConfig, inputs: &InputSet) -> Result<PipelineOutcome> {
    let extractor = Bet::new(&config.tools);
    let registrar = registrar_for(config.strategy, &config.tools);
    Pipeline::new(config, &extractor, registrar.as_ref()).run(inputs)
}

#[cfg(test)]
mod tests {
    use super::{measure_both, measure_hemisphere, PipelineConfig};
    use crate::{Hemisphere, Hemispheres, ScalarVolume};
    use ndarray::{s, Array3};

    fn resampled(x0: usize) -> ScalarVolume {
        let mut data = Array3::<f32>::zeros((12, 8, 4));
        data.slice_mut(s![x0..x0 + 4, 2..6, 1..3]).fill(1.0);
        ScalarVolume::fake(data, [1.0, 1.0, 3.0])
    }

    #[test]
    fn test_measure_both_keeps_sides_apart() {
        let mut t2 = Array3::<f32>::zeros((12, 8, 4));
        t2.slice_mut(s![0..6, .., ..]).fill(90.0);
        t2.slice_mut(s![6..12, .., ..]).fill(110.0);
        let t2 = ScalarVolume::fake(t2, [1.0, 1.0, 3.0]);

        // 左侧在 x 较大的一边, 右侧在 x 较小的一边.
        let masks = Hemispheres::new(resampled(7), resampled(1));
        let measured = measure_both(&masks, &t2, &PipelineConfig::default().correction_params())
            .unwrap();
        assert_eq!(measured.left.1.display_mean_ms(), Some(110.0));
        assert_eq!(measured.right.1.display_mean_ms(), Some(90.0));
        assert_eq!(measured.left.1.sampled_voxels, 8);
    }

    #[test]
    fn test_measure_both_matches_sequential() {
        let t2 = Array3::from_shape_fn((12, 8, 4), |(x, y, z)| {
            if x == 4 && y == 3 {
                f32::NAN
            } else if y == 5 && z == 2 {
                240.0
            } else {
                80.0 + 0.37 * x as f32 + 1.13 * y as f32 + 2.71 * z as f32
            }
        });
        let t2 = ScalarVolume::fake(t2, [0.9, 0.9, 2.5]);

        let partial = |x0: usize| {
            let mut data = Array3::<f32>::zeros((12, 8, 4));
            data.slice_mut(s![x0..x0 + 5, 1..7, 0..4]).fill(1.0);
            data.slice_mut(s![x0..x0 + 5, 1..2, 0..4]).fill(0.96);
            data.slice_mut(s![x0..x0 + 5, 6..7, 0..4]).fill(0.5);
            ScalarVolume::fake(data, [0.9, 0.9, 2.5])
        };
        let masks = Hemispheres::new(partial(6), partial(1));
        let params = PipelineConfig::default().correction_params();

        let both = measure_both(&masks, &t2, &params).unwrap();
        for hemi in Hemisphere::REPORT_ORDER {
            let (corrected, stats) = measure_hemisphere(hemi, masks.get(hemi), &t2, &params).unwrap();
            let (both_corrected, both_stats) = both.get(hemi);
            assert_eq!(both_stats, &stats);
            assert_eq!(
                both_corrected.corrected.foreground_pos(),
                corrected.corrected.foreground_pos()
            );

            let mean = stats.mean_ms().unwrap();
            assert_ne!(mean.fract(), 0.0, "{hemi}: {mean}");
            assert_eq!(stats.hemisphere, hemi);
        }
        assert_ne!(both.left.1.mean_ms(), both.right.1.mean_ms());
    }
}
