//! 统计量.
//!
//! 将校正后的掩膜归约为可报告的标量. 比值总是由未舍入的均值计算,
//! 均值只在展示时舍入到一位小数.

use crate::correction::CorrectedMask;
use crate::{BinaryMask, Hemisphere, NiftiHeaderAttr, PipelineError, Result, ScalarVolume};

/// 舍入到一位小数 (四舍五入, 远离零).
#[inline]
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// 单侧海马的统计量.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HemisphereStats {
    /// 哪一侧.
    pub hemisphere: Hemisphere,

    /// 未舍入的平均 T2 (ms). 校正后掩膜为空时为 `None`.
    mean_ms: Option<f64>,

    /// 参与平均的体素个数.
    pub sampled_voxels: usize,

    /// 参与平均的体素体积 (mm^3).
    pub sampled_volume_mm3: f64,

    /// 二值化后 (腐蚀前) 分割掩膜的体积 (mm^3).
    pub total_volume_mm3: f64,
}

impl HemisphereStats {
    /// 由掩膜内 T2 值与腐蚀前的二值掩膜计算统计量.
    ///
    /// 两者应处于同一体素网格.
    pub fn measure(hemisphere: Hemisphere, masked_t2: &ScalarVolume, binarized: &BinaryMask) -> Self {
        let sampled_voxels = masked_t2.count_nonzero();
        Self {
            hemisphere,
            mean_ms: masked_t2.mean_nonzero(),
            sampled_voxels,
            sampled_volume_mm3: sampled_voxels as f64 * masked_t2.voxel(),
            total_volume_mm3: binarized.volume_mm3(),
        }
    }

    /// 由校正结果计算统计量.
    #[inline]
    pub fn from_correction(hemisphere: Hemisphere, c: &CorrectedMask) -> Self {
        Self::measure(hemisphere, &c.masked_t2, &c.binarized)
    }

    /// 未舍入的平均 T2 (ms). 没有样本时返回 `None`.
    #[inline]
    pub fn mean_ms(&self) -> Option<f64> {
        self.mean_ms
    }

    /// 未舍入的平均 T2 (ms). 没有样本时返回 `EmptyMask` 错误.
    pub fn mean_t2(&self) -> Result<f64> {
        self.mean_ms
            .ok_or(PipelineError::EmptyMask(self.hemisphere))
    }

    /// 用于展示的平均 T2 (ms), 舍入到一位小数.
    #[inline]
    pub fn display_mean_ms(&self) -> Option<f64> {
        self.mean_ms.map(round1)
    }

    /// 采样覆盖率 (%), 舍入到一位小数.
    ///
    /// 没有样本或分割体积为 0 时返回 `None`.
    pub fn coverage_percent(&self) -> Option<f64> {
        if self.sampled_voxels == 0 || self.total_volume_mm3 <= 0.0 {
            return None;
        }
        Some(round1(100.0 * self.sampled_volume_mm3 / self.total_volume_mm3))
    }

    /// 是否没有任何样本.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mean_ms.is_none()
    }
}

/// 左右不对称比值 (%), 舍入到一位小数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Asymmetry {
    /// 100 * 左 / 右.
    pub left_to_right: Option<f64>,

    /// 100 * 右 / 左.
    pub right_to_left: Option<f64>,
}

impl Asymmetry {
    /// 由两侧未舍入的均值计算比值. 任一侧没有样本时比值为 `None`.
    pub fn between(left: &HemisphereStats, right: &HemisphereStats) -> Self {
        match (left.mean_ms(), right.mean_ms()) {
            (Some(l), Some(r)) => Self {
                left_to_right: (r != 0.0).then(|| round1(100.0 * l / r)),
                right_to_left: (l != 0.0).then(|| round1(100.0 * r / l)),
            },
            _ => Self {
                left_to_right: None,
                right_to_left: None,
            },
        }
    }
}
