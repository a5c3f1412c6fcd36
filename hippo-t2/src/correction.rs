//! 污染校正.
//!
//! 将重采样到 T2 map 空间的连续值掩膜变为干净的二值 ROI 掩膜:
//!
//! 1. 以满强度的 0.95 为阈值二值化, 只保留几乎确定属于海马的体素;
//! 2. 平面内腐蚀一个体素, 去掉部分容积边界;
//! 3. 与 "低 T2 值" 掩膜 (T2 <= 阈值) 求交, 排除脑脊液污染.
//!
//! 每一步只会删除体素, 因此 `corrected ⊆ eroded ⊆ binarized`.

use crate::consts::{DEFAULT_CSF_THRESHOLD_MS, MASK_BINARIZE_FRACTION};
use crate::{BinaryMask, NiftiHeaderAttr, Result, ScalarVolume};

/// 校正参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrectionParams {
    /// 二值化阈值, 相对于满强度 1.0.
    pub binarize_fraction: f32,

    /// CSF 排除上限 (ms). T2 值严格大于它的体素被排除.
    pub csf_threshold_ms: f32,
}

impl Default for CorrectionParams {
    fn default() -> Self {
        Self {
            binarize_fraction: MASK_BINARIZE_FRACTION,
            csf_threshold_ms: DEFAULT_CSF_THRESHOLD_MS,
        }
    }
}

/// 单侧海马的校正结果. 三个掩膜逐级收缩.
#[derive(Debug, Clone)]
pub struct CorrectedMask {
    /// 二值化后的掩膜 (腐蚀前). 分割总体积由它计算.
    pub binarized: BinaryMask,

    /// 平面内腐蚀后的掩膜.
    pub eroded: BinaryMask,

    /// 排除 CSF 后的最终掩膜.
    pub corrected: BinaryMask,

    /// 最终掩膜内的 T2 值, 掩膜外为 0, 不含 NaN.
    pub masked_t2: ScalarVolume,
}

/// 将连续值掩膜二值化: 值不小于 `fraction` 的体素为前景, NaN 为背景.
#[inline]
pub fn binarize(resampled: &ScalarVolume, fraction: f32) -> BinaryMask {
    BinaryMask::from_predicate(resampled, |v| v >= fraction)
}

/// 在 T2 map 上构造 "低 T2 值" 掩膜: 值不大于 `upper_ms` 的体素为前景, NaN 为背景.
#[inline]
pub fn low_value_mask(t2map: &ScalarVolume, upper_ms: f32) -> BinaryMask {
    BinaryMask::from_predicate(t2map, |v| v <= upper_ms)
}

/// 取出 `mask` 内的 T2 值, 并将 NaN 清为 0.
pub fn mask_values(t2map: &ScalarVolume, mask: &BinaryMask) -> Result<ScalarVolume> {
    let mut masked = t2map.masked_by(mask)?;
    let cleared = masked.clear_nan();
    if cleared != 0 {
        log::debug!("Cleared {cleared} NaN voxels from masked T2 values");
    }
    Ok(masked)
}

/// 对重采样后的单侧掩膜做完整的污染校正.
///
/// `resampled` 必须与 `t2map` 处于同一体素网格, 否则返回 `Err`.
pub fn correct(
    resampled: &ScalarVolume,
    t2map: &ScalarVolume,
    params: &CorrectionParams,
) -> Result<CorrectedMask> {
    t2map.ensure_same_grid(resampled, "resampled mask")?;

    let binarized = binarize(resampled, params.binarize_fraction);
    let eroded = binarized.erode_in_plane();
    let corrected = eroded.intersect(&low_value_mask(t2map, params.csf_threshold_ms))?;
    debug_assert!(corrected.is_subset_of(&eroded));
    debug_assert!(eroded.is_subset_of(&binarized));

    let masked_t2 = mask_values(t2map, &corrected)?;
    Ok(CorrectedMask {
        binarized,
        eroded,
        corrected,
        masked_t2,
    })
}
