//! 空间对齐: 颅骨剥离, 刚性配准, 分割掩膜重采样到 T2 map 空间.

use std::path::{Path, PathBuf};

use super::resolve::ResolvedInputs;
use crate::toolkit::{BrainExtractor, Registrar};
use crate::{BinaryMask, Hemisphere, Hemispheres, NiftiHeaderAttr, Result, ScalarVolume};

/// 腐蚀后的脑掩膜文件名.
const ERODED_BRAIN_MASK: &str = "T1_brain_mask_ero.nii.gz";

/// 重采样后的分割掩膜文件名.
fn resampled_name(hemisphere: Hemisphere) -> String {
    format!("seg_{}_in_T2map.nii.gz", hemisphere.letter())
}

/// 对齐阶段的产物. 两个掩膜均处于 T2 map 的体素网格, 连续取值.
#[derive(Debug)]
pub struct Aligned {
    /// 重采样后的左右分割掩膜.
    pub masks: Hemispheres<ScalarVolume>,
}

/// 在工作目录 `workdir` 中完成对齐.
pub fn align(
    inputs: &ResolvedInputs,
    t2map: &ScalarVolume,
    extractor: &dyn BrainExtractor,
    registrar: &dyn Registrar,
    workdir: &Path,
) -> Result<Aligned> {
    log::info!("Extracting brain from {}", inputs.t1.display());
    let brain = extractor.extract(&inputs.t1, workdir)?;

    let brain_mask = BinaryMask::open(&brain.mask)?.erode_3d();
    if brain_mask.is_empty() {
        log::warn!("Eroded brain mask is empty, registration is unweighted in effect");
    }
    let weight = workdir.join(ERODED_BRAIN_MASK);
    brain_mask.save(&weight)?;

    log::info!("Registering T1 to T2 map ({})", registrar.strategy());
    let transform = registrar.register(&inputs.t2map, &brain.brain, &weight, workdir)?;
    log::debug!("Rigid transform saved to {}", transform.path.display());

    let seg = Hemispheres::new(inputs.seg_l.clone(), inputs.seg_r.clone());
    let masks = seg.try_map(|hemi, path: PathBuf| -> Result<ScalarVolume> {
        log::info!("Resampling {} segmentation", hemi);
        let out = workdir.join(resampled_name(hemi));
        let out = registrar.resample(&inputs.t2map, &path, &transform, &out, workdir)?;
        let mask = ScalarVolume::open(out)?;
        t2map.ensure_same_grid(&mask, &format!("resampled {hemi} segmentation"))?;
        Ok(mask)
    })?;

    Ok(Aligned { masks })
}

#[cfg(test)]
mod tests {
    use super::resampled_name;
    use crate::Hemisphere;

    #[test]
    fn test_resampled_name() {
        assert_eq!(resampled_name(Hemisphere::Left), "seg_L_in_T2map.nii.gz");
        assert_eq!(resampled_name(Hemisphere::Right), "seg_R_in_T2map.nii.gz");
    }
}
