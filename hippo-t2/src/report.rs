//! 固定格式文本报告与校正后掩膜的输出路径.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::REPORT_FILE_NAME;
use crate::pipeline::ResolvedInputs;
use crate::stats::{Asymmetry, HemisphereStats};
use crate::{Hemisphere, Hemispheres, Result};

/// 报告标题.
const TITLE: &str = "Hippocampal T2 relaxometry";

/// 时间戳格式.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 没有样本时均值与覆盖率的占位.
const NO_SAMPLES: &str = "no samples";

/// 比值无定义时的占位.
const NOT_AVAILABLE: &str = "n/a";

/// 一次运行的全部报告内容.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportRecord {
    /// 本地时间, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,

    /// 输入文件.
    pub inputs: ResolvedInputs,

    /// 配准工具名称、版本与策略.
    pub tool_identity: String,

    /// 右侧统计量.
    pub right: HemisphereStats,

    /// 左侧统计量.
    pub left: HemisphereStats,

    /// 左右比值.
    pub asymmetry: Asymmetry,
}

impl ReportRecord {
    /// 以当前时间构造报告.
    pub fn new(
        inputs: ResolvedInputs,
        tool_identity: String,
        stats: Hemispheres<HemisphereStats>,
    ) -> Self {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::with_timestamp(timestamp, inputs, tool_identity, stats)
    }

    /// 以给定时间戳构造报告.
    pub fn with_timestamp(
        timestamp: String,
        inputs: ResolvedInputs,
        tool_identity: String,
        stats: Hemispheres<HemisphereStats>,
    ) -> Self {
        let asymmetry = Asymmetry::between(&stats.left, &stats.right);
        Self {
            timestamp,
            inputs,
            tool_identity,
            right: stats.right,
            left: stats.left,
            asymmetry,
        }
    }

    /// 某一侧的统计量.
    #[inline]
    pub fn stats(&self, hemisphere: Hemisphere) -> &HemisphereStats {
        match hemisphere {
            Hemisphere::Left => &self.left,
            Hemisphere::Right => &self.right,
        }
    }

    /// 渲染为报告文本, 以换行结尾.
    pub fn render(&self) -> String {
        let mut s = String::new();
        // 写入 `String` 不会失败.
        let _ = writeln!(s, "{TITLE}");
        let _ = writeln!(s, "Date: {}", self.timestamp);
        let _ = writeln!(s, "T1: {}", self.inputs.t1.display());
        let _ = writeln!(s, "T2 map: {}", self.inputs.t2map.display());
        let _ = writeln!(s, "Left segmentation: {}", self.inputs.seg_l.display());
        let _ = writeln!(s, "Right segmentation: {}", self.inputs.seg_r.display());
        let _ = writeln!(s, "Registration: {}", self.tool_identity);
        for hemi in Hemisphere::REPORT_ORDER {
            let _ = writeln!(s, "{hemi} hippocampal T2: {}", mean_line(self.stats(hemi)));
        }
        let _ = writeln!(s, "Right:Left ratio: {}", ratio(self.asymmetry.right_to_left));
        let _ = writeln!(s, "Left:Right ratio: {}", ratio(self.asymmetry.left_to_right));
        s
    }

    /// 写入 `<output_dir>/Hippocampal_T2.txt`, 覆盖已有报告. 返回报告路径.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(REPORT_FILE_NAME);
        fs::write(&path, self.render())?;
        Ok(path)
    }
}

fn mean_line(st: &HemisphereStats) -> String {
    match (st.display_mean_ms(), st.coverage_percent()) {
        (Some(mean), Some(cov)) => format!("{mean:.1} ms (sampling {cov:.1}% of segmentation)"),
        (Some(mean), None) => format!("{mean:.1} ms (sampling {NOT_AVAILABLE})"),
        (None, _) => NO_SAMPLES.to_string(),
    }
}

fn ratio(r: Option<f64>) -> String {
    r.map_or_else(|| NOT_AVAILABLE.to_string(), |r| format!("{r:.1}%"))
}

/// 将 nii 文件名拆为 (基本名, 扩展名). `.nii.gz` 视为一个整体.
///
/// 没有扩展名时扩展名为 `nii.gz`.
pub fn split_nifti_name(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for ext in ["nii.gz", "nii"] {
        if let Some(base) = name.strip_suffix(&format!(".{ext}")) {
            if !base.is_empty() {
                return (base.to_string(), ext.to_string());
            }
        }
    }
    match name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base.to_string(), ext.to_string()),
        _ => (name, "nii.gz".to_string()),
    }
}

/// 校正后掩膜的输出路径: `<output_dir>/<T2map 基本名>_mask_{L,R}.<扩展名>`.
pub fn mask_paths(output_dir: &Path, t2map: &Path) -> Hemispheres<PathBuf> {
    let (base, ext) = split_nifti_name(t2map);
    let path = |h: Hemisphere| output_dir.join(format!("{base}_mask_{}.{ext}", h.letter()));
    Hemispheres::new(path(Hemisphere::Left), path(Hemisphere::Right))
}

#[cfg(test)]
mod tests {
    use super::{mask_paths, split_nifti_name, ReportRecord};
    use crate::pipeline::ResolvedInputs;
    use crate::stats::HemisphereStats;
    use crate::{BinaryMask, Hemisphere, Hemispheres, ScalarVolume};
    use ndarray::{s, Array3};
    use std::path::{Path, PathBuf};

    fn inputs() -> ResolvedInputs {
        ResolvedInputs {
            t1: "/data/T1.nii.gz".into(),
            t2map: "/data/T2map.nii.gz".into(),
            seg_l: "/data/seg_L.nii.gz".into(),
            seg_r: "/data/seg_R.nii.gz".into(),
        }
    }

    /// 在 10x10x12 网格上放 `n` 层 2x2 的 `value` 体素, 分割为 4x4.
    fn stats(hemisphere: Hemisphere, value: f32) -> HemisphereStats {
        let mut t2 = Array3::<f32>::zeros((10, 10, 12));
        t2.slice_mut(s![3..5, 3..5, 1..11]).fill(value);
        let mut seg = Array3::<u8>::zeros((10, 10, 12));
        seg.slice_mut(s![2..6, 2..6, 1..11]).fill(1);
        HemisphereStats::measure(
            hemisphere,
            &ScalarVolume::fake(t2, [1.0, 1.0, 3.0]),
            &BinaryMask::fake(seg, [1.0, 1.0, 3.0]),
        )
    }

    fn record(left: f32, right: f32) -> ReportRecord {
        ReportRecord::with_timestamp(
            "2024-01-02 03:04:05".to_string(),
            inputs(),
            "FLIRT version 6.0, reg_resample 1.5.0 [psf-resampling]".to_string(),
            Hemispheres::new(stats(Hemisphere::Left, left), stats(Hemisphere::Right, right)),
        )
    }

    #[test]
    fn test_render_field_order() {
        let text = record(100.0, 120.0).render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "Hippocampal T2 relaxometry",
                "Date: 2024-01-02 03:04:05",
                "T1: /data/T1.nii.gz",
                "T2 map: /data/T2map.nii.gz",
                "Left segmentation: /data/seg_L.nii.gz",
                "Right segmentation: /data/seg_R.nii.gz",
                "Registration: FLIRT version 6.0, reg_resample 1.5.0 [psf-resampling]",
                "Right hippocampal T2: 120.0 ms (sampling 25.0% of segmentation)",
                "Left hippocampal T2: 100.0 ms (sampling 25.0% of segmentation)",
                "Right:Left ratio: 120.0%",
                "Left:Right ratio: 83.3%",
            ]
        );
    }

    #[test]
    fn test_render_no_samples() {
        let text = record(0.0, 120.0).render();
        assert!(text.contains("Left hippocampal T2: no samples\n"));
        assert!(text.contains("Right:Left ratio: n/a\n"));
        assert!(text.contains("Left:Right ratio: n/a\n"));
    }

    #[test]
    fn test_write_truncates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Hippocampal_T2.txt"), "x".repeat(4096)).unwrap();
        let rec = record(100.0, 100.0);
        let path = rec.write(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), rec.render());
    }

    #[test]
    fn test_nifti_names() {
        let split = |p: &str| split_nifti_name(Path::new(p));
        assert_eq!(split("/a/T2map.nii.gz"), ("T2map".into(), "nii.gz".into()));
        assert_eq!(split("T2map.nii"), ("T2map".into(), "nii".into()));
        assert_eq!(split("sub.01.T2.nii.gz"), ("sub.01.T2".into(), "nii.gz".into()));
        assert_eq!(split("T2map.img"), ("T2map".into(), "img".into()));
        assert_eq!(split("T2map"), ("T2map".into(), "nii.gz".into()));

        let masks = mask_paths(Path::new("/out"), Path::new("/data/T2map.nii"));
        assert_eq!(masks.left, PathBuf::from("/out/T2map_mask_L.nii"));
        assert_eq!(masks.right, PathBuf::from("/out/T2map_mask_R.nii"));
    }
}
