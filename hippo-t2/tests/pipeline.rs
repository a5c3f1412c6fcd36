//! 以不启动外部进程的颅骨剥离与配准替身, 在合成 nii 数据上跑完整流水线.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use hippo_t2::prelude::*;
use ndarray::{s, Array3};

/// 体素 1x1x3 mm, [w, h, z] = [16, 10, 12].
const SHAPE: (usize, usize, usize) = (16, 10, 12);
const PIX_DIM: [f32; 3] = [1.0, 1.0, 3.0];

/// 把 T1 原样作为脑组织, 脑掩膜全为前景.
struct CopyExtractor;

impl BrainExtractor for CopyExtractor {
    fn extract(&self, t1: &Path, workdir: &Path) -> Result<BrainExtraction> {
        let brain = workdir.join("T1_brain.nii.gz");
        let mask = workdir.join("T1_brain_mask.nii.gz");
        let t1 = ScalarVolume::open(t1)?;
        t1.save(&brain)?;
        BinaryMask::from_predicate(&t1, |_| true).save(&mask)?;
        Ok(BrainExtraction { brain, mask })
    }
}

/// 恒等配准: 分割掩膜已经处于 T2 map 网格, 重采样即复制.
#[derive(Default)]
struct IdentityRegistrar {
    registered: AtomicUsize,
    resampled: AtomicUsize,
}

impl Registrar for IdentityRegistrar {
    fn strategy(&self) -> RegistrationStrategy {
        RegistrationStrategy::PsfResampling
    }

    fn identity(&self) -> String {
        "identity-registrar 1.0".to_string()
    }

    fn register(
        &self,
        _reference: &Path,
        _floating: &Path,
        floating_mask: &Path,
        workdir: &Path,
    ) -> Result<RigidTransform> {
        assert!(floating_mask.ends_with("T1_brain_mask_ero.nii.gz"));
        assert!(floating_mask.is_file());
        self.registered.fetch_add(1, Ordering::SeqCst);
        let path = workdir.join("T1_to_T2map.txt");
        fs::write(&path, "1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n")?;
        Ok(RigidTransform {
            path,
            strategy: self.strategy(),
        })
    }

    fn resample(
        &self,
        _reference: &Path,
        floating: &Path,
        transform: &RigidTransform,
        output: &Path,
        _workdir: &Path,
    ) -> Result<PathBuf> {
        assert!(transform.path.is_file());
        self.resampled.fetch_add(1, Ordering::SeqCst);
        ScalarVolume::open(floating)?.save(output)?;
        Ok(output.to_path_buf())
    }
}

/// 总是失败的配准.
struct FailingRegistrar;

impl Registrar for FailingRegistrar {
    fn strategy(&self) -> RegistrationStrategy {
        RegistrationStrategy::DirectInterpolation
    }

    fn identity(&self) -> String {
        "failing".to_string()
    }

    fn register(&self, _: &Path, _: &Path, _: &Path, workdir: &Path) -> Result<RigidTransform> {
        Err(PipelineError::MissingToolOutput(
            Stage::Alignment,
            "flirt".to_string(),
            workdir.join("T1_to_T2map.mat"),
        ))
    }

    fn resample(
        &self,
        _: &Path,
        _: &Path,
        _: &RigidTransform,
        _: &Path,
        _: &Path,
    ) -> Result<PathBuf> {
        unreachable!()
    }
}

struct Subject {
    _root: tempfile::TempDir,
    data: PathBuf,
    out: PathBuf,
}

impl Subject {
    fn inputs(&self) -> InputSet {
        InputSet {
            t1: Some(self.data.join("T1.nii.gz")),
            t2map: Some(self.data.join("T2map.nii.gz")),
            seg_l: Some(self.data.join("seg_L.nii.gz")),
            seg_r: Some(self.data.join("seg_R.nii.gz")),
        }
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            output_dir: Some(self.out.clone()),
            ..Default::default()
        }
    }

    fn report(&self) -> String {
        fs::read_to_string(self.out.join(REPORT_FILE_NAME)).unwrap()
    }
}

/// 左侧 4x4x10 分割, 内部 T2 为 100 ms; 右侧同样大小, 内部 T2 为 120 ms.
/// 分割之外是 300 ms 的 "CSF".
fn subject() -> Subject {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    let out = root.path().join("out");
    fs::create_dir(&data).unwrap();

    let mut t2 = Array3::<f32>::from_elem(SHAPE, 300.0);
    t2.slice_mut(s![2..6, 3..7, 1..11]).fill(100.0);
    t2.slice_mut(s![9..13, 3..7, 1..11]).fill(120.0);
    let t2 = ScalarVolume::fake(t2, PIX_DIM);
    t2.save(data.join("T2map.nii.gz")).unwrap();
    t2.save(data.join("T1.nii.gz")).unwrap();

    let mut seg_l = Array3::<u8>::zeros(SHAPE);
    seg_l.slice_mut(s![2..6, 3..7, 1..11]).fill(1);
    BinaryMask::fake(seg_l, PIX_DIM)
        .save(data.join("seg_L.nii.gz"))
        .unwrap();

    let mut seg_r = Array3::<u8>::zeros(SHAPE);
    seg_r.slice_mut(s![9..13, 3..7, 1..11]).fill(1);
    BinaryMask::fake(seg_r, PIX_DIM)
        .save(data.join("seg_R.nii.gz"))
        .unwrap();

    Subject {
        _root: root,
        data,
        out,
    }
}

fn without_date(report: &str) -> Vec<&str> {
    report
        .lines()
        .filter(|l| !l.starts_with("Date: "))
        .collect()
}

#[test]
fn test_full_run() {
    let subject = subject();
    let registrar = IdentityRegistrar::default();
    let outcome = Pipeline::new(subject.config(), &CopyExtractor, &registrar)
        .run(&subject.inputs())
        .unwrap();

    assert_eq!(registrar.registered.load(Ordering::SeqCst), 1);
    assert_eq!(registrar.resampled.load(Ordering::SeqCst), 2);

    let left = &outcome.record.left;
    assert_eq!(left.sampled_voxels, 40);
    assert!((left.total_volume_mm3 - 480.0).abs() < 1e-8);
    assert_eq!(left.display_mean_ms(), Some(100.0));
    assert_eq!(left.coverage_percent(), Some(25.0));
    assert_eq!(outcome.record.right.display_mean_ms(), Some(120.0));

    let report = subject.report();
    assert_eq!(report, outcome.record.render());
    let lines = without_date(&report);
    assert_eq!(
        lines[1..],
        [
            format!("T1: {}", subject.data.join("T1.nii.gz").display()),
            format!("T2 map: {}", subject.data.join("T2map.nii.gz").display()),
            format!("Left segmentation: {}", subject.data.join("seg_L.nii.gz").display()),
            format!("Right segmentation: {}", subject.data.join("seg_R.nii.gz").display()),
            "Registration: identity-registrar 1.0 [psf-resampling]".to_string(),
            "Right hippocampal T2: 120.0 ms (sampling 25.0% of segmentation)".to_string(),
            "Left hippocampal T2: 100.0 ms (sampling 25.0% of segmentation)".to_string(),
            "Right:Left ratio: 120.0%".to_string(),
            "Left:Right ratio: 83.3%".to_string(),
        ]
    );

    // 校正后的掩膜与 T2 map 同网格, 且只含腐蚀后的内部.
    assert_eq!(outcome.mask_paths.left, subject.out.join("T2map_mask_L.nii.gz"));
    let mask_l = BinaryMask::open(&outcome.mask_paths.left).unwrap();
    let mask_r = BinaryMask::open(&outcome.mask_paths.right).unwrap();
    assert_eq!(mask_l.shape(), (12, 10, 16));
    assert_eq!(mask_l.count(), 40);
    assert_eq!(mask_r.count(), 40);

    // 临时目录由本次运行创建, 结束后删除.
    assert!(!subject.out.join("tmp").exists());
    assert!(outcome.check(&subject.config()).is_ok());
}

#[test]
fn test_runs_are_idempotent() {
    let subject = subject();
    let registrar = IdentityRegistrar::default();
    let pipeline = Pipeline::new(subject.config(), &CopyExtractor, &registrar);

    let first = pipeline.run(&subject.inputs()).unwrap();
    let first_report = subject.report();
    let first_mask = BinaryMask::open(&first.mask_paths.left).unwrap();

    let second = pipeline.run(&subject.inputs()).unwrap();
    let second_report = subject.report();
    let second_mask = BinaryMask::open(&second.mask_paths.left).unwrap();

    assert_eq!(without_date(&first_report), without_date(&second_report));
    assert_eq!(first_mask.foreground_pos(), second_mask.foreground_pos());
    assert_eq!(first.record.asymmetry, second.record.asymmetry);
}

#[test]
fn test_threshold_below_all_values() {
    let subject = subject();
    let config = PipelineConfig {
        csf_threshold_ms: 50.0,
        require_samples: true,
        ..subject.config()
    };
    let outcome = Pipeline::new(config.clone(), &CopyExtractor, &IdentityRegistrar::default())
        .run(&subject.inputs())
        .unwrap();

    let report = subject.report();
    assert!(report.contains("Right hippocampal T2: no samples\n"));
    assert!(report.contains("Left hippocampal T2: no samples\n"));
    assert!(report.contains("Right:Left ratio: n/a\n"));
    assert!(report.contains("Left:Right ratio: n/a\n"));

    // 严格模式: 报告已写出, 右侧先报错.
    assert!(matches!(
        outcome.check(&config),
        Err(PipelineError::EmptyMask(Hemisphere::Right))
    ));
    assert!(outcome.record.left.mean_t2().is_err());
}

#[test]
fn test_missing_segmentation_leaves_nothing() {
    let subject = subject();
    let inputs = InputSet {
        seg_r: None,
        ..subject.inputs()
    };
    let err = Pipeline::new(subject.config(), &CopyExtractor, &IdentityRegistrar::default())
        .run(&inputs)
        .unwrap_err();

    assert!(err.is_usage_error());
    let msg = err.to_string();
    for flag in ["-T1", "-seg_L", "-seg_R", "-T2map"] {
        assert!(msg.contains(flag), "{msg}");
    }
    assert!(!subject.out.exists());
}

#[test]
fn test_invalid_threshold_leaves_nothing() {
    let subject = subject();
    let config = PipelineConfig {
        csf_threshold_ms: -1.0,
        ..subject.config()
    };
    let err = Pipeline::new(config, &CopyExtractor, &IdentityRegistrar::default())
        .run(&subject.inputs())
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidArgument("-T2_thr", _)));
    assert!(!subject.out.exists());
}

#[test]
fn test_tool_failure_cleans_up() {
    let subject = subject();
    let tmp = subject.out.join("scratch");
    let config = PipelineConfig {
        temp_dir: Some(tmp.clone()),
        ..subject.config()
    };
    let err = Pipeline::new(config, &CopyExtractor, &FailingRegistrar)
        .run(&subject.inputs())
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Alignment));
    assert!(!err.is_usage_error());
    assert!(!subject.out.join(REPORT_FILE_NAME).exists());
    assert!(!tmp.exists());
}

#[test]
fn test_shared_temp_dir_survives() {
    let subject = subject();
    let tmp = subject.data.join("shared_tmp");
    fs::create_dir(&tmp).unwrap();
    fs::write(tmp.join("other_run.lock"), "").unwrap();
    let config = PipelineConfig {
        temp_dir: Some(tmp.clone()),
        ..subject.config()
    };
    Pipeline::new(config, &CopyExtractor, &IdentityRegistrar::default())
        .run(&subject.inputs())
        .unwrap();

    let left: Vec<_> = fs::read_dir(&tmp)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(left, ["other_run.lock"]);
}
