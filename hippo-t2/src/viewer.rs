//! `fsleyes` 叠加显示.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::Hemispheres;

/// 默认查看器程序.
pub const DEFAULT_VIEWER: &str = "fsleyes";

/// 叠加层不透明度 (%).
const OVERLAY_ALPHA: &str = "50";

/// 查看器参数: T2 map 为底图, 左侧红色, 右侧蓝色.
pub fn viewer_args(t2map: &Path, masks: &Hemispheres<impl AsRef<Path>>) -> Vec<OsString> {
    vec![
        t2map.into(),
        masks.left.as_ref().into(),
        "-cm".into(),
        "red".into(),
        "-a".into(),
        OVERLAY_ALPHA.into(),
        masks.right.as_ref().into(),
        "-cm".into(),
        "blue".into(),
        "-a".into(),
        OVERLAY_ALPHA.into(),
    ]
}

/// 启动查看器后立即返回, 不等待其退出. 启动失败只记录警告.
pub fn launch(program: &Path, t2map: &Path, masks: &Hemispheres<impl AsRef<Path>>) -> Option<Child> {
    let spawned = Command::new(program)
        .args(viewer_args(t2map, masks))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match spawned {
        Ok(child) => {
            log::info!("Launched {} (pid {})", program.display(), child.id());
            Some(child)
        }
        Err(e) => {
            log::warn!("Cannot launch viewer `{}`: {e}", program.display());
            None
        }
    }
}
