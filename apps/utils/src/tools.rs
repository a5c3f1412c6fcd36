//! 从环境变量或用户主目录定位外部工具包.

use std::env;
use std::path::{Path, PathBuf};

use hippo_t2::toolkit::{RegistrationStrategy, ToolPaths};
use hippo_t2::Result;

/// FSL 安装目录环境变量.
pub const FSLDIR: &str = "FSLDIR";

/// NiftyReg 安装目录环境变量.
pub const NIFTYREG_DIR: &str = "NIFTYREG_DIR";

/// 默认配准策略环境变量.
pub const REGISTRATION_ENV: &str = "HIPPO_T2_REGISTRATION";

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// 获取 FSL 可执行文件目录.
///
/// 1. 若环境变量 `$FSLDIR` 非空, 则返回 `$FSLDIR/bin`;
/// 2. 否则, 若 `{用户主目录}/fsl/bin` 存在, 则返回它;
/// 3. 否则返回 `None`, 交给 `PATH` 查找.
pub fn fsl_bin_with<F: Fn(&str) -> Option<String>>(var: F, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(d) = non_empty(var(FSLDIR)) {
        return Some(PathBuf::from(d).join("bin"));
    }
    let guess = home?.join("fsl").join("bin");
    guess.is_dir().then_some(guess)
}

/// 获取 NiftyReg 可执行文件目录.
///
/// 1. 若环境变量 `$NIFTYREG_DIR` 非空且 `$NIFTYREG_DIR/bin` 存在, 则返回 `$NIFTYREG_DIR/bin`;
/// 2. 若环境变量 `$NIFTYREG_DIR` 非空, 则返回 `$NIFTYREG_DIR`;
/// 3. 否则返回 `None`, 交给 `PATH` 查找.
pub fn niftyreg_bin_with<F: Fn(&str) -> Option<String>>(var: F) -> Option<PathBuf> {
    let dir = PathBuf::from(non_empty(var(NIFTYREG_DIR))?);
    let bin = dir.join("bin");
    Some(if bin.is_dir() { bin } else { dir })
}

/// 从当前进程环境与用户主目录定位工具包.
pub fn tool_paths_from_env_or_home() -> ToolPaths {
    let var = |k: &str| env::var(k).ok();
    let paths = ToolPaths {
        fsl_bin: fsl_bin_with(var, dirs::home_dir().as_deref()),
        niftyreg_bin: niftyreg_bin_with(var),
    };
    log::debug!("Tool locations: {paths:?}");
    paths
}

/// 从 `$HIPPO_T2_REGISTRATION` 读取默认配准策略. 未设置时返回 `None`.
pub fn strategy_from_env() -> Option<Result<RegistrationStrategy>> {
    non_empty(env::var(REGISTRATION_ENV).ok()).map(|s| s.parse())
}

#[cfg(test)]
mod tests {
    use super::{fsl_bin_with, niftyreg_bin_with};
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_fsl_from_var() {
        let var = |k: &str| (k == "FSLDIR").then(|| "/usr/local/fsl".to_string());
        assert_eq!(
            fsl_bin_with(var, None),
            Some(PathBuf::from("/usr/local/fsl/bin"))
        );
    }

    #[test]
    fn test_fsl_home_fallback() {
        let home = tempfile::tempdir().unwrap();
        let unset = |_: &str| None;
        assert_eq!(fsl_bin_with(unset, Some(home.path())), None);

        let bin = home.path().join("fsl").join("bin");
        fs::create_dir_all(&bin).unwrap();
        assert_eq!(fsl_bin_with(unset, Some(home.path())), Some(bin));

        let blank = |_: &str| Some("  ".to_string());
        assert!(fsl_bin_with(blank, None).is_none());
    }

    #[test]
    fn test_niftyreg_dir_layouts() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().to_string_lossy().into_owned();
        let var = move |k: &str| (k == "NIFTYREG_DIR").then(|| dir.clone());

        // 没有 bin 子目录时直接使用安装目录.
        assert_eq!(niftyreg_bin_with(&var), Some(root.path().to_path_buf()));

        fs::create_dir(root.path().join("bin")).unwrap();
        assert_eq!(niftyreg_bin_with(&var), Some(root.path().join("bin")));
        assert_eq!(niftyreg_bin_with(|_: &str| None), None);
    }
}
