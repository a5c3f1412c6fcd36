//! 通用常量.

/// 二值掩膜的体素值.
pub mod gray {
    /// 掩膜背景.
    pub const BACKGROUND: u8 = 0;

    /// 掩膜前景.
    pub const FOREGROUND: u8 = 1;

    /// 体素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        p != BACKGROUND
    }

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        p == BACKGROUND
    }
}

/// 默认 CSF 排除上限, 以毫秒为单位. T2 值高于该值的体素视为脑脊液污染.
pub const DEFAULT_CSF_THRESHOLD_MS: f32 = 170.0;

/// 重采样后的连续值掩膜以该比例 (相对于满强度 1.0) 二值化.
pub const MASK_BINARIZE_FRACTION: f32 = 0.95;

/// 报告文件名.
pub const REPORT_FILE_NAME: &str = "Hippocampal_T2.txt";

/// 未指定 `-tmp` 时, 输出目录下临时目录的名字.
pub const DEFAULT_TEMP_DIR_NAME: &str = "tmp";

/// 每次运行在临时目录下独占的工作目录前缀.
pub const RUN_DIR_PREFIX: &str = "hippo_t2.";

/// 必需的命令行参数, 按用法说明中的顺序.
pub const REQUIRED_FLAGS: [&str; 4] = ["-T1", "-seg_L", "-seg_R", "-T2map"];
