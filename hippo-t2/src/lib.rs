#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 从 T1 结构像、T2 弛豫图 (T2 map) 和左右海马分割掩膜出发,
//! 计算左右海马的平均 T2 弛豫时间, 并输出文本报告.
//!
//! 颅骨剥离、刚性配准与重采样委托给外部工具 (FSL / NiftyReg);
//! 二值化、平面内腐蚀、脑脊液 (CSF) 排除和统计量计算均在本 crate 内直接完成.
//!
//! # 注意
//!
//! 1. 第二阶段 (配准) 之后的所有体素操作都在 T2 map 的体素空间内进行,
//!   不会再回到 T1 空间.
//! 2. 校正后的掩膜总是校正前掩膜的子集: 腐蚀和阈值只会删除体素, 不会添加.
//! 3. 所有错误都是致命的, 流水线在第一个错误处立即终止.
//!
//! # 开发计划
//!
//! ### 输入解析 ✅
//!
//! 校验四个必需输入, 相对路径转绝对路径, 建立输出目录和每次运行独占的临时目录.
//!
//! 实现位于 `hippo-t2/src/pipeline/resolve.rs`.
//!
//! ### 空间对齐 ✅
//!
//! `bet` 提取脑组织, 脑掩膜做一次 3D 腐蚀; 6 自由度刚性配准到 T2 map;
//! 左右海马掩膜分别重采样到 T2 map 空间. 两种可互换的配准后端:
//!
//! 1. FSL `flirt` 互信息配准, `flirt` 直接插值;
//! 2. FSL `flirt` 互信息配准, 矩阵经 `reg_transform` 转换后由 NiftyReg `reg_resample -psf` 点扩散函数重采样 (默认).
//!
//! 实现位于 `hippo-t2/src/toolkit` 与 `hippo-t2/src/pipeline/alignment.rs`.
//!
//! ### 污染校正 ✅
//!
//! 0.95 阈值二值化, 平面内 (2D) 3x3 腐蚀, 排除 T2 值高于阈值 (默认 170 ms) 的体素.
//!
//! 实现位于 `hippo-t2/src/correction.rs` 和 `hippo-t2/src/data/morph.rs`.
//!
//! ### 统计 ✅
//!
//! 平均 T2, 采样体积, 分割总体积, 采样覆盖率, 左右比值.
//! 比值由未舍入的均值计算, 均值仅在展示时舍入到一位小数.
//!
//! 实现位于 `hippo-t2/src/stats.rs`.
//!
//! ### 报告 ✅
//!
//! 固定格式文本报告 `Hippocampal_T2.txt`, 以及两个校正后的掩膜.
//!
//! 实现位于 `hippo-t2/src/report.rs`.
//!
//! ### 小功能 ✅
//!
//! 1. 左右半球在 `rayon` feature 下并行校正与统计, 结果与串行一致. ✅
//! 2. 可选的 `fsleyes` 叠加显示. ✅

/// 三维索引, 按 `(z, h, w)` 组织.
pub type Idx3d = (usize, usize, usize);

/// 二维索引, 按 `(h, w)` 组织.
pub type Idx2d = (usize, usize);

/// nii 体数据基础结构.
mod data;

pub use data::{BinaryMask, NiftiHeaderAttr, ScalarVolume};

pub mod consts;

mod error;

pub use error::{PipelineError, Result, Stage};

mod hemisphere;

pub use hemisphere::{Hemisphere, Hemispheres};

pub mod correction;

pub mod stats;

pub mod toolkit;

pub mod pipeline;

pub mod report;

pub mod viewer;

pub mod prelude;
