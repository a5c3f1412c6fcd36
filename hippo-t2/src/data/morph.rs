//! 二值掩膜的形态学腐蚀.
//!
//! 两种结构元素:
//!
//! 1. 平面内 3x3 方形核 (只在每个水平切片内部起作用, 不沿层厚方向收缩);
//! 2. 3x3x3 立方核.
//!
//! 越界的邻居视为不存在, 不会腐蚀掉位于体数据边缘的前景.

use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis};

use super::BinaryMask;
use crate::consts::gray::*;
use crate::{Idx2d, Idx3d, NiftiHeaderAttr};

/// 3x3 平面核的相对偏移 (不含中心), 按 (h, w) 组织.
const N8: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// `pos + delta`, 越界时返回 `None`.
#[inline]
fn offset_2d((h, w): Idx2d, (dh, dw): (isize, isize), (bh, bw): Idx2d) -> Option<Idx2d> {
    let h = h.checked_add_signed(dh)?;
    let w = w.checked_add_signed(dw)?;
    (h < bh && w < bw).then_some((h, w))
}

/// 对单个水平切片做 3x3 腐蚀, 结果写入 `dst`. `dst` 应当已被清零.
fn erode_slice(src: ArrayView2<u8>, mut dst: ArrayViewMut2<u8>) {
    let bound = src.dim();
    for (pos, _) in src.indexed_iter().filter(|(_, p)| is_foreground(**p)) {
        let keep = N8.iter().all(|&delta| match offset_2d(pos, delta, bound) {
            Some(n) => is_foreground(src[n]),
            None => true,
        });
        if keep {
            dst[pos] = FOREGROUND;
        }
    }
}

/// 3x3x3 立方核的相对偏移 (不含中心), 按 (z, h, w) 组织.
fn box_kernel_3d() -> impl Iterator<Item = (isize, isize, isize)> {
    (-1..=1)
        .flat_map(|z| (-1..=1).flat_map(move |h| (-1..=1).map(move |w| (z, h, w))))
        .filter(|d| *d != (0, 0, 0))
}

/// 形态学实现块
impl BinaryMask {
    /// 平面内 (2D) 腐蚀一个体素.
    ///
    /// 对每个水平切片独立地使用 3x3 方形核: 前景体素仅当其切片内所有 (不越界的)
    /// 邻居也是前景时保留. 层厚方向不收缩, 以免破坏沿层厚方向很薄的结构.
    ///
    /// 返回值总是 `self` 的子集.
    pub fn erode_in_plane(&self) -> BinaryMask {
        let mut out = Array3::<u8>::zeros(self.data.dim());

        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

                out.axis_iter_mut(Axis(0))
                    .into_par_iter()
                    .zip(self.data.axis_iter(Axis(0)).into_par_iter())
                    .for_each(|(dst, src)| erode_slice(src, dst));
            } else {
                out.axis_iter_mut(Axis(0))
                    .zip(self.data.axis_iter(Axis(0)))
                    .for_each(|(dst, src)| erode_slice(src, dst));
            }
        }

        Self {
            header: self.header.clone(),
            data: out,
        }
    }

    /// 三维腐蚀一个体素 (3x3x3 立方核).
    ///
    /// 前景体素仅当其 26 个 (不越界的) 邻居都是前景时保留. 返回值总是 `self` 的子集.
    pub fn erode_3d(&self) -> BinaryMask {
        let kernel: Vec<_> = box_kernel_3d().collect();
        let mut out = Array3::<u8>::zeros(self.data.dim());

        for pos in self.foreground_pos() {
            let keep = kernel.iter().all(|&delta| match self.offset_3d(pos, delta) {
                Some(n) => is_foreground(self[n]),
                None => true,
            });
            if keep {
                out[pos] = FOREGROUND;
            }
        }

        Self {
            header: self.header.clone(),
            data: out,
        }
    }

    /// `pos + delta`, 越界时返回 `None`.
    #[inline]
    fn offset_3d(&self, (z, h, w): Idx3d, (dz, dh, dw): (isize, isize, isize)) -> Option<Idx3d> {
        let pos = (
            z.checked_add_signed(dz)?,
            h.checked_add_signed(dh)?,
            w.checked_add_signed(dw)?,
        );
        self.check(&pos).then_some(pos)
    }
}
