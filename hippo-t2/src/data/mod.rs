use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView3, Axis, Zip};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::gray::*;
use crate::{Idx3d, PipelineError, Result};

pub mod morph;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组. 不足三维的数据缺失维度按 1 处理.
    let [ndim, w, h, z, ..] = h.dim;
    let at = |d: u16, i: u16| if ndim >= i { d.max(1) as usize } else { 1 };
    (at(z, 3), at(h, 2), at(w, 1))
}

/// 读取 nii 文件, 返回 header 与按 (z, H, W) 组织的 `f32` 数据.
fn read_nifti_f32(path: &Path) -> Result<(BoxedHeader, Array3<f32>)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    let shape = get_shape_from_header(&header);

    // nifti 数据按 W 增长最快存储, 读出的数组为 Fortran 序的 [W, H, z(, t)].
    // 反转坐标轴后按逻辑序遍历, 恰好得到 (z, H, W) 的行优先序.
    let data = obj.into_volume().into_ndarray::<f32>()?;
    let raw: Vec<f32> = data.t().iter().copied().collect();
    let found = raw.len();
    let data = Array3::<f32>::from_shape_vec(shape, raw).map_err(|_| {
        PipelineError::ShapeMismatch(
            format!("{} (only 3D volumes are supported)", path.display()),
            shape,
            (found, 1, 1),
        )
    })?;

    Ok((header, data))
}

/// 写出时使用的 header: 复制参考头, 并清除数据缩放.
fn output_header(header: &NiftiHeader) -> NiftiHeader {
    let mut header = header.clone();
    // 数据已经是物理值, 不能再让读取方做一次线性变换.
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header.intent_name = Default::default();
    header
}

macro_rules! impl_write_nifti {
    ($($name: ident, $elem: ty);+) => {
        $(
            /// 以 `header` 为参考头写入 nii 文件. 文件名以 `.gz` 结尾时自动压缩.
            fn $name(path: &Path, header: &NiftiHeader, data: ArrayView3<$elem>) -> Result<()> {
                let header = output_header(header);
                // (z, H, W) -> [W, H, z]
                let data = data.permuted_axes([2, 1, 0]);
                WriterOptions::new(path)
                    .reference_header(&header)
                    .write_nifti(&data)?;
                Ok(())
            }
        )+
    };
}

impl_write_nifti!(write_nifti_f32, f32; write_nifti_u8, u8);

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小, 按 (z, H, W) 组织.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高, 宽.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z.abs() as f64, h.abs() as f64, w.abs() as f64]
    }

    /// 获取切片方向 (层厚方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.pix_dim()[0]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取水平切片方向的像素实际面积值, 以平方毫米为单位.
    #[inline]
    fn slice_pixel(&self) -> f64 {
        self.pix_dim().iter().skip(1).product()
    }

    /// 检查 `other` 与自身是否处于同一体素网格, 不一致则返回 `ShapeMismatch`.
    ///
    /// `what` 用于错误信息, 描述 `other` 是什么.
    fn ensure_same_grid<O: NiftiHeaderAttr>(&self, other: &O, what: &str) -> Result<()> {
        if self.shape() == other.shape() {
            Ok(())
        } else {
            Err(PipelineError::ShapeMismatch(
                what.to_string(),
                self.shape(),
                other.shape(),
            ))
        }
    }
}

/// 由裸数据和体素分辨率构造 header.
///
/// `pix_dim` 按照 \[w, h, z\] 格式存储.
fn fake_header(pix_dim: [f32; 3], (z, h, w): Idx3d) -> BoxedHeader {
    let mut header = Box::<NiftiHeader>::default();
    header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
    let [_, pw, ph, pz, ..] = &mut header.pixdim;
    let [w, h, z] = &pix_dim;
    (*pw, *ph, *pz) = (*w, *h, *z);
    header.intent_name[..4].copy_from_slice(b"fake");
    header
}

/// 将 \[w, h, z\] 数组转换为行优先的 (z, H, W) 数组.
fn to_zhw<A: Clone>(data: Array3<A>) -> Array3<A> {
    let data = data.permuted_axes([2, 1, 0]);
    if data.is_standard_layout() {
        data
    } else {
        data.as_standard_layout().to_owned()
    }
}

/// nii 格式 3D 标量体数据, 包括 header 和体素值. 体素值以 `f32` 保存.
///
/// T2 map (单位 ms)、重采样后的连续值掩膜和掩膜内的 T2 值均使用该结构.
#[derive(Debug, Clone)]
pub struct ScalarVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for ScalarVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for ScalarVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for ScalarVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl ScalarVolume {
    /// 打开 nii 文件格式的 3D 体数据. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (header, data) = read_nifti_f32(path.as_ref())?;
        Ok(Self { header, data })
    }

    /// 保存为 nii 文件. 文件名以 `.gz` 结尾时压缩保存.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_nifti_f32(path.as_ref(), &self.header, self.data.view())
    }

    /// 根据裸数据和体素分辨率直接创建实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 nifti 惯用标准以 \[w, h, z\] 格式存储.
    /// 2. `pix_dim` 按照 \[w, h, z\] 格式存储, 以毫米为单位.
    ///
    /// # 注意
    ///
    /// 该方法创建的 header 不含方向信息, 你应仅将其用于实验和测试.
    pub fn fake(data: Array3<f32>, pix_dim: [f32; 3]) -> Self {
        let data = to_zhw(data);
        let header = fake_header(pix_dim, data.dim());
        Self { header, data }
    }

    /// 以 `self` 的 header 为模板, 包装同一网格上的另一份数据.
    /// 若 `data` 形状不一致则 panic.
    pub(crate) fn with_data(&self, data: Array3<f32>) -> Self {
        assert_eq!(data.dim(), self.data.dim(), "体素网格形状不一致");
        Self {
            header: self.header.clone(),
            data,
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 将所有 NaN 体素替换为 0. 返回替换的个数.
    pub fn clear_nan(&mut self) -> usize {
        let mut cnt = 0usize;
        self.data
            .iter_mut()
            .filter(|v| v.is_nan())
            .for_each(|v| {
                cnt += 1;
                *v = 0.0;
            });
        cnt
    }

    /// 非零 (且非 NaN) 体素的个数.
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|v| **v != 0.0 && !v.is_nan()).count()
    }

    /// 非零 (且非 NaN) 体素的算术平均值. 不存在非零体素时返回 `None`.
    pub fn mean_nonzero(&self) -> Option<f64> {
        let mut count = 0u64;
        let mut sum = 0.0;
        for v in self.data.iter().filter(|v| **v != 0.0 && !v.is_nan()) {
            count += 1;
            sum += *v as f64;
        }
        (count != 0).then(|| sum / (count as f64))
    }

    /// 以 `self` 为值, `mask` 为掩膜, 逐体素相乘. 网格不一致时返回 `Err`.
    pub fn masked_by(&self, mask: &BinaryMask) -> Result<ScalarVolume> {
        self.ensure_same_grid(mask, "mask")?;
        let mut data = self.data.clone();
        Zip::from(&mut data).and(&mask.data).for_each(|v, &m| {
            *v *= m as f32;
        });
        Ok(self.with_data(data))
    }
}

/// nii 格式 3D 二值掩膜, 包括 header 和 0/1 体素. 体素值以 `u8` 保存.
///
/// 读入时任何有限的非零值都视为前景.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiHeaderAttr for BinaryMask {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for BinaryMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for BinaryMask {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl BinaryMask {
    /// 打开 nii 文件格式的 3D 掩膜. 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (header, data) = read_nifti_f32(path.as_ref())?;
        let data = data.mapv(|v| {
            if v.is_finite() && v != 0.0 {
                FOREGROUND
            } else {
                BACKGROUND
            }
        });
        Ok(Self { header, data })
    }

    /// 保存为 nii 文件 (`uint8`). 文件名以 `.gz` 结尾时压缩保存.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_nifti_u8(path.as_ref(), &self.header, self.data.view())
    }

    /// 根据裸数据和体素分辨率直接创建实体. 非零值视为前景.
    ///
    /// `data` 与 `pix_dim` 均按照 \[w, h, z\] 格式存储.
    pub fn fake(data: Array3<u8>, pix_dim: [f32; 3]) -> Self {
        let data = to_zhw(data).mapv(|p| if is_foreground(p) { FOREGROUND } else { BACKGROUND });
        let header = fake_header(pix_dim, data.dim());
        Self { header, data }
    }

    /// 在 `volume` 的网格上, 将满足 `pred` 的体素设为前景.
    pub fn from_predicate<F: Fn(f32) -> bool>(volume: &ScalarVolume, pred: F) -> Self {
        let data = volume
            .data
            .mapv(|v| if pred(v) { FOREGROUND } else { BACKGROUND });
        Self {
            header: volume.header.clone(),
            data,
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 获取前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| is_foreground(**p)).count()
    }

    /// 是否不存在前景体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|p| is_foreground(*p))
    }

    /// 前景的物理体积, 以立方毫米为单位.
    #[inline]
    pub fn volume_mm3(&self) -> f64 {
        self.count() as f64 * self.voxel()
    }

    /// 与 `other` 逐体素相乘 (交集). 网格不一致时返回 `Err`.
    pub fn intersect(&self, other: &BinaryMask) -> Result<BinaryMask> {
        self.ensure_same_grid(other, "mask")?;
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| a * b);
        Ok(Self {
            header: self.header.clone(),
            data,
        })
    }

    /// 自身前景是否是 `other` 前景的 (逐体素) 子集. 网格不一致时返回 `false`.
    pub fn is_subset_of(&self, other: &BinaryMask) -> bool {
        self.shape() == other.shape()
            && Zip::from(&self.data)
                .and(&other.data)
                .all(|&a, &b| is_background(a) || is_foreground(b))
    }

    /// 收集所有前景体素的下标, 结果按行优先存储.
    pub fn foreground_pos(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| is_foreground(*p).then_some(pos))
            .collect()
    }

    /// 获取第 `z_index` 层切片的前景体素个数.
    ///
    /// 当 `z_index` 越界时 panic.
    pub fn count_at(&self, z_index: usize) -> usize {
        self.data
            .index_axis(Axis(0), z_index)
            .iter()
            .filter(|p| is_foreground(**p))
            .count()
    }
}
