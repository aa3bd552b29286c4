//! dMRI 数据集容器.
//!
//! [`DiffusionDataset`] 聚合一次扩散加权采集的全部信息, 并在构造时校验
//! 各属性之间的形状一致性. 持久化见 `persist.rs`, 由 NIfTI 与梯度文件组装见
//! `load.rs`.

use crate::affine::Affine;
use crate::error::{IndexOutOfRange, MosaicError, ShapeMismatchError};
use crate::gradients::GradientTable;
use crate::mosaic::{render_mosaic, MosaicOptions};
use crate::{Idx3d, Shape4d};
use image::GrayImage;
use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis, CowArray, Ix3};
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod load;
mod persist;

pub use load::{median_volume, DwiFiles};

#[cfg(feature = "rayon")]
pub use load::par_median_volume;

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 一次 dMRI 采集的数据集.
///
/// # 不变量
///
/// 1. 梯度表样本数等于 `dataobj` 最后一维的长度.
/// 2. `brainmask` 与 `bzero` (若存在) 的形状等于 `dataobj` 的前三维.
/// 3. `em_affines` 要么为空, 要么长度等于样本数.
///
/// 所有修改入口都会维持上述不变量.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "DatasetRepr"))]
pub struct DiffusionDataset {
    /// 仅包含扩散加权样本的 4D 数据 `(i, j, k, n)`.
    dataobj: Array4<f32>,

    /// 体素到世界坐标的仿射矩阵.
    affine: Affine,

    /// 脑掩膜.
    brainmask: Option<Array3<bool>>,

    /// b=0 参考图, 通常为多个 b=0 体的中位数.
    bzero: Option<Array3<f32>>,

    /// RAS+B 梯度表, 每列一个样本.
    gradients: GradientTable,

    /// 逐样本运动校正仿射变换, 由外部配准过程写入.
    em_affines: Vec<Affine>,
}

/// 留一梯度 (leave-one-gradient-out) 拆分中的训练部分.
#[derive(Debug, Clone)]
pub struct LogoTrain {
    /// 去掉被留出样本后的 4D 数据.
    pub data: Array4<f32>,

    /// 对应的梯度表.
    pub gradients: GradientTable,
}

/// 留一梯度拆分中被留出的样本.
#[derive(Debug, Clone)]
pub struct LogoTest {
    /// 被留出的 3D 体.
    pub volume: Array3<f32>,

    /// 被留出样本的 `[x, y, z, b]`.
    pub gradient: [f32; 4],
}

impl DiffusionDataset {
    /// 由 DW 数据和梯度表创建数据集. 仿射矩阵缺省为单位阵.
    ///
    /// 梯度表样本数与 `dataobj` 最后一维不一致时返回错误.
    pub fn new(dataobj: Array4<f32>, gradients: GradientTable) -> Result<Self, ShapeMismatchError> {
        let n = dataobj.len_of(Axis(3));
        if gradients.len() != n {
            return Err(ShapeMismatchError::SampleCount {
                field: "gradients",
                expected: n,
                found: gradients.len(),
            });
        }
        Ok(Self {
            dataobj,
            affine: Affine::identity(),
            brainmask: None,
            bzero: None,
            gradients,
            em_affines: Vec::new(),
        })
    }

    /// 设置体素到世界坐标的仿射矩阵.
    #[inline]
    pub fn with_affine(mut self, affine: Affine) -> Self {
        self.affine = affine;
        self
    }

    /// 设置脑掩膜. 形状必须与空间形状一致.
    pub fn with_brainmask(mut self, mask: Array3<bool>) -> Result<Self, ShapeMismatchError> {
        self.check_spatial("brainmask", mask.dim())?;
        self.brainmask = Some(mask);
        Ok(self)
    }

    /// 设置 b=0 参考图. 形状必须与空间形状一致.
    pub fn with_bzero(mut self, bzero: Array3<f32>) -> Result<Self, ShapeMismatchError> {
        self.check_spatial("bzero", bzero.dim())?;
        self.bzero = Some(bzero);
        Ok(self)
    }

    /// 整体替换运动校正仿射变换. 传入空序列表示清除.
    ///
    /// 非空时长度必须等于样本数.
    pub fn set_em_affines(&mut self, affines: Vec<Affine>) -> Result<(), ShapeMismatchError> {
        if !affines.is_empty() && affines.len() != self.sample_count() {
            return Err(ShapeMismatchError::SampleCount {
                field: "em_affines",
                expected: self.sample_count(),
                found: affines.len(),
            });
        }
        self.em_affines = affines;
        Ok(())
    }

    /// 设置第 `index` 个样本的运动校正仿射变换.
    ///
    /// 首次设置时, 其余样本以单位变换填充.
    pub fn set_transform(&mut self, index: usize, affine: Affine) -> Result<(), IndexOutOfRange> {
        IndexOutOfRange::check(index, self.sample_count())?;
        if self.em_affines.is_empty() {
            self.em_affines = vec![Affine::identity(); self.sample_count()];
        }
        self.em_affines[index] = affine;
        Ok(())
    }

    /// 扩散加权样本数, 即梯度表的列数.
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.gradients.len()
    }

    /// DW 数据形状 `(i, j, k, n)`.
    #[inline]
    pub fn shape(&self) -> Shape4d {
        self.dataobj.dim()
    }

    /// 空间形状 `[i, j, k]`.
    #[inline]
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (i, j, k, _) = self.dataobj.dim();
        [i, j, k]
    }

    /// 体素尺寸, 以毫米为单位.
    #[inline]
    pub fn voxel_sizes(&self) -> [f64; 3] {
        self.affine.voxel_sizes()
    }

    /// DW 数据视图.
    #[inline]
    pub fn dataobj(&self) -> ArrayView4<'_, f32> {
        self.dataobj.view()
    }

    /// 体素到世界坐标的仿射矩阵.
    #[inline]
    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// 脑掩膜视图.
    #[inline]
    pub fn brainmask(&self) -> Option<ArrayView3<'_, bool>> {
        self.brainmask.as_ref().map(|m| m.view())
    }

    /// b=0 参考图视图.
    #[inline]
    pub fn bzero(&self) -> Option<ArrayView3<'_, f32>> {
        self.bzero.as_ref().map(|b| b.view())
    }

    /// RAS+B 梯度表.
    #[inline]
    pub fn gradients(&self) -> &GradientTable {
        &self.gradients
    }

    /// 运动校正仿射变换. 未设置时为空.
    #[inline]
    pub fn em_affines(&self) -> &[Affine] {
        &self.em_affines
    }

    /// 是否已有运动校正结果.
    #[inline]
    pub fn has_em_affines(&self) -> bool {
        !self.em_affines.is_empty()
    }

    /// 第 `index` 个 DW 体.
    pub fn volume(&self, index: usize) -> Result<ArrayView3<'_, f32>, IndexOutOfRange> {
        IndexOutOfRange::check(index, self.sample_count())?;
        Ok(self.dataobj.index_axis(Axis(3), index))
    }

    /// 第 `index` 个样本的 `[x, y, z, b]`.
    #[inline]
    pub fn gradient(&self, index: usize) -> Result<[f32; 4], IndexOutOfRange> {
        self.gradients.column(index)
    }

    /// 掩膜内的体素个数. 未设置掩膜时返回 `None`.
    pub fn masked_voxels(&self) -> Option<usize> {
        self.brainmask
            .as_ref()
            .map(|m| m.iter().filter(|v| **v).count())
    }

    /// 留一梯度拆分: 返回去掉第 `index` 个样本后的数据与梯度表, 以及被留出的样本.
    pub fn logo_split(&self, index: usize) -> Result<(LogoTrain, LogoTest), IndexOutOfRange> {
        IndexOutOfRange::check(index, self.sample_count())?;
        let keep: Vec<usize> = (0..self.sample_count()).filter(|&i| i != index).collect();
        let train = LogoTrain {
            data: self.dataobj.select(Axis(3), &keep),
            gradients: self.gradients.without(index)?,
        };
        let test = LogoTest {
            volume: self.dataobj.index_axis(Axis(3), index).to_owned(),
            gradient: self.gradients.column(index)?,
        };
        Ok((train, test))
    }

    /// 绘制马赛克图.
    ///
    /// `index` 为 `None` 时绘制 b=0 参考图 (未设置参考图时退化为所有 DW 体的均值);
    /// 为 `Some(i)` 时绘制第 `i` 个 DW 体, 越界时返回
    /// [`MosaicError::IndexOutOfRange`].
    pub fn plot_mosaic(
        &self,
        index: Option<usize>,
        opts: &MosaicOptions,
    ) -> Result<GrayImage, MosaicError> {
        let volume: CowArray<'_, f32, Ix3> = match index {
            Some(i) => self.volume(i)?.into(),
            None => match self.bzero() {
                Some(b) => b.into(),
                None => {
                    log::warn!("no b=0 reference set, rendering the mean DW volume instead");
                    self.dataobj
                        .mean_axis(Axis(3))
                        .ok_or(MosaicError::Empty)?
                        .into()
                }
            },
        };
        render_mosaic(volume.view(), opts)
    }

    /// 绘制马赛克图并保存到 `path`. 图片格式由扩展名决定.
    pub fn save_mosaic<P: AsRef<Path>>(
        &self,
        index: Option<usize>,
        path: P,
        opts: &MosaicOptions,
    ) -> Result<(), MosaicError> {
        let img = self.plot_mosaic(index, opts)?;
        img.save(path.as_ref())?;
        log::info!("mosaic written to {}", path.as_ref().display());
        Ok(())
    }

    fn check_spatial(
        &self,
        field: &'static str,
        (i, j, k): Idx3d,
    ) -> Result<(), ShapeMismatchError> {
        let expected = self.spatial_shape();
        if expected == [i, j, k] {
            Ok(())
        } else {
            Err(ShapeMismatchError::Spatial {
                field,
                expected,
                found: [i, j, k],
            })
        }
    }
}

/// 反序列化的中间形式. 字段与 [`DiffusionDataset`] 一一对应, 转换时重新走
/// 构造函数的全部校验.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct DatasetRepr {
    dataobj: Array4<f32>,
    affine: Affine,
    brainmask: Option<Array3<bool>>,
    bzero: Option<Array3<f32>>,
    gradients: GradientTable,
    em_affines: Vec<Affine>,
}

#[cfg(feature = "serde")]
impl TryFrom<DatasetRepr> for DiffusionDataset {
    type Error = ShapeMismatchError;

    fn try_from(r: DatasetRepr) -> Result<Self, Self::Error> {
        let mut ds = DiffusionDataset::new(r.dataobj, r.gradients)?.with_affine(r.affine);
        if let Some(mask) = r.brainmask {
            ds = ds.with_brainmask(mask)?;
        }
        if let Some(bzero) = r.bzero {
            ds = ds.with_bzero(bzero)?;
        }
        ds.set_em_affines(r.em_affines)?;
        Ok(ds)
    }
}
