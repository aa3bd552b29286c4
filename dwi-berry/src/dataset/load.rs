//! 由 NIfTI 体数据与梯度文件组装 [`DiffusionDataset`].
//!
//! 组装流程:
//!
//! 1. 读取 4D DWI;
//! 2. 读取梯度表 (RAS+B 文件优先, 其次 FSL `bval`/`bvec`);
//! 3. 检查梯度样本数与 DWI 第四维一致;
//! 4. 按 b=0 阈值拆分 b=0 样本与 DW 样本;
//! 5. 参考图取显式给出的文件, 否则取所有 b=0 体的逐体素中位数;
//! 6. 读取可选的脑掩膜;
//! 7. 仅用 DW 样本构造容器.

use super::DiffusionDataset;
use crate::error::{LoadError, ShapeMismatchError};
use crate::gradients::GradientTable;
use crate::nifti_io;
use ndarray::{Array3, ArrayView1, ArrayView4, Axis};
use ordered_float::OrderedFloat;
use std::path::{Path, PathBuf};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use self::par_median_volume as reference_median;
    } else {
        use self::median_volume as reference_median;
    }
}

/// 一次 dMRI 采集涉及的文件路径.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DwiFiles {
    /// 4D DWI NIfTI 文件, 包含 b=0 与 DW 样本.
    pub dwi: PathBuf,

    /// FSL `bval` 文件.
    pub bvals: Option<PathBuf>,

    /// FSL `bvec` 文件.
    pub bvecs: Option<PathBuf>,

    /// RAS+B 文本文件. 与 FSL 文件同时给出时优先使用.
    pub rasb: Option<PathBuf>,

    /// 脑掩膜 NIfTI 文件.
    pub brainmask: Option<PathBuf>,

    /// b=0 参考图 NIfTI 文件. 缺省时由 b=0 样本的中位数计算.
    pub bzero: Option<PathBuf>,
}

impl DwiFiles {
    /// 仅指定 DWI 文件.
    pub fn new<P: Into<PathBuf>>(dwi: P) -> Self {
        Self {
            dwi: dwi.into(),
            ..Self::default()
        }
    }

    /// 按文件名约定在目录 `dir` 下查找 `{stem}` 对应的文件.
    ///
    /// DWI 为 `{stem}.nii.gz` 或 `{stem}.nii`; 梯度为 `{stem}.b` 或
    /// `{stem}.bval` + `{stem}.bvec`; 掩膜为 `{stem}_brainmask.nii.gz`;
    /// 参考图为 `{stem}_b0.nii.gz`. 只有实际存在的可选文件会被记录.
    pub fn from_stem<P: AsRef<Path>>(dir: P, stem: &str) -> Self {
        let dir = dir.as_ref();
        let existing = |name: String| Some(dir.join(name)).filter(|p| p.is_file());

        let dwi = existing(format!("{stem}.nii"))
            .unwrap_or_else(|| dir.join(format!("{stem}.nii.gz")));
        let (bvals, bvecs) = match (
            existing(format!("{stem}.bval")),
            existing(format!("{stem}.bvec")),
        ) {
            (Some(a), Some(b)) => (Some(a), Some(b)),
            _ => (None, None),
        };

        Self {
            dwi,
            bvals,
            bvecs,
            rasb: existing(format!("{stem}.b")),
            brainmask: existing(format!("{stem}_brainmask.nii.gz")),
            bzero: existing(format!("{stem}_b0.nii.gz")),
        }
    }

    /// 指定 FSL 梯度文件对.
    pub fn with_fsl<P: Into<PathBuf>, Q: Into<PathBuf>>(self, bvals: P, bvecs: Q) -> Self {
        Self {
            bvals: Some(bvals.into()),
            bvecs: Some(bvecs.into()),
            ..self
        }
    }

    /// 指定 RAS+B 梯度文件.
    pub fn with_rasb<P: Into<PathBuf>>(self, rasb: P) -> Self {
        Self {
            rasb: Some(rasb.into()),
            ..self
        }
    }

    /// 指定脑掩膜文件.
    pub fn with_brainmask<P: Into<PathBuf>>(self, brainmask: P) -> Self {
        Self {
            brainmask: Some(brainmask.into()),
            ..self
        }
    }

    /// 指定 b=0 参考图文件.
    pub fn with_bzero<P: Into<PathBuf>>(self, bzero: P) -> Self {
        Self {
            bzero: Some(bzero.into()),
            ..self
        }
    }

    /// 读取梯度表.
    fn read_gradients(&self) -> Result<GradientTable, LoadError> {
        match (&self.rasb, &self.bvals, &self.bvecs) {
            (Some(rasb), _, _) => Ok(GradientTable::read_rasb(rasb)?),
            (None, Some(bvals), Some(bvecs)) => Ok(GradientTable::read_fsl(bvals, bvecs)?),
            _ => Err(LoadError::MissingField("gradients")),
        }
    }
}

impl DiffusionDataset {
    /// 由 NIfTI 与梯度文件组装数据集. b 值不大于 `b0_threshold` 的样本被视为
    /// b=0 样本, 只参与参考图计算, 不进入 DW 数据.
    pub fn load(files: &DwiFiles, b0_threshold: f32) -> Result<Self, LoadError> {
        let (data, affine) = nifti_io::read_volume_4d(&files.dwi)?;
        let gradients = files.read_gradients()?;

        let n = data.len_of(Axis(3));
        if gradients.len() != n {
            return Err(ShapeMismatchError::SampleCount {
                field: "gradients",
                expected: n,
                found: gradients.len(),
            }
            .into());
        }

        let b0_mask = gradients.b0_mask(b0_threshold);
        let (b0_idx, dw_idx): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| b0_mask[i]);
        log::info!(
            "found {} DW samples and {} b=0 samples in {}",
            dw_idx.len(),
            b0_idx.len(),
            files.dwi.display()
        );

        let bzero = match &files.bzero {
            Some(p) => Some(nifti_io::read_volume_3d(p)?.0),
            None if !b0_idx.is_empty() => {
                let b0s = data.select(Axis(3), &b0_idx);
                Some(reference_median(b0s.view()))
            }
            None => {
                log::warn!("no b=0 sample below {b0_threshold}, reference map left empty");
                None
            }
        };

        let gradients = gradients
            .select(&dw_idx)
            .map_err(|e| LoadError::BadLayout {
                field: "gradients",
                reason: e.to_string(),
            })?;
        let mut ds =
            DiffusionDataset::new(data.select(Axis(3), &dw_idx), gradients)?.with_affine(affine);

        if let Some(bzero) = bzero {
            ds = ds.with_bzero(bzero)?;
        }
        if let Some(p) = &files.brainmask {
            ds = ds.with_brainmask(nifti_io::read_mask(p)?.0)?;
        }
        Ok(ds)
    }
}

/// 一条样本轴上有限值的中位数. 没有有限值时返回 NaN.
fn median(lane: ArrayView1<f32>) -> f32 {
    let mut v: Vec<OrderedFloat<f32>> = lane
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| OrderedFloat(*x))
        .collect();
    if v.is_empty() {
        return f32::NAN;
    }
    v.sort_unstable();
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid].0
    } else {
        (v[mid - 1].0 + v[mid].0) / 2.0
    }
}

/// 沿样本轴 (第四维) 计算逐体素中位数.
pub fn median_volume(stack: ArrayView4<f32>) -> Array3<f32> {
    stack.map_axis(Axis(3), median)
}

/// 借助 `rayon`, 并行地沿样本轴计算逐体素中位数.
#[cfg(feature = "rayon")]
pub fn par_median_volume(stack: ArrayView4<f32>) -> Array3<f32> {
    ndarray::Zip::from(stack.lanes(Axis(3))).par_map_collect(median)
}
