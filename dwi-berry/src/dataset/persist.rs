//! 以 NumPy `.npz` 归档持久化 [`DiffusionDataset`].
//!
//! 归档中每个属性对应一个数组, 字段名见 [`crate::consts::fields`]. 可选属性缺省时
//! 不写入. 掩膜以 `u8` 保存, 运动校正变换堆叠为 `(N, 4, 4)` 的 `f64` 数组.

use super::DiffusionDataset;
use crate::affine::Affine;
use crate::consts::fields;
use crate::error::{LoadError, SaveError, ShapeMismatchError};
use crate::gradients::GradientTable;
use crate::nifti_io;
use ndarray::{Array, Array3, Axis, Dimension, Ix2, Ix3, Ix4, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

impl DiffusionDataset {
    /// 将数据集写入 `path` 处的压缩 `.npz` 归档. 已存在的文件会被覆盖.
    pub fn to_filename<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveError> {
        let path = path.as_ref();
        let mut npz = NpzWriter::new_compressed(File::create(path)?);

        npz.add_array(fields::DATAOBJ, &self.dataobj)?;
        npz.add_array(fields::AFFINE, &self.affine.to_array())?;
        npz.add_array(fields::GRADIENTS, &self.gradients.data())?;
        if let Some(mask) = &self.brainmask {
            npz.add_array(fields::BRAINMASK, &mask.mapv(u8::from))?;
        }
        if let Some(bzero) = &self.bzero {
            npz.add_array(fields::BZERO, bzero)?;
        }
        if self.has_em_affines() {
            let stacked = Array3::from_shape_fn((self.em_affines.len(), 4, 4), |(s, r, c)| {
                self.em_affines[s].rows()[r][c]
            });
            npz.add_array(fields::EM_AFFINES, &stacked)?;
        }
        npz.finish()?;

        log::info!(
            "saved {} samples {:?} to {}",
            self.sample_count(),
            self.spatial_shape(),
            path.display()
        );
        Ok(())
    }

    /// 从 `path` 处的 `.npz` 归档加载数据集.
    ///
    /// 文件不存在或不可读时返回 `LoadError::Io`; 缺少 `dataobj` 或 `gradients`
    /// 时返回 `LoadError::MissingField`; 字段维度或形状不兼容时返回
    /// `LoadError::BadLayout` / `LoadError::Shape`.
    pub fn from_filename<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let mut npz = NpzReader::new(File::open(path)?)?;
        let names = npz.names()?;
        log::debug!("{} holds {:?}", path.display(), names);

        let dataobj = read_field::<f32, _>(&mut npz, &names, fields::DATAOBJ)?
            .ok_or(LoadError::MissingField(fields::DATAOBJ))?;
        let ndim = dataobj.ndim();
        let dataobj = dataobj
            .into_dimensionality::<Ix4>()
            .map_err(|_| ShapeMismatchError::NotFourDimensional(ndim))?;

        let gradients = read_fixed::<f32, _, Ix2>(&mut npz, &names, fields::GRADIENTS)?
            .ok_or(LoadError::MissingField(fields::GRADIENTS))?;
        let gradients = GradientTable::from_rasb(gradients)?;

        let mut ds = DiffusionDataset::new(dataobj, gradients)?;

        if let Some(a) = read_fixed::<f64, _, Ix2>(&mut npz, &names, fields::AFFINE)? {
            let affine = Affine::from_array(a.view()).ok_or_else(|| LoadError::BadLayout {
                field: fields::AFFINE,
                reason: format!("expected a homogeneous 4x4 matrix, found shape {:?}", a.dim()),
            })?;
            ds = ds.with_affine(affine);
        }
        if let Some(mask) = read_fixed::<u8, _, Ix3>(&mut npz, &names, fields::BRAINMASK)? {
            ds = ds.with_brainmask(mask.mapv(|v| v != 0))?;
        }
        if let Some(bzero) = read_fixed::<f32, _, Ix3>(&mut npz, &names, fields::BZERO)? {
            ds = ds.with_bzero(bzero)?;
        }
        if let Some(stacked) = read_fixed::<f64, _, Ix3>(&mut npz, &names, fields::EM_AFFINES)? {
            let affines = stacked
                .axis_iter(Axis(0))
                .map(Affine::from_array)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| LoadError::BadLayout {
                    field: fields::EM_AFFINES,
                    reason: format!(
                        "expected (N, 4, 4) homogeneous matrices, found {:?}",
                        stacked.dim()
                    ),
                })?;
            ds.set_em_affines(affines)?;
        }

        log::info!(
            "loaded {} samples {:?} from {}",
            ds.sample_count(),
            ds.spatial_shape(),
            path.display()
        );
        Ok(ds)
    }

    /// 将 DW 数据连同仿射矩阵写为 NIfTI 文件.
    pub fn to_nifti<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveError> {
        nifti_io::write_volume(path, &self.dataobj, &self.affine)
    }

    /// 将梯度表写为 RAS+B 文本文件.
    pub fn write_gradients<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveError> {
        Ok(self.gradients.write_rasb(path)?)
    }
}

/// 在归档中查找字段名. 兼容带与不带 `.npy` 后缀两种写法.
fn entry_name<'a>(names: &'a [String], field: &str) -> Option<&'a str> {
    let with_suffix = fields::npy(field);
    names
        .iter()
        .find(|n| **n == with_suffix || *n == field)
        .map(String::as_str)
}

/// 读取任意维度的字段. 字段不存在时返回 `Ok(None)`.
fn read_field<A, R>(
    npz: &mut NpzReader<R>,
    names: &[String],
    field: &'static str,
) -> Result<Option<Array<A, IxDyn>>, LoadError>
where
    A: ReadableElement,
    R: Read + Seek,
{
    read_fixed::<A, R, IxDyn>(npz, names, field)
}

/// 读取固定维度的字段. 字段不存在时返回 `Ok(None)`, 维度不符时返回
/// `LoadError::BadLayout`.
fn read_fixed<A, R, D>(
    npz: &mut NpzReader<R>,
    names: &[String],
    field: &'static str,
) -> Result<Option<Array<A, D>>, LoadError>
where
    A: ReadableElement,
    R: Read + Seek,
    D: Dimension,
{
    let Some(name) = entry_name(names, field) else {
        return Ok(None);
    };
    npz.by_name::<OwnedRepr<A>, D>(name)
        .map(Some)
        .map_err(|e| LoadError::BadLayout {
            field,
            reason: e.to_string(),
        })
}
