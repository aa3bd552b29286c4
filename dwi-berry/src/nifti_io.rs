//! NIfTI 体数据读写.
//!
//! 数组按 NIfTI 原生轴序 `(i, j, k[, n])` 返回, 不转换为 `(z, H, W)`:
//! 梯度方向定义在体素网格所在的 RAS+ 空间, 保持原轴序可以避免额外的方向换算.

use crate::affine::Affine;
use crate::error::{LoadError, SaveError};
use ndarray::{Array, Array3, Array4, ArrayBase, Axis, Data, Ix3, Ix4, IxDyn, RemoveAxis};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// 打开 NIfTI 文件, 返回 header 与动态维度的 `f32` 数组.
fn read_dyn<P: AsRef<Path>>(path: P) -> Result<(NiftiHeader, Array<f32, IxDyn>), LoadError> {
    let path = path.as_ref();
    log::debug!("reading NIfTI volume {}", path.display());
    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header().clone();
    let data = obj.into_volume().into_ndarray::<f32>()?;
    Ok((header, data))
}

/// 读取 4D 体数据. 3D 文件会被视为只有一个样本的 4D 数据.
///
/// 维度多于 4 (且多出的维度长度不为 1) 时返回 `LoadError::BadLayout`.
pub fn read_volume_4d<P: AsRef<Path>>(path: P) -> Result<(Array4<f32>, Affine), LoadError> {
    let (header, data) = read_dyn(path)?;
    let affine = Affine::from_header(&header);
    let mut data = match data.ndim() {
        3 => data.insert_axis(Axis(3)),
        n if n >= 4 && data.shape()[4..].iter().all(|&d| d == 1) => data,
        n => {
            return Err(LoadError::BadLayout {
                field: "dataobj",
                reason: format!("expected a 3D or 4D volume, found {n} dimensions"),
            })
        }
    };
    // 末尾长度为 1 的多余维度.
    while data.ndim() > 4 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    let data = data
        .into_dimensionality::<Ix4>()
        .map_err(|e| bad_layout("dataobj", e))?;
    Ok((data, affine))
}

/// 读取 3D 体数据. 4D 文件只保留第一个样本.
pub fn read_volume_3d<P: AsRef<Path>>(path: P) -> Result<(Array3<f32>, Affine), LoadError> {
    let (data, affine) = read_volume_4d(path)?;
    if data.len_of(Axis(3)) == 0 {
        return Err(LoadError::BadLayout {
            field: "volume",
            reason: "the file holds no volume".to_string(),
        });
    }
    let first = data.index_axis_move(Axis(3), 0);
    Ok((first, affine))
}

/// 读取掩膜. 非零体素为 `true`.
pub fn read_mask<P: AsRef<Path>>(path: P) -> Result<(Array3<bool>, Affine), LoadError> {
    let (data, affine) = read_volume_3d(path)?;
    Ok((data.mapv(|v| v != 0.0), affine))
}

/// 将 3D 或 4D `f32` 体数据写为 NIfTI 文件. `affine` 写入 sform.
pub fn write_volume<P, S, D>(
    path: P,
    data: &ArrayBase<S, D>,
    affine: &Affine,
) -> Result<(), SaveError>
where
    P: AsRef<Path>,
    S: Data<Elem = f32>,
    D: RemoveAxis,
{
    let path = path.as_ref();
    log::debug!("writing NIfTI volume {} {:?}", path.display(), data.shape());
    let mut header = NiftiHeader::default();
    affine.write_header(&mut header);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(data)?;
    Ok(())
}

/// 将掩膜写为 `f32` NIfTI 文件 (`true` 为 1).
pub fn write_mask<P: AsRef<Path>, S: Data<Elem = bool>>(
    path: P,
    mask: &ArrayBase<S, Ix3>,
    affine: &Affine,
) -> Result<(), SaveError> {
    let data = mask.mapv(|b| if b { 1.0f32 } else { 0.0 });
    write_volume(path, &data, affine)
}

fn bad_layout(field: &'static str, e: ndarray::ShapeError) -> LoadError {
    LoadError::BadLayout {
        field,
        reason: e.to_string(),
    }
}
