//! 4×4 齐次仿射变换.
//!
//! 既用于描述体素网格到扫描仪坐标的映射, 也用于保存外部运动校正得到的
//! 逐样本对齐变换.

use crate::consts::AFFINE_TOLERANCE;
use ndarray::{Array2, ArrayView2};
use nifti::NiftiHeader;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 行优先存储的 4×4 齐次仿射矩阵. 最后一行恒为 `[0, 0, 0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "AffineRepr"))]
pub struct Affine {
    rows: [[f64; 4]; 4],
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct AffineRepr {
    rows: [[f64; 4]; 4],
}

#[cfg(feature = "serde")]
impl TryFrom<AffineRepr> for Affine {
    type Error = &'static str;

    fn try_from(r: AffineRepr) -> Result<Self, Self::Error> {
        Self::from_rows(r.rows).ok_or("affine must be finite with a last row of [0, 0, 0, 1]")
    }
}

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    /// 单位变换.
    pub const fn identity() -> Self {
        Self {
            rows: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// 由行优先的 4×4 矩阵构造. 最后一行不满足齐次约束时返回 `None`.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Option<Self> {
        let last = rows[3];
        let homogeneous = [0.0, 0.0, 0.0, 1.0]
            .iter()
            .zip(last.iter())
            .all(|(e, v)| (e - v).abs() <= AFFINE_TOLERANCE);
        (homogeneous && rows.iter().flatten().all(|v| v.is_finite())).then_some(Self { rows })
    }

    /// 由对角缩放和平移构造.
    pub fn from_scaling(scale: [f64; 3], translation: [f64; 3]) -> Self {
        let mut ans = Self::identity();
        for axis in 0..3 {
            ans.rows[axis][axis] = scale[axis];
            ans.rows[axis][3] = translation[axis];
        }
        ans
    }

    /// 由 `ndarray` 视图构造. 形状必须为 `(4, 4)`.
    pub fn from_array(a: ArrayView2<f64>) -> Option<Self> {
        if a.dim() != (4, 4) {
            return None;
        }
        let mut rows = [[0.0; 4]; 4];
        for ((r, c), v) in a.indexed_iter() {
            rows[r][c] = *v;
        }
        Self::from_rows(rows)
    }

    /// 从 NIfTI header 获取体素到世界坐标的仿射矩阵.
    ///
    /// 优先使用 sform; 其次使用 qform (四元数); 两者都缺失时仅按 `pixdim` 缩放.
    pub fn from_header(header: &NiftiHeader) -> Self {
        let f = |v: f32| v as f64;
        if header.sform_code > 0 {
            let row = |r: &[f32; 4]| [f(r[0]), f(r[1]), f(r[2]), f(r[3])];
            return Self {
                rows: [
                    row(&header.srow_x),
                    row(&header.srow_y),
                    row(&header.srow_z),
                    [0.0, 0.0, 0.0, 1.0],
                ],
            };
        }

        let [_, dx, dy, dz, ..] = header.pixdim.map(f);
        if header.qform_code > 0 {
            let (b, c, d) = (
                f(header.quatern_b),
                f(header.quatern_c),
                f(header.quatern_d),
            );
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
            let dz = dz * qfac;
            return Self {
                rows: [
                    [
                        (a * a + b * b - c * c - d * d) * dx,
                        2.0 * (b * c - a * d) * dy,
                        2.0 * (b * d + a * c) * dz,
                        f(header.quatern_x),
                    ],
                    [
                        2.0 * (b * c + a * d) * dx,
                        (a * a + c * c - b * b - d * d) * dy,
                        2.0 * (c * d - a * b) * dz,
                        f(header.quatern_y),
                    ],
                    [
                        2.0 * (b * d - a * c) * dx,
                        2.0 * (c * d + a * b) * dy,
                        (a * a + d * d - b * b - c * c) * dz,
                        f(header.quatern_z),
                    ],
                    [0.0, 0.0, 0.0, 1.0],
                ],
            };
        }

        // pixdim 为 0 时视为 1mm.
        let nz = |v: f64| if v == 0.0 { 1.0 } else { v };
        Self::from_scaling([nz(dx), nz(dy), nz(dz)], [0.0; 3])
    }

    /// 将该矩阵写入 NIfTI header 的 sform 字段.
    pub fn write_header(&self, header: &mut NiftiHeader) {
        let row = |r: &[f64; 4]| [r[0] as f32, r[1] as f32, r[2] as f32, r[3] as f32];
        header.srow_x = row(&self.rows[0]);
        header.srow_y = row(&self.rows[1]);
        header.srow_z = row(&self.rows[2]);
        header.sform_code = 1;
        let [sx, sy, sz] = self.voxel_sizes();
        header.pixdim[1] = sx as f32;
        header.pixdim[2] = sy as f32;
        header.pixdim[3] = sz as f32;
    }

    /// 行优先的底层矩阵.
    #[inline]
    pub fn rows(&self) -> &[[f64; 4]; 4] {
        &self.rows
    }

    /// 转换为 `(4, 4)` 的 `ndarray` 矩阵.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((4, 4), |(r, c)| self.rows[r][c])
    }

    /// 对点 `p` 施加变换.
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let mut ans = [0.0; 3];
        for (out, row) in ans.iter_mut().zip(self.rows.iter()) {
            *out = row[0] * p[0] + row[1] * p[1] + row[2] * p[2] + row[3];
        }
        ans
    }

    /// 先施加 `self`, 再施加 `next` 所得的复合变换, 即 `next * self`.
    pub fn then(&self, next: &Affine) -> Affine {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = (0..4).map(|k| next.rows[r][k] * self.rows[k][c]).sum();
            }
        }
        Affine { rows }
    }

    /// 各体素轴在世界坐标下的长度 (即矩阵前三列的范数), 以毫米为单位.
    pub fn voxel_sizes(&self) -> [f64; 3] {
        let mut ans = [0.0; 3];
        for (c, out) in ans.iter_mut().enumerate() {
            *out = (0..3)
                .map(|r| self.rows[r][c] * self.rows[r][c])
                .sum::<f64>()
                .sqrt();
        }
        ans
    }

    /// 在容差 `tol` 内是否为单位变换.
    pub fn is_identity(&self, tol: f64) -> bool {
        self.rows
            .iter()
            .flatten()
            .zip(Self::identity().rows.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tol)
    }

    /// 在容差 `tol` 内是否与 `other` 相等.
    pub fn approx_eq(&self, other: &Affine, tol: f64) -> bool {
        self.rows
            .iter()
            .flatten()
            .zip(other.rows.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}
