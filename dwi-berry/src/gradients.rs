//! RAS+B 梯度表.
//!
//! 梯度表以 `(4, N)` 矩阵保存: 每一列对应一个扩散加权样本,
//! 前三行为扫描仪 RAS+ 坐标系下的梯度方向, 第四行为 b 值 (s/mm²).

use crate::consts::RASB_ROWS;
use crate::error::{GradientError, IndexOutOfRange, ShapeMismatchError};
use itertools::Itertools;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// RAS+B 梯度表. 列数即样本数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "GradientRepr"))]
pub struct GradientTable {
    data: Array2<f32>,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct GradientRepr {
    data: Array2<f32>,
}

#[cfg(feature = "serde")]
impl TryFrom<GradientRepr> for GradientTable {
    type Error = ShapeMismatchError;

    fn try_from(r: GradientRepr) -> Result<Self, Self::Error> {
        Self::from_rasb(r.data)
    }
}

impl GradientTable {
    /// 由 RAS+B 矩阵构造.
    ///
    /// 接受 `(4, N)`; 当形状为 `(N, 4)` 且 `N != 4` 时自动转置
    /// (文本 `.b` 文件通常一行一个样本). 形状为 `(4, 4)` 时按列解释.
    pub fn from_rasb(data: Array2<f32>) -> Result<Self, ShapeMismatchError> {
        let (rows, cols) = data.dim();
        if rows == RASB_ROWS {
            Ok(Self { data })
        } else if cols == RASB_ROWS {
            Ok(Self {
                data: data.reversed_axes().as_standard_layout().into_owned(),
            })
        } else {
            Err(ShapeMismatchError::GradientRows([rows, cols]))
        }
    }

    /// 由逐样本的 b 值和 b 向量构造.
    pub fn from_bvals_bvecs(bvals: &[f32], bvecs: &[[f32; 3]]) -> Result<Self, GradientError> {
        if bvals.len() != bvecs.len() {
            return Err(GradientError::LengthMismatch {
                bvals: bvals.len(),
                bvecs: bvecs.len(),
            });
        }
        let mut data = Array2::<f32>::zeros((RASB_ROWS, bvals.len()));
        for (mut col, (b, v)) in data.axis_iter_mut(Axis(1)).zip(bvals.iter().zip(bvecs)) {
            col[0] = v[0];
            col[1] = v[1];
            col[2] = v[2];
            col[3] = *b;
        }
        Ok(Self { data })
    }

    /// 读取 MRtrix 风格的 RAS+B 文本文件: 每行 `x y z b`, `#` 开头的行为注释.
    pub fn read_rasb<P: AsRef<Path>>(path: P) -> Result<Self, GradientError> {
        let text = fs::read_to_string(path.as_ref())?;
        let rows = parse_rows(&text)?;
        let mut values = Vec::with_capacity(rows.len() * RASB_ROWS);
        for (line, row) in rows {
            if row.len() != RASB_ROWS {
                return Err(GradientError::Columns {
                    line,
                    expected: RASB_ROWS,
                    found: row.len(),
                });
            }
            values.extend(row);
        }
        let n = values.len() / RASB_ROWS;
        let data = Array2::from_shape_vec((n, RASB_ROWS), values)
            .map_err(|_| ShapeMismatchError::GradientRows([n, RASB_ROWS]))?;
        Ok(Self::from_rasb(data.reversed_axes().as_standard_layout().into_owned())?)
    }

    /// 读取 FSL 风格的 `bval` / `bvec` 文件对.
    ///
    /// `bval` 中的所有数值按出现顺序依次作为样本 b 值. `bvec` 可以是 3 行 N 列
    /// (FSL 惯例), 也可以是 N 行 3 列.
    pub fn read_fsl<P: AsRef<Path>, Q: AsRef<Path>>(
        bval_path: P,
        bvec_path: Q,
    ) -> Result<Self, GradientError> {
        let bvals: Vec<f32> = parse_rows(&fs::read_to_string(bval_path.as_ref())?)?
            .into_iter()
            .flat_map(|(_, row)| row)
            .collect();

        let rows = parse_rows(&fs::read_to_string(bvec_path.as_ref())?)?;
        let bvecs = bvecs_from_rows(rows)?;

        Self::from_bvals_bvecs(&bvals, &bvecs)
    }

    /// 以 MRtrix 风格文本写出, 每行一个样本.
    pub fn write_rasb<P: AsRef<Path>>(&self, path: P) -> Result<(), GradientError> {
        let mut w = BufWriter::new(fs::File::create(path.as_ref())?);
        for col in self.data.axis_iter(Axis(1)) {
            writeln!(w, "{}", col.iter().map(|v| format!("{v:.6}")).join(" "))?;
        }
        w.flush()?;
        Ok(())
    }

    /// 样本数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.ncols()
    }

    /// 是否没有任何样本.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 底层 `(4, N)` 矩阵视图.
    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// 取出底层矩阵.
    #[inline]
    pub fn into_inner(self) -> Array2<f32> {
        self.data
    }

    /// 所有样本的 b 值.
    #[inline]
    pub fn bvals(&self) -> ArrayView1<'_, f32> {
        self.data.row(3)
    }

    /// 所有样本的梯度方向, 形状 `(3, N)`.
    #[inline]
    pub fn bvecs(&self) -> ArrayView2<'_, f32> {
        self.data.slice(s![0..3, ..])
    }

    /// 第 `index` 个样本的 `[x, y, z, b]`.
    pub fn column(&self, index: usize) -> Result<[f32; 4], IndexOutOfRange> {
        IndexOutOfRange::check(index, self.len())?;
        let c = self.data.column(index);
        Ok([c[0], c[1], c[2], c[3]])
    }

    /// 标记 b 值不大于 `threshold` 的样本 (b=0 样本).
    pub fn b0_mask(&self, threshold: f32) -> Vec<bool> {
        self.bvals().iter().map(|b| *b <= threshold).collect()
    }

    /// 按 `indices` 顺序抽取样本组成新表.
    ///
    /// 任一索引越界时返回错误.
    pub fn select(&self, indices: &[usize]) -> Result<Self, IndexOutOfRange> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(IndexOutOfRange {
                index: bad,
                len: self.len(),
            });
        }
        Ok(Self {
            data: self.data.select(Axis(1), indices),
        })
    }

    /// 去掉第 `index` 个样本后的新表.
    pub fn without(&self, index: usize) -> Result<Self, IndexOutOfRange> {
        IndexOutOfRange::check(index, self.len())?;
        let keep = (0..self.len()).filter(|&i| i != index).collect_vec();
        self.select(&keep)
    }

    /// 将所有非零梯度方向归一化为单位向量. b 值保持不变.
    pub fn normalized(&self) -> Self {
        let mut data = self.data.clone();
        for mut col in data.axis_iter_mut(Axis(1)) {
            let norm = col
                .slice(s![0..3])
                .iter()
                .map(|v| v * v)
                .sum::<f32>()
                .sqrt();
            if norm > f32::EPSILON {
                col.slice_mut(s![0..3]).mapv_inplace(|v| v / norm);
            }
        }
        Self { data }
    }

    /// 各样本梯度方向的模长.
    pub fn norms(&self) -> Array1<f32> {
        self.bvecs()
            .axis_iter(Axis(1))
            .map(|v| v.iter().map(|x| x * x).sum::<f32>().sqrt())
            .collect()
    }
}

/// 按行解析空白分隔的数值文本. 空行与 `#` 注释行被跳过, 返回 `(行号, 数值)`.
fn parse_rows(text: &str) -> Result<Vec<(usize, Vec<f32>)>, GradientError> {
    let mut ans = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c.is_ascii_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<f32>().map_err(|_| GradientError::BadToken {
                    line: i + 1,
                    token: t.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        ans.push((i + 1, row));
    }
    Ok(ans)
}

/// 将 `bvec` 文件的行解释为 b 向量. 支持 3×N 和 N×3 两种布局.
fn bvecs_from_rows(rows: Vec<(usize, Vec<f32>)>) -> Result<Vec<[f32; 3]>, GradientError> {
    if rows.len() == 3 {
        // 3 行 N 列 (FSL 惯例). 3×3 时同样按 FSL 惯例解释.
        let n = rows[0].1.len();
        if let Some((line, r)) = rows.iter().find(|(_, r)| r.len() != n) {
            return Err(GradientError::Columns {
                line: *line,
                expected: n,
                found: r.len(),
            });
        }
        Ok((0..n)
            .map(|j| [rows[0].1[j], rows[1].1[j], rows[2].1[j]])
            .collect())
    } else {
        rows.into_iter()
            .map(|(line, r)| match r.as_slice() {
                &[x, y, z] => Ok([x, y, z]),
                other => Err(GradientError::Columns {
                    line,
                    expected: 3,
                    found: other.len(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::GradientTable;
    use crate::error::{GradientError, ShapeMismatchError};
    use ndarray::Array2;
    use std::fs;

    fn table(n: usize) -> GradientTable {
        let bvals: Vec<f32> = (0..n).map(|i| if i % 4 == 0 { 0.0 } else { 1000.0 }).collect();
        let bvecs: Vec<[f32; 3]> = (0..n)
            .map(|i| if i % 4 == 0 { [0.0; 3] } else { [1.0, i as f32, 0.0] })
            .collect();
        GradientTable::from_bvals_bvecs(&bvals, &bvecs).unwrap()
    }

    #[test]
    fn test_gradient_len() {
        let g = GradientTable::from_rasb(Array2::zeros((4, 64))).unwrap();
        assert_eq!(g.len(), 64);
        assert!(!g.is_empty());

        // 一行一个样本的布局会被转置.
        let g = GradientTable::from_rasb(Array2::zeros((102, 4))).unwrap();
        assert_eq!(g.len(), 102);
        assert_eq!(g.data().dim(), (4, 102));

        let e = GradientTable::from_rasb(Array2::zeros((3, 10))).unwrap_err();
        assert_eq!(e, ShapeMismatchError::GradientRows([3, 10]));
    }

    #[test]
    fn test_gradient_b0_mask_and_select() {
        let g = table(8);
        let mask = g.b0_mask(50.0);
        assert_eq!(
            mask,
            vec![true, false, false, false, true, false, false, false]
        );

        let sub = g.select(&[1, 5]).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.column(1).unwrap(), [1.0, 5.0, 0.0, 1000.0]);
        assert!(g.select(&[8]).is_err());

        let rest = g.without(0).unwrap();
        assert_eq!(rest.len(), 7);
        assert_eq!(rest.column(0).unwrap(), g.column(1).unwrap());
        assert!(g.without(8).is_err());
    }

    #[test]
    fn test_gradient_normalized() {
        let g = table(4).normalized();
        let norms = g.norms();
        assert_eq!(norms[0], 0.0);
        for n in norms.iter().skip(1) {
            assert!((n - 1.0).abs() < 1e-6);
        }
        assert_eq!(g.bvals()[1], 1000.0);
    }

    #[test]
    fn test_gradient_length_mismatch() {
        let e = GradientTable::from_bvals_bvecs(&[0.0, 1000.0], &[[0.0; 3]]).unwrap_err();
        assert!(matches!(
            e,
            GradientError::LengthMismatch { bvals: 2, bvecs: 1 }
        ));
    }

    #[test]
    fn test_gradient_text_files() {
        let dir = tempfile::tempdir().unwrap();

        let bval = dir.path().join("dwi.bval");
        let bvec = dir.path().join("dwi.bvec");
        fs::write(&bval, "0 1000 1000 2000\n").unwrap();
        fs::write(&bvec, "0 1 0 0\n0 0 1 0\n0 0 0 1\n").unwrap();
        let fsl = GradientTable::read_fsl(&bval, &bvec).unwrap();
        assert_eq!(fsl.len(), 4);
        assert_eq!(fsl.column(3).unwrap(), [0.0, 0.0, 1.0, 2000.0]);

        // N×3 布局.
        fs::write(&bvec, "0 0 0\n1 0 0\n0 1 0\n0 0 1\n").unwrap();
        assert_eq!(GradientTable::read_fsl(&bval, &bvec).unwrap(), fsl);

        let rasb = dir.path().join("dwi.b");
        fsl.write_rasb(&rasb).unwrap();
        assert_eq!(GradientTable::read_rasb(&rasb).unwrap(), fsl);

        fs::write(&rasb, "# comment\n0 0 0 0\n1 0 0\n").unwrap();
        assert!(matches!(
            GradientTable::read_rasb(&rasb).unwrap_err(),
            GradientError::Columns { line: 3, expected: 4, found: 3 }
        ));

        fs::write(&bval, "0 abc\n").unwrap();
        assert!(matches!(
            GradientTable::read_fsl(&bval, &bvec).unwrap_err(),
            GradientError::BadToken { line: 1, .. }
        ));
    }
}
