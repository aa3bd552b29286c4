//! 马赛克可视化: 将 3D 体按轴向切片平铺为一张灰度图, 主要用于目视检查.

use crate::consts::gray::BLACK;
use crate::consts::{DEFAULT_MOSAIC_COLUMNS, DEFAULT_PERCENTILES};
use crate::error::MosaicError;
use crate::window::IntensityWindow;
use image::{GrayImage, Luma};
use ndarray::{ArrayView3, Axis};

/// 马赛克绘制参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MosaicOptions {
    /// 每行平铺的切片数. 为 0 时按 1 处理.
    pub columns: usize,

    /// 强度窗口的 (下百分位, 上百分位).
    pub percentiles: (f64, f64),

    /// 是否垂直翻转每个切片, 使 `j` 轴 (通常为前方) 朝上.
    pub flip_vertical: bool,
}

impl Default for MosaicOptions {
    fn default() -> Self {
        Self {
            columns: DEFAULT_MOSAIC_COLUMNS,
            percentiles: DEFAULT_PERCENTILES,
            flip_vertical: true,
        }
    }
}

impl MosaicOptions {
    /// 以 `columns` 列替换默认值.
    #[inline]
    pub fn with_columns(self, columns: usize) -> Self {
        Self { columns, ..self }
    }
}

/// `n_slices` 个切片在每行 `columns` 个的情况下所需的网格 `(行, 列)`.
pub fn mosaic_grid(n_slices: usize, columns: usize) -> (usize, usize) {
    let cols = columns.max(1).min(n_slices.max(1));
    let rows = n_slices.div_ceil(cols).max(1);
    (rows, cols)
}

/// 将 `volume` 的轴向切片 (`k` 轴) 从左到右、从上到下平铺.
///
/// 每个切片占据 `nj` 行 `ni` 列: `i` 轴为水平方向, `j` 轴为垂直方向.
/// 网格中多余的位置填充黑色. 强度窗口由整个体的百分位数确定, 非有限值绘制为黑色.
pub fn render_mosaic(
    volume: ArrayView3<f32>,
    opts: &MosaicOptions,
) -> Result<GrayImage, MosaicError> {
    let (ni, nj, nk) = volume.dim();
    if volume.is_empty() {
        return Err(MosaicError::Empty);
    }
    let (rows, cols) = mosaic_grid(nk, opts.columns);
    let (lo, hi) = opts.percentiles;
    let window = IntensityWindow::from_percentiles(volume.iter(), lo, hi);
    log::debug!("mosaic {ni}x{nj}x{nk} as {rows}x{cols} tiles, window {window:?}");

    let mut buf = GrayImage::from_pixel((cols * ni) as u32, (rows * nj) as u32, Luma([BLACK]));
    for (k, slice) in volume.axis_iter(Axis(2)).enumerate() {
        let (r, c) = (k / cols, k % cols);
        for ((i, j), &v) in slice.indexed_iter() {
            let j = if opts.flip_vertical { nj - 1 - j } else { j };
            let gray = window.and_then(|w| w.eval(v)).unwrap_or(BLACK);
            buf.put_pixel((c * ni + i) as u32, (r * nj + j) as u32, Luma([gray]));
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::{mosaic_grid, render_mosaic, MosaicOptions};
    use crate::error::MosaicError;
    use ndarray::Array3;

    #[test]
    fn test_mosaic_grid() {
        assert_eq!(mosaic_grid(12, 6), (2, 6));
        assert_eq!(mosaic_grid(13, 6), (3, 6));
        assert_eq!(mosaic_grid(3, 6), (1, 3));
        assert_eq!(mosaic_grid(5, 0), (5, 1));
        assert_eq!(mosaic_grid(0, 6), (1, 1));
    }

    #[test]
    fn test_mosaic_layout() {
        // 每个切片为常数 k, 便于检查平铺位置.
        let vol = Array3::from_shape_fn((4, 3, 5), |(_, _, k)| k as f32);
        let opts = MosaicOptions {
            columns: 2,
            percentiles: (0.0, 100.0),
            flip_vertical: false,
        };
        let img = render_mosaic(vol.view(), &opts).unwrap();
        assert_eq!(img.dimensions(), (8, 9));

        // 第 0 片在左上角, 第 4 片在第 3 行第 1 列.
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(4, 0).0[0], (255.0 * 0.25) as u8);
        assert_eq!(img.get_pixel(0, 6).0[0], 255);
        // 第 3 行第 2 列没有切片.
        assert_eq!(img.get_pixel(7, 8).0[0], 0);
    }

    #[test]
    fn test_mosaic_flip() {
        let vol = Array3::from_shape_fn((2, 2, 1), |(_, j, _)| j as f32);
        let opts = MosaicOptions {
            columns: 1,
            percentiles: (0.0, 100.0),
            flip_vertical: true,
        };
        let img = render_mosaic(vol.view(), &opts).unwrap();
        // j = 1 在上.
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        assert_eq!(img.get_pixel(0, 1).0[0], 0);
    }

    #[test]
    fn test_mosaic_empty() {
        let vol = Array3::<f32>::zeros((0, 4, 4));
        assert!(matches!(
            render_mosaic(vol.view(), &MosaicOptions::default()),
            Err(MosaicError::Empty)
        ));
    }
}
