//! 强度窗口. 将任意实数强度线性映射为 8-bit 灰度值.

use ordered_float::OrderedFloat;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::slice::ParallelSliceMut;
    }
}

/// 强度窗口, 包含下限和上限.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    lower: f32,
    upper: f32,
}

impl IntensityWindow {
    /// 构建强度窗.
    ///
    /// `lower` 和 `upper` 必须有限且 `lower < upper`, 否则返回 `None`.
    pub fn new(lower: f32, upper: f32) -> Option<IntensityWindow> {
        if lower.is_finite() && upper.is_finite() && lower < upper {
            Some(Self { lower, upper })
        } else {
            None
        }
    }

    /// 由 `values` 的百分位数构建窗口. `lo`, `hi` 以百分比给出, 如 `(0.5, 99.5)`.
    ///
    /// 非有限值会被忽略. 若没有有限值, 或百分位参数不满足 `0 <= lo < hi <= 100`,
    /// 则返回 `None`. 若数据是常数, 窗口上限会被抬高 (至少 1.0, 并随量级放大),
    /// 使常数映射为黑色.
    pub fn from_percentiles<'a, I>(values: I, lo: f64, hi: f64) -> Option<IntensityWindow>
    where
        I: IntoIterator<Item = &'a f32>,
    {
        if !(0.0..100.0).contains(&lo) || !(lo < hi && hi <= 100.0) {
            return None;
        }
        let mut sorted: Vec<OrderedFloat<f32>> = values
            .into_iter()
            .filter(|v| v.is_finite())
            .map(|v| OrderedFloat(*v))
            .collect();
        if sorted.is_empty() {
            return None;
        }
        #[cfg(feature = "rayon")]
        sorted.par_sort_unstable();
        #[cfg(not(feature = "rayon"))]
        sorted.sort_unstable();

        let lower = percentile_sorted(&sorted, lo);
        let upper = percentile_sorted(&sorted, hi);
        if upper > lower {
            Self::new(lower, upper)
        } else {
            Self::new(lower, widen(lower))
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.lower
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.upper
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.upper - self.lower
    }

    /// 求在当前窗口设置下, 强度 `v` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        // 255, not 256.
        self.eval_f32(v).map(|g| g as u8)
    }

    /// 求在当前窗口设置下, 强度 `v` 对应的灰度图像素分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, v: f32) -> Option<f32> {
        if !v.is_finite() {
            return None;
        }
        let clamped = num::clamp(v, self.lower, self.upper);
        Some((clamped - self.lower) / self.width() * 255.0)
    }
}

/// 常数窗口的上限. 大量级时 `+ 1.0` 会被舍入吸收, 因此按相对精度放大步长.
fn widen(v: f32) -> f32 {
    let step = (v.abs() * f32::EPSILON * 2.0).max(1.0);
    v + step
}

/// 线性插值的百分位数. `sorted` 非空且升序.
fn percentile_sorted(sorted: &[OrderedFloat<f32>], q: f64) -> f32 {
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let (below, above) = (pos.floor() as usize, pos.ceil() as usize);
    let frac = (pos - below as f64) as f32;
    let (a, b) = (sorted[below].0, sorted[above].0);
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use crate::IntensityWindow;

    fn is_valid_init(lower: f32, upper: f32) -> bool {
        IntensityWindow::new(lower, upper).is_some()
    }

    #[test]
    fn test_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
        assert!(!is_valid_init(f32::NEG_INFINITY, 0.0));
        assert!(!is_valid_init(0.0, f32::NAN));
    }

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_window_generic() {
        // [60, 100]
        let win = IntensityWindow::new(60.0, 100.0).unwrap();
        assert_eq!(win.eval(f32::NAN), None);
        assert_eq!(win.eval(f32::MIN), Some(0));
        assert_eq!(win.eval(f32::MAX), Some(255));

        assert_eq!(win.eval(50.0), Some(0));
        assert!(float_eq(win.eval_f32(60.0).unwrap(), 0.0));

        assert_eq!(win.eval(70.0).unwrap(), (255.0 * 0.25) as u8);
        assert!(float_eq(win.eval_f32(80.0).unwrap(), 255.0 * 0.5));

        // boundary
        assert_eq!(win.eval(99.999), Some(254));
        assert_eq!(win.eval(100.0).unwrap(), u8::MAX);
    }

    #[test]
    fn test_window_percentiles() {
        let values: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        let win = IntensityWindow::from_percentiles(&values, 0.0, 100.0).unwrap();
        assert!(float_eq(win.lower_bound(), 0.0));
        assert!(float_eq(win.upper_bound(), 100.0));

        let win = IntensityWindow::from_percentiles(&values, 10.0, 90.0).unwrap();
        assert!(float_eq(win.lower_bound(), 10.0));
        assert!(float_eq(win.upper_bound(), 90.0));

        // 非有限值被忽略.
        let values = [f32::NAN, 1.0, 3.0, f32::INFINITY];
        let win = IntensityWindow::from_percentiles(&values, 0.0, 100.0).unwrap();
        assert!(float_eq(win.lower_bound(), 1.0));
        assert!(float_eq(win.upper_bound(), 3.0));

        // 常数.
        let win = IntensityWindow::from_percentiles(&[5.0, 5.0], 0.5, 99.5).unwrap();
        assert_eq!(win.eval(5.0), Some(0));

        // 大量级常数同样得到有效窗口.
        for v in [3.0e7f32, -3.0e7, 1.0e30] {
            let win = IntensityWindow::from_percentiles(&[v, v, v], 0.5, 99.5).unwrap();
            assert!(win.width() > 0.0);
            assert_eq!(win.eval(v), Some(0));
        }

        assert!(IntensityWindow::from_percentiles(&[f32::NAN], 0.5, 99.5).is_none());
        assert!(IntensityWindow::from_percentiles(&[1.0, 2.0], 50.0, 50.0).is_none());
    }
}
