//! 通用常量.

/// 默认 b=0 阈值 (s/mm²). b 值不大于该值的样本视为非扩散加权 (b=0) 样本.
pub const DEFAULT_B0_THRESHOLD: f32 = 50.0;

/// 马赛克图默认每行平铺的切片数.
pub const DEFAULT_MOSAIC_COLUMNS: usize = 6;

/// 马赛克图默认强度窗口 (下百分位, 上百分位).
pub const DEFAULT_PERCENTILES: (f64, f64) = (0.5, 99.5);

/// 梯度表行数: 三个方向分量加一个 b 值.
pub const RASB_ROWS: usize = 4;

/// 仿射矩阵判等的默认容差.
pub const AFFINE_TOLERANCE: f64 = 1e-6;

/// `.npz` 归档中各字段的名字.
///
/// 写入时使用不带后缀的名字, `ndarray-npy` 会自动补上 `.npy`;
/// 读取时需要使用 [`fields::npy`] 拼出完整的归档内文件名.
pub mod fields {
    /// 4D 扩散加权数据, 必需.
    pub const DATAOBJ: &str = "dataobj";

    /// 体素到世界坐标的仿射矩阵, 可选 (缺省为单位阵).
    pub const AFFINE: &str = "affine";

    /// 脑掩膜, 以 `u8` 保存, 可选.
    pub const BRAINMASK: &str = "brainmask";

    /// b=0 参考图, 可选.
    pub const BZERO: &str = "bzero";

    /// RAS+B 梯度表, 必需.
    pub const GRADIENTS: &str = "gradients";

    /// 逐样本运动校正仿射变换, `(N, 4, 4)`, 可选.
    pub const EM_AFFINES: &str = "em_affines";

    /// 归档内的数组文件后缀.
    pub const NPY_SUFFIX: &str = ".npy";

    /// 获取字段 `name` 在归档内的文件名.
    #[inline]
    pub fn npy(name: &str) -> String {
        format!("{name}{NPY_SUFFIX}")
    }
}

/// 单通道颜色.
pub mod gray {
    /// 单通道黑色. 马赛克图中空白网格的颜色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;
}
