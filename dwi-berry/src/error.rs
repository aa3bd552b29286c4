//! 错误类型.
//!
//! 所有错误都直接传播给调用者, 库内部不做重试或恢复.

use thiserror::Error;

/// 数据集各属性之间形状或样本数不一致.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeMismatchError {
    /// DW 数据不是四维.
    #[error("diffusion data must be 4-dimensional, found {0} dimensions")]
    NotFourDimensional(usize),

    /// 空间形状与 DW 数据前三维不一致.
    #[error("`{field}` has spatial shape {found:?}, expected {expected:?}")]
    Spatial {
        /// 出错的字段名.
        field: &'static str,
        /// DW 数据的空间形状.
        expected: [usize; 3],
        /// 实际形状.
        found: [usize; 3],
    },

    /// 样本数与 DW 数据最后一维不一致.
    #[error("`{field}` holds {found} samples, expected {expected}")]
    SampleCount {
        /// 出错的字段名.
        field: &'static str,
        /// 期望的样本数.
        expected: usize,
        /// 实际样本数.
        found: usize,
    },

    /// 梯度表形状既不是 `(4, N)` 也不是 `(N, 4)`.
    #[error("gradient table must have 4 rows (RAS+B), found shape {0:?}")]
    GradientRows([usize; 2]),
}

/// 样本索引越界.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sample index {index} out of range for {len} samples")]
pub struct IndexOutOfRange {
    /// 传入的索引.
    pub index: usize,
    /// 样本总数.
    pub len: usize,
}

impl IndexOutOfRange {
    /// 当 `index >= len` 时返回错误.
    #[inline]
    pub fn check(index: usize, len: usize) -> Result<(), Self> {
        if index < len {
            Ok(())
        } else {
            Err(Self { index, len })
        }
    }
}

/// 梯度文本文件解析错误.
#[derive(Error, Debug)]
pub enum GradientError {
    /// 底层 I/O 错误.
    #[error("cannot read gradient file: {0}")]
    Io(#[from] std::io::Error),

    /// 无法解析为浮点数的字段.
    #[error("line {line}: cannot parse `{token}` as a number")]
    BadToken {
        /// 行号, 从 1 开始.
        line: usize,
        /// 原始字段.
        token: String,
    },

    /// 某行的列数不符合预期.
    #[error("line {line}: expected {expected} columns, found {found}")]
    Columns {
        /// 行号, 从 1 开始.
        line: usize,
        /// 期望列数.
        expected: usize,
        /// 实际列数.
        found: usize,
    },

    /// b 值个数与 b 向量个数不一致.
    #[error("{bvals} b-values but {bvecs} b-vectors")]
    LengthMismatch {
        /// b 值个数.
        bvals: usize,
        /// b 向量个数.
        bvecs: usize,
    },

    /// 形状不是 RAS+B.
    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),
}

/// 从持久化文件或 NIfTI 文件构造数据集失败.
#[derive(Error, Debug)]
pub enum LoadError {
    /// 文件不存在或不可读.
    #[error("cannot open dataset file: {0}")]
    Io(#[from] std::io::Error),

    /// `.npz` 归档结构错误.
    #[error("cannot read npz archive: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),

    /// 必需字段缺失.
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    /// 字段存在但布局不兼容.
    #[error("field `{field}` has an incompatible layout: {reason}")]
    BadLayout {
        /// 字段名.
        field: &'static str,
        /// 原因.
        reason: String,
    },

    /// NIfTI 读取错误.
    #[error("cannot read NIfTI file: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 梯度文件错误.
    #[error(transparent)]
    Gradient(#[from] GradientError),

    /// 字段之间形状不一致.
    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),
}

/// 持久化数据集失败.
#[derive(Error, Debug)]
pub enum SaveError {
    /// 底层 I/O 错误.
    #[error("cannot write dataset file: {0}")]
    Io(#[from] std::io::Error),

    /// `.npz` 写入错误.
    #[error("cannot write npz archive: {0}")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    /// NIfTI 写入错误.
    #[error("cannot write NIfTI file: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 梯度文件写入错误.
    #[error(transparent)]
    Gradient(#[from] GradientError),
}

/// 生成马赛克图失败.
#[derive(Error, Debug)]
pub enum MosaicError {
    /// 样本索引越界.
    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),

    /// 体数据为空, 无法绘制.
    #[error("cannot render a mosaic of an empty volume")]
    Empty,

    /// 图像编码或写入错误.
    #[error("cannot write mosaic image: {0}")]
    Image(#[from] image::ImageError),
}
