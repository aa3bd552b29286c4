#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供扩散加权磁共振 (dMRI) 数据集的结构化容器, 以及围绕该容器的
//! 加载、持久化与可视化功能.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 只负责 **数据组织**. 配准、脑提取、梯度旋转、模型拟合等数值方法
//!   不在本 crate 范围内, 应交给外部工具完成, 其结果 (如运动校正仿射变换)
//!   再回填到容器中.
//! 2. 所有体数据均按 NIfTI 原生轴序 `(i, j, k[, n])` 存储, 不做转置.
//! 3. 非期望输入不会 panic, 而是以 `Result::Err` 返回给调用者.
//!
//! # 功能清单
//!
//! ### dMRI 数据集容器 ✅
//!
//! 聚合 DW 数据、脑掩膜、b=0 参考图、RAS+B 梯度表和逐样本运动校正仿射变换,
//! 并在构造时校验形状一致性.
//!
//! 实现位于 `dwi-berry/src/dataset`.
//!
//! ### 梯度表 ✅
//!
//! RAS+B 布局, 支持 MRtrix 风格 `.b` 文本和 FSL `bval`/`bvec` 文件对.
//!
//! 实现位于 `dwi-berry/src/gradients.rs`.
//!
//! ### 持久化 ✅
//!
//! 以 NumPy `.npz` 归档保存和加载完整容器. 字段名见 [`consts::fields`].
//!
//! ### 马赛克可视化 ✅
//!
//! 将 3D 体按轴向切片平铺为单张灰度图, 强度经百分位窗口归一化.
//!
//! 实现位于 `dwi-berry/src/mosaic.rs` 与 `dwi-berry/src/window.rs`.

/// 三维索引 `(i, j, k)`.
pub type Idx3d = (usize, usize, usize);

/// 四维形状 `(i, j, k, n)`.
pub type Shape4d = (usize, usize, usize, usize);

pub mod affine;
pub mod consts;
pub mod dataset;
pub mod error;
pub mod gradients;
pub mod mosaic;
pub mod nifti_io;
pub mod window;

pub use affine::Affine;
pub use dataset::{DiffusionDataset, DwiFiles, LogoTest, LogoTrain};
pub use error::{
    GradientError, IndexOutOfRange, LoadError, MosaicError, SaveError, ShapeMismatchError,
};
pub use gradients::GradientTable;
pub use mosaic::MosaicOptions;
pub use window::IntensityWindow;

pub mod prelude;
