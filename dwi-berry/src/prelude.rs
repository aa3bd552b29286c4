//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Shape4d};

pub use crate::affine::Affine;
pub use crate::dataset::{self, home_dataset_dir_with, median_volume, DiffusionDataset, DwiFiles};
pub use crate::gradients::GradientTable;
pub use crate::mosaic::{render_mosaic, MosaicOptions};
pub use crate::window::IntensityWindow;

pub use crate::consts::{DEFAULT_B0_THRESHOLD, DEFAULT_MOSAIC_COLUMNS};
pub use crate::error::{IndexOutOfRange, LoadError, MosaicError, SaveError, ShapeMismatchError};
