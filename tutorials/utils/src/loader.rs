//! 对 `dwi-berry::dataset` 的更一层封装. 提供更直接的数据集加载器.

use dwi_berry::consts::DEFAULT_B0_THRESHOLD;
use dwi_berry::{DiffusionDataset, DwiFiles, LoadError};
use std::env;
use std::path::{Path, PathBuf};

/// 默认的采集文件名前缀.
pub const DEFAULT_STEM: &str = "sub-01_dwi";

/// 获取 dMRI 数据基本路径.
///
/// 1. 若环境变量 `$DWI_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/dwi`.
pub fn data_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("DWI_DATA_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => dwi_berry::dataset::home_dataset_dir_with(["dwi"]),
    }
}

/// 获取结果输出路径.
///
/// 1. 若环境变量 `$DWI_OUTPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `{data_dir}/derivatives`.
pub fn output_dir_from_env_or<P: AsRef<Path>>(data_dir: P) -> PathBuf {
    match env::var("DWI_OUTPUT_DIR") {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => data_dir.as_ref().join("derivatives"),
    }
}

/// 获取采集文件名前缀. `$DWI_STEM` 非空时使用其值, 否则为 [`DEFAULT_STEM`].
pub fn stem_from_env() -> String {
    match env::var("DWI_STEM") {
        Ok(s) if !s.is_empty() => s,
        _ => DEFAULT_STEM.to_string(),
    }
}

/// 从 `dir` 加载名为 `stem` 的数据集.
///
/// 若存在已持久化的 `{stem}.npz` 则直接加载, 否则由 NIfTI 与梯度文件组装.
pub fn load_dataset<P: AsRef<Path>>(dir: P, stem: &str) -> Result<DiffusionDataset, LoadError> {
    let dir = dir.as_ref();
    let npz = dir.join(format!("{stem}.npz"));
    if npz.is_file() {
        log::info!("loading persisted dataset {}", npz.display());
        DiffusionDataset::from_filename(npz)
    } else {
        let files = DwiFiles::from_stem(dir, stem);
        log::info!("assembling dataset from {:?}", files);
        DiffusionDataset::load(&files, DEFAULT_B0_THRESHOLD)
    }
}
