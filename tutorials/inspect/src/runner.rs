//! 程序运行函数.

use crate::report::InspectReport;
use dwi_berry::{DiffusionDataset, MosaicOptions};
use std::error::Error;
use std::fs;
use std::path::Path;
use utils::loader;

/// 额外绘制的 DW 样本个数 (均匀分布在所有样本中).
const PREVIEW_SAMPLES: usize = 3;

/// 实际运行.
pub fn run() -> Result<InspectReport, Box<dyn Error>> {
    let data_dir = loader::data_dir_from_env_or_home().ok_or("cannot locate home directory")?;
    let stem = loader::stem_from_env();
    let out_dir = loader::output_dir_from_env_or(&data_dir);
    fs::create_dir_all(&out_dir)?;

    let ds = loader::load_dataset(&data_dir, &stem)?;
    let mut report = InspectReport::new(&stem, &ds);

    let opts = MosaicOptions::default();
    let reference = out_dir.join(format!("{stem}_b0_mosaic.png"));
    ds.save_mosaic(None, &reference, &opts)?;
    report.push_output(reference);

    for index in preview_indices(ds.sample_count()) {
        let path = out_dir.join(format!("{stem}_dw{index:03}_mosaic.png"));
        ds.save_mosaic(Some(index), &path, &opts)?;
        report.push_output(path);
    }

    let archive = out_dir.join(format!("{stem}.npz"));
    persist(&ds, &archive)?;
    report.push_output(archive);

    Ok(report)
}

/// 均匀选取至多 `PREVIEW_SAMPLES` 个样本索引.
fn preview_indices(n: usize) -> Vec<usize> {
    let k = PREVIEW_SAMPLES.min(n);
    (0..k).map(|i| i * n / k).collect()
}

/// 持久化并立即重新加载, 确认归档可用.
fn persist(ds: &DiffusionDataset, path: &Path) -> Result<(), Box<dyn Error>> {
    ds.to_filename(path)?;
    let back = DiffusionDataset::from_filename(path)?;
    if back.shape() != ds.shape() {
        return Err(format!("archive {} does not round-trip", path.display()).into());
    }
    Ok(())
}
