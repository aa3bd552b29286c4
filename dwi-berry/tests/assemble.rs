//! 由 NIfTI 与梯度文件组装数据集.

use dwi_berry::consts::DEFAULT_B0_THRESHOLD;
use dwi_berry::nifti_io;
use dwi_berry::{
    Affine, DiffusionDataset, DwiFiles, IndexOutOfRange, LoadError, MosaicError, MosaicOptions,
};
use ndarray::{Array3, Array4};
use std::fs;
use std::path::Path;

/// 8 个样本: 第 0, 4 个为 b=0 (值 100 / 300), 其余为 DW (值等于样本号).
fn write_acquisition(dir: &Path) -> DwiFiles {
    let data = Array4::from_shape_fn((5, 4, 3, 8), |(_, _, _, s)| match s {
        0 => 100.0,
        4 => 300.0,
        s => s as f32,
    });
    let affine = Affine::from_scaling([2.0, 2.0, 2.0], [-5.0, -4.0, -3.0]);
    let dwi = dir.join("sub-01_dwi.nii");
    nifti_io::write_volume(&dwi, &data, &affine).unwrap();

    fs::write(
        dir.join("sub-01_dwi.bval"),
        "0 1000 1000 1000 5 2000 2000 2000\n",
    )
    .unwrap();
    fs::write(
        dir.join("sub-01_dwi.bvec"),
        "0 1 0 0 0 1 0 0\n0 0 1 0 0 0 1 0\n0 0 0 1 0 0 0 1\n",
    )
    .unwrap();
    DwiFiles::from_stem(dir, "sub-01_dwi")
}

#[test]
fn test_load_splits_b0() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_acquisition(dir.path());
    assert!(files.bvals.is_some() && files.bvecs.is_some());

    let ds = DiffusionDataset::load(&files, DEFAULT_B0_THRESHOLD).unwrap();
    assert_eq!(ds.sample_count(), 6);
    assert_eq!(ds.spatial_shape(), [5, 4, 3]);
    assert!(ds.gradients().bvals().iter().all(|b| *b >= 1000.0));

    // DW 样本保持原顺序.
    let first: Vec<f32> = (0..6).map(|i| ds.volume(i).unwrap()[(0, 0, 0)]).collect();
    assert_eq!(first, vec![1.0, 2.0, 3.0, 5.0, 6.0, 7.0]);

    // 参考图为两个 b=0 体的中位数.
    let bzero = ds.bzero().unwrap();
    assert!(bzero.iter().all(|v| (v - 200.0).abs() < 1e-4));

    let [sx, sy, sz] = ds.voxel_sizes();
    assert!((sx - 2.0).abs() < 1e-6 && (sy - 2.0).abs() < 1e-6 && (sz - 2.0).abs() < 1e-6);

    let img = ds.plot_mosaic(None, &MosaicOptions::default()).unwrap();
    assert_eq!(img.dimensions(), (15, 4));
}

#[test]
fn test_load_with_mask_and_rasb() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_acquisition(dir.path());
    let ds = DiffusionDataset::load(&files, DEFAULT_B0_THRESHOLD).unwrap();

    // RAS+B 文件优先于 FSL 文件对.
    let rasb = dir.path().join("dw_only.b");
    ds.write_gradients(&rasb).unwrap();
    let mask_path = dir.path().join("mask.nii");
    let mask = Array3::from_shape_fn((5, 4, 3), |(i, _, _)| i < 2);
    nifti_io::write_mask(&mask_path, &mask, ds.affine()).unwrap();

    let dw_only = dir.path().join("dw_only.nii");
    ds.to_nifti(&dw_only).unwrap();

    let files = DwiFiles::new(&dw_only)
        .with_fsl(files.bvals.unwrap(), files.bvecs.unwrap())
        .with_rasb(&rasb)
        .with_brainmask(&mask_path);
    let again = DiffusionDataset::load(&files, DEFAULT_B0_THRESHOLD).unwrap();
    assert_eq!(again.sample_count(), 6);
    assert!(again.bzero().is_none());
    assert_eq!(again.masked_voxels(), Some(2 * 4 * 3));
    assert_eq!(again.brainmask().unwrap(), mask.view());
}

#[test]
fn test_load_without_dw_samples() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_acquisition(dir.path());
    let rasb = dir.path().join("all_b0.b");
    fs::write(&rasb, "0 0 0 0\n".repeat(8)).unwrap();

    let ds = DiffusionDataset::load(&files.with_rasb(&rasb), DEFAULT_B0_THRESHOLD).unwrap();
    assert_eq!(ds.sample_count(), 0);
    assert_eq!(ds.shape(), (5, 4, 3, 0));
    assert!(ds.gradients().is_empty());

    // 参考图取全部 8 个体的中位数: [1, 2, 3, 5, 6, 7, 100, 300] -> 5.5.
    let bzero = ds.bzero().unwrap();
    assert!(bzero.iter().all(|v| (v - 5.5).abs() < 1e-4));

    let opts = MosaicOptions::default();
    assert_eq!(ds.plot_mosaic(None, &opts).unwrap().dimensions(), (15, 4));
    assert!(matches!(
        ds.plot_mosaic(Some(0), &opts).unwrap_err(),
        MosaicError::IndexOutOfRange(IndexOutOfRange { index: 0, len: 0 })
    ));
    assert!(ds.logo_split(0).is_err());
}

#[test]
fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_acquisition(dir.path());

    let no_gradients = DwiFiles::new(&files.dwi);
    assert!(matches!(
        DiffusionDataset::load(&no_gradients, DEFAULT_B0_THRESHOLD).unwrap_err(),
        LoadError::MissingField("gradients")
    ));

    let short = dir.path().join("short.b");
    fs::write(&short, "0 0 0 0\n1 0 0 1000\n").unwrap();
    assert!(matches!(
        DiffusionDataset::load(&files.clone().with_rasb(&short), DEFAULT_B0_THRESHOLD)
            .unwrap_err(),
        LoadError::Shape(_)
    ));

    let missing = DwiFiles::new(dir.path().join("missing.nii")).with_rasb(&short);
    assert!(DiffusionDataset::load(&missing, DEFAULT_B0_THRESHOLD).is_err());
}
