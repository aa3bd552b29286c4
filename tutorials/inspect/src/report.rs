//! 检查结果.

use dwi_berry::consts::DEFAULT_B0_THRESHOLD;
use dwi_berry::DiffusionDataset;
use std::io::{self, Write};
use std::path::PathBuf;

/// 一次检查的概览信息与输出文件.
pub struct InspectReport {
    stem: String,
    shape: (usize, usize, usize, usize),
    voxel_sizes: [f64; 3],
    bvals: Vec<f32>,
    masked_voxels: Option<usize>,
    has_bzero: bool,
    em_affines: usize,
    outputs: Vec<PathBuf>,
}

impl InspectReport {
    pub fn new(stem: &str, ds: &DiffusionDataset) -> Self {
        Self {
            stem: stem.to_string(),
            shape: ds.shape(),
            voxel_sizes: ds.voxel_sizes(),
            bvals: shells(ds.gradients().bvals().iter().copied()),
            masked_voxels: ds.masked_voxels(),
            has_bzero: ds.bzero().is_some(),
            em_affines: ds.em_affines().len(),
            outputs: Vec::new(),
        }
    }

    /// 记录一个输出文件.
    pub fn push_output(&mut self, p: PathBuf) {
        self.outputs.push(p);
    }

    /// 将概览写进 `w` 中.
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        let (i, j, k, n) = self.shape;
        let [sx, sy, sz] = self.voxel_sizes;
        writeln!(w, "Dataset `{}`:", self.stem)?;
        writeln!(w, "{S4}Grid: {i} x {j} x {k} voxels")?;
        writeln!(w, "{S4}Voxel size: {sx:.2} x {sy:.2} x {sz:.2} mm")?;
        writeln!(w, "{S4}DW samples: {n}")?;
        writeln!(w, "{S4}Shells: {:?}", self.bvals)?;
        match self.masked_voxels {
            Some(m) => writeln!(w, "{S4}Brain voxels: {m}")?,
            None => writeln!(w, "{S4}Brain voxels: /")?,
        }
        writeln!(w, "{S4}b=0 reference: {}", if self.has_bzero { "yes" } else { "/" })?;
        writeln!(w, "{S4}Motion transforms: {}", self.em_affines)?;
        write!(w, "{S4}Outputs:")?;
        for p in &self.outputs {
            write!(w, "\n{S4}{S4}{}", p.display())?;
        }
        Ok(())
    }

    /// 打印检查结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);
        match self.describe_into(&mut buf) {
            Ok(()) => println!("{}", String::from_utf8_lossy(&buf)),
            Err(e) => log::error!("cannot format report: {e}"),
        }
        utils::sep();
    }
}

/// 将 b 值按 b=0 阈值取整并去重, 得到各壳层的 b 值.
fn shells<I: IntoIterator<Item = f32>>(bvals: I) -> Vec<f32> {
    let mut ans: Vec<f32> = bvals
        .into_iter()
        .map(|b| (b / DEFAULT_B0_THRESHOLD).round() * DEFAULT_B0_THRESHOLD)
        .collect();
    ans.sort_by(f32::total_cmp);
    ans.dedup();
    ans
}

#[cfg(test)]
mod tests {
    use super::shells;
    use dwi_berry::consts::DEFAULT_B0_THRESHOLD;

    #[test]
    fn test_shells() {
        let bvals = [995.0, 1005.0, 2010.0, 1000.0, 1990.0, 3000.0];
        assert_eq!(shells(bvals), vec![1000.0, 2000.0, 3000.0]);
        assert!(shells(Vec::new()).is_empty());

        // 取整步长跟随阈值.
        let t = DEFAULT_B0_THRESHOLD;
        assert_eq!(shells([20.0 * t + 0.4 * t]), vec![20.0 * t]);
    }
}
