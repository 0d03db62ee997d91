use crate::error::Result;

/// Reductions across cooperating ranks under domain decomposition.
///
/// Both operations leave the reduced values on every rank (reduce followed by
/// broadcast). Ranks hold no shared memory; everything crosses through here.
pub trait Collective {
    fn rank(&self) -> u32;
    fn size(&self) -> u32;
    fn all_reduce_max(&self, values: &mut [f64]) -> Result<()>;
    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()>;
}

/// The only rank of a serial run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn rank(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    fn all_reduce_max(&self, _values: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) -> Result<()> {
        Ok(())
    }
}
