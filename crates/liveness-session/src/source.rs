//! Frame sample sources

use liveness::FrameSample;

/// Producer of one sample per tick (camera + landmark detector)
pub trait FrameSource {
    /// Next sample, or `None` once the source is torn down
    fn next_sample(&mut self) -> Option<FrameSample>;
}

impl<I> FrameSource for I
where
    I: Iterator<Item = FrameSample>,
{
    fn next_sample(&mut self) -> Option<FrameSample> {
        self.next()
    }
}
