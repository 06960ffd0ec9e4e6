use crate::Result;

/// A collective sum over every node of a training group.
///
/// All nodes must call `all_reduce_sum` the same number of times with buffers of
/// the same length. A failure at any node is reported as an error, the call is
/// never retried.
pub trait AllReduce: Send {
    /// Replaces `buf` with the element wise sum of every node's `buf`.
    fn all_reduce_sum(&mut self, buf: &mut [f32]) -> Result<()>;

    /// The amount of nodes in the group.
    fn total(&self) -> usize;

    /// This node's position in the group.
    fn node(&self) -> usize;
}
