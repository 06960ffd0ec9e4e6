use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use super::AllReduce;
use crate::{GdErr, Result};

struct Shared {
    barrier: Barrier,
    contributions: Mutex<Vec<Vec<f32>>>,
}

/// An in process all-reduce group, one member per thread.
///
/// Every member sums the contributions in node order, so all members observe
/// bit identical results.
pub struct LocalGroup {
    node: usize,
    total: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Creates every member of a new group.
    ///
    /// # Arguments
    /// * `total` - The amount of members.
    pub fn new_group(total: usize) -> Vec<Self> {
        let shared = Arc::new(Shared {
            barrier: Barrier::new(total),
            contributions: Mutex::new(vec![Vec::new(); total]),
        });

        (0..total)
            .map(|node| Self {
                node,
                total,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl AllReduce for LocalGroup {
    fn all_reduce_sum(&mut self, buf: &mut [f32]) -> Result<()> {
        {
            let mut contributions = self.shared.contributions.lock();
            contributions[self.node].clear();
            contributions[self.node].extend_from_slice(buf);
        }

        self.shared.barrier.wait();

        let result = {
            let contributions = self.shared.contributions.lock();
            let mismatch = contributions.iter().find(|c| c.len() != buf.len());

            match mismatch {
                Some(c) => Err(GdErr::SizeMismatch {
                    what: "all-reduce contribution",
                    got: c.len(),
                    expected: buf.len(),
                }),
                None => {
                    buf.fill(0.);
                    for contribution in contributions.iter() {
                        buf.iter_mut()
                            .zip(contribution)
                            .for_each(|(b, c)| *b += c);
                    }
                    Ok(())
                }
            }
        };

        // Nobody may overwrite its contribution before everyone has read.
        self.shared.barrier.wait();
        result
    }

    fn total(&self) -> usize {
        self.total
    }

    fn node(&self) -> usize {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn every_member_sees_the_sum() {
        const NODES: usize = 4;

        let handles: Vec<_> = LocalGroup::new_group(NODES)
            .into_iter()
            .map(|mut member| {
                thread::spawn(move || {
                    let node = member.node() as f32;
                    let mut first = [node, 1.];
                    member.all_reduce_sum(&mut first).unwrap();

                    let mut second = [node * node];
                    member.all_reduce_sum(&mut second).unwrap();
                    (first, second)
                })
            })
            .collect();

        for handle in handles {
            let (first, second) = handle.join().unwrap();
            assert_eq!(first, [6., 4.]);
            assert_eq!(second, [14.]);
        }
    }

    #[test]
    fn mismatched_lengths_fail_everywhere() {
        let handles: Vec<_> = LocalGroup::new_group(2)
            .into_iter()
            .map(|mut member| {
                thread::spawn(move || {
                    let mut buf = vec![1.; 1 + member.node()];
                    member.all_reduce_sum(&mut buf)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_err());
        }
    }
}
