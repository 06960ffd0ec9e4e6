use log::warn;

use super::AllReduce;
use crate::{Result, storage::WeightStore};

/// Replaces slot `offset` of every weight group with its average over the group.
pub fn accumulate_avg(
    group: &mut dyn AllReduce,
    weights: &mut WeightStore,
    offset: usize,
) -> Result<()> {
    let total = group.total() as f32;
    let mut local: Vec<f32> = weights.groups().map(|g| g[offset]).collect();

    group.all_reduce_sum(&mut local)?;

    for (g, sum) in weights.groups_mut().zip(local) {
        g[offset] = sum / total;
    }

    Ok(())
}

/// Averages the learned slots of every weight group, weighting each node by its
/// share of the summed adaptive statistic.
///
/// A feature no node has seen gets a zero weight. Feature mask slots are left
/// untouched.
pub fn accumulate_weighted_avg(group: &mut dyn AllReduce, weights: &mut WeightStore) -> Result<()> {
    let layout = weights.layout();
    let adaptive = layout.adaptive;

    if adaptive == 0 {
        warn!("weighted averaging needs the adaptive statistic, skipping");
        return Ok(());
    }

    let mut totals: Vec<f32> = weights.groups().map(|g| g[adaptive]).collect();
    group.all_reduce_sum(&mut totals)?;

    for (g, total) in weights.groups_mut().zip(&totals) {
        if *total > 0. {
            let ratio = g[adaptive] / total;
            g[0] *= ratio;
            g[adaptive] *= ratio;
            if layout.normalized != 0 {
                g[layout.normalized] *= ratio;
            }
        } else {
            g[0] = 0.;
        }
    }

    let stats = layout.stats();
    let mut local: Vec<f32> = weights
        .groups()
        .flat_map(|g| g[..stats].iter().copied())
        .collect();

    group.all_reduce_sum(&mut local)?;

    for (g, summed) in weights.groups_mut().zip(local.chunks_exact(stats)) {
        g[..stats].copy_from_slice(summed);
    }

    Ok(())
}

/// The average of a scalar over the group.
pub fn accumulate_scalar(group: &mut dyn AllReduce, value: f32) -> Result<f32> {
    let mut buf = [value];
    group.all_reduce_sum(&mut buf)?;
    Ok(buf[0] / group.total() as f32)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{storage::SlotLayout, synchronization::LocalGroup};

    #[test]
    fn plain_average_of_weights() {
        let handles: Vec<_> = LocalGroup::new_group(2)
            .into_iter()
            .map(|mut member| {
                thread::spawn(move || {
                    let mut weights = WeightStore::new(2, SlotLayout::new(false, false, false));
                    weights.group_mut(1)[0] = if member.node() == 0 { 1. } else { 3. };

                    accumulate_avg(&mut member, &mut weights, 0).unwrap();
                    weights.weight(1)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2.);
        }
    }

    #[test]
    fn weighted_average_favors_confident_nodes() {
        let handles: Vec<_> = LocalGroup::new_group(2)
            .into_iter()
            .map(|mut member| {
                thread::spawn(move || {
                    let mut weights = WeightStore::new(2, SlotLayout::new(true, false, false));
                    let (w, g) = if member.node() == 0 { (1., 3.) } else { (5., 1.) };
                    weights.group_mut(1)[0] = w;
                    weights.group_mut(1)[1] = g;
                    weights.group_mut(2)[0] = 7.;

                    accumulate_weighted_avg(&mut member, &mut weights).unwrap();
                    (weights.group(1).to_vec(), weights.weight(2))
                })
            })
            .collect();

        for handle in handles {
            let (group, unseen) = handle.join().unwrap();
            assert_eq!(group[0], 1. * 0.75 + 5. * 0.25);
            assert_eq!(group[1], 3. * 0.75 + 1. * 0.25);
            assert_eq!(unseen, 0.);
        }
    }

    #[test]
    fn scalar_average() {
        let handles: Vec<_> = LocalGroup::new_group(3)
            .into_iter()
            .map(|mut member| {
                thread::spawn(move || {
                    let value = member.node() as f32;
                    accumulate_scalar(&mut member, value).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1.);
        }
    }
}
