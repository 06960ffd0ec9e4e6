use std::{
    fs::{self, File},
    io::{BufRead, BufWriter, Write},
    path::Path,
};

use log::info;

use super::ModelIo;
use crate::{
    GdErr, Result, context::TrainingContext, initialization::initialize_regressor,
    optimization::sync_weights,
};

const MAX_STATS: usize = 3;

/// Reads or writes the whole model: the resume flag, then either the plain
/// regressor or the resumable online state.
///
/// Reading first brings the table back to its initial state. Writing first
/// folds any pending regularization into the weights.
pub fn save_load(ctx: &mut TrainingContext, io: &mut ModelIo<'_>) -> Result<()> {
    if io.is_read() {
        initialize_regressor(ctx)?;
    } else {
        sync_weights(ctx);
    }

    let mut resume = ctx.cfg.save_resume;
    io.rw_resume_flag(&mut resume)?;

    if resume {
        save_load_online_state(ctx, io)
    } else {
        save_load_regressor(ctx, io)
    }
}

fn checked_index(ctx: &TrainingContext, index: u32) -> Result<u32> {
    let length = ctx.weights.len();

    if index as usize >= length {
        return Err(GdErr::IndexOutOfRange { index, length });
    }

    Ok(index)
}

/// Every non zero weight as `(index, weight)`.
fn save_load_regressor(ctx: &mut TrainingContext, io: &mut ModelIo<'_>) -> Result<()> {
    if io.is_read() {
        let mut slot = [0.];
        while let Some(index) = io.read_entry(&mut slot)? {
            let index = checked_index(ctx, index)?;
            ctx.weights.group_mut(index)[0] = slot[0];
        }
        return Ok(());
    }

    for (index, group) in ctx.weights.groups().enumerate() {
        if group[0] != 0. {
            io.write_entry(index as u32, &group[..1])?;
        }
    }

    Ok(())
}

/// The shared counters followed by every entry with a non zero weight together
/// with its adaptive and normalized statistics.
fn save_load_online_state(ctx: &mut TrainingContext, io: &mut ModelIo<'_>) -> Result<()> {
    let sd = &mut ctx.sd;

    io.rw_f32("initial_t", &mut ctx.initial_t)?;
    io.rw_f32("norm normalizer", &mut sd.normalized_sum_norm_x)?;
    io.rw_f64("t", &mut sd.t)?;
    io.rw_f64("sum_loss", &mut sd.sum_loss)?;
    io.rw_f64("sum_loss_since_last_dump", &mut sd.sum_loss_since_last_dump)?;
    io.rw_f32("dump_interval", &mut sd.dump_interval)?;
    io.rw_f32("min_label", &mut sd.min_label)?;
    io.rw_f32("max_label", &mut sd.max_label)?;
    io.rw_f64("weighted_examples", &mut sd.weighted_examples)?;
    io.rw_f64("weighted_labels", &mut sd.weighted_labels)?;
    io.rw_f64("weighted_unlabeled_examples", &mut sd.weighted_unlabeled_examples)?;
    io.rw_u64("example_number", &mut sd.example_number)?;
    io.rw_u64("total_features", &mut sd.total_features)?;

    let training = ctx.cfg.training;
    if io.is_read() && !training {
        sd.reset_counters();
    }

    let stats = ctx.weights.layout().stats();

    if io.is_read() {
        let mut buf = [0.; MAX_STATS];
        while let Some(index) = io.read_entry(&mut buf[..stats])? {
            let index = checked_index(ctx, index)?;
            let group = ctx.weights.group_mut(index);
            group[..stats].copy_from_slice(&buf[..stats]);

            if !training {
                group[1..stats].fill(0.);
            }
        }
        return Ok(());
    }

    for (index, group) in ctx.weights.groups().enumerate() {
        if group[0] != 0. {
            io.write_entry(index as u32, &group[..stats])?;
        }
    }

    Ok(())
}

/// Writes the human readable model: one `name:weight` line per feature name
/// collected while auditing whose weight is non zero.
pub fn save_inverted(ctx: &mut TrainingContext, tx: &mut dyn Write) -> Result<()> {
    sync_weights(ctx);
    let mut io = ModelIo::writer(tx, true);

    for (name, &index) in &ctx.name_index_map {
        let weight = ctx.weights.weight(index);
        if weight != 0. {
            io.write_named(name, weight)?;
        }
    }

    Ok(())
}

/// Loads a model and marks exactly its non zero weights as trainable. The
/// weights themselves are discarded.
pub fn load_feature_mask(ctx: &mut TrainingContext, rx: &mut dyn BufRead, text: bool) -> Result<()> {
    let mask = ctx.weights.layout().feature_mask;
    if mask == 0 {
        return Err(GdErr::InvalidConfig(
            "a feature mask needs a weight table with a mask slot".to_string(),
        ));
    }

    let mut io = ModelIo::reader(rx, text);
    save_load(ctx, &mut io)?;

    for group in ctx.weights.groups_mut() {
        group[mask] = if group[0] != 0. { 1. } else { 0. };
    }

    initialize_regressor(ctx)
}

/// Writes the model to `path`, going through a temporary file so a reader never
/// observes a partial model.
pub fn dump_regressor(ctx: &mut TrainingContext, path: &Path, text: bool) -> Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".writing");

    {
        let mut tx = BufWriter::new(File::create(&staging)?);
        let mut io = ModelIo::writer(&mut tx, text);
        save_load(ctx, &mut io)?;
        tx.flush()?;
    }

    fs::rename(&staging, path)?;
    info!(path:? = path; "model written");
    Ok(())
}

/// Writes the inverted hash model to `path`.
pub fn dump_inverted(ctx: &mut TrainingContext, path: &Path) -> Result<()> {
    let mut tx = BufWriter::new(File::create(path)?);
    save_inverted(ctx, &mut tx)?;
    tx.flush()?;
    Ok(())
}
