mod random;

pub use random::RandomWeights;

use crate::{Result, context::TrainingContext, example::CONSTANT};

const RANDOM_BOUND: f32 = 0.05;

/// Brings the weight table to its initial state: base weights at zero or drawn
/// at random, `initial_t` in the adaptive slot and the optional initial bias.
/// Feature mask slots are left untouched.
pub fn initialize_regressor(ctx: &mut TrainingContext) -> Result<()> {
    let layout = ctx.weights.layout();
    let initial_t = ctx.initial_t;

    for group in ctx.weights.groups_mut() {
        group[..layout.stats()].fill(0.);

        if layout.adaptive != 0 && initial_t > 0. {
            group[layout.adaptive] = initial_t;
        }
    }

    if ctx.cfg.random_weights {
        RandomWeights::new(ctx.cfg.seed, RANDOM_BOUND)?.fill(&mut ctx.weights);
    }

    if let Some(constant) = ctx.cfg.initial_constant {
        ctx.weights.group_mut(CONSTANT)[0] = constant;
    }

    Ok(())
}
