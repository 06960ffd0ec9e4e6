use crate::{Result, context::TrainingContext, example::Example, persistence::ModelIo};

/// A stage of the learning stack.
///
/// Stages are composed by wrapping: an outer stage owns the stage below it and
/// forwards the calls it does not handle.
pub trait Learner: Send {
    /// Computes `ec.partial_prediction` and the final `ec.label.prediction`.
    fn predict(&mut self, ctx: &mut TrainingContext, ec: &mut Example);

    /// Predicts and, unless the example is held out, updates the weights.
    fn learn(&mut self, ctx: &mut TrainingContext, ec: &mut Example);

    /// Updates the weights from an example that was already predicted.
    fn update(&mut self, ctx: &mut TrainingContext, ec: &mut Example);

    /// Reads or writes the stage's model state.
    fn save_load(&mut self, ctx: &mut TrainingContext, io: &mut ModelIo<'_>) -> Result<()>;

    /// Called once after every pass over the data.
    fn end_pass(&mut self, _ctx: &mut TrainingContext) -> Result<()> {
        Ok(())
    }

    /// Called once when the run is over.
    fn finish(&mut self, _ctx: &mut TrainingContext) {}
}

impl<T: Learner + ?Sized> Learner for Box<T> {
    fn predict(&mut self, ctx: &mut TrainingContext, ec: &mut Example) {
        (**self).predict(ctx, ec)
    }

    fn learn(&mut self, ctx: &mut TrainingContext, ec: &mut Example) {
        (**self).learn(ctx, ec)
    }

    fn update(&mut self, ctx: &mut TrainingContext, ec: &mut Example) {
        (**self).update(ctx, ec)
    }

    fn save_load(&mut self, ctx: &mut TrainingContext, io: &mut ModelIo<'_>) -> Result<()> {
        (**self).save_load(ctx, io)
    }

    fn end_pass(&mut self, ctx: &mut TrainingContext) -> Result<()> {
        (**self).end_pass(ctx)
    }

    fn finish(&mut self, ctx: &mut TrainingContext) {
        (**self).finish(ctx)
    }
}
