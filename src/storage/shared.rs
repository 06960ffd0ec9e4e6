/// Counters and accumulators shared by every example of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedData {
    pub t: f64,
    pub sum_loss: f64,
    pub sum_loss_since_last_dump: f64,
    pub dump_interval: f32,
    pub min_label: f32,
    pub max_label: f32,
    pub weighted_examples: f64,
    pub weighted_labels: f64,
    pub weighted_unlabeled_examples: f64,
    pub weighted_holdout_examples: f64,
    pub weighted_holdout_examples_since_last_pass: f64,
    pub holdout_sum_loss: f64,
    pub holdout_sum_loss_since_last_pass: f64,
    pub holdout_best_loss: f32,
    pub holdout_best_pass: usize,
    pub example_number: u64,
    pub total_features: u64,
    pub normalized_sum_norm_x: f32,
    /// Pending soft threshold of every weight from L1 regularization.
    pub gravity: f64,
    /// Pending multiplicative shrink of every weight from L2 regularization.
    pub contraction: f64,
}

impl Default for SharedData {
    fn default() -> Self {
        Self {
            t: 0.,
            sum_loss: 0.,
            sum_loss_since_last_dump: 0.,
            dump_interval: 1.,
            min_label: 0.,
            max_label: 1.,
            weighted_examples: 0.,
            weighted_labels: 0.,
            weighted_unlabeled_examples: 0.,
            weighted_holdout_examples: 0.,
            weighted_holdout_examples_since_last_pass: 0.,
            holdout_sum_loss: 0.,
            holdout_sum_loss_since_last_pass: 0.,
            holdout_best_loss: f32::MAX,
            holdout_best_pass: 0,
            example_number: 0,
            total_features: 0,
            normalized_sum_norm_x: 0.,
            gravity: 0.,
            contraction: 1.,
        }
    }
}

impl SharedData {
    /// Widens the label range to include `label`.
    pub fn set_minmax(&mut self, label: f32) {
        self.min_label = self.min_label.min(label);
        self.max_label = self.max_label.max(label);
    }

    /// Bounds a prediction by the label range. An inverted range never panics:
    /// the maximum is checked first.
    pub fn bound_prediction(&self, prediction: f32) -> f32 {
        if prediction > self.max_label {
            self.max_label
        } else if prediction < self.min_label {
            self.min_label
        } else {
            prediction
        }
    }

    /// Clears the counters a model loaded for evaluation must not inherit.
    pub fn reset_counters(&mut self) {
        self.sum_loss = 0.;
        self.sum_loss_since_last_dump = 0.;
        self.dump_interval = 1.;
        self.weighted_examples = 0.;
        self.weighted_labels = 0.;
        self.weighted_unlabeled_examples = 0.;
        self.example_number = 0;
        self.total_features = 0;
    }

    /// The mean loss over the non holdout examples seen so far.
    pub fn average_loss(&self) -> f64 {
        if self.weighted_examples > 0. {
            self.sum_loss / self.weighted_examples
        } else {
            0.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minmax_only_widens() {
        let mut sd = SharedData::default();

        sd.set_minmax(0.5);
        assert_eq!((sd.min_label, sd.max_label), (0., 1.));

        sd.set_minmax(-3.);
        sd.set_minmax(7.);
        assert_eq!((sd.min_label, sd.max_label), (-3., 7.));
    }

    #[test]
    fn bounding_tolerates_an_inverted_range() {
        let sd = SharedData {
            min_label: 2.,
            max_label: 1.,
            ..SharedData::default()
        };

        assert_eq!(sd.bound_prediction(5.), 1.);
        assert_eq!(sd.bound_prediction(0.), 2.);
        assert_eq!(sd.bound_prediction(1.5), 2.);
    }
}
