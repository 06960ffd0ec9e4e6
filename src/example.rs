/// The raw index of the always-on bias feature.
pub const CONSTANT: u32 = 11_650_396;
/// The namespace the bias feature lives in.
pub const CONSTANT_NAMESPACE: u8 = 128;
/// The default namespace for features that name none.
pub const DEFAULT_NAMESPACE: u8 = b' ';

pub const QUADRATIC_CONSTANT: u32 = 27_942_141;
pub const CUBIC_CONSTANT: u32 = 21_791;
pub const CUBIC_CONSTANT2: u32 = 37_663;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub x: f32,
    pub weight_index: u32,
}

/// The human readable name of a feature, kept only for auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureName {
    pub space: String,
    pub feature: String,
}

/// A group of features sharing a one byte namespace.
///
/// `names` is either empty or holds exactly one name per feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    pub index: u8,
    pub features: Vec<Feature>,
    pub names: Vec<FeatureName>,
}

impl Namespace {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn name(&self, i: usize) -> Option<&FeatureName> {
        self.names.get(i)
    }

    fn sum_feat_sq(&self) -> f32 {
        self.features.iter().map(|f| f.x * f.x).sum()
    }
}

/// The namespace pairs and triples whose feature products are generated on the fly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interactions {
    pub pairs: Vec<[u8; 2]>,
    pub triples: Vec<[u8; 3]>,
}

impl Interactions {
    /// Creates a new `Interactions` from namespace strings such as `"ab"`.
    ///
    /// Strings of the wrong length are ignored.
    pub fn new(pairs: &[String], triples: &[String]) -> Self {
        Self {
            pairs: pairs
                .iter()
                .filter_map(|p| p.as_bytes().try_into().ok())
                .collect(),
            triples: triples
                .iter()
                .filter_map(|t| t.as_bytes().try_into().ok())
                .collect(),
        }
    }
}

/// The label side of an example.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelData {
    /// `None` marks an unlabeled example.
    pub label: Option<f32>,
    /// The importance weight.
    pub weight: f32,
    /// The base the prediction is computed on top of.
    pub initial: f32,
    pub prediction: f32,
}

impl Default for LabelData {
    fn default() -> Self {
        Self {
            label: None,
            weight: 1.,
            initial: 0.,
            prediction: 0.,
        }
    }
}

/// A single example together with the scratch state the engine writes while
/// learning from it.
#[derive(Debug, Clone)]
pub struct Example {
    pub namespaces: Vec<Namespace>,
    pub label: LabelData,
    pub tag: Option<String>,
    /// Added to every feature index before hashing.
    pub ft_offset: u32,
    pub example_counter: u64,
    /// The weighted count of examples seen up to and including this one.
    pub example_t: f32,
    /// Whether this example belongs to the holdout set.
    pub test_only: bool,
    pub in_use: bool,
    pub num_features: usize,
    pub total_sum_feat_sq: f32,
    pub partial_prediction: f32,
    pub loss: f32,
    pub eta_round: f32,
    pub revert_weight: f32,
}

impl Example {
    /// Creates a new `Example` without features.
    ///
    /// # Arguments
    /// * `label` - The target, or `None` for an unlabeled example.
    pub fn new(label: Option<f32>) -> Self {
        Self {
            namespaces: Vec::new(),
            label: LabelData {
                label,
                ..LabelData::default()
            },
            tag: None,
            ft_offset: 0,
            example_counter: 0,
            example_t: 0.,
            test_only: false,
            in_use: true,
            num_features: 0,
            total_sum_feat_sq: 0.,
            partial_prediction: 0.,
            loss: 0.,
            eta_round: 0.,
            revert_weight: 0.,
        }
    }

    /// Sets the importance weight of this example.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.label.weight = weight;
        self
    }

    fn namespace_mut(&mut self, index: u8) -> &mut Namespace {
        let pos = match self.namespaces.iter().position(|ns| ns.index == index) {
            Some(pos) => pos,
            None => {
                self.namespaces.push(Namespace::new(index));
                self.namespaces.len() - 1
            }
        };

        &mut self.namespaces[pos]
    }

    /// Returns the namespace with the given index, if the example has one.
    pub fn namespace(&self, index: u8) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.index == index)
    }

    /// Appends an anonymous feature to the namespace `ns`. Zero valued features
    /// are dropped.
    pub fn push_feature(&mut self, ns: u8, x: f32, weight_index: u32) {
        if x == 0. {
            return;
        }

        self.namespace_mut(ns)
            .features
            .push(Feature { x, weight_index });
    }

    /// Appends a named feature to the namespace `ns`.
    ///
    /// Mixing named and anonymous features in one namespace drops the names.
    /// Zero valued features are dropped.
    pub fn push_named_feature(
        &mut self,
        ns: u8,
        x: f32,
        weight_index: u32,
        space: &str,
        feature: &str,
    ) {
        if x == 0. {
            return;
        }

        let namespace = self.namespace_mut(ns);

        if namespace.names.len() == namespace.features.len() {
            namespace.names.push(FeatureName {
                space: space.to_string(),
                feature: feature.to_string(),
            });
        } else {
            namespace.names.clear();
        }

        namespace.features.push(Feature { x, weight_index });
    }

    /// Appends the bias feature.
    pub fn add_constant(&mut self) {
        self.push_feature(CONSTANT_NAMESPACE, 1., CONSTANT);
    }

    /// Recomputes the feature count and the sum of squared feature values,
    /// including generated interactions.
    pub fn compute_feature_stats(&mut self, interactions: &Interactions) {
        let mut num_features = 0;
        let mut sum_feat_sq = 0.;

        for ns in &self.namespaces {
            num_features += ns.features.len();
            sum_feat_sq += ns.sum_feat_sq();
        }

        for [a, b] in &interactions.pairs {
            if let (Some(a), Some(b)) = (self.namespace(*a), self.namespace(*b)) {
                num_features += a.features.len() * b.features.len();
                sum_feat_sq += a.sum_feat_sq() * b.sum_feat_sq();
            }
        }

        for [a, b, c] in &interactions.triples {
            if let (Some(a), Some(b), Some(c)) =
                (self.namespace(*a), self.namespace(*b), self.namespace(*c))
            {
                num_features += a.features.len() * b.features.len() * c.features.len();
                sum_feat_sq += a.sum_feat_sq() * b.sum_feat_sq() * c.sum_feat_sq();
            }
        }

        self.num_features = num_features;
        self.total_sum_feat_sq = sum_feat_sq;
    }

    /// Visits every active feature as `(value, raw index)`: first the explicit
    /// features namespace by namespace, then every configured pair and triple.
    ///
    /// Raw indices still have to be hashed into a weight table.
    pub fn for_each_feature<F>(&self, interactions: &Interactions, mut f: F)
    where
        F: FnMut(f32, u32),
    {
        let offset = self.ft_offset;

        for ns in &self.namespaces {
            for feat in &ns.features {
                f(feat.x, feat.weight_index.wrapping_add(offset));
            }
        }

        for [a, b] in &interactions.pairs {
            let (Some(first), Some(second)) = (self.namespace(*a), self.namespace(*b)) else {
                continue;
            };

            for left in &first.features {
                let halfhash = pair_hash(left.weight_index, offset);
                for right in &second.features {
                    f(
                        left.x * right.x,
                        right.weight_index.wrapping_add(halfhash).wrapping_add(offset),
                    );
                }
            }
        }

        for [a, b, c] in &interactions.triples {
            let (Some(first), Some(second), Some(third)) =
                (self.namespace(*a), self.namespace(*b), self.namespace(*c))
            else {
                continue;
            };

            for f0 in &first.features {
                for f1 in &second.features {
                    let halfhash = triple_hash(f0.weight_index, f1.weight_index, offset);
                    let mult = f0.x * f1.x;
                    for f2 in &third.features {
                        f(
                            mult * f2.x,
                            f2.weight_index.wrapping_add(halfhash).wrapping_add(offset),
                        );
                    }
                }
            }
        }
    }
}

/// The hash offset a left feature contributes to a pair.
pub fn pair_hash(left: u32, offset: u32) -> u32 {
    QUADRATIC_CONSTANT.wrapping_mul(left.wrapping_add(offset))
}

/// The hash offset the two leading features contribute to a triple.
pub fn triple_hash(first: u32, second: u32, offset: u32) -> u32 {
    let inner = CUBIC_CONSTANT
        .wrapping_mul(first.wrapping_add(offset))
        .wrapping_add(second)
        .wrapping_add(offset);
    CUBIC_CONSTANT2.wrapping_mul(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(ec: &Example, interactions: &Interactions) -> Vec<(f32, u32)> {
        let mut out = Vec::new();
        ec.for_each_feature(interactions, |x, i| out.push((x, i)));
        out
    }

    #[test]
    fn visits_plain_features_with_offset() {
        let mut ec = Example::new(Some(1.));
        ec.push_feature(b'a', 2., 5);
        ec.push_feature(b'b', 3., 7);
        ec.ft_offset = 1;

        let features = collect(&ec, &Interactions::default());
        assert_eq!(features, vec![(2., 6), (3., 8)]);
    }

    #[test]
    fn pairs_multiply_values_and_mix_indices() {
        let mut ec = Example::new(Some(1.));
        ec.push_feature(b'a', 2., 5);
        ec.push_feature(b'b', 3., 7);
        let interactions = Interactions::new(&["ab".to_string()], &[]);

        let features = collect(&ec, &interactions);
        assert_eq!(features.len(), 3);
        assert_eq!(
            features[2],
            (6., 7u32.wrapping_add(QUADRATIC_CONSTANT.wrapping_mul(5)))
        );
    }

    #[test]
    fn missing_namespaces_generate_nothing() {
        let mut ec = Example::new(None);
        ec.push_feature(b'a', 1., 1);
        let interactions = Interactions::new(&["az".to_string()], &["abz".to_string()]);

        assert_eq!(collect(&ec, &interactions).len(), 1);
    }

    #[test]
    fn feature_stats_include_interactions() {
        let mut ec = Example::new(Some(0.));
        ec.push_feature(b'a', 2., 1);
        ec.push_feature(b'b', 3., 2);
        ec.add_constant();

        let interactions = Interactions::new(&["ab".to_string()], &[]);
        ec.compute_feature_stats(&interactions);

        assert_eq!(ec.num_features, 4);
        assert_eq!(ec.total_sum_feat_sq, 4. + 9. + 1. + 36.);
    }

    #[test]
    fn zero_valued_features_are_dropped() {
        let mut ec = Example::new(Some(1.));
        ec.push_feature(b'a', 0., 1);
        ec.push_named_feature(b'a', 0., 2, "a", "x");
        ec.push_named_feature(b'a', -0., 3, "a", "y");
        ec.push_feature(b'a', 2., 4);

        let a = ec.namespace(b'a').unwrap();
        assert_eq!(a.features, vec![Feature { x: 2., weight_index: 4 }]);
    }

    #[test]
    fn mixed_naming_drops_names() {
        let mut ec = Example::new(None);
        ec.push_named_feature(b'a', 1., 1, "a", "x");
        assert_eq!(ec.namespace(b'a').unwrap().names.len(), 1);

        ec.push_feature(b'a', 1., 2);
        ec.push_named_feature(b'a', 1., 3, "a", "y");
        assert!(ec.namespace(b'a').unwrap().names.is_empty());
    }
}
