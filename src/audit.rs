use std::{fmt::Write as _, io::Write};

use log::warn;

use crate::{
    context::TrainingContext,
    example::{CONSTANT, Example, Feature, FeatureName, Namespace, pair_hash, triple_hash},
    optimization::trunc_weight,
};

/// A single line of an audit report.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// `w * x`, the feature's share of the prediction.
    pub contribution: f32,
    pub text: String,
}

struct AuditScope<'a> {
    prepend: &'a str,
    ns_pre: &'a str,
    offset: u32,
    mult: f32,
}

fn audit_feature(
    ctx: &mut TrainingContext,
    feature: &Feature,
    name: Option<&FeatureName>,
    scope: &AuditScope<'_>,
    results: &mut Vec<AuditEntry>,
) {
    let index = feature.weight_index.wrapping_add(scope.offset);
    let logical = ctx.weights.logical(index);
    let is_constant = logical == ctx.weights.logical(CONSTANT.wrapping_add(scope.offset));
    let group = ctx.weights.group(index);
    let audit = ctx.cfg.audit;

    let mut text = String::new();
    let mut tmp = name
        .map(|n| format!("{}^{}", n.space, n.feature))
        .unwrap_or_default();

    if audit {
        text.push_str(scope.prepend);

        if name.is_some() {
            text.push_str(&tmp);
            text.push(':');
        } else if is_constant {
            text.push_str("Constant:");
        }

        let value = scope.mult * feature.x;
        let weight = trunc_weight(group[0], ctx.sd.gravity as f32) * ctx.sd.contraction as f32;
        let _ = write!(text, "{logical}:{value}:{weight}");

        let adaptive = ctx.weights.layout().adaptive;
        if adaptive != 0 {
            let _ = write!(text, "@{}", group[adaptive]);
        }
    }

    let contribution = group[0] * feature.x;

    if ctx.current_pass == 0 && ctx.hash_inv() {
        if is_constant {
            tmp = "Constant".to_string();
        }

        ctx.name_index_map
            .entry(format!("{}{tmp}:{logical}", scope.ns_pre))
            .or_insert(logical);
    }

    results.push(AuditEntry { contribution, text });
}

fn audit_namespace(
    ctx: &mut TrainingContext,
    ns: &Namespace,
    scope: &AuditScope<'_>,
    results: &mut Vec<AuditEntry>,
) {
    for (i, feature) in ns.features.iter().enumerate() {
        audit_feature(ctx, feature, ns.name(i), scope, results);
    }
}

fn left_prefix(name: Option<&FeatureName>, right: &Namespace) -> String {
    match name {
        Some(n) if !right.names.is_empty() => format!("{}^{}^", n.space, n.feature),
        _ => String::new(),
    }
}

/// Describes every active feature of `ec`, sorted by decreasing absolute
/// contribution to the prediction.
///
/// During the first pass with an inverted hash model configured, this also
/// records each feature's name in the context.
pub fn audit_features(ctx: &mut TrainingContext, ec: &Example) -> Vec<AuditEntry> {
    let offset = ec.ft_offset;
    let mut results = Vec::new();

    let atomic = AuditScope {
        prepend: "",
        ns_pre: "",
        offset,
        mult: 1.,
    };
    for ns in &ec.namespaces {
        audit_namespace(ctx, ns, &atomic, &mut results);
    }

    let interactions = ctx.interactions.clone();

    for [a, b] in &interactions.pairs {
        let (Some(first), Some(second)) = (ec.namespace(*a), ec.namespace(*b)) else {
            continue;
        };

        for (i, left) in first.features.iter().enumerate() {
            let prefix = left_prefix(first.name(i), second);
            let scope = AuditScope {
                prepend: &prefix,
                ns_pre: &prefix,
                offset: pair_hash(left.weight_index, offset).wrapping_add(offset),
                mult: left.x,
            };
            audit_namespace(ctx, second, &scope, &mut results);
        }
    }

    for [a, b, c] in &interactions.triples {
        let (Some(first), Some(second), Some(third)) =
            (ec.namespace(*a), ec.namespace(*b), ec.namespace(*c))
        else {
            continue;
        };

        for (i, f0) in first.features.iter().enumerate() {
            for (j, f1) in second.features.iter().enumerate() {
                let prefix = format!(
                    "{}{}",
                    left_prefix(first.name(i), third),
                    left_prefix(second.name(j), third)
                );
                let scope = AuditScope {
                    prepend: &prefix,
                    ns_pre: &prefix,
                    offset: triple_hash(f0.weight_index, f1.weight_index, offset)
                        .wrapping_add(offset),
                    mult: f0.x * f1.x,
                };
                audit_namespace(ctx, third, &scope, &mut results);
            }
        }
    }

    results.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    results
}

/// Writes the audit report of a predicted example to the audit sink: the
/// prediction and tag on one line, then every feature tab separated.
pub fn print_audit_features(ctx: &mut TrainingContext, ec: &Example) {
    let entries = audit_features(ctx, ec);

    if !ctx.cfg.audit {
        return;
    }

    let mut report = format!("{:.6}", ec.label.prediction);
    if let Some(tag) = &ec.tag {
        report.push(' ');
        report.push_str(tag);
    }
    report.push('\n');

    for entry in &entries {
        report.push('\t');
        report.push_str(&entry.text);
    }
    report.push('\n');

    if let Err(e) = ctx.audit_out.write_all(report.as_bytes()) {
        warn!("failed to write audit report: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn entries_sorted_by_magnitude() {
        let mut ctx = testing::context(r#"{ "num_bits": 6, "audit": true }"#);
        ctx.weights.group_mut(1)[0] = 0.5;
        ctx.weights.group_mut(2)[0] = -3.;

        let mut ec = Example::new(Some(1.));
        ec.push_named_feature(b'a', 1., 1, "a", "small");
        ec.push_named_feature(b'a', 1., 2, "a", "big");
        ec.add_constant();

        let entries = audit_features(&mut ctx, &ec);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].contribution, -3.);
        assert!(entries[0].text.starts_with("a^big:2:1:-3"));
        assert!(entries[2].text.starts_with("Constant:"));
    }

    #[test]
    fn first_pass_collects_names() {
        let mut ctx = testing::context(r#"{ "num_bits": 6, "invert_hash": "model.inv" }"#);

        let mut ec = Example::new(Some(1.));
        ec.push_named_feature(b'a', 1., 1, "a", "x");
        ec.push_named_feature(b'b', 1., 2, "b", "y");
        ec.add_constant();
        ctx.interactions = crate::example::Interactions::new(&["ab".to_string()], &[]);

        audit_features(&mut ctx, &ec);

        let names: Vec<&str> = ctx.name_index_map.keys().map(String::as_str).collect();
        assert!(names.contains(&"a^x:1"));
        assert!(names.contains(&"b^y:2"));
        assert!(names.iter().any(|n| n.starts_with("Constant:")));
        assert!(names.iter().any(|n| n.starts_with("a^x^b^y:")));

        ctx.current_pass = 1;
        ctx.name_index_map.clear();
        audit_features(&mut ctx, &ec);
        assert!(ctx.name_index_map.is_empty());
    }
}
