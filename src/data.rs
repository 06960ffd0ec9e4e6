use std::io::BufRead;

use crate::{
    GdErr, Result,
    example::{DEFAULT_NAMESPACE, Example},
};

/// Parses one example line:
///
/// ```text
/// [label [importance]] ['tag] |namespace index[:value] ... |namespace ...
/// ```
///
/// Feature indices are pre hashed unsigned integers. A `|` directly followed by a
/// space opens the default namespace. Every example gets the bias feature.
pub fn parse_example(line: &str) -> std::result::Result<Example, String> {
    let (header, body) = line.split_once('|').unwrap_or((line, ""));

    let mut label = None;
    let mut weight = 1.;
    let mut tag = None;

    for (i, token) in header.split_whitespace().enumerate() {
        if let Some(t) = token.strip_prefix('\'') {
            tag = Some(t.to_string());
            continue;
        }

        let value: f32 = token
            .parse()
            .map_err(|_| format!("`{token}` is not a number"))?;
        match i {
            0 => label = Some(value),
            1 => weight = value,
            _ => return Err(format!("unexpected `{token}` before the features")),
        }
    }

    let mut ec = Example::new(label).with_weight(weight);
    ec.tag = tag;

    for section in format!("|{body}").split('|').skip(1) {
        let (ns_name, features) = match section.chars().next() {
            None | Some(' ') => (" ", section),
            Some(_) => section.split_once(' ').unwrap_or((section, "")),
        };
        let ns_index = ns_name.bytes().next().unwrap_or(DEFAULT_NAMESPACE);

        for token in features.split_whitespace() {
            let (name, value) = match token.split_once(':') {
                Some((name, value)) => {
                    let value = value
                        .parse()
                        .map_err(|_| format!("bad feature value in `{token}`"))?;
                    (name, value)
                }
                None => (token, 1.),
            };

            let index = name
                .parse()
                .map_err(|_| format!("feature `{name}` is not a hashed index"))?;
            ec.push_named_feature(ns_index, value, index, ns_name.trim(), name);
        }
    }

    ec.add_constant();
    Ok(ec)
}

/// Reads every non empty line of `rx` as an example.
pub fn read_examples<R: BufRead>(rx: R) -> Result<Vec<Example>> {
    let mut examples = Vec::new();

    for (i, line) in rx.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let ec = parse_example(&line).map_err(|detail| GdErr::Parse { line: i + 1, detail })?;
        examples.push(ec);
    }

    Ok(examples)
}
