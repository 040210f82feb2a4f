//! Deterministic per-job diversity modifiers.
//!
//! When a batch asks for N outputs of the same request, each job index picks
//! one modifier from every dimension (lighting, angle, ...) so parallel
//! requests differ. Dimensions wrap independently: the value for dimension
//! `d` is `d[index % d.len()]`.

use std::collections::BTreeMap;

/// Named dimension → candidate modifiers.
pub type Dimensions = BTreeMap<String, Vec<String>>;

/// Named dimension → chosen modifier.
pub type Variation = BTreeMap<String, String>;

/// Build [`Dimensions`] from a static table.
pub fn dimensions(table: &[(&str, &[&str])]) -> Dimensions {
    table
        .iter()
        .map(|&(name, values)| {
            (
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

/// Pick one modifier per dimension for job `index`.
///
/// Dimensions with no candidates are left out.
pub fn variation_for(index: usize, dimensions: &Dimensions) -> Variation {
    dimensions
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| (name.clone(), values[index % values.len()].clone()))
        .collect()
}

/// Number of indices after which the full variation repeats (LCM of lengths).
pub fn period(dimensions: &Dimensions) -> usize {
    dimensions
        .values()
        .map(Vec::len)
        .filter(|&len| len > 0)
        .fold(1, lcm)
}

/// Render a variation as prompt text, e.g. `"angle: profile; lighting: golden hour"`.
pub fn describe(variation: &Variation) -> String {
    variation
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}
