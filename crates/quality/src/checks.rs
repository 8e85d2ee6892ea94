//! Helpers for writing structural and artifact checks.

use std::collections::BTreeSet;
use std::fmt::Display;

/// Outcome of an asset URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriStatus {
    /// Points at a real artifact
    Success,
    /// Generation was attempted and failed
    Error,
    /// Not generated yet
    Missing,
}

/// Classify an asset URI.
///
/// Empty and `placeholder` are missing; an `error:` prefix marks a failed
/// generation; anything else is taken as a real location.
pub fn check_uri(uri: &str) -> UriStatus {
    if uri.is_empty() || uri == "placeholder" {
        UriStatus::Missing
    } else if uri.starts_with("error:") {
        UriStatus::Error
    } else {
        UriStatus::Success
    }
}

/// Fraction of URIs that succeeded. An empty list counts as fully successful.
pub fn success_rate<'a>(uris: impl IntoIterator<Item = &'a str>) -> f64 {
    let (total, ok) = uris.into_iter().fold((0usize, 0usize), |(total, ok), uri| {
        (total + 1, ok + usize::from(check_uri(uri) == UriStatus::Success))
    });
    if total == 0 {
        1.0
    } else {
        ok as f64 / total as f64
    }
}

/// Record an error if a reported metric disagrees with the actual value.
pub fn check_metric<T: PartialEq + Display>(
    errors: &mut Vec<String>,
    field: &str,
    expected: T,
    actual: T,
) {
    if expected != actual {
        errors.push(format!("metrics.{} ({}) != actual ({})", field, expected, actual));
    }
}

/// Record an error unless `orders` is exactly `1, 2, ..., N`.
pub fn check_order_continuous(errors: &mut Vec<String>, name: &str, orders: &[u64]) {
    let continuous = orders.iter().zip(1u64..).all(|(o, expected)| *o == expected);
    if !continuous {
        errors.push(format!("{} order not continuous from 1: {:?}", name, orders));
    }
}

/// Record missing and extra ids between two sets, each listed in sorted order.
pub fn check_id_coverage<T: Ord + Clone + std::fmt::Debug>(
    errors: &mut Vec<String>,
    label: &str,
    expected: &BTreeSet<T>,
    actual: &BTreeSet<T>,
) {
    let missing: Vec<_> = expected.difference(actual).cloned().collect();
    let extra: Vec<_> = actual.difference(expected).cloned().collect();
    if !missing.is_empty() {
        errors.push(format!("{} missing: {:?}", label, missing));
    }
    if !extra.is_empty() {
        errors.push(format!("{} extra: {:?}", label, extra));
    }
}
