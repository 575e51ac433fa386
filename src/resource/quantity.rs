// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Parses a Kubernetes quantity ("10Gi", "500m", "1.5", "2e3") into its numeric value.
pub fn parse_quantity(quantity: &Quantity) -> Result<f64, String> {
    let text = quantity.0.trim();
    if text.is_empty() {
        return Err("quantity is empty".to_string());
    }
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("quantity {:?} has no valid number", text))?;
    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        exponent if exponent.starts_with('e') || exponent.starts_with('E') => {
            let exponent: i32 = exponent[1..]
                .parse()
                .map_err(|_| format!("quantity {:?} has an invalid exponent", text))?;
            10f64.powi(exponent)
        }
        _ => return Err(format!("quantity {:?} has an unknown suffix", text)),
    };
    Ok(value * multiplier)
}

pub fn is_zero(quantity: &Quantity) -> Result<bool, String> {
    parse_quantity(quantity).map(|value| value == 0.0)
}

/// Two quantities match when they denote the same amount, so "1" matches "1000m"
/// and "1Gi" matches "1073741824".
pub fn quantities_match(desired: &Quantity, observed: &Quantity) -> bool {
    if desired == observed {
        return true;
    }
    match (parse_quantity(desired), parse_quantity(observed)) {
        (Ok(d), Ok(o)) => (d - o).abs() <= 1e-9 * d.abs().max(o.abs()),
        _ => false,
    }
}

pub fn resource_lists_match(
    desired: Option<&BTreeMap<String, Quantity>>,
    observed: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let desired = desired.unwrap_or(&empty);
    let observed = observed.unwrap_or(&empty);
    desired.len() == observed.len()
        && desired.iter().all(|(name, d)| {
            observed
                .get(name)
                .map_or(false, |o| quantities_match(d, o))
        })
}

pub fn resource_requirements_match(
    desired: Option<&corev1::ResourceRequirements>,
    observed: Option<&corev1::ResourceRequirements>,
) -> bool {
    let limits = |r: Option<&corev1::ResourceRequirements>| r.and_then(|r| r.limits.clone());
    let requests = |r: Option<&corev1::ResourceRequirements>| r.and_then(|r| r.requests.clone());
    resource_lists_match(limits(desired).as_ref(), limits(observed).as_ref())
        && resource_lists_match(requests(desired).as_ref(), requests(observed).as_ref())
}
