//! Resource amount conversions and human-readable formatting
//!
//! CPU amounts are integer millicores and memory amounts integer bytes.
//! Every conversion from floating point saturates into `[0, MAX_RESOURCE_AMOUNT]`.

use crate::models::{ResourceMap, ResourceName, MAX_RESOURCE_AMOUNT};
use std::collections::BTreeMap;

const MILLICORES_PER_CORE: f64 = 1000.0;

/// Decimal memory units, largest first
const MEMORY_UNITS: [(&str, i64); 3] = [("G", 1_000_000_000), ("M", 1_000_000), ("k", 1_000)];

/// Clamp a floating point amount into the valid range, rounding to the nearest unit
pub fn resource_amount_from_float(amount: f64) -> i64 {
    if amount.is_nan() || amount <= 0.0 {
        0
    } else if amount >= MAX_RESOURCE_AMOUNT as f64 {
        MAX_RESOURCE_AMOUNT
    } else {
        amount.round() as i64
    }
}

pub fn cpu_amount_from_cores(cores: f64) -> i64 {
    resource_amount_from_float(cores * MILLICORES_PER_CORE)
}

pub fn cores_from_cpu_amount(millicores: i64) -> f64 {
    millicores as f64 / MILLICORES_PER_CORE
}

pub fn memory_amount_from_bytes(bytes: f64) -> i64 {
    resource_amount_from_float(bytes)
}

pub fn bytes_from_memory_amount(bytes: i64) -> f64 {
    bytes as f64
}

/// Multiply an amount by `factor`, saturating at the bounds
pub fn scale_resource(amount: i64, factor: f64) -> i64 {
    resource_amount_from_float(amount as f64 * factor)
}

pub fn make_resource_map(cpu_millicores: i64, memory_bytes: i64) -> ResourceMap {
    let mut map = ResourceMap::new();
    map.insert(ResourceName::Cpu.as_str().to_string(), cpu_millicores);
    map.insert(ResourceName::Memory.as_str().to_string(), memory_bytes);
    map
}

/// Format millicores: below one core as `"{n}m"`, otherwise as cores
/// (`1000` -> `"1"`, `1500` -> `"1.5"`)
pub fn readable_cpu_amount(millicores: i64) -> String {
    if millicores < 1000 {
        return format!("{}m", millicores);
    }
    if millicores % 1000 == 0 {
        return (millicores / 1000).to_string();
    }
    let cores = format!("{}.{:03}", millicores / 1000, millicores % 1000);
    cores.trim_end_matches('0').to_string()
}

/// Format bytes with a decimal suffix, rounding up to a whole unit.
///
/// The largest unit is used when it divides the amount exactly or when the
/// amount is at least ten of that unit; otherwise the next smaller unit is
/// tried. `25_000_000` -> `"25M"`, `1_730_769` -> `"1731k"`,
/// `21_861_730_769` -> `"22G"`.
pub fn readable_memory_amount(bytes: i64) -> String {
    if bytes <= 0 {
        return bytes.to_string();
    }
    for (suffix, unit) in MEMORY_UNITS {
        if bytes % unit == 0 || bytes >= 10 * unit {
            let rounded_up = bytes / unit + i64::from(bytes % unit != 0);
            return format!("{}{}", rounded_up, suffix);
        }
    }
    bytes.to_string()
}

/// Render every entry with its resource-specific formatter; unknown keys
/// keep their raw value
pub fn convert_to_readable_form(resources: &ResourceMap) -> BTreeMap<String, String> {
    resources
        .iter()
        .map(|(name, &amount)| {
            let readable = match name.parse::<ResourceName>() {
                Ok(ResourceName::Cpu) => readable_cpu_amount(amount),
                Ok(ResourceName::Memory) => readable_memory_amount(amount),
                Err(_) => amount.to_string(),
            };
            (name.clone(), readable)
        })
        .collect()
}
