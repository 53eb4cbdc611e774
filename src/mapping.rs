// Axis mapping helpers: range mapping, deadzones and response curves
//
// All functions are total and clamp their output to [out_min, out_max].

/// Affine map from [min, max] into [out_min, out_max], clamped
///
/// `min == max` is a caller bug (division by zero); vehicle code never builds such ranges.
pub fn map_to_range(value: f64, min: f64, max: f64, out_min: f64, out_max: f64) -> f64 {
    let mapped = (out_max - out_min) * (value - min) / (max - min) + out_min;
    if mapped > out_max {
        out_max
    } else if mapped < out_min {
        out_min
    } else {
        mapped
    }
}

/// Map an axis that rests at centre, with a symmetric deadzone around zero
///
/// Values inside `[-deadzone, deadzone]` return `mid`. Outside, the value is shifted
/// towards zero by `deadzone` and the shrunk domain `[min + deadzone, max - deadzone]`
/// is mapped onto the output range.
pub fn map_axis_with_deadzone(
    value: f64,
    min: f64,
    max: f64,
    out_min: f64,
    out_max: f64,
    deadzone: f64,
    mid: f64,
) -> f64 {
    if value.abs() <= deadzone {
        return mid;
    }
    let shifted = if value < 0.0 {
        value + deadzone
    } else {
        value - deadzone
    };
    map_to_range(shifted, min + deadzone, max - deadzone, out_min, out_max)
}

/// Map an axis that rests at `min` (triggers), with a one-sided deadzone above `min`
pub fn map_trigger_with_deadzone(
    value: f64,
    min: f64,
    max: f64,
    out_min: f64,
    out_max: f64,
    deadzone: f64,
    rest: f64,
) -> f64 {
    if value > min + deadzone {
        map_to_range(value - deadzone, min, max - deadzone, out_min, out_max)
    } else {
        rest
    }
}

/// `sign(x) * |x|^exponent`; exponents outside [1.0, 2.0] fall back to linear
pub fn pow_curve(x: f64, exponent: f64) -> f64 {
    let exponent = if (1.0..=2.0).contains(&exponent) {
        exponent
    } else {
        1.0
    };
    x.signum() * x.abs().powf(exponent)
}
