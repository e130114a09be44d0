//! Conversion of raw 16-bit module samples into physical units.
//!
//! Cell voltages are a straight linear map of the ADC range onto 0-5 V.
//! Temperatures go through the NTC network of the module: a quadratic gives the
//! thermistor resistance, a logarithmic fit turns that into degrees Celsius.

#![allow(clippy::excessive_precision)]

/// Full scale of a cell voltage sample in volts
pub const VOLTAGE_FULL_SCALE: f32 = 5.0;

const SAMPLE_FULL_SCALE: f32 = 65535.0;

// NTC resistance = A * x^2 - B * x + C
const NTC_A: f32 = 0.000_000_034_736_342_749_929_2;
const NTC_B: f32 = 0.001_025_770_762_903;
const NTC_C: f32 = 2.682_353_406_143_37;

// Temperature = ln(resistance) * SCALE + OFFSET
const NTC_SCALE: f32 = -30.528_096_423_981_6;
const NTC_OFFSET: f32 = 95.684_150_131_244_7;

/// Convert a raw cell sample to volts
pub fn decode_voltage(sample: u16) -> f32 {
    sample as f32 * VOLTAGE_FULL_SCALE / SAMPLE_FULL_SCALE
}

/// Convert a raw NTC sample to degrees Celsius.
///
/// The result is not clamped. Samples below the usable range of the network
/// give a non-positive resistance and therefore `NaN`.
pub fn decode_temperature(sample: u16) -> f32 {
    let x = sample as f32;
    let resistance = NTC_A * x * x - NTC_B * x + NTC_C;
    libm::logf(resistance) * NTC_SCALE + NTC_OFFSET
}

/// Raw sample that decodes to the given voltage (rounded, saturating)
pub fn encode_voltage(volts: f32) -> u16 {
    let sample = libm::roundf(volts * SAMPLE_FULL_SCALE / VOLTAGE_FULL_SCALE);
    sample.clamp(0.0, SAMPLE_FULL_SCALE) as u16
}

/// Raw sample that decodes to the given temperature (rounded, saturating).
///
/// Solves the resistance quadratic on its rising branch, which is the one
/// real sensors report on.
pub fn encode_temperature(celsius: f32) -> u16 {
    let resistance = libm::expf((celsius - NTC_OFFSET) / NTC_SCALE);
    let discriminant = (NTC_B * NTC_B - 4.0 * NTC_A * (NTC_C - resistance)).max(0.0);
    let sample = libm::roundf((NTC_B + libm::sqrtf(discriminant)) / (2.0 * NTC_A));
    sample.clamp(0.0, SAMPLE_FULL_SCALE) as u16
}
