//! Multi-criteria path weight.
//!
//! `weight = (L / 150)^0.7 * (P / 20)^0.2 * (1 / R)^0.1`
//!
//! Lower is better. Latency dominates, price matters less and resource
//! availability only breaks near-ties. The reference constants normalise
//! typical values close to 1.

use core::num::NonZeroU32;

pub const LATENCY_REFERENCE: f64 = 150.0;
pub const PRICE_REFERENCE: f64 = 20.0;

pub const LATENCY_EXPONENT: f64 = 0.7;
pub const PRICE_EXPONENT: f64 = 0.2;
pub const RESOURCE_EXPONENT: f64 = 0.1;

/// Weight of a path with accumulated `latency`, ending at a node with the
/// given price and resource availability.
///
/// Non-decreasing in latency and price, non-increasing in resource.
pub fn weight(latency: u32, price: u32, resource: NonZeroU32) -> f64 {
    let l = f64::from(latency) / LATENCY_REFERENCE;
    let p = f64::from(price) / PRICE_REFERENCE;
    let r = 1.0 / f64::from(resource.get());
    libm::pow(l, LATENCY_EXPONENT) * libm::pow(p, PRICE_EXPONENT) * libm::pow(r, RESOURCE_EXPONENT)
}
