// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Portable wide vector types for the pipeline kernels.
//!
//! The standard-precision family computes in [`f32x8`] from the `wide` crate.
//! The reduced-precision family wants sixteen u16 lanes, which `wide` does
//! not provide, so [`u16x16`] is a plain array wrapper whose per-lane loops
//! are written to stay trivially auto-vectorizable under whatever target
//! features the surrounding engine tier enables.

use core::ops::{Add, Div, Mul, Sub};

pub use wide::f32x8;

/// Sixteen u16 lanes holding 0..=255 color values (with 16-bit headroom for
/// intermediate products).
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct u16x16(pub [u16; 16]);

impl u16x16 {
    pub fn splat(v: u16) -> Self {
        Self([v; 16])
    }

    pub fn min(&self, other: &Self) -> Self {
        let mut out = [0; 16];
        for i in 0..16 {
            out[i] = self.0[i].min(other.0[i]);
        }
        Self(out)
    }

    pub fn max(&self, other: &Self) -> Self {
        let mut out = [0; 16];
        for i in 0..16 {
            out[i] = self.0[i].max(other.0[i]);
        }
        Self(out)
    }

    pub fn as_slice(&self) -> &[u16; 16] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u16; 16] {
        &mut self.0
    }
}

impl Add for u16x16 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let mut out = [0; 16];
        for i in 0..16 {
            out[i] = self.0[i] + rhs.0[i];
        }
        Self(out)
    }
}

impl Sub for u16x16 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let mut out = [0; 16];
        for i in 0..16 {
            out[i] = self.0[i] - rhs.0[i];
        }
        Self(out)
    }
}

impl Mul for u16x16 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut out = [0; 16];
        for i in 0..16 {
            out[i] = self.0[i] * rhs.0[i];
        }
        Self(out)
    }
}

impl Div for u16x16 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let mut out = [0; 16];
        for i in 0..16 {
            out[i] = self.0[i] / rhs.0[i];
        }
        Self(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_arithmetic() {
        let a = u16x16::splat(200);
        let b = u16x16::splat(55);
        assert_eq!(a + b, u16x16::splat(255));
        assert_eq!(a - b, u16x16::splat(145));
        assert_eq!(u16x16::splat(3) * b, u16x16::splat(165));
        assert_eq!(a / u16x16::splat(100), u16x16::splat(2));
    }

    #[test]
    fn min_max() {
        let a = u16x16::splat(7);
        let b = u16x16::splat(9);
        assert_eq!(a.min(&b), a);
        assert_eq!(a.max(&b), b);
    }
}
