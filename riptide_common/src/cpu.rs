// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime CPU capability detection.
//!
//! Engine selection happens once per process, so probe cost is irrelevant.
//! What matters is that the probe result is a plain value: the selector can
//! be driven by a hand-built `CpuFeatures` in tests, and the real detection
//! is confined to [`CpuFeatures::detect`].

/// The instruction-set extensions that matter for engine selection.
///
/// Fields for foreign architectures are simply `false`, which keeps the
/// selection code free of per-architecture feature types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    /// SSE 4.1 (x86-64).
    pub sse41: bool,
    /// AVX2 (x86-64).
    pub avx2: bool,
    /// Fused multiply-add (x86-64).
    pub fma: bool,
    /// NEON (AArch64, where it is part of the baseline profile).
    pub neon: bool,
}

impl CpuFeatures {
    /// Probe the running CPU.
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> Self {
        Self {
            sse41: is_x86_feature_detected!("sse4.1"),
            avx2: is_x86_feature_detected!("avx2"),
            fma: is_x86_feature_detected!("fma"),
            neon: false,
        }
    }

    /// Probe the running CPU.
    #[cfg(target_arch = "aarch64")]
    pub fn detect() -> Self {
        Self {
            neon: true,
            ..Self::default()
        }
    }

    /// Probe the running CPU.
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    pub fn detect() -> Self {
        Self::default()
    }

    /// Haswell-class tier: 256-bit integer SIMD plus fused multiply-add.
    pub fn hsw(&self) -> bool {
        self.avx2 && self.fma
    }
}
