// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine selection.
//!
//! An engine is one complete, precompiled set of stage implementations for a
//! (precision family, instruction-set tier) pair. All engines exist as
//! statics; all this module does at runtime is pick the best one for the
//! running CPU, once per family per process.

use std::sync::OnceLock;

use riptide_common::cpu::CpuFeatures;

use crate::stages::{highp, lowp, Stage, StartFn, STAGE_COUNT};

/// Everything needed to run linked pipelines at one precision on one
/// instruction-set tier.
///
/// `F` is the family's stage-function pointer type. A `None` table entry
/// means the family cannot express that stage on any tier; the per-tier
/// wrappers all share one support pattern per family.
pub(crate) struct Engine<F: Copy + 'static> {
    pub name: &'static str,
    pub stages: [Option<F>; STAGE_COUNT],
    pub start: StartFn,
    pub just_return: F,
}

static HIGHP: OnceLock<&'static Engine<highp::StageFn>> = OnceLock::new();
static LOWP: OnceLock<Option<&'static Engine<lowp::StageFn>>> = OnceLock::new();

/// The standard-precision engine for this process.
///
/// Chosen on first use and cached; later calls are plain reads.
pub(crate) fn highp() -> &'static Engine<highp::StageFn> {
    HIGHP.get_or_init(|| {
        let engine = choose_highp(&CpuFeatures::detect());
        log::debug!("selected standard-precision engine {}", engine.name);
        engine
    })
}

/// The reduced-precision engine for this process, if the target has one.
///
/// Reduced precision is an optimization, not a backstop: on targets without
/// a reduced-precision build this stays `None` and every pipeline links at
/// standard precision.
pub(crate) fn lowp() -> Option<&'static Engine<lowp::StageFn>> {
    *LOWP.get_or_init(|| {
        let engine = choose_lowp(&CpuFeatures::detect());
        match engine {
            Some(engine) => log::debug!("selected reduced-precision engine {}", engine.name),
            None => log::debug!("no reduced-precision engine for this target"),
        }
        engine
    })
}

#[cfg(target_arch = "x86_64")]
pub(crate) fn choose_highp(features: &CpuFeatures) -> &'static Engine<highp::StageFn> {
    if features.hsw() {
        return &highp::HSW;
    }
    if features.sse41 {
        return &highp::SSE41;
    }
    &highp::BASELINE
}

#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn choose_highp(_features: &CpuFeatures) -> &'static Engine<highp::StageFn> {
    &highp::BASELINE
}

#[cfg(target_arch = "x86_64")]
pub(crate) fn choose_lowp(features: &CpuFeatures) -> Option<&'static Engine<lowp::StageFn>> {
    if features.hsw() {
        return Some(&lowp::HSW);
    }
    if features.sse41 {
        return Some(&lowp::SSE41);
    }
    // SSE2 is part of the x86-64 baseline, so the portable build qualifies
    // as the bottom tier here.
    Some(&lowp::BASELINE)
}

#[cfg(target_arch = "aarch64")]
pub(crate) fn choose_lowp(_features: &CpuFeatures) -> Option<&'static Engine<lowp::StageFn>> {
    // NEON is part of the baseline AArch64 profile.
    Some(&lowp::BASELINE)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) fn choose_lowp(_features: &CpuFeatures) -> Option<&'static Engine<lowp::StageFn>> {
    None
}

/// Observer for reduced-precision fallbacks; receives the stage that forced
/// the pipeline to standard precision.
pub type FallbackHook = fn(Stage);

static FALLBACK_HOOK: OnceLock<FallbackHook> = OnceLock::new();

/// Install a process-wide observer that is called whenever a
/// reduced-precision link attempt is abandoned.
///
/// The hook runs at link time, never per pixel, and at most once per link.
/// It can only be installed once; returns `false` if a hook was already
/// installed.
pub fn set_lowp_fallback_hook(hook: FallbackHook) -> bool {
    FALLBACK_HOOK.set(hook).is_ok()
}

pub(crate) fn lowp_fallback_hook() -> Option<FallbackHook> {
    FALLBACK_HOOK.get().copied()
}
