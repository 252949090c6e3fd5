// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline description, linking, and execution.
//!
//! A [`RasterPipeline`] is an append-ordered list of stage requests. Linking
//! turns it into a flat program of function and context pointers for the best
//! engine the running CPU supports, preferring the reduced-precision family
//! and falling back, whole-pipeline, to standard precision when a requested
//! stage has no reduced-precision implementation.
//!
//! The program is built backward: the terminal stage is placed at the end of
//! the buffer first, then stages are written from the last request to the
//! first, each context slot immediately before its function slot. That way
//! every stage's tail call is simply "jump to whatever sits after my own
//! slots", and the finished chain is read forward in append order.

use core::ffi::c_void;

use smallvec::SmallVec;

use crate::engine::{self, Engine, FallbackHook};
use crate::stages::{highp, lowp, Stage, StartFn, LOWP_IDENTITY_STAGES};

/// A single appended stage request. `ctx` is null for context-free stages.
#[derive(Clone, Copy, Debug)]
struct StageRequest {
    stage: Stage,
    ctx: *const c_void,
}

/// An ordered pixel-processing program under construction.
///
/// Append stages in application order, then either [`run`](Self::run) the
/// pipeline directly or [`compile`](Self::compile) it once for repeated
/// execution.
#[derive(Debug)]
pub struct RasterPipeline {
    stages: Vec<StageRequest>,
    /// Worst-case program slot count: one per stage, one per context, plus
    /// the terminal stage. The standard-precision family skips nothing, so
    /// linking can never need more than this.
    slots_needed: usize,
}

/// A freshly linked program: which engine's start entry to call, and the
/// index of the first instruction slot. Skipped stages make the chain occupy
/// a suffix of the buffer, so the start index is not always zero.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LinkedProgram {
    pub start: StartFn,
    pub first: usize,
}

impl RasterPipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            slots_needed: 1,
        }
    }

    /// Append a context-free stage.
    pub fn append(&mut self, stage: Stage) {
        self.stages.push(StageRequest {
            stage,
            ctx: core::ptr::null(),
        });
        self.slots_needed += 1;
    }

    /// Append a stage together with its context.
    ///
    /// # Safety
    ///
    /// `ctx` must be the context type `stage` expects, and the pointed-to
    /// value (including any storage it refers to, like a [`PixelsCtx`]'s
    /// surface) must remain valid and in bounds for every later run of this
    /// pipeline or of a [`CompiledPipeline`] built from it. The pipeline
    /// does not track lifetimes; this promise is the crate's one trusted
    /// boundary.
    ///
    /// [`PixelsCtx`]: crate::PixelsCtx
    pub unsafe fn append_with_context<T>(&mut self, stage: Stage, ctx: &T) {
        self.stages.push(StageRequest {
            stage,
            ctx: (ctx as *const T).cast(),
        });
        self.slots_needed += 2;
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of appended stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    fn build_pipeline(&self, program: &mut [*const c_void]) -> LinkedProgram {
        self.build_pipeline_with(
            program,
            engine::lowp(),
            engine::highp(),
            engine::lowp_fallback_hook(),
        )
    }

    /// Link this pipeline into `program` using the given engines.
    ///
    /// Split out from [`build_pipeline`](Self::build_pipeline) so tests can
    /// drive linking with explicit engines and observers.
    pub(crate) fn build_pipeline_with(
        &self,
        program: &mut [*const c_void],
        lowp_engine: Option<&'static Engine<lowp::StageFn>>,
        highp_engine: &'static Engine<highp::StageFn>,
        hook: Option<FallbackHook>,
    ) -> LinkedProgram {
        // First try to build a reduced-precision program. The attempt is
        // all-or-nothing: one unsupported stage abandons the partial build,
        // because there are no stages that could convert between the
        // families' pixel formats mid-chain.
        if let Some(eng) = lowp_engine {
            let reset_point = program.len();
            let mut ip = reset_point;
            ip -= 1;
            program[ip] = lowp::fn_ptr(eng.just_return);
            for st in self.stages.iter().rev() {
                if LOWP_IDENTITY_STAGES.contains(&st.stage) {
                    continue; // No-ops in lowp.
                }
                if let Some(f) = eng.stages[st.stage as usize] {
                    if !st.ctx.is_null() {
                        ip -= 1;
                        program[ip] = st.ctx;
                    }
                    ip -= 1;
                    program[ip] = lowp::fn_ptr(f);
                } else {
                    log::trace!(
                        "{:?} has no reduced-precision implementation; relinking the pipeline at standard precision",
                        st.stage
                    );
                    if let Some(hook) = hook {
                        hook(st.stage);
                    }
                    ip = reset_point;
                    break;
                }
            }
            if ip != reset_point {
                return LinkedProgram {
                    start: eng.start,
                    first: ip,
                };
            }
        }

        let eng = highp_engine;
        let mut ip = program.len();
        // We're building the pipeline backwards, so the terminal stage goes
        // in first.
        ip -= 1;
        program[ip] = highp::fn_ptr(eng.just_return);

        // Still going backwards, each stage's context pointer then its
        // function pointer.
        for st in self.stages.iter().rev() {
            if !st.ctx.is_null() {
                ip -= 1;
                program[ip] = st.ctx;
            }
            ip -= 1;
            let f = eng.stages[st.stage as usize]
                .expect("standard-precision engines implement every stage");
            program[ip] = highp::fn_ptr(f);
        }

        LinkedProgram {
            start: eng.start,
            first: ip,
        }
    }

    /// Run the pipeline once over the rectangle `width` x `height` with its
    /// top-left corner at (`x`, `y`).
    ///
    /// Linking happens on every call; use [`compile`](Self::compile) when the
    /// same pipeline runs many times.
    pub fn run(&self, x: usize, y: usize, width: usize, height: usize) {
        if self.is_empty() {
            return;
        }

        // Best to not reach for a longer-lived allocation here; there is no
        // bound on how often run() is called, so prefer the stack for small
        // programs.
        let mut program: SmallVec<[*const c_void; 64]> =
            smallvec::smallvec![core::ptr::null(); self.slots_needed];

        let linked = self.build_pipeline(&mut program);
        unsafe { (linked.start)(x, y, x + width, y + height, program[linked.first..].as_ptr()) }
    }

    /// Link the pipeline once and return a program that can be run many
    /// times with different geometry.
    ///
    /// Engine selection, fallback, and linking all happen here; the returned
    /// program never revisits them.
    pub fn compile(&self) -> CompiledPipeline {
        if self.is_empty() {
            return CompiledPipeline {
                program: Vec::new(),
                first: 0,
                start: None,
            };
        }

        let mut program = vec![core::ptr::null(); self.slots_needed];
        let linked = self.build_pipeline(&mut program);
        CompiledPipeline {
            program,
            first: linked.first,
            start: Some(linked.start),
        }
    }
}

impl Default for RasterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// A pipeline linked once, runnable many times.
///
/// Holds the linked program buffer alive for as long as the caller keeps the
/// value around. Built by [`RasterPipeline::compile`].
#[derive(Debug)]
pub struct CompiledPipeline {
    program: Vec<*const c_void>,
    first: usize,
    /// `None` for a compiled empty pipeline, which runs as a no-op.
    start: Option<StartFn>,
}

impl CompiledPipeline {
    /// Run the program over the rectangle `width` x `height` with its
    /// top-left corner at (`x`, `y`).
    pub fn run(&self, x: usize, y: usize, width: usize, height: usize) {
        if let Some(start) = self.start {
            unsafe { start(x, y, x + width, y + height, self.program[self.first..].as_ptr()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::UniformColorCtx;

    fn raw(f: highp::StageFn) -> *const c_void {
        highp::fn_ptr(f)
    }

    fn highp_fn(stage: Stage) -> *const c_void {
        raw(highp::BASELINE.stages[stage as usize].unwrap())
    }

    fn link<'a>(
        pipeline: &RasterPipeline,
        program: &'a mut Vec<*const c_void>,
        lowp_engine: Option<&'static Engine<lowp::StageFn>>,
        hook: Option<FallbackHook>,
    ) -> (LinkedProgram, &'a [*const c_void]) {
        program.clear();
        program.resize(pipeline.slots_needed, core::ptr::null());
        let linked = pipeline.build_pipeline_with(program, lowp_engine, &highp::BASELINE, hook);
        let chain = &program[linked.first..];
        (linked, chain)
    }

    #[test]
    fn forward_order_matches_append_order() {
        let mut p = RasterPipeline::new();
        p.append(Stage::SeedShader);
        p.append(Stage::Premultiply);
        p.append(Stage::SourceOver);

        let mut program = Vec::new();
        let (linked, chain) = link(&p, &mut program, None, None);

        assert_eq!(linked.first, 0);
        assert_eq!(
            chain,
            &[
                highp_fn(Stage::SeedShader),
                highp_fn(Stage::Premultiply),
                highp_fn(Stage::SourceOver),
                raw(highp::BASELINE.just_return),
            ]
        );
    }

    #[test]
    fn context_sits_after_its_stage_function() {
        let ctx = UniformColorCtx::new(1.0, 0.0, 0.0, 1.0);
        let mut p = RasterPipeline::new();
        unsafe { p.append_with_context(Stage::UniformColor, &ctx) };
        p.append(Stage::SourceOver);

        let mut program = Vec::new();
        let (_, chain) = link(&p, &mut program, None, None);

        assert_eq!(
            chain,
            &[
                highp_fn(Stage::UniformColor),
                (&ctx as *const UniformColorCtx).cast(),
                highp_fn(Stage::SourceOver),
                raw(highp::BASELINE.just_return),
            ]
        );
    }

    #[test]
    fn empty_pipeline_is_a_no_op() {
        let p = RasterPipeline::new();
        assert!(p.is_empty());
        assert_eq!(p.slots_needed, 1);

        // Neither of these may invoke any stage.
        p.run(0, 0, 128, 128);
        p.compile().run(0, 0, 128, 128);
    }

    #[test]
    fn slot_accounting() {
        let ctx = 0.5_f32;
        let mut p = RasterPipeline::new();
        p.append(Stage::SourceOver);
        assert_eq!(p.slots_needed, 2);
        unsafe { p.append_with_context(Stage::Scale1Float, &ctx) };
        assert_eq!(p.slots_needed, 4);
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    mod lowp_linking {
        use super::*;
        use std::sync::atomic::{AtomicUsize, Ordering};

        fn lowp_fn(stage: Stage) -> *const c_void {
            lowp::fn_ptr(lowp::BASELINE.stages[stage as usize].unwrap())
        }

        #[test]
        fn supported_pipeline_links_at_reduced_precision() {
            let ctx = UniformColorCtx::new(0.0, 0.0, 0.0, 1.0);
            let mut p = RasterPipeline::new();
            unsafe { p.append_with_context(Stage::UniformColor, &ctx) };
            p.append(Stage::SourceOver);

            let mut program = Vec::new();
            let (linked, chain) = link(&p, &mut program, Some(&lowp::BASELINE), None);

            assert_eq!(linked.start as usize, lowp::BASELINE.start as usize);
            // The context slot sits right after its stage's function slot in
            // this family too.
            assert_eq!(
                chain,
                &[
                    lowp_fn(Stage::UniformColor),
                    (&ctx as *const UniformColorCtx).cast(),
                    lowp_fn(Stage::SourceOver),
                    lowp::fn_ptr(lowp::BASELINE.just_return),
                ]
            );
        }

        #[test]
        fn identity_stages_cost_no_slots_and_no_fallback() {
            let mut p = RasterPipeline::new();
            p.append(Stage::Clamp0);
            p.append(Stage::SourceOver);
            p.append(Stage::ClampA);

            static FIRED: AtomicUsize = AtomicUsize::new(0);
            fn hook(_: Stage) {
                FIRED.fetch_add(1, Ordering::Relaxed);
            }

            let mut program = Vec::new();
            let (linked, chain) = link(&p, &mut program, Some(&lowp::BASELINE), Some(hook));

            assert_eq!(FIRED.load(Ordering::Relaxed), 0);
            assert_eq!(linked.start as usize, lowp::BASELINE.start as usize);
            // Both clamps are skipped, so only the blend and the terminal
            // stage remain, at the end of the buffer.
            assert_eq!(linked.first, p.slots_needed - 2);
            assert_eq!(
                chain,
                &[
                    lowp_fn(Stage::SourceOver),
                    lowp::fn_ptr(lowp::BASELINE.just_return),
                ]
            );
        }

        #[test]
        fn fallback_is_total_not_partial() {
            static FIRED: AtomicUsize = AtomicUsize::new(0);
            fn hook(stage: Stage) {
                assert_eq!(stage, Stage::ColorBurn);
                FIRED.fetch_add(1, Ordering::Relaxed);
            }

            let mut p = RasterPipeline::new();
            p.append(Stage::MoveSourceToDestination);
            p.append(Stage::ColorBurn);
            p.append(Stage::SourceOver);

            let mut program = Vec::new();
            let (linked, chain) = link(&p, &mut program, Some(&lowp::BASELINE), Some(hook));

            assert_eq!(FIRED.load(Ordering::Relaxed), 1);
            assert_eq!(linked.start as usize, highp::BASELINE.start as usize);
            assert_eq!(linked.first, 0);

            // Every slot must come from the standard-precision table; the
            // rolled-back reduced-precision slots may not survive anywhere.
            let lowp_fns: Vec<*const c_void> = lowp::BASELINE
                .stages
                .iter()
                .flatten()
                .map(|f| lowp::fn_ptr(*f))
                .chain([lowp::fn_ptr(lowp::BASELINE.just_return)])
                .collect();
            assert!(chain.iter().all(|slot| !lowp_fns.contains(slot)));
            assert_eq!(
                chain,
                &[
                    highp_fn(Stage::MoveSourceToDestination),
                    highp_fn(Stage::ColorBurn),
                    highp_fn(Stage::SourceOver),
                    raw(highp::BASELINE.just_return),
                ]
            );
        }
    }
}
