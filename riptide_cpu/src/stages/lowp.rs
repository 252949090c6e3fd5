// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The reduced-precision kernel family.
//!
//! Computes in u16 (values 0..=255), sixteen pixels per batch, which is
//! substantially faster than f32 for the common compositing pipelines. The
//! price is that some stages cannot be expressed at this precision; their
//! table entries are `None` and the linker falls the whole pipeline back to
//! [`highp`](super::highp) when it meets one. Mixing precisions inside one
//! pipeline is not possible: there are no conversion stages.

use core::ffi::c_void;

use riptide_common::peniko::color::PremulRgba8;
use riptide_common::wide::u16x16;

use super::{MaskCtx, PixelsCtx, StartFn, UniformColorCtx};
use crate::engine::Engine;

pub(crate) const STAGE_WIDTH: usize = 16;

pub(crate) type StageFn = unsafe fn(&mut Pipeline);

/// One in-flight batch of pixels: the source and destination registers, the
/// program cursor, and the batch geometry.
#[derive(Debug)]
pub(crate) struct Pipeline {
    program: *const *const c_void,
    r: u16x16,
    g: u16x16,
    b: u16x16,
    a: u16x16,
    dr: u16x16,
    dg: u16x16,
    db: u16x16,
    da: u16x16,
    /// Number of active lanes, 1..=STAGE_WIDTH.
    tail: usize,
    dx: usize,
    dy: usize,
}

impl Pipeline {
    /// Call the stage the program cursor points at.
    #[inline(always)]
    unsafe fn exec(&mut self) {
        unsafe {
            let f: StageFn = core::mem::transmute(*self.program);
            f(self);
        }
    }

    /// Advance past this stage's slots and chain into the next stage.
    #[inline(always)]
    fn next_stage(&mut self, offset: usize) {
        unsafe {
            self.program = self.program.add(offset);
            self.exec();
        }
    }

    /// This stage's context, stored one slot after its function pointer.
    #[inline(always)]
    fn stage_ctx<T>(&self) -> *const T {
        unsafe { (*self.program.add(1)).cast() }
    }
}

pub(crate) fn fn_ptr(f: StageFn) -> *const c_void {
    f as *const () as *const c_void
}

macro_rules! blend_fn {
    ($name:ident, $f:expr) => {
        #[inline(always)]
        pub(crate) fn $name(p: &mut Pipeline) {
            p.r = $f(p.r, p.dr, p.a, p.da);
            p.g = $f(p.g, p.dg, p.a, p.da);
            p.b = $f(p.b, p.db, p.a, p.da);
            p.a = $f(p.a, p.da, p.a, p.da);

            p.next_stage(1);
        }
    };
}

// The same formula applied to color, and source-over for alpha.
macro_rules! blend_fn2 {
    ($name:ident, $f:expr) => {
        #[inline(always)]
        pub(crate) fn $name(p: &mut Pipeline) {
            p.r = $f(p.r, p.dr, p.a, p.da);
            p.g = $f(p.g, p.dg, p.a, p.da);
            p.b = $f(p.b, p.db, p.a, p.da);
            p.a = p.a + div255(p.da * inv(p.a));

            p.next_stage(1);
        }
    };
}

pub(crate) mod portable {
    use super::*;

    #[inline(always)]
    fn div255(v: u16x16) -> u16x16 {
        (v + u16x16::splat(255)) / u16x16::splat(256)
    }

    #[inline(always)]
    fn inv(v: u16x16) -> u16x16 {
        u16x16::splat(255) - v
    }

    #[inline(always)]
    fn two(v: u16x16) -> u16x16 {
        v + v
    }

    #[inline(always)]
    fn from_float(f: f32) -> u16x16 {
        u16x16::splat((f * 255.0 + 0.5) as u16)
    }

    #[inline(always)]
    fn lerp(from: u16x16, to: u16x16, t: u16x16) -> u16x16 {
        div255(from * inv(t) + to * t)
    }

    #[inline(always)]
    unsafe fn load_rgba(
        ptr: *const PremulRgba8,
        tail: usize,
        r: &mut u16x16,
        g: &mut u16x16,
        b: &mut u16x16,
        a: &mut u16x16,
    ) {
        let mut tmp = [PremulRgba8::from_u32(0); STAGE_WIDTH];
        unsafe { core::ptr::copy_nonoverlapping(ptr, tmp.as_mut_ptr(), tail) };
        for i in 0..STAGE_WIDTH {
            r.0[i] = tmp[i].r as u16;
            g.0[i] = tmp[i].g as u16;
            b.0[i] = tmp[i].b as u16;
            a.0[i] = tmp[i].a as u16;
        }
    }

    #[inline(always)]
    unsafe fn store_rgba(
        r: &u16x16,
        g: &u16x16,
        b: &u16x16,
        a: &u16x16,
        ptr: *mut PremulRgba8,
        tail: usize,
    ) {
        let mut tmp = [PremulRgba8::from_u32(0); STAGE_WIDTH];
        for i in 0..STAGE_WIDTH {
            tmp[i] = PremulRgba8 {
                r: r.0[i] as u8,
                g: g.0[i] as u8,
                b: b.0[i] as u8,
                a: a.0[i] as u8,
            };
        }
        unsafe { core::ptr::copy_nonoverlapping(tmp.as_ptr(), ptr, tail) };
    }

    #[inline(always)]
    unsafe fn load_coverage(ptr: *const u8, tail: usize) -> u16x16 {
        let mut tmp = [0_u8; STAGE_WIDTH];
        unsafe { core::ptr::copy_nonoverlapping(ptr, tmp.as_mut_ptr(), tail) };
        let mut c = u16x16::splat(0);
        for i in 0..STAGE_WIDTH {
            c.0[i] = tmp[i] as u16;
        }
        c
    }

    #[inline(always)]
    pub(crate) fn move_source_to_destination(p: &mut Pipeline) {
        p.dr = p.r;
        p.dg = p.g;
        p.db = p.b;
        p.da = p.a;

        p.next_stage(1);
    }

    #[inline(always)]
    pub(crate) fn move_destination_to_source(p: &mut Pipeline) {
        p.r = p.dr;
        p.g = p.dg;
        p.b = p.db;
        p.a = p.da;

        p.next_stage(1);
    }

    #[inline(always)]
    pub(crate) fn premultiply(p: &mut Pipeline) {
        p.r = div255(p.r * p.a);
        p.g = div255(p.g * p.a);
        p.b = div255(p.b * p.a);

        p.next_stage(1);
    }

    #[inline(always)]
    pub(crate) fn swap_red_blue(p: &mut Pipeline) {
        core::mem::swap(&mut p.r, &mut p.b);

        p.next_stage(1);
    }

    #[inline(always)]
    pub(crate) fn uniform_color(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<UniformColorCtx>() };
        p.r = u16x16::splat(ctx.rgba[0]);
        p.g = u16x16::splat(ctx.rgba[1]);
        p.b = u16x16::splat(ctx.rgba[2]);
        p.a = u16x16::splat(ctx.rgba[3]);

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn load_8888(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<PixelsCtx>() };
        unsafe {
            let ptr = ctx.ptr_at_xy(p.dx, p.dy);
            load_rgba(ptr, p.tail, &mut p.r, &mut p.g, &mut p.b, &mut p.a);
        }

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn load_8888_dst(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<PixelsCtx>() };
        unsafe {
            let ptr = ctx.ptr_at_xy(p.dx, p.dy);
            load_rgba(ptr, p.tail, &mut p.dr, &mut p.dg, &mut p.db, &mut p.da);
        }

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn store_8888(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<PixelsCtx>() };
        unsafe {
            let ptr = ctx.ptr_at_xy(p.dx, p.dy);
            store_rgba(&p.r, &p.g, &p.b, &p.a, ptr, p.tail);
        }

        p.next_stage(2);
    }

    /// Fused load-dst + source-over + store for the common compositing tail.
    #[inline(always)]
    pub(crate) fn source_over_rgba(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<PixelsCtx>() };
        unsafe {
            let ptr = ctx.ptr_at_xy(p.dx, p.dy);
            load_rgba(ptr, p.tail, &mut p.dr, &mut p.dg, &mut p.db, &mut p.da);

            p.r = p.r + div255(p.dr * inv(p.a));
            p.g = p.g + div255(p.dg * inv(p.a));
            p.b = p.b + div255(p.db * inv(p.a));
            p.a = p.a + div255(p.da * inv(p.a));

            store_rgba(&p.r, &p.g, &p.b, &p.a, ptr, p.tail);
        }

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn scale_u8(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<MaskCtx>() };
        let c = unsafe { load_coverage(ctx.ptr_at_xy(p.dx, p.dy), p.tail) };

        p.r = div255(p.r * c);
        p.g = div255(p.g * c);
        p.b = div255(p.b * c);
        p.a = div255(p.a * c);

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn lerp_u8(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<MaskCtx>() };
        let c = unsafe { load_coverage(ctx.ptr_at_xy(p.dx, p.dy), p.tail) };

        p.r = lerp(p.dr, p.r, c);
        p.g = lerp(p.dg, p.g, c);
        p.b = lerp(p.db, p.b, c);
        p.a = lerp(p.da, p.a, c);

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn scale_1_float(p: &mut Pipeline) {
        let c = from_float(unsafe { *p.stage_ctx::<f32>() });

        p.r = div255(p.r * c);
        p.g = div255(p.g * c);
        p.b = div255(p.b * c);
        p.a = div255(p.a * c);

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn lerp_1_float(p: &mut Pipeline) {
        let c = from_float(unsafe { *p.stage_ctx::<f32>() });

        p.r = lerp(p.dr, p.r, c);
        p.g = lerp(p.dg, p.g, c);
        p.b = lerp(p.db, p.b, c);
        p.a = lerp(p.da, p.a, c);

        p.next_stage(2);
    }

    blend_fn!(clear,            |_, _,  _,  _| u16x16::splat(0));
    blend_fn!(source_over,      |s, d, sa,  _| s + div255(d * inv(sa)));
    blend_fn!(destination_over, |s, d,  _, da| d + div255(s * inv(da)));
    blend_fn!(source_in,        |s, _,  _, da| div255(s * da));
    blend_fn!(destination_in,   |_, d, sa,  _| div255(d * sa));
    blend_fn!(source_out,       |s, _,  _, da| div255(s * inv(da)));
    blend_fn!(destination_out,  |_, d, sa,  _| div255(d * inv(sa)));
    blend_fn!(source_atop,      |s, d, sa, da| div255(s * da + d * inv(sa)));
    blend_fn!(destination_atop, |s, d, sa, da| div255(d * sa + s * inv(da)));
    blend_fn!(xor,              |s, d, sa, da| div255(s * inv(da) + d * inv(sa)));
    blend_fn!(modulate,         |s, d,  _,  _| div255(s * d));
    blend_fn!(multiply,         |s, d, sa, da| div255(s * inv(da) + d * inv(sa) + s * d));
    blend_fn!(screen,           |s, d,  _,  _| s + d - div255(s * d));

    // Wants a type for some reason.
    blend_fn!(plus, |s: u16x16, d, _, _| (s + d).min(&u16x16::splat(255)));

    blend_fn2!(darken,     |s: u16x16, d, sa, da: u16x16| s + d - div255((s * da).max(&(d * sa))));
    blend_fn2!(lighten,    |s: u16x16, d, sa, da: u16x16| s + d - div255((s * da).min(&(d * sa))));
    blend_fn2!(difference, |s: u16x16, d, sa, da: u16x16| s + d - two(div255((s * da).min(&(d * sa)))));
    blend_fn2!(exclusion,  |s: u16x16, d,  _,  _| s + d - two(div255(s * d)));

    pub(crate) fn just_return(_p: &mut Pipeline) {}

    /// Drive a linked reduced-precision program over one rectangle.
    ///
    /// # Safety
    ///
    /// `program` must point at the first slot of a chain linked against this
    /// family on a tier the running CPU supports, and every context in the
    /// chain must uphold the promises made when it was appended.
    #[inline(always)]
    pub(crate) unsafe fn start(
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
        program: *const *const c_void,
    ) {
        let mut p = Pipeline {
            program,
            r: u16x16::splat(0),
            g: u16x16::splat(0),
            b: u16x16::splat(0),
            a: u16x16::splat(0),
            dr: u16x16::splat(0),
            dg: u16x16::splat(0),
            db: u16x16::splat(0),
            da: u16x16::splat(0),
            tail: 0,
            dx: 0,
            dy: 0,
        };

        for dy in y0..y1 {
            let mut dx = x0;
            while dx + STAGE_WIDTH <= x1 {
                p.program = program;
                p.dx = dx;
                p.dy = dy;
                p.tail = STAGE_WIDTH;
                unsafe { p.exec() };

                dx += STAGE_WIDTH;
            }

            if dx < x1 {
                p.program = program;
                p.dx = dx;
                p.dy = dy;
                p.tail = x1 - dx;
                unsafe { p.exec() };
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub(crate) mod hsw {
    use core::ffi::c_void;

    stage_wrappers!("avx2", "fma";
        move_source_to_destination, move_destination_to_source,
        premultiply, swap_red_blue, uniform_color,
        load_8888, load_8888_dst, store_8888, source_over_rgba,
        scale_u8, lerp_u8, scale_1_float, lerp_1_float,
        clear, source_over, destination_over, source_in, destination_in,
        source_out, destination_out, source_atop, destination_atop,
        xor, plus, modulate, multiply, screen,
        darken, lighten, difference, exclusion,
        just_return,
    );

    #[target_feature(enable = "avx2", enable = "fma")]
    pub(crate) unsafe fn start(
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
        program: *const *const c_void,
    ) {
        unsafe { super::portable::start(x0, y0, x1, y1, program) }
    }
}

#[cfg(target_arch = "x86_64")]
pub(crate) mod sse41 {
    use core::ffi::c_void;

    stage_wrappers!("sse4.1";
        move_source_to_destination, move_destination_to_source,
        premultiply, swap_red_blue, uniform_color,
        load_8888, load_8888_dst, store_8888, source_over_rgba,
        scale_u8, lerp_u8, scale_1_float, lerp_1_float,
        clear, source_over, destination_over, source_in, destination_in,
        source_out, destination_out, source_atop, destination_atop,
        xor, plus, modulate, multiply, screen,
        darken, lighten, difference, exclusion,
        just_return,
    );

    #[target_feature(enable = "sse4.1")]
    pub(crate) unsafe fn start(
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
        program: *const *const c_void,
    ) {
        unsafe { super::portable::start(x0, y0, x1, y1, program) }
    }
}

// Must be in the same order as super::Stage. `None` marks a stage this family
// cannot express; meeting one during linking falls the pipeline back to the
// standard-precision family.
macro_rules! stage_table {
    ($m:ident) => {
        [
            Some($m::move_source_to_destination as StageFn),
            Some($m::move_destination_to_source as StageFn),
            None, // clamp_0, identity in u16 math; skipped by the linker
            None, // clamp_a, identity in u16 math; skipped by the linker
            Some($m::premultiply as StageFn),
            Some($m::swap_red_blue as StageFn),
            Some($m::uniform_color as StageFn),
            None, // seed_shader
            None, // luminance_to_alpha
            Some($m::load_8888 as StageFn),
            Some($m::load_8888_dst as StageFn),
            Some($m::store_8888 as StageFn),
            Some($m::source_over_rgba as StageFn),
            Some($m::scale_u8 as StageFn),
            Some($m::lerp_u8 as StageFn),
            Some($m::scale_1_float as StageFn),
            Some($m::lerp_1_float as StageFn),
            Some($m::clear as StageFn),
            Some($m::source_over as StageFn),
            Some($m::destination_over as StageFn),
            Some($m::source_in as StageFn),
            Some($m::destination_in as StageFn),
            Some($m::source_out as StageFn),
            Some($m::destination_out as StageFn),
            Some($m::source_atop as StageFn),
            Some($m::destination_atop as StageFn),
            Some($m::xor as StageFn),
            Some($m::plus as StageFn),
            Some($m::modulate as StageFn),
            Some($m::multiply as StageFn),
            Some($m::screen as StageFn),
            Some($m::darken as StageFn),
            Some($m::lighten as StageFn),
            Some($m::difference as StageFn),
            Some($m::exclusion as StageFn),
            None, // color_burn
            None, // color_dodge
            None, // soft_light
        ]
    };
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub(crate) static BASELINE: Engine<StageFn> = Engine {
    name: "lowp-baseline",
    stages: stage_table!(portable),
    start: portable::start as StartFn,
    just_return: portable::just_return as StageFn,
};

#[cfg(target_arch = "x86_64")]
pub(crate) static SSE41: Engine<StageFn> = Engine {
    name: "lowp-sse41",
    stages: stage_table!(sse41),
    start: sse41::start as StartFn,
    just_return: sse41::just_return as StageFn,
};

#[cfg(target_arch = "x86_64")]
pub(crate) static HSW: Engine<StageFn> = Engine {
    name: "lowp-hsw",
    stages: stage_table!(hsw),
    start: hsw::start as StartFn,
    just_return: hsw::just_return as StageFn,
};
