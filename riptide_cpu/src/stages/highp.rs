// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The standard-precision kernel family.
//!
//! Computes in f32, eight pixels per batch. This family is total: every
//! [`Stage`](super::Stage) has an implementation here, which is what makes it
//! the safe landing spot when the reduced-precision link attempt fails.

use core::ffi::c_void;

use riptide_common::peniko::color::PremulRgba8;
use riptide_common::wide::f32x8;
use wide::{CmpEq, CmpGt, CmpLe};

use super::{MaskCtx, PixelsCtx, StartFn, UniformColorCtx};
use crate::engine::Engine;

pub(crate) const STAGE_WIDTH: usize = 8;

pub(crate) type StageFn = unsafe fn(&mut Pipeline);

/// One in-flight batch of pixels: the source and destination registers, the
/// program cursor, and the batch geometry.
#[derive(Debug)]
pub(crate) struct Pipeline {
    program: *const *const c_void,
    r: f32x8,
    g: f32x8,
    b: f32x8,
    a: f32x8,
    dr: f32x8,
    dg: f32x8,
    db: f32x8,
    da: f32x8,
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
            p.a = mad(p.da, inv(p.a), p.a);

            p.next_stage(1);
        }
    };
}

pub(crate) mod portable {
    use super::*;

    #[inline(always)]
    fn mad(f: f32x8, m: f32x8, a: f32x8) -> f32x8 {
        f * m + a
    }

    #[inline(always)]
    fn inv(v: f32x8) -> f32x8 {
        f32x8::splat(1.0) - v
    }

    #[inline(always)]
    fn two(v: f32x8) -> f32x8 {
        v + v
    }

    #[inline(always)]
    fn lerp(from: f32x8, to: f32x8, t: f32x8) -> f32x8 {
        mad(to - from, t, from)
    }

    #[inline(always)]
    fn to_u8(v: f32) -> u8 {
        (v * 255.0 + 0.5) as u8
    }

    #[inline(always)]
    fn gather(tmp: &[PremulRgba8; STAGE_WIDTH], ch: fn(&PremulRgba8) -> u8) -> f32x8 {
        f32x8::from([
            ch(&tmp[0]) as f32,
            ch(&tmp[1]) as f32,
            ch(&tmp[2]) as f32,
            ch(&tmp[3]) as f32,
            ch(&tmp[4]) as f32,
            ch(&tmp[5]) as f32,
            ch(&tmp[6]) as f32,
            ch(&tmp[7]) as f32,
        ]) * f32x8::splat(1.0 / 255.0)
    }

    #[inline(always)]
    unsafe fn load_rgba(
        ptr: *const PremulRgba8,
        tail: usize,
        r: &mut f32x8,
        g: &mut f32x8,
        b: &mut f32x8,
        a: &mut f32x8,
    ) {
        let mut tmp = [PremulRgba8::from_u32(0); STAGE_WIDTH];
        unsafe { core::ptr::copy_nonoverlapping(ptr, tmp.as_mut_ptr(), tail) };
        *r = gather(&tmp, |p| p.r);
        *g = gather(&tmp, |p| p.g);
        *b = gather(&tmp, |p| p.b);
        *a = gather(&tmp, |p| p.a);
    }

    #[inline(always)]
    unsafe fn store_rgba(
        r: &f32x8,
        g: &f32x8,
        b: &f32x8,
        a: &f32x8,
        ptr: *mut PremulRgba8,
        tail: usize,
    ) {
        let (r, g, b, a) = (r.to_array(), g.to_array(), b.to_array(), a.to_array());
        let mut tmp = [PremulRgba8::from_u32(0); STAGE_WIDTH];
        for i in 0..STAGE_WIDTH {
            tmp[i] = PremulRgba8 {
                r: to_u8(r[i]),
                g: to_u8(g[i]),
                b: to_u8(b[i]),
                a: to_u8(a[i]),
            };
        }
        unsafe { core::ptr::copy_nonoverlapping(tmp.as_ptr(), ptr, tail) };
    }

    #[inline(always)]
    unsafe fn load_coverage(ptr: *const u8, tail: usize) -> f32x8 {
        let mut tmp = [0_u8; STAGE_WIDTH];
        unsafe { core::ptr::copy_nonoverlapping(ptr, tmp.as_mut_ptr(), tail) };
        f32x8::from([
            tmp[0] as f32,
            tmp[1] as f32,
            tmp[2] as f32,
            tmp[3] as f32,
            tmp[4] as f32,
            tmp[5] as f32,
            tmp[6] as f32,
            tmp[7] as f32,
        ]) * f32x8::splat(1.0 / 255.0)
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
    pub(crate) fn clamp_0(p: &mut Pipeline) {
        p.r = p.r.max(f32x8::splat(0.0));
        p.g = p.g.max(f32x8::splat(0.0));
        p.b = p.b.max(f32x8::splat(0.0));
        p.a = p.a.max(f32x8::splat(0.0));

        p.next_stage(1);
    }

    #[inline(always)]
    pub(crate) fn clamp_a(p: &mut Pipeline) {
        p.r = p.r.min(f32x8::splat(1.0));
        p.g = p.g.min(f32x8::splat(1.0));
        p.b = p.b.min(f32x8::splat(1.0));
        p.a = p.a.min(f32x8::splat(1.0));

        p.next_stage(1);
    }

    #[inline(always)]
    pub(crate) fn premultiply(p: &mut Pipeline) {
        p.r = p.r * p.a;
        p.g = p.g * p.a;
        p.b = p.b * p.a;

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
        p.r = f32x8::splat(ctx.r);
        p.g = f32x8::splat(ctx.g);
        p.b = f32x8::splat(ctx.b);
        p.a = f32x8::splat(ctx.a);

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn seed_shader(p: &mut Pipeline) {
        let iota = f32x8::from([0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5]);

        p.r = f32x8::splat(p.dx as f32) + iota;
        p.g = f32x8::splat(p.dy as f32 + 0.5);
        p.b = f32x8::splat(1.0);
        p.a = f32x8::splat(0.0);

        p.dr = f32x8::splat(0.0);
        p.dg = f32x8::splat(0.0);
        p.db = f32x8::splat(0.0);
        p.da = f32x8::splat(0.0);

        p.next_stage(1);
    }

    #[inline(always)]
    pub(crate) fn luminance_to_alpha(p: &mut Pipeline) {
        p.a = p.r * f32x8::splat(0.2126)
            + p.g * f32x8::splat(0.7152)
            + p.b * f32x8::splat(0.0722);
        p.r = f32x8::splat(0.0);
        p.g = f32x8::splat(0.0);
        p.b = f32x8::splat(0.0);

        p.next_stage(1);
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

            p.r = mad(p.dr, inv(p.a), p.r);
            p.g = mad(p.dg, inv(p.a), p.g);
            p.b = mad(p.db, inv(p.a), p.b);
            p.a = mad(p.da, inv(p.a), p.a);

            store_rgba(&p.r, &p.g, &p.b, &p.a, ptr, p.tail);
        }

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn scale_u8(p: &mut Pipeline) {
        let ctx = unsafe { *p.stage_ctx::<MaskCtx>() };
        let c = unsafe { load_coverage(ctx.ptr_at_xy(p.dx, p.dy), p.tail) };

        p.r = p.r * c;
        p.g = p.g * c;
        p.b = p.b * c;
        p.a = p.a * c;

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
        let c = f32x8::splat(unsafe { *p.stage_ctx::<f32>() });

        p.r = p.r * c;
        p.g = p.g * c;
        p.b = p.b * c;
        p.a = p.a * c;

        p.next_stage(2);
    }

    #[inline(always)]
    pub(crate) fn lerp_1_float(p: &mut Pipeline) {
        let c = f32x8::splat(unsafe { *p.stage_ctx::<f32>() });

        p.r = lerp(p.dr, p.r, c);
        p.g = lerp(p.dg, p.g, c);
        p.b = lerp(p.db, p.b, c);
        p.a = lerp(p.da, p.a, c);

        p.next_stage(2);
    }

    blend_fn!(clear,            |_, _,  _,  _| f32x8::splat(0.0));
    blend_fn!(source_over,      |s, d, sa,  _| mad(d, inv(sa), s));
    blend_fn!(destination_over, |s, d,  _, da| mad(s, inv(da), d));
    blend_fn!(source_in,        |s, _,  _, da| s * da);
    blend_fn!(destination_in,   |_, d, sa,  _| d * sa);
    blend_fn!(source_out,       |s, _,  _, da| s * inv(da));
    blend_fn!(destination_out,  |_, d, sa,  _| d * inv(sa));
    blend_fn!(source_atop,      |s, d, sa, da| s * da + d * inv(sa));
    blend_fn!(destination_atop, |s, d, sa, da| d * sa + s * inv(da));
    blend_fn!(xor,              |s, d, sa, da| s * inv(da) + d * inv(sa));
    blend_fn!(modulate,         |s, d,  _,  _| s * d);
    blend_fn!(multiply,         |s, d, sa, da| s * inv(da) + d * inv(sa) + s * d);
    blend_fn!(screen,           |s, d,  _,  _| s + d - s * d);

    // Wants a type for some reason.
    blend_fn!(plus, |s: f32x8, d: f32x8, _, _| (s + d).min(f32x8::splat(1.0)));

    blend_fn2!(darken,     |s: f32x8, d, sa, da: f32x8| s + d - (s * da).max(d * sa));
    blend_fn2!(lighten,    |s: f32x8, d, sa, da: f32x8| s + d - (s * da).min(d * sa));
    blend_fn2!(difference, |s: f32x8, d, sa, da: f32x8| s + d - two((s * da).min(d * sa)));
    blend_fn2!(exclusion,  |s: f32x8, d,  _,  _| s + d - two(s * d));

    blend_fn2!(color_burn, |s: f32x8, d: f32x8, sa: f32x8, da: f32x8| d
        .cmp_eq(da)
        .blend(
            d * inv(sa) + s * inv(da),
            s.cmp_eq(f32x8::splat(0.0)).blend(
                d * inv(sa),
                sa * (da - da.min((da - d) * sa / s)) + s * inv(da) + d * inv(sa),
            ),
        ));

    blend_fn2!(color_dodge, |s: f32x8, d: f32x8, sa: f32x8, da: f32x8| d
        .cmp_eq(f32x8::splat(0.0))
        .blend(
            s * inv(da),
            s.cmp_eq(sa).blend(
                s + d * inv(sa),
                sa * da.min((d * sa) / (sa - s)) + s * inv(da) + d * inv(sa),
            ),
        ));

    blend_fn2!(soft_light, |s: f32x8, d: f32x8, sa: f32x8, da: f32x8| {
        let m = da.cmp_gt(f32x8::splat(0.0)).blend(d / da, f32x8::splat(0.0));
        let s2 = two(s);
        let m4 = two(two(m));

        // The logic forks three ways:
        //    1. dark src?
        //    2. light src, dark dst?
        //    3. light src, light dst?
        let dark_src = d * (sa + (s2 - sa) * (f32x8::splat(1.0) - m));
        let dark_dst = (m4 * m4 + m4) * (m - f32x8::splat(1.0)) + f32x8::splat(7.0) * m;
        let lite_dst = m.sqrt() - m;
        let lite_src =
            d * sa + da * (s2 - sa) * two(two(d)).cmp_le(da).blend(dark_dst, lite_dst);

        s * inv(da) + d * inv(sa) + s2.cmp_le(sa).blend(dark_src, lite_src)
    });

    pub(crate) fn just_return(_p: &mut Pipeline) {}

    /// Drive a linked standard-precision program over one rectangle.
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
            r: f32x8::splat(0.0),
            g: f32x8::splat(0.0),
            b: f32x8::splat(0.0),
            a: f32x8::splat(0.0),
            dr: f32x8::splat(0.0),
            dg: f32x8::splat(0.0),
            db: f32x8::splat(0.0),
            da: f32x8::splat(0.0),
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
        move_source_to_destination, move_destination_to_source, clamp_0, clamp_a,
        premultiply, swap_red_blue, uniform_color, seed_shader, luminance_to_alpha,
        load_8888, load_8888_dst, store_8888, source_over_rgba,
        scale_u8, lerp_u8, scale_1_float, lerp_1_float,
        clear, source_over, destination_over, source_in, destination_in,
        source_out, destination_out, source_atop, destination_atop,
        xor, plus, modulate, multiply, screen,
        darken, lighten, difference, exclusion,
        color_burn, color_dodge, soft_light,
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
        move_source_to_destination, move_destination_to_source, clamp_0, clamp_a,
        premultiply, swap_red_blue, uniform_color, seed_shader, luminance_to_alpha,
        load_8888, load_8888_dst, store_8888, source_over_rgba,
        scale_u8, lerp_u8, scale_1_float, lerp_1_float,
        clear, source_over, destination_over, source_in, destination_in,
        source_out, destination_out, source_atop, destination_atop,
        xor, plus, modulate, multiply, screen,
        darken, lighten, difference, exclusion,
        color_burn, color_dodge, soft_light,
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

// Must be in the same order as super::Stage.
macro_rules! stage_table {
    ($m:ident) => {
        [
            Some($m::move_source_to_destination as StageFn),
            Some($m::move_destination_to_source as StageFn),
            Some($m::clamp_0 as StageFn),
            Some($m::clamp_a as StageFn),
            Some($m::premultiply as StageFn),
            Some($m::swap_red_blue as StageFn),
            Some($m::uniform_color as StageFn),
            Some($m::seed_shader as StageFn),
            Some($m::luminance_to_alpha as StageFn),
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
            Some($m::color_burn as StageFn),
            Some($m::color_dodge as StageFn),
            Some($m::soft_light as StageFn),
        ]
    };
}

pub(crate) static BASELINE: Engine<StageFn> = Engine {
    name: "highp-baseline",
    stages: stage_table!(portable),
    start: portable::start as StartFn,
    just_return: portable::just_return as StageFn,
};

#[cfg(target_arch = "x86_64")]
pub(crate) static SSE41: Engine<StageFn> = Engine {
    name: "highp-sse41",
    stages: stage_table!(sse41),
    start: sse41::start as StartFn,
    just_return: sse41::just_return as StageFn,
};

#[cfg(target_arch = "x86_64")]
pub(crate) static HSW: Engine<StageFn> = Engine {
    name: "highp-hsw",
    stages: stage_table!(hsw),
    start: hsw::start as StartFn,
    just_return: hsw::just_return as StageFn,
};
