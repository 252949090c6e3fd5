// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end pipeline runs over real pixmaps.
//!
//! The expected values below are exact for both kernel families, so the
//! tests hold regardless of which engine the running CPU selects.

use riptide_common::peniko::color::PremulRgba8;
use riptide_cpu::{MaskCtx, PixelsCtx, Pixmap, RasterPipeline, Stage, UniformColorCtx};

fn px(r: u8, g: u8, b: u8, a: u8) -> PremulRgba8 {
    PremulRgba8 { r, g, b, a }
}

#[test]
fn uniform_color_fills_the_rect() {
    let mut pixmap = Pixmap::new(8, 8);
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    let color = UniformColorCtx::new(1.0, 0.5, 0.25, 1.0);

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::UniformColor, &color);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(0, 0, 8, 8);

    for y in 0..8 {
        for x in 0..8 {
            assert_eq!(pixmap.sample(x, y).to_u32(), px(255, 128, 64, 255).to_u32());
        }
    }
}

#[test]
fn source_over_composites() {
    let mut pixmap = Pixmap::new(16, 1);
    pixmap.fill(px(0, 0, 255, 255));
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    // Premultiplied half-transparent red.
    let color = UniformColorCtx::new(128.0 / 255.0, 0.0, 0.0, 128.0 / 255.0);

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::Load8888Dst, &pixels);
        p.append_with_context(Stage::UniformColor, &color);
        p.append(Stage::SourceOver);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(0, 0, 16, 1);

    for x in 0..16 {
        assert_eq!(pixmap.sample(x, 0).to_u32(), px(128, 0, 127, 255).to_u32());
    }
}

#[test]
fn fused_source_over_matches_the_split_version() {
    let mut split = Pixmap::new(16, 1);
    split.fill(px(0, 0, 255, 255));
    let mut fused = split.clone();

    let color = UniformColorCtx::new(128.0 / 255.0, 0.0, 0.0, 128.0 / 255.0);

    {
        let pixels = PixelsCtx::from_pixmap(&mut split);
        let mut p = RasterPipeline::new();
        unsafe {
            p.append_with_context(Stage::Load8888Dst, &pixels);
            p.append_with_context(Stage::UniformColor, &color);
            p.append(Stage::SourceOver);
            p.append_with_context(Stage::Store8888, &pixels);
        }
        p.run(0, 0, 16, 1);
    }
    {
        let pixels = PixelsCtx::from_pixmap(&mut fused);
        let mut p = RasterPipeline::new();
        unsafe {
            p.append_with_context(Stage::UniformColor, &color);
            p.append_with_context(Stage::SourceOverRgba, &pixels);
        }
        p.run(0, 0, 16, 1);
    }

    assert_eq!(split.data_as_u8_slice(), fused.data_as_u8_slice());
}

#[test]
fn partial_batches_stay_inside_the_rect() {
    // 21 columns: neither a multiple of the lowp batch (16) nor the highp
    // one (8), so both families take the tail path.
    let mut pixmap = Pixmap::new(32, 4);
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    let color = UniformColorCtx::new(0.0, 1.0, 0.0, 1.0);

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::UniformColor, &color);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(3, 1, 21, 2);

    let inside = px(0, 255, 0, 255).to_u32();
    for y in 0..4 {
        for x in 0..32 {
            let expected = if (3..24).contains(&x) && (1..3).contains(&y) {
                inside
            } else {
                0
            };
            assert_eq!(pixmap.sample(x, y).to_u32(), expected, "({x}, {y})");
        }
    }
}

#[test]
fn scale_u8_applies_per_pixel_coverage() {
    let width = 16_u16;
    let mask: Vec<u8> = (0..width).map(|x| (x * 17) as u8).collect();

    let mut pixmap = Pixmap::new(width, 1);
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    let mask_ctx = MaskCtx::new(&mask, width as usize);
    let white = UniformColorCtx::new(1.0, 1.0, 1.0, 1.0);

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::UniformColor, &white);
        p.append_with_context(Stage::ScaleU8, &mask_ctx);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(0, 0, width as usize, 1);

    // Scaling opaque white by coverage m yields exactly (m, m, m, m) in
    // both families.
    for x in 0..width {
        let m = (x * 17) as u8;
        assert_eq!(pixmap.sample(x, 0).to_u32(), px(m, m, m, m).to_u32());
    }
}

#[test]
fn screen_blend() {
    let mut pixmap = Pixmap::new(8, 1);
    pixmap.fill(px(128, 128, 128, 255));
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    let gray = UniformColorCtx::new(128.0 / 255.0, 128.0 / 255.0, 128.0 / 255.0, 1.0);

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::Load8888Dst, &pixels);
        p.append_with_context(Stage::UniformColor, &gray);
        p.append(Stage::Screen);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(0, 0, 8, 1);

    for x in 0..8 {
        assert_eq!(pixmap.sample(x, 0).to_u32(), px(192, 192, 192, 255).to_u32());
    }
}

#[test]
fn swap_red_blue_swaps_channels() {
    let mut pixmap = Pixmap::new(4, 1);
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    let color = UniformColorCtx::new(1.0, 0.5, 0.25, 1.0);

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::UniformColor, &color);
        p.append(Stage::SwapRedBlue);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(0, 0, 4, 1);

    assert_eq!(pixmap.sample(0, 0).to_u32(), px(64, 128, 255, 255).to_u32());
}

#[test]
fn seed_shader_writes_device_coordinates() {
    // The seed shader only exists at standard precision, so this also
    // exercises the full fallback path end to end.
    let mut pixmap = Pixmap::new(20, 2);
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);

    let mut p = RasterPipeline::new();
    p.append(Stage::SeedShader);
    unsafe {
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(0, 0, 20, 2);

    for y in 0..2 {
        for x in 0..20 {
            // r = x + 0.5 and g = y + 0.5 in pixel units, saturating on
            // store for every x/y >= 1; b = 1.0, a = 0.
            let r = if x == 0 { 128 } else { 255 };
            let g = if y == 0 { 128 } else { 255 };
            assert_eq!(pixmap.sample(x, y).to_u32(), px(r, g, 255, 0).to_u32(), "({x}, {y})");
        }
    }
}

#[test]
fn clamps_are_transparent_to_the_result() {
    let mut plain = Pixmap::new(16, 1);
    let mut clamped = Pixmap::new(16, 1);
    let color = UniformColorCtx::new(0.75, 0.5, 0.25, 1.0);

    {
        let pixels = PixelsCtx::from_pixmap(&mut plain);
        let mut p = RasterPipeline::new();
        unsafe {
            p.append_with_context(Stage::UniformColor, &color);
            p.append_with_context(Stage::Store8888, &pixels);
        }
        p.run(0, 0, 16, 1);
    }
    {
        let pixels = PixelsCtx::from_pixmap(&mut clamped);
        let mut p = RasterPipeline::new();
        unsafe {
            p.append_with_context(Stage::UniformColor, &color);
            p.append(Stage::Clamp0);
            p.append(Stage::ClampA);
            p.append_with_context(Stage::Store8888, &pixels);
        }
        p.run(0, 0, 16, 1);
    }

    assert_eq!(plain.data_as_u8_slice(), clamped.data_as_u8_slice());
}

#[test]
fn compiled_pipeline_reruns_with_new_geometry() {
    let mut pixmap = Pixmap::new(24, 3);
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    let color = UniformColorCtx::new(1.0, 0.0, 0.0, 1.0);

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::UniformColor, &color);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    let compiled = p.compile();

    compiled.run(0, 0, 5, 1);
    compiled.run(10, 2, 14, 1);

    let red = px(255, 0, 0, 255).to_u32();
    for x in 0..24 {
        assert_eq!(pixmap.sample(x, 0).to_u32(), if x < 5 { red } else { 0 });
        assert_eq!(pixmap.sample(x, 1).to_u32(), 0);
        assert_eq!(pixmap.sample(x, 2).to_u32(), if x >= 10 { red } else { 0 });
    }
}

#[test]
fn empty_pipeline_touches_nothing() {
    let p = RasterPipeline::new();
    p.run(0, 0, 64, 64);
    p.compile().run(0, 0, 64, 64);
}

#[test]
fn lerp_1_float_mixes_src_and_dst() {
    let mut pixmap = Pixmap::new(8, 1);
    pixmap.fill(px(0, 0, 0, 255));
    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    let white = UniformColorCtx::new(1.0, 1.0, 1.0, 1.0);
    let t = 0.5_f32;

    let mut p = RasterPipeline::new();
    unsafe {
        p.append_with_context(Stage::Load8888Dst, &pixels);
        p.append_with_context(Stage::UniformColor, &white);
        p.append_with_context(Stage::Lerp1Float, &t);
        p.append_with_context(Stage::Store8888, &pixels);
    }
    p.run(0, 0, 8, 1);

    // Halfway between black and white; 0.5 quantizes to 128/255 in both
    // families, and alpha stays opaque.
    for x in 0..8 {
        assert_eq!(pixmap.sample(x, 0).to_u32(), px(128, 128, 128, 255).to_u32());
    }
}
