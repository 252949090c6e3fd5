// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composites a translucent red square over a checkerboard and writes the
//! result to stdout as a binary PPM:
//!
//! ```sh
//! cargo run --example composite > out.ppm
//! ```

use std::io::Write;

use riptide_cpu::{PixelsCtx, Pixmap, RasterPipeline, Stage, UniformColorCtx};
use riptide_common::peniko::color::PremulRgba8;

const SIZE: u16 = 256;

fn main() {
    let mut pixmap = Pixmap::new(SIZE, SIZE);
    for y in 0..SIZE {
        for x in 0..SIZE {
            let v = if (x / 32 + y / 32) % 2 == 0 { 200 } else { 80 };
            pixmap.set_pixel(x, y, PremulRgba8 { r: v, g: v, b: v, a: 255 });
        }
    }

    let pixels = PixelsCtx::from_pixmap(&mut pixmap);
    // Premultiplied 60% red.
    let red = UniformColorCtx::new(0.6, 0.0, 0.0, 0.6);

    let mut pipeline = RasterPipeline::new();
    // SAFETY: `red` and `pixmap` outlive the runs below, and the rectangle
    // stays inside the pixmap.
    unsafe {
        pipeline.append_with_context(Stage::UniformColor, &red);
        pipeline.append_with_context(Stage::SourceOverRgba, &pixels);
    }

    let compiled = pipeline.compile();
    compiled.run(32, 32, 192, 192);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "P6\n{SIZE} {SIZE}\n255").unwrap();
    for px in pixmap.data() {
        out.write_all(&[px.r, px.g, px.b]).unwrap();
    }
}
