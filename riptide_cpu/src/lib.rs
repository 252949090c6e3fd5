// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A CPU raster pipeline with runtime engine selection.
//!
//! Describe a pixel transformation as an ordered sequence of [`Stage`]s,
//! then run it over a rectangle. The crate ships two precompiled kernel
//! families (a full-precision f32 one and a faster reduced-precision u16
//! one), each built for several instruction-set tiers. On first use the best
//! tier for the running CPU is picked, and every pipeline is linked against
//! the reduced-precision family when all of its stages exist there, falling
//! back to full precision as a whole otherwise.
//!
//! ```
//! use riptide_cpu::{PixelsCtx, Pixmap, RasterPipeline, Stage, UniformColorCtx};
//!
//! let mut pixmap = Pixmap::new(64, 64);
//! let pixels = PixelsCtx::from_pixmap(&mut pixmap);
//! let color = UniformColorCtx::new(0.5, 0.0, 0.0, 0.5);
//!
//! let mut pipeline = RasterPipeline::new();
//! // SAFETY: `color` and `pixmap` outlive the run, and the rectangle stays
//! // inside the pixmap.
//! unsafe {
//!     pipeline.append_with_context(Stage::UniformColor, &color);
//!     pipeline.append_with_context(Stage::SourceOverRgba, &pixels);
//! }
//! pipeline.run(0, 0, 64, 64);
//! ```

mod engine;
mod pipeline;
mod stages;

pub use engine::{set_lowp_fallback_hook, FallbackHook};
pub use pipeline::{CompiledPipeline, RasterPipeline};
pub use riptide_common::pixmap::Pixmap;
pub use stages::{MaskCtx, PixelsCtx, Stage, UniformColorCtx};
