// Copyright 2026 the Riptide Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared leaf material for the Riptide raster pipeline: runtime CPU
//! capability detection, the portable wide vector types the pipeline kernels
//! are written against, and a premultiplied RGBA8 pixmap for the load/store
//! stages to target.

pub mod cpu;
pub mod pixmap;
pub mod wide;

pub use peniko;
