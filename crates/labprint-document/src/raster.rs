// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster geometry and pixel-format conversion for device output.
//
// Pages are scaled to fit the printable area without ever being enlarged,
// centred, and converted to the byte layout the device context expects.

use image::DynamicImage;

/// Byte layout a device context accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed R,G,B rows with no padding.
    Rgb24,
    /// One byte per pixel, no padding.
    Gray8,
    /// B,G,R rows padded to a multiple of four bytes (DIB layout), top-down.
    Bgr24Padded,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgb24 | Self::Bgr24Padded => 3,
            Self::Gray8 => 1,
        }
    }

    /// Bytes per row for an image `width` pixels wide.
    pub fn stride(&self, width: u32) -> usize {
        let row = width as usize * self.bytes_per_pixel();
        match self {
            Self::Bgr24Padded => (row + 3) & !3,
            Self::Rgb24 | Self::Gray8 => row,
        }
    }
}

/// A page image ready to be handed to a device context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBitmap {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Printable area and resolution of a device context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceGeometry {
    pub printable_width_px: u32,
    pub printable_height_px: u32,
    pub dpi_x: f32,
    pub dpi_y: f32,
}

impl DeviceGeometry {
    /// Render resolution (dots per inch) for a page of `page_w_pt` x `page_h_pt`.
    ///
    /// The page at this resolution fits the printable area with its aspect
    /// ratio intact, and never exceeds the device resolution.
    pub fn fit_dpi(&self, page_w_pt: f32, page_h_pt: f32) -> f32 {
        if page_w_pt <= 0.0 || page_h_pt <= 0.0 {
            return self.dpi_x;
        }
        let native_w = page_w_pt * self.dpi_x / 72.0;
        let native_h = page_h_pt * self.dpi_y / 72.0;
        let fit = (self.printable_width_px as f32 / native_w)
            .min(self.printable_height_px as f32 / native_h)
            .min(1.0);
        fit * self.dpi_x
    }

    /// Top-left position that centres an image in the printable area.
    pub fn centred_origin(&self, width: u32, height: u32) -> (i32, i32) {
        let x = (self.printable_width_px as i64 - width as i64) / 2;
        let y = (self.printable_height_px as i64 - height as i64) / 2;
        (x.max(0) as i32, y.max(0) as i32)
    }
}

/// Convert a rendered page into `format`.
pub fn to_device_bitmap(image: &DynamicImage, format: PixelFormat) -> DeviceBitmap {
    let width = image.width();
    let height = image.height();
    let stride = format.stride(width);

    let data = match format {
        PixelFormat::Rgb24 => image.to_rgb8().into_raw(),
        PixelFormat::Gray8 => image.to_luma8().into_raw(),
        PixelFormat::Bgr24Padded => {
            let rgb = image.to_rgb8();
            let mut data = vec![0u8; stride * height as usize];
            for (y, row) in rgb.rows().enumerate() {
                let line = &mut data[y * stride..y * stride + width as usize * 3];
                for (px, out) in row.zip(line.chunks_exact_mut(3)) {
                    out[0] = px.0[2];
                    out[1] = px.0[1];
                    out[2] = px.0[0];
                }
            }
            data
        }
    };

    DeviceBitmap {
        width,
        height,
        stride,
        format,
        data,
    }
}
