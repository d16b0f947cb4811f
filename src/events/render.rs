//! Annotated still rendering: draw detection boxes, labels, and a
//! timestamp onto a copy of the frame, then JPEG-encode it.
//!
//! Text is rendered with a small embedded 5x7 bitmap font rather than a
//! vector font + glyph rasterizer: there's no font asset in the workspace
//! to embed and fabricating a binary asset isn't worth it for overlay
//! text. Only uppercase letters, digits, and a handful of punctuation
//! marks are defined; anything else renders as a blank cell. Input text
//! is upper-cased before drawing.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::Cursor;

use crate::model::{BoundingBoxDetection, Resolution};

const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;
const GLYPH_SPACING: i32 = 1;
const GLYPH_SCALE: i32 = 2;

static FONT: Lazy<HashMap<char, [u8; 7]>> = Lazy::new(build_font);

fn build_font() -> HashMap<char, [u8; 7]> {
    let mut m = HashMap::new();
    m.insert(' ', [0, 0, 0, 0, 0, 0, 0]);
    m.insert('-', [0, 0, 0, 0b11111, 0, 0, 0]);
    m.insert('.', [0, 0, 0, 0, 0, 0b00110, 0b00110]);
    m.insert(':', [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0]);
    m.insert('/', [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000]);
    m.insert('%', [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011]);
    m.insert('|', [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]);
    m.insert('_', [0, 0, 0, 0, 0, 0, 0b11111]);
    m.insert('0', [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]);
    m.insert('1', [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]);
    m.insert('2', [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]);
    m.insert('3', [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110]);
    m.insert('4', [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]);
    m.insert('5', [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]);
    m.insert('6', [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]);
    m.insert('7', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]);
    m.insert('8', [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]);
    m.insert('9', [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]);
    let letters: &[(char, [u8; 7])] = &[
        ('A', [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        ('B', [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110]),
        ('C', [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
        ('D', [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100]),
        ('E', [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111]),
        ('F', [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000]),
        ('G', [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
        ('H', [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        ('I', [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        ('J', [0b00001, 0b00001, 0b00001, 0b00001, 0b10001, 0b10001, 0b01110]),
        ('K', [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001]),
        ('L', [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
        ('M', [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001]),
        ('N', [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001]),
        ('O', [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        ('P', [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
        ('Q', [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101]),
        ('R', [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
        ('S', [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110]),
        ('T', [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
        ('U', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        ('V', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100]),
        ('W', [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001]),
        ('X', [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001]),
        ('Y', [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100]),
        ('Z', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111]),
    ];
    for (c, rows) in letters {
        m.insert(*c, *rows);
    }
    m
}

fn draw_char(img: &mut RgbImage, ch: char, origin_x: i32, origin_y: i32, color: Rgb<u8>) {
    let upper = ch.to_ascii_uppercase();
    let Some(rows) = FONT.get(&upper) else { return };
    for (row_idx, row) in rows.iter().enumerate() {
        for col_idx in 0..GLYPH_W {
            let bit = (row >> (GLYPH_W - 1 - col_idx)) & 1;
            if bit == 0 {
                continue;
            }
            for sy in 0..GLYPH_SCALE {
                for sx in 0..GLYPH_SCALE {
                    let px = origin_x + col_idx * GLYPH_SCALE + sx;
                    let py = origin_y + row_idx as i32 * GLYPH_SCALE + sy;
                    if px >= 0 && py >= 0 && (px as u32) < img.width() && (py as u32) < img.height() {
                        img.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

/// Draws `text` left-to-right starting at `(x, y)`.
pub fn draw_text(img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    let mut cursor_x = x;
    let advance = (GLYPH_W + GLYPH_SPACING) * GLYPH_SCALE;
    for ch in text.chars() {
        draw_char(img, ch, cursor_x, y, color);
        cursor_x += advance;
    }
}

pub fn text_height() -> i32 {
    GLYPH_H * GLYPH_SCALE
}

/// Converts a packed BGR24 buffer to an owned `RgbImage`.
pub fn bgr_to_rgb_image(pixels: &[u8], resolution: Resolution) -> RgbImage {
    let mut img = RgbImage::new(resolution.width, resolution.height);
    for (chunk, px) in pixels.chunks_exact(3).zip(img.pixels_mut()) {
        *px = Rgb([chunk[2], chunk[1], chunk[0]]);
    }
    img
}

/// Draw a 3px-thick rectangle outline by drawing three nested hollow
/// rects, giving a 3px box weight.
fn draw_thick_rect(img: &mut RgbImage, b: &BoundingBoxDetection, color: Rgb<u8>) {
    let (x1, y1, x2, y2) = (b.box_.x1, b.box_.y1, b.box_.x2, b.box_.y2);
    let w = (x2 - x1).max(1) as u32;
    let h = (y2 - y1).max(1) as u32;
    for inset in 0..3 {
        if w <= inset as u32 * 2 || h <= inset as u32 * 2 {
            continue;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w - inset as u32 * 2, h - inset as u32 * 2);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Renders boxes, per-detection labels, and a timestamp line onto a copy
/// of `pixels`, returning JPEG bytes.
pub fn render_annotated_still(
    pixels: &[u8],
    resolution: Resolution,
    detections: &[BoundingBoxDetection],
    timestamp_label: &str,
) -> anyhow::Result<Vec<u8>> {
    let mut img = bgr_to_rgb_image(pixels, resolution);
    let box_color = Rgb([255, 0, 0]);
    let text_color = Rgb([255, 255, 0]);

    for d in detections {
        draw_thick_rect(&mut img, d, box_color);
        let label = format!("{} {:.2}", d.class_name, d.confidence);
        let label_y = (d.box_.y1 - text_height() - 2).max(0);
        draw_text(&mut img, &label, d.box_.x1.max(0), label_y, text_color);
    }

    draw_text(&mut img, timestamp_label, 4, 4, Rgb([255, 255, 255]));

    let mut buf = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageOutputFormat::Jpeg(85))?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoundingBox;

    #[test]
    fn renders_nonempty_jpeg() {
        let resolution = Resolution { width: 16, height: 16 };
        let pixels = vec![0u8; 16 * 16 * 3];
        let detections = vec![BoundingBoxDetection {
            class_name: "person".to_string(),
            class_id: 0,
            confidence: 0.91,
            box_: BoundingBox { x1: 1, y1: 1, x2: 10, y2: 10 },
        }];
        let jpeg = render_annotated_still(&pixels, resolution, &detections, "2026-07-28 12:00:00").unwrap();
        assert!(!jpeg.is_empty());
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn bgr_to_rgb_swaps_channels() {
        let resolution = Resolution { width: 1, height: 1 };
        let pixels = vec![10u8, 20, 30];
        let img = bgr_to_rgb_image(&pixels, resolution);
        assert_eq!(*img.get_pixel(0, 0), Rgb([30, 20, 10]));
    }
}
