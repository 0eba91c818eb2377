//! The panorama shown when imagery can't be loaded: a red box carrying the
//! coverage kind and id so a screenshot is enough to diagnose it.

use crate::geometry::Geometry;
use crate::projection::UvTransform;
use crate::scene::{Material, Mesh, SceneObject};
use crate::texture::Texture;
use font8x8::legacy::BASIC_LEGACY;
use glam::Quat;
use image::{Rgba, RgbaImage};
use panoid::PanoramaDescriptor;
use std::sync::Arc;

pub const TEXTURE_SIZE: u32 = 1024;
const FILL: Rgba<u8> = Rgba([0xbe, 0x00, 0x39, 0xff]);
const BORDER: Rgba<u8> = Rgba([0x6d, 0x00, 0x1a, 0xff]);
const TEXT: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
/// Half of a 16 px stroke centred on the canvas edge.
const BORDER_WIDTH: u32 = 8;
const MARGIN: u32 = 32;
const LINE_GAP: u32 = 24;
const GLYPH: u32 = 8;

fn glyph_for_char(ch: char) -> [u8; 8] {
    let index = ch as usize;
    if index < BASIC_LEGACY.len() {
        BASIC_LEGACY[index]
    } else {
        BASIC_LEGACY[b'?' as usize]
    }
}

/// Greedy word wrap to `columns` characters; words longer than a line are split.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let used = current.chars().count();
            let sep = usize::from(used > 0);
            if used + sep + word.len() <= columns {
                if sep == 1 {
                    current.push(' ');
                }
                current.extend(word.iter());
                break;
            }
            if used > 0 {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            let rest = word.split_off(columns);
            lines.push(word.iter().collect());
            word = rest;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn draw_text(img: &mut RgbaImage, line: &str, top: u32, scale: u32) {
    let line_width = line.chars().count() as u32 * GLYPH * scale;
    let left = img.width().saturating_sub(line_width) / 2;

    for (col, ch) in line.chars().enumerate() {
        let glyph = glyph_for_char(ch);
        let gx = left + col as u32 * GLYPH * scale;
        for (row, bits) in glyph.iter().enumerate() {
            for bit in 0..GLYPH {
                if (bits >> bit) & 0x01 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let x = gx + bit * scale + dx;
                        let y = top + row as u32 * scale + dy;
                        if x < img.width() && y < img.height() {
                            img.put_pixel(x, y, TEXT);
                        }
                    }
                }
            }
        }
    }
}

/// Paints the error texture. An empty id leaves the box blank.
pub fn error_image(descriptor: &PanoramaDescriptor) -> RgbaImage {
    let size = TEXTURE_SIZE;
    let mut img = RgbaImage::from_fn(size, size, |x, y| {
        let edge = x.min(y).min(size - 1 - x).min(size - 1 - y);
        if edge < BORDER_WIDTH {
            BORDER
        } else {
            FILL
        }
    });

    if descriptor.id.is_empty() {
        return img;
    }

    let blocks = [
        ("Failed to load panorama.".to_owned(), 5),
        (format!("Coverage: {}", descriptor.kind), 3),
        (format!("PanoID: {}", descriptor.id), 2),
    ];

    let usable = size - 2 * MARGIN;
    let laid_out: Vec<(Vec<String>, u32)> = blocks
        .iter()
        .map(|(text, scale)| (wrap(text, (usable / (GLYPH * scale)) as usize), *scale))
        .collect();

    let total: u32 = laid_out
        .iter()
        .map(|(lines, scale)| lines.len() as u32 * GLYPH * scale)
        .sum::<u32>()
        + LINE_GAP * (laid_out.len() as u32 - 1);

    let mut top = size.saturating_sub(total) / 2;
    for (lines, scale) in &laid_out {
        for line in lines {
            draw_text(&mut img, line, top, *scale);
            top += GLYPH * scale;
        }
        top += LINE_GAP;
    }
    img
}

/// Builds the error panorama object: an inverted box of edge `size`, every
/// face showing the error texture, initially transparent.
pub fn error_panorama(descriptor: &PanoramaDescriptor, size: f32) -> SceneObject {
    let texture = Arc::new(Texture::new(
        format!("error:{}", descriptor),
        error_image(descriptor),
    ));
    let mesh = Mesh {
        geometry: Arc::new(Geometry::inverted_box(size)),
        material: Material::fading(texture, UvTransform::IDENTITY),
        render_order: 1,
    };
    SceneObject::panorama(Quat::IDENTITY, vec![mesh])
}
