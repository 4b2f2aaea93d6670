//! Black preview tile listing patient metadata in white text.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{GrayImage, ImageResult, Luma, codecs::jpeg::JpegEncoder};
use std::{fs::File, io::BufWriter, path::Path};

pub const GLYPH_SIZE: u32 = 8;
/// Baseline distance between consecutive lines
pub const LINE_STEP: u32 = 15;

/// Draw `lines` onto a `size`×`size` black tile. Text past the edges is clipped.
pub fn render_info_card(lines: &[String], size: u32) -> GrayImage {
    let mut image = GrayImage::new(size, size);

    for (row, line) in lines.iter().enumerate() {
        let baseline = (row as u32 + 1) * LINE_STEP;
        let top = baseline.saturating_sub(GLYPH_SIZE);
        for (column, c) in line.chars().enumerate() {
            let left = column as u32 * GLYPH_SIZE;
            if left >= size {
                break;
            }
            draw_glyph(&mut image, c, left, top);
        }
    }

    image
}

fn draw_glyph(image: &mut GrayImage, c: char, left: u32, top: u32) {
    let Some(glyph) = BASIC_FONTS.get(c).or_else(|| BASIC_FONTS.get('?')) else {
        return;
    };

    for (dy, &bits) in glyph.iter().enumerate() {
        for dx in 0..GLYPH_SIZE {
            if bits & (1u8 << dx) == 0 {
                continue;
            }
            let (x, y) = (left + dx, top + dy as u32);
            if x < image.width() && y < image.height() {
                image.put_pixel(x, y, Luma([255]));
            }
        }
    }
}

pub fn save_jpeg(image: &GrayImage, path: impl AsRef<Path>, quality: u8) -> ImageResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    image.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_card_is_black() {
        let image = render_info_card(&[], 128);
        assert_eq!(image.dimensions(), (128, 128));
        assert!(image.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn lines_are_drawn_on_their_rows() {
        let lines = vec!["I".to_owned(), String::new(), "I".to_owned()];
        let image = render_info_card(&lines, 64);

        let lit_rows: Vec<u32> = (0..64)
            .filter(|&y| (0..64).any(|x| image.get_pixel(x, y).0[0] == 255))
            .collect();
        assert!(!lit_rows.is_empty());
        assert!(lit_rows.iter().all(|&y| (7..15).contains(&y) || (37..45).contains(&y)));
    }

    #[test]
    fn long_lines_are_clipped() {
        let line = "W".repeat(100);
        let image = render_info_card(&[line], 16);
        assert_eq!(image.dimensions(), (16, 16));
    }

    #[test]
    fn saves_a_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.jpeg");
        save_jpeg(&render_info_card(&["ID: 7".to_owned()], 32), &path, 100).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
