//! Box overlay for persisted frames

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::classifier::BoundingBox;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 2;

/// Draw each box as a hollow green rectangle, grown inwards to the thickness
pub fn draw_boxes(image: &mut RgbImage, boxes: &[BoundingBox]) {
    for bbox in boxes {
        for inset in 0..BOX_THICKNESS {
            let width = bbox.width.saturating_sub(2 * inset);
            let height = bbox.height.saturating_sub(2 * inset);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32).of_size(width, height);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }
    }
}

/// Copy of `image` with the boxes drawn on it
pub fn annotated(image: &RgbImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut out = image.clone();
    draw_boxes(&mut out, boxes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_outline_is_two_pixels() {
        let mut image = RgbImage::new(50, 50);
        let bbox = BoundingBox {
            x: 10,
            y: 10,
            width: 20,
            height: 20,
        };
        draw_boxes(&mut image, &[bbox]);

        assert_eq!(*image.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*image.get_pixel(11, 15), BOX_COLOR);
        assert_eq!(*image.get_pixel(29, 29), BOX_COLOR);
        assert_eq!(*image.get_pixel(12, 15), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotated_leaves_source_untouched() {
        let image = RgbImage::new(20, 20);
        let bbox = BoundingBox {
            x: 0,
            y: 0,
            width: 5,
            height: 5,
        };
        let out = annotated(&image, &[bbox]);
        assert_eq!(*out.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_touching_edge_is_clipped() {
        let mut image = RgbImage::new(20, 20);
        let bbox = BoundingBox {
            x: 15,
            y: 15,
            width: 10,
            height: 10,
        };
        draw_boxes(&mut image, &[bbox]);
        assert_eq!(*image.get_pixel(15, 19), BOX_COLOR);
    }
}
