use super::*;
use crate::foundation::core::Affine;
use std::sync::Arc;

fn quad_frame() -> DecodedFrame {
    // Top-left red, top-right green, bottom-left blue, bottom-right white.
    let pixels: Vec<u8> = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 255, 255],
    ]
    .concat();
    DecodedFrame {
        width: 2,
        height: 2,
        pixels: Arc::from(pixels),
        pts_ms: 0,
    }
}

fn gray_frame() -> DecodedFrame {
    DecodedFrame {
        width: 2,
        height: 1,
        pixels: Arc::from(vec![100u8, 100, 100, 255, 100, 100, 100, 255]),
        pts_ms: 0,
    }
}

fn effect(transform: Affine, opacity: f32) -> FrameEffect {
    FrameEffect {
        transform,
        opacity,
        sepia: 0.0,
        sepia_center: None,
        volume: 1.0,
    }
}

fn black(w: u32, h: u32) -> Surface {
    let mut s = Surface::new(Canvas::new(w, h).unwrap());
    s.clear([0, 0, 0, 255]);
    s
}

#[test]
fn identity_sprite_fills_a_square_surface_upright() {
    let mut s = black(8, 8);
    let touched = s.draw_sprite(&quad_frame(), &effect(Affine::IDENTITY, 1.0));
    assert_eq!(touched, 64);
    assert_eq!(s.pixel(0, 0), [255, 0, 0, 255]);
    assert_eq!(s.pixel(7, 0), [0, 255, 0, 255]);
    assert_eq!(s.pixel(0, 7), [0, 0, 255, 255]);
    assert_eq!(s.pixel(7, 7), [255, 255, 255, 255]);
}

#[test]
fn scaled_sprite_only_covers_its_footprint() {
    let mut s = black(8, 8);
    let touched = s.draw_sprite(&quad_frame(), &effect(Affine::scale(0.5), 1.0));
    assert_eq!(touched, 16);
    assert_eq!(s.pixel(0, 0), [0, 0, 0, 255]);
    assert_eq!(s.pixel(2, 2), [255, 0, 0, 255]);
    assert_eq!(s.pixel(5, 5), [255, 255, 255, 255]);
}

#[test]
fn half_opacity_blends_over_the_background() {
    let mut s = black(4, 4);
    s.draw_sprite(&quad_frame(), &effect(Affine::IDENTITY, 0.5));
    assert_eq!(s.pixel(0, 0), [128, 0, 0, 255]);
}

#[test]
fn degenerate_or_invisible_sprites_draw_nothing() {
    let mut s = black(4, 4);
    assert_eq!(s.draw_sprite(&quad_frame(), &effect(Affine::scale(0.0), 1.0)), 0);
    assert_eq!(s.draw_sprite(&quad_frame(), &effect(Affine::IDENTITY, 0.0)), 0);
    assert!(s.data().chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
}

#[test]
fn sepia_tone_is_blended_by_amount() {
    assert_eq!(sepia([100, 100, 100, 255], 0.0), [100, 100, 100, 255]);
    assert_eq!(sepia([100, 100, 100, 255], 1.0), [135, 120, 94, 255]);
    // Bright input saturates before blending.
    assert_eq!(sepia([255, 255, 255, 255], 1.0), [255, 255, 239, 255]);
}

#[test]
fn sepia_center_splits_the_frame() {
    let mut s = black(8, 8);
    let mut fx = effect(Affine::IDENTITY, 1.0);
    fx.sepia = 1.0;
    fx.sepia_center = Some(0.5);
    s.draw_sprite(&gray_frame(), &fx);
    assert_eq!(s.pixel(0, 0), [135, 120, 94, 255]);
    assert_eq!(s.pixel(7, 0), [100, 100, 100, 255]);
}

#[test]
fn wide_surface_keeps_the_aspect_of_the_plane() {
    // On a 2:1 surface the unit quad covers the middle half horizontally.
    let mut s = black(16, 8);
    let touched = s.draw_sprite(&quad_frame(), &effect(Affine::IDENTITY, 1.0));
    assert_eq!(touched, 64);
    assert_eq!(s.pixel(0, 0), [0, 0, 0, 255]);
    assert_eq!(s.pixel(4, 0), [255, 0, 0, 255]);
}

#[test]
fn png_export_round_trips_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let mut s = black(4, 2);
    s.draw_sprite(&quad_frame(), &effect(Affine::IDENTITY, 1.0));
    s.save_png(&path).unwrap();

    let img = image::open(&path).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (4, 2));
    assert_eq!(img.get_pixel(1, 0).0, s.pixel(1, 0));
}
