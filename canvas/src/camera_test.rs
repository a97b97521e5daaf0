#![allow(clippy::float_cmp)]

use super::*;

fn close(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
}

#[test]
fn identity_camera_maps_points_to_themselves() {
    let cam = Camera::default();
    let p = Point::new(-4.0, 120.5);
    assert!(close(cam.world_to_screen(p), p));
    assert!(close(cam.screen_to_world(p), p));
}

#[test]
fn pan_and_zoom_transform_both_ways() {
    let cam = Camera { pan_x: 50.0, pan_y: 30.0, zoom: 2.0 };
    assert!(close(cam.screen_to_world(Point::new(0.0, 0.0)), Point::new(-25.0, -15.0)));
    assert!(close(cam.world_to_screen(Point::new(5.0, 5.0)), Point::new(60.0, 40.0)));

    let odd = Camera { pan_x: 13.7, pan_y: -42.3, zoom: 0.75 };
    let world = Point::new(333.3, -999.9);
    assert!(close(odd.screen_to_world(odd.world_to_screen(world)), world));
}

#[test]
fn distances_scale_with_zoom_only() {
    let cam = Camera { pan_x: 999.0, pan_y: -999.0, zoom: 4.0 };
    assert_eq!(cam.screen_dist_to_world(8.0), 2.0);
}

#[test]
fn panning_moves_the_origin_on_screen() {
    let mut cam = Camera::default();
    cam.pan_by(30.0, -10.0);
    assert!(close(cam.world_to_screen(Point::default()), Point::new(30.0, -10.0)));
}

#[test]
fn zooming_pins_the_anchor() {
    let mut cam = Camera { pan_x: 40.0, pan_y: 25.0, zoom: 1.5 };
    let anchor = Point::new(300.0, 200.0);
    let pinned = cam.screen_to_world(anchor);
    cam.zoom_at(anchor, 2.0);
    assert_eq!(cam.zoom, 3.0);
    assert!(close(cam.screen_to_world(anchor), pinned));
}

#[test]
fn zoom_is_clamped_and_anchor_still_pinned() {
    let mut cam = Camera { pan_x: -12.0, pan_y: 8.0, zoom: 9.0 };
    let anchor = Point::new(120.0, 80.0);
    let pinned = cam.screen_to_world(anchor);
    cam.zoom_at(anchor, 5.0);
    assert_eq!(cam.zoom, ZOOM_MAX);
    assert!(close(cam.screen_to_world(anchor), pinned));

    cam.zoom_at(anchor, 1e-6);
    assert_eq!(cam.zoom, ZOOM_MIN);
}

#[test]
fn bad_zoom_factors_are_ignored() {
    let before = Camera { pan_x: 5.0, pan_y: 6.0, zoom: 2.0 };
    let mut cam = before;
    for factor in [0.0, -3.0, f64::NAN, f64::INFINITY] {
        cam.zoom_at(Point::new(1.0, 1.0), factor);
    }
    assert_eq!(cam, before);
}
