//! Skeleton overlay compositing
//!
//! Every output frame starts fully black. When a pose is present, bones are
//! drawn as thick segments and joints as filled circles on top, all in the
//! single overlay color. Landmarks outside the frame or below the visibility
//! threshold are not drawn, nor is any bone touching them. Rasterization is pure integer/float math with a
//! fixed drawing order, so the same pose always yields the same pixels.

use image::{ImageBuffer, Rgb};
use movedict_core::{Frame, Landmark, OverlaySpec, PoseResult};

type Canvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

/// Render `pose` onto a black canvas of the given size
pub fn composite(
    width: u32,
    height: u32,
    pose: &PoseResult,
    spec: &OverlaySpec,
    sequence: u64,
) -> Frame {
    let mut frame = Frame::black(width, height, sequence);

    let Some(pose) = pose.pose() else {
        return frame;
    };

    if let Some(mut canvas) = Canvas::from_raw(width, height, frame.data_mut()) {
        let color = Rgb(spec.color);
        let landmarks = pose.landmarks();
        let (max_x, max_y) = (width as f32, height as f32);
        let visible = |lm: &Landmark| -> bool {
            (0.0..=max_x).contains(&lm.x)
                && (0.0..=max_y).contains(&lm.y)
                && lm.is_visible(spec.visibility_threshold)
        };

        for &(a, b) in pose.connections() {
            let (start, end) = (&landmarks[a], &landmarks[b]);
            if visible(start) && visible(end) {
                draw_thick_segment(&mut canvas, start, end, spec.bone_thickness, color);
            }
        }

        for landmark in landmarks.iter().filter(|lm| visible(*lm)) {
            fill_circle(&mut canvas, landmark, spec.joint_radius, color);
        }
    }

    frame
}

/// Clamp an inclusive pixel range to the canvas
fn clamp_span(lo: f32, hi: f32, limit: u32) -> Option<(u32, u32)> {
    if limit == 0 || hi < 0.0 || lo > (limit - 1) as f32 {
        return None;
    }
    let lo = lo.max(0.0).floor() as u32;
    let hi = (hi.ceil() as u32).min(limit - 1);
    Some((lo, hi))
}

fn fill_circle(canvas: &mut Canvas<'_>, center: &Landmark, radius: u32, color: Rgb<u8>) {
    let r = radius as f32;
    let (cx, cy) = (center.x.round(), center.y.round());
    let Some((x0, x1)) = clamp_span(cx - r, cx + r, canvas.width()) else {
        return;
    };
    let Some((y0, y1)) = clamp_span(cy - r, cy + r, canvas.height()) else {
        return;
    };

    for y in y0..=y1 {
        for x in x0..=x1 {
            let (dx, dy) = (x as f32 - cx, y as f32 - cy);
            if dx * dx + dy * dy <= r * r {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

/// Fill every pixel whose center lies within `thickness / 2` of the segment
fn draw_thick_segment(
    canvas: &mut Canvas<'_>,
    start: &Landmark,
    end: &Landmark,
    thickness: u32,
    color: Rgb<u8>,
) {
    let half = (thickness.max(1) as f32) / 2.0;
    let (ax, ay) = (start.x.round(), start.y.round());
    let (bx, by) = (end.x.round(), end.y.round());

    let Some((x0, x1)) = clamp_span(ax.min(bx) - half, ax.max(bx) + half, canvas.width()) else {
        return;
    };
    let Some((y0, y1)) = clamp_span(ay.min(by) - half, ay.max(by) + half, canvas.height()) else {
        return;
    };

    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let (px, py) = (x as f32, y as f32);
            let t = if len_sq == 0.0 {
                0.0
            } else {
                (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
            };
            let (qx, qy) = (ax + t * dx - px, ay + t * dy - py);
            if qx * qx + qy * qy <= half * half {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}
