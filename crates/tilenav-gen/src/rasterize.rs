//! Triangle rasterisation into the heightfield.
//!
//! Each triangle is clipped row by row, then column by column, and the z
//! extent of every surviving clip becomes a span in that column.

use crate::heightfield::{Heightfield, NULL_AREA, WALKABLE_AREA};
use tilenav_common::{deg_to_rad, Result};

/// Assigns [`WALKABLE_AREA`] to triangles whose slope is below
/// `walkable_slope_angle` (degrees); the rest keep [`NULL_AREA`].
pub fn mark_walkable_triangles(
    walkable_slope_angle: f32,
    verts: &[f32],
    tris: &[i32],
    areas: &mut [u8],
) {
    let threshold = deg_to_rad(walkable_slope_angle).cos();
    for (i, tri) in tris.chunks_exact(3).enumerate() {
        if let Some(nz) = triangle_normal_z(verts, tri) {
            areas[i] = if nz > threshold { WALKABLE_AREA } else { NULL_AREA };
        }
    }
}

/// z component of the normalized triangle normal; `None` for degenerates.
fn triangle_normal_z(verts: &[f32], tri: &[i32]) -> Option<f32> {
    let a = &verts[tri[0] as usize * 3..tri[0] as usize * 3 + 3];
    let b = &verts[tri[1] as usize * 3..tri[1] as usize * 3 + 3];
    let c = &verts[tri[2] as usize * 3..tri[2] as usize * 3 + 3];

    let e0 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let e1 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        e0[1] * e1[2] - e0[2] * e1[1],
        e0[2] * e1[0] - e0[0] * e1[2],
        e0[0] * e1[1] - e0[1] * e1[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len < f32::EPSILON {
        return None;
    }
    Some(n[2] / len)
}

/// Rasterises indexed triangles into the heightfield.
pub fn rasterize_triangles(
    verts: &[f32],
    tris: &[i32],
    areas: &[u8],
    heightfield: &mut Heightfield,
    flag_merge_threshold: i32,
) -> Result<()> {
    for (i, tri) in tris.chunks_exact(3).enumerate() {
        let v0 = &verts[tri[0] as usize * 3..tri[0] as usize * 3 + 3];
        let v1 = &verts[tri[1] as usize * 3..tri[1] as usize * 3 + 3];
        let v2 = &verts[tri[2] as usize * 3..tri[2] as usize * 3 + 3];
        rasterize_tri(v0, v1, v2, areas[i], heightfield, flag_merge_threshold)?;
    }
    Ok(())
}

/// Splits a convex polygon along an axis-aligned line. Vertices below the
/// line go to `out1`, the rest to `out2`; crossing edges emit the
/// intersection into both.
fn divide_poly(in_verts: &[f32], out1: &mut Vec<f32>, out2: &mut Vec<f32>, offset: f32, axis: usize) {
    out1.clear();
    out2.clear();

    let n = in_verts.len() / 3;
    if n == 0 {
        return;
    }

    let mut d = [0.0f32; 12];
    for i in 0..n {
        d[i] = offset - in_verts[i * 3 + axis];
    }

    let mut j = n - 1;
    for i in 0..n {
        let ina = d[j] >= 0.0;
        let inb = d[i] >= 0.0;
        if ina != inb {
            let s = d[j] / (d[j] - d[i]);
            let vj = &in_verts[j * 3..j * 3 + 3];
            let vi = &in_verts[i * 3..i * 3 + 3];
            let split = [
                vj[0] + (vi[0] - vj[0]) * s,
                vj[1] + (vi[1] - vj[1]) * s,
                vj[2] + (vi[2] - vj[2]) * s,
            ];
            out1.extend_from_slice(&split);
            out2.extend_from_slice(&split);
            // Add the i'th point to the right polygon.
            if d[i] > 0.0 {
                out1.extend_from_slice(&in_verts[i * 3..i * 3 + 3]);
            } else if d[i] < 0.0 {
                out2.extend_from_slice(&in_verts[i * 3..i * 3 + 3]);
            }
        } else {
            // Same side; on-the-line points land in out1 only.
            if d[i] >= 0.0 {
                out1.extend_from_slice(&in_verts[i * 3..i * 3 + 3]);
                if d[i] != 0.0 {
                    j = i;
                    continue;
                }
            }
            out2.extend_from_slice(&in_verts[i * 3..i * 3 + 3]);
        }
        j = i;
    }
}

fn rasterize_tri(
    v0: &[f32],
    v1: &[f32],
    v2: &[f32],
    area: u8,
    hf: &mut Heightfield,
    flag_merge_threshold: i32,
) -> Result<()> {
    let ics = 1.0 / hf.cs;
    let ich = 1.0 / hf.ch;

    let mut tmin = [v0[0], v0[1], v0[2]];
    let mut tmax = [v0[0], v0[1], v0[2]];
    for v in [v1, v2] {
        tilenav_common::vmin(&mut tmin, v);
        tilenav_common::vmax(&mut tmax, v);
    }

    if !overlap_bounds(&tmin, &tmax, &hf.bmin, &hf.bmax) {
        return Ok(());
    }

    let h = hf.height;
    let w = hf.width;
    let by = hf.bmax[2] - hf.bmin[2];

    let y0 = (((tmin[1] - hf.bmin[1]) * ics) as i32).clamp(-1, h - 1);
    let y1 = (((tmax[1] - hf.bmin[1]) * ics) as i32).clamp(0, h - 1);

    let mut buf_in: Vec<f32> = Vec::with_capacity(7 * 3);
    let mut buf_row: Vec<f32> = Vec::with_capacity(7 * 3);
    let mut buf_p1: Vec<f32> = Vec::with_capacity(7 * 3);
    let mut buf_p2: Vec<f32> = Vec::with_capacity(7 * 3);

    buf_in.extend_from_slice(v0);
    buf_in.extend_from_slice(v1);
    buf_in.extend_from_slice(v2);

    for y in y0..=y1 {
        // Clip the polygon to the row.
        let cy_max = hf.bmin[1] + (y + 1) as f32 * hf.cs;
        divide_poly(&buf_in, &mut buf_row, &mut buf_p1, cy_max, 1);
        std::mem::swap(&mut buf_in, &mut buf_p1);
        if buf_row.len() < 9 || y < 0 {
            continue;
        }

        // Find the horizontal footprint of the row polygon.
        let mut min_x = buf_row[0];
        let mut max_x = buf_row[0];
        for i in 1..buf_row.len() / 3 {
            min_x = min_x.min(buf_row[i * 3]);
            max_x = max_x.max(buf_row[i * 3]);
        }
        let x0 = ((min_x - hf.bmin[0]) * ics) as i32;
        let x1 = ((max_x - hf.bmin[0]) * ics) as i32;
        if x1 < 0 || x0 >= w {
            continue;
        }
        let x0 = x0.clamp(-1, w - 1);
        let x1 = x1.clamp(0, w - 1);

        let mut row = std::mem::take(&mut buf_row);
        for x in x0..=x1 {
            // Clip the row polygon to the column.
            let cx_max = hf.bmin[0] + (x + 1) as f32 * hf.cs;
            divide_poly(&row, &mut buf_p2, &mut buf_p1, cx_max, 0);
            std::mem::swap(&mut row, &mut buf_p1);
            if buf_p2.len() < 9 || x < 0 {
                continue;
            }

            // z extent of the clipped cell polygon.
            let mut zmin = buf_p2[2];
            let mut zmax = buf_p2[2];
            for i in 1..buf_p2.len() / 3 {
                zmin = zmin.min(buf_p2[i * 3 + 2]);
                zmax = zmax.max(buf_p2[i * 3 + 2]);
            }
            zmin -= hf.bmin[2];
            zmax -= hf.bmin[2];

            // Entirely outside the field's vertical range.
            if zmax < 0.0 || zmin > by {
                continue;
            }
            let zmin = zmin.max(0.0);
            let zmax = zmax.min(by);

            let smin = ((zmin * ich).floor() as i32).clamp(0, 0xfffe) as u16;
            let smax = ((zmax * ich).ceil() as i32).clamp(smin as i32 + 1, 0xffff) as u16;

            hf.add_span(x, y, smin, smax, area, flag_merge_threshold)?;
        }
        buf_row = row;
    }

    Ok(())
}

fn overlap_bounds(amin: &[f32], amax: &[f32], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_walkable_triangles() {
        // One flat triangle, one vertical wall.
        let verts = [
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0,
        ];
        let tris = [0, 1, 2, 3, 4, 5];
        let mut areas = [NULL_AREA; 2];
        mark_walkable_triangles(45.0, &verts, &tris, &mut areas);
        assert_eq!(areas[0], WALKABLE_AREA);
        assert_eq!(areas[1], NULL_AREA);
    }

    #[test]
    fn test_rasterize_flat_quad() {
        let mut hf = Heightfield::new(4, 4, [0.0; 3], [4.0, 4.0, 4.0], 1.0, 0.5);
        let verts = [
            0.0, 0.0, 1.0, 4.0, 0.0, 1.0, 4.0, 4.0, 1.0, 0.0, 4.0, 1.0,
        ];
        let tris = [0, 1, 2, 0, 2, 3];
        let areas = [1u8, 1];
        rasterize_triangles(&verts, &tris, &areas, &mut hf, 1).unwrap();

        // Every column is covered and the span sits at z = 1 (2 voxels).
        for y in 0..4 {
            for x in 0..4 {
                let spans: Vec<_> = hf.column(x, y).collect();
                assert_eq!(spans.len(), 1, "column ({x},{y})");
                assert_eq!(spans[0].smin, 2);
                assert!(spans[0].smax >= 2);
                assert_eq!(spans[0].area, 1);
            }
        }
    }

    #[test]
    fn test_rasterize_outside_bounds_is_noop() {
        let mut hf = Heightfield::new(4, 4, [0.0; 3], [4.0, 4.0, 4.0], 1.0, 0.5);
        let verts = [10.0, 10.0, 0.0, 12.0, 10.0, 0.0, 10.0, 12.0, 0.0];
        let tris = [0, 1, 2];
        rasterize_triangles(&verts, &tris, &[1], &mut hf, 1).unwrap();
        assert_eq!(hf.span_count(), 0);
    }
}
