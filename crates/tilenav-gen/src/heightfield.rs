//! Voxel heightfield: columns of solid spans over an xy grid.
//!
//! Spans live in a single pool and chain through indices, so columns are
//! cheap to splice during merging and the field frees as one allocation.

use tilenav_common::{Error, Result};

/// Area id for unwalkable voxels.
pub const NULL_AREA: u8 = 0;
/// Default walkable area id assigned by slope marking.
pub const WALKABLE_AREA: u8 = 63;

/// Largest representable span height.
const MAX_HEIGHT: i32 = 0xffff;

const NO_SPAN: u32 = u32::MAX;

/// A solid vertical interval `[smin, smax)` in a column, in voxel units.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    /// Lower extent.
    pub smin: u16,
    /// Upper extent.
    pub smax: u16,
    /// Area id, [`NULL_AREA`] when unwalkable.
    pub area: u8,
    next: u32,
}

/// Heightfield over a `width x height` xy grid; z is up.
#[derive(Debug)]
pub struct Heightfield {
    pub width: i32,
    pub height: i32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Horizontal voxel size.
    pub cs: f32,
    /// Vertical voxel size.
    pub ch: f32,
    /// First span per column, `NO_SPAN` when empty.
    columns: Vec<u32>,
    spans: Vec<Span>,
    free_list: u32,
}

impl Heightfield {
    /// Creates an empty heightfield.
    pub fn new(width: i32, height: i32, bmin: [f32; 3], bmax: [f32; 3], cs: f32, ch: f32) -> Self {
        Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![NO_SPAN; (width * height) as usize],
            spans: Vec::new(),
            free_list: NO_SPAN,
        }
    }

    fn alloc_span(&mut self, span: Span) -> u32 {
        if self.free_list != NO_SPAN {
            let idx = self.free_list;
            self.free_list = self.spans[idx as usize].next;
            self.spans[idx as usize] = span;
            idx
        } else {
            self.spans.push(span);
            (self.spans.len() - 1) as u32
        }
    }

    fn free_span(&mut self, idx: u32) {
        self.spans[idx as usize].next = self.free_list;
        self.free_list = idx;
    }

    /// First span of a column, walkable or not.
    pub fn first_span(&self, x: i32, y: i32) -> Option<&Span> {
        let idx = self.columns[(y * self.width + x) as usize];
        if idx == NO_SPAN {
            None
        } else {
            Some(&self.spans[idx as usize])
        }
    }

    /// Iterates the spans of one column bottom-up.
    pub fn column(&self, x: i32, y: i32) -> ColumnIter<'_> {
        ColumnIter {
            field: self,
            next: self.columns[(y * self.width + x) as usize],
        }
    }

    /// Total number of live spans.
    pub fn span_count(&self) -> usize {
        let mut count = 0;
        for y in 0..self.height {
            for x in 0..self.width {
                count += self.column(x, y).count();
            }
        }
        count
    }

    /// Inserts a span into column `(x, y)`, merging with overlapping spans.
    ///
    /// When the merged tops land within `flag_merge_threshold` voxels of each
    /// other, the higher area id wins; otherwise the incoming area is kept.
    pub fn add_span(
        &mut self,
        x: i32,
        y: i32,
        smin: u16,
        smax: u16,
        area: u8,
        flag_merge_threshold: i32,
    ) -> Result<()> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return Err(Error::MeshGeneration(format!(
                "span position out of bounds: ({x}, {y})"
            )));
        }
        if smin > smax {
            return Err(Error::MeshGeneration(format!(
                "inverted span extents: [{smin}, {smax})"
            )));
        }

        let column = (y * self.width + x) as usize;
        let mut new_smin = smin;
        let mut new_smax = smax;
        let mut new_area = area;

        let mut prev: u32 = NO_SPAN;
        let mut cur = self.columns[column];

        while cur != NO_SPAN {
            let cur_span = self.spans[cur as usize];
            if cur_span.smin > new_smax {
                // Past the insertion point.
                break;
            }
            if cur_span.smax < new_smin {
                // Fully below; advance.
                prev = cur;
                cur = cur_span.next;
                continue;
            }

            // Overlap: absorb the existing span.
            new_smin = new_smin.min(cur_span.smin);
            new_smax = new_smax.max(cur_span.smax);
            if (new_smax as i32 - cur_span.smax as i32).abs() <= flag_merge_threshold {
                new_area = new_area.max(cur_span.area);
            }

            // Unlink and free, keep scanning from its successor.
            let next = cur_span.next;
            if prev != NO_SPAN {
                self.spans[prev as usize].next = next;
            } else {
                self.columns[column] = next;
            }
            self.free_span(cur);
            cur = next;
        }

        // Link the merged span after prev.
        let next = if prev != NO_SPAN {
            self.spans[prev as usize].next
        } else {
            self.columns[column]
        };
        let idx = self.alloc_span(Span {
            smin: new_smin,
            smax: new_smax,
            area: new_area,
            next,
        });
        if prev != NO_SPAN {
            self.spans[prev as usize].next = idx;
        } else {
            self.columns[column] = idx;
        }

        Ok(())
    }

    /// Promotes unwalkable spans the agent can step onto from the span below.
    ///
    /// A span whose top sits at most `walkable_climb` above a walkable span
    /// directly beneath it inherits that span's area.
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: i32) {
        for column in 0..self.columns.len() {
            let mut previous_walkable = false;
            let mut previous_area = NULL_AREA;
            let mut previous_smax = 0i32;

            let mut cur = self.columns[column];
            while cur != NO_SPAN {
                let span = self.spans[cur as usize];
                let walkable = span.area != NULL_AREA;

                if !walkable && previous_walkable {
                    if (span.smax as i32 - previous_smax).abs() <= walkable_climb {
                        self.spans[cur as usize].area = previous_area;
                    }
                }

                // Track the original walkability so runs of unwalkable spans
                // are not promoted transitively.
                previous_walkable = walkable;
                previous_area = self.spans[cur as usize].area;
                previous_smax = span.smax as i32;
                cur = span.next;
            }
        }
    }

    /// Marks spans bordering a ledge as unwalkable.
    ///
    /// A span is a ledge when any of its 4-connected neighbours' walkable
    /// surfaces sit more than `walkable_climb` below it, or when the
    /// traversable neighbour floors spread wider than `walkable_climb`.
    pub fn filter_ledge_spans(&mut self, walkable_height: i32, walkable_climb: i32) {
        let w = self.width;
        let h = self.height;
        let dir_offset = [(-1i32, 0i32), (0, 1), (1, 0), (0, -1)];

        for y in 0..h {
            for x in 0..w {
                let mut cur = self.columns[(y * w + x) as usize];
                while cur != NO_SPAN {
                    let span = self.spans[cur as usize];
                    let next_idx = span.next;

                    if span.area == NULL_AREA {
                        cur = next_idx;
                        continue;
                    }

                    let floor = span.smax as i32;
                    let ceiling = if next_idx != NO_SPAN {
                        self.spans[next_idx as usize].smin as i32
                    } else {
                        MAX_HEIGHT
                    };

                    let mut lowest_neighbor_floor = MAX_HEIGHT;
                    let mut lowest_traversable_floor = floor;
                    let mut highest_traversable_floor = floor;

                    for (dx, dy) in dir_offset {
                        let nx = x + dx;
                        let ny = y + dy;
                        if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            lowest_neighbor_floor = -walkable_climb - 1;
                            break;
                        }

                        // Gap from the column base to the first span.
                        let mut neighbor = self.columns[(ny * w + nx) as usize];
                        let mut neighbor_floor = -walkable_climb - 1;
                        let mut neighbor_ceiling = if neighbor != NO_SPAN {
                            self.spans[neighbor as usize].smin as i32
                        } else {
                            MAX_HEIGHT
                        };

                        if neighbor_ceiling.min(ceiling) - floor >= walkable_height {
                            lowest_neighbor_floor =
                                lowest_neighbor_floor.min(neighbor_floor - floor);
                        }

                        while neighbor != NO_SPAN {
                            let nspan = self.spans[neighbor as usize];
                            neighbor_floor = nspan.smax as i32;
                            neighbor_ceiling = if nspan.next != NO_SPAN {
                                self.spans[nspan.next as usize].smin as i32
                            } else {
                                MAX_HEIGHT
                            };

                            // Only consider gaps the agent fits through.
                            if neighbor_ceiling.min(ceiling) - floor.max(nspan.smax as i32)
                                >= walkable_height
                            {
                                let diff = neighbor_floor - floor;
                                lowest_neighbor_floor = lowest_neighbor_floor.min(diff);
                                if diff.abs() <= walkable_climb {
                                    lowest_traversable_floor =
                                        lowest_traversable_floor.min(neighbor_floor);
                                    highest_traversable_floor =
                                        highest_traversable_floor.max(neighbor_floor);
                                }
                            }
                            neighbor = nspan.next;
                        }
                    }

                    // Sheer drop, or internal ledge steeper than the climb.
                    if lowest_neighbor_floor < -walkable_climb
                        || highest_traversable_floor - lowest_traversable_floor > walkable_climb
                    {
                        self.spans[cur as usize].area = NULL_AREA;
                    }

                    cur = next_idx;
                }
            }
        }
    }

    /// Marks spans with less than `walkable_height` headroom as unwalkable.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: i32) {
        for column in 0..self.columns.len() {
            let mut cur = self.columns[column];
            while cur != NO_SPAN {
                let span = self.spans[cur as usize];
                if span.next != NO_SPAN {
                    let ceiling = self.spans[span.next as usize].smin as i32;
                    if ceiling - (span.smax as i32) < walkable_height {
                        self.spans[cur as usize].area = NULL_AREA;
                    }
                }
                cur = span.next;
            }
        }
    }
}

/// Iterator over one column's spans, bottom-up.
pub struct ColumnIter<'a> {
    field: &'a Heightfield,
    next: u32,
}

impl<'a> Iterator for ColumnIter<'a> {
    type Item = &'a Span;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NO_SPAN {
            return None;
        }
        let span = &self.field.spans[self.next as usize];
        self.next = span.next;
        Some(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> Heightfield {
        Heightfield::new(4, 4, [0.0; 3], [4.0, 4.0, 10.0], 1.0, 1.0)
    }

    #[test]
    fn test_add_span_sorted_non_overlapping() {
        let mut hf = field();
        hf.add_span(1, 1, 5, 6, 1, 1).unwrap();
        hf.add_span(1, 1, 0, 1, 1, 1).unwrap();
        hf.add_span(1, 1, 2, 3, 1, 1).unwrap();

        let extents: Vec<(u16, u16)> = hf.column(1, 1).map(|s| (s.smin, s.smax)).collect();
        assert_eq!(extents, vec![(0, 1), (2, 3), (5, 6)]);
    }

    #[test]
    fn test_add_span_merges_overlap() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 4, 1, 1).unwrap();
        hf.add_span(0, 0, 3, 6, 2, 1).unwrap();

        let spans: Vec<Span> = hf.column(0, 0).copied().collect();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].smin, spans[0].smax), (0, 6));
        // Tops within the merge threshold: higher area id wins.
        assert_eq!(spans[0].area, 2);
    }

    #[test]
    fn test_add_span_merge_chains_spans() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 2, 1, 1).unwrap();
        hf.add_span(0, 0, 4, 6, 1, 1).unwrap();
        // Bridges both existing spans.
        hf.add_span(0, 0, 1, 5, 1, 1).unwrap();

        let spans: Vec<(u16, u16)> = hf.column(0, 0).map(|s| (s.smin, s.smax)).collect();
        assert_eq!(spans, vec![(0, 6)]);
    }

    #[test]
    fn test_filter_low_hanging() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 2, 1, 1).unwrap();
        // Unwalkable lip one voxel above the walkable surface.
        hf.add_span(0, 0, 2, 3, NULL_AREA, 1).unwrap();

        hf.filter_low_hanging_walkable_obstacles(1);
        let areas: Vec<u8> = hf.column(0, 0).map(|s| s.area).collect();
        assert_eq!(areas, vec![1, 1]);
    }

    #[test]
    fn test_filter_low_height() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 1, 1, 1).unwrap();
        hf.add_span(0, 0, 3, 5, 1, 1).unwrap();

        // Two voxels of headroom, agent needs four.
        hf.filter_walkable_low_height_spans(4);
        let areas: Vec<u8> = hf.column(0, 0).map(|s| s.area).collect();
        assert_eq!(areas, vec![NULL_AREA, 1]);
    }

    #[test]
    fn test_filter_ledge_spans() {
        let mut hf = Heightfield::new(3, 3, [0.0; 3], [3.0, 3.0, 20.0], 1.0, 1.0);
        // Centre pillar towering over the floor.
        for y in 0..3 {
            for x in 0..3 {
                let top = if x == 1 && y == 1 { 10 } else { 1 };
                hf.add_span(x, y, 0, top, 1, 1).unwrap();
            }
        }

        hf.filter_ledge_spans(4, 2);
        let pillar: Vec<u8> = hf.column(1, 1).map(|s| s.area).collect();
        assert_eq!(pillar, vec![NULL_AREA]);
        // The floor next to the pillar keeps its area; the drop is upward.
        let floor: Vec<u8> = hf.column(0, 0).map(|s| s.area).collect();
        assert_eq!(floor, vec![NULL_AREA]); // border columns see the void edge
    }
}
