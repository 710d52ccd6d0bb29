use std::collections::HashMap;
use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use crate::topology::{RelationKind, SpaceKind, TopologyGraph};

const CELL: u32 = 64;
const MARGIN: u32 = 8;
const BACKGROUND: Rgb<u8> = Rgb([250, 250, 250]);
const BORDER: Rgb<u8> = Rgb([60, 60, 60]);
const LINK: Rgb<u8> = Rgb([200, 40, 40]);

fn fill_for(kind: SpaceKind) -> Rgb<u8> {
    match kind {
        SpaceKind::Bedroom => Rgb([186, 214, 246]),
        SpaceKind::LivingRoom => Rgb([255, 226, 160]),
        SpaceKind::Kitchen => Rgb([255, 190, 150]),
        SpaceKind::Bathroom => Rgb([170, 230, 230]),
        SpaceKind::Balcony => Rgb([190, 235, 180]),
        SpaceKind::Entrance => Rgb([220, 200, 240]),
        SpaceKind::DressRoom => Rgb([240, 200, 220]),
        SpaceKind::Utility => Rgb([210, 210, 210]),
        SpaceKind::Corridor => Rgb([235, 235, 225]),
        SpaceKind::Other => Rgb([225, 225, 225]),
    }
}

/// Draw the graph as a grid of colour-coded spaces with connection lines.
///
/// Used when the vision backend does not return its own visualisation.
pub fn render_topology_png(graph: &TopologyGraph) -> Result<Vec<u8>, image::ImageError> {
    let n = graph.spaces.len().max(1) as u32;
    let cols = (n as f64).sqrt().ceil() as u32;
    let rows = n.div_ceil(cols);
    let width = cols * CELL + 2 * MARGIN;
    let height = rows * CELL + 2 * MARGIN;

    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let mut centers = HashMap::with_capacity(graph.spaces.len());

    for (i, space) in graph.spaces.iter().enumerate() {
        let i = i as u32;
        let x0 = MARGIN + (i % cols) * CELL;
        let y0 = MARGIN + (i / cols) * CELL;
        let inset = 3;
        for y in (y0 + inset)..(y0 + CELL - inset) {
            for x in (x0 + inset)..(x0 + CELL - inset) {
                let edge = x < x0 + inset + 2
                    || x >= x0 + CELL - inset - 2
                    || y < y0 + inset + 2
                    || y >= y0 + CELL - inset - 2;
                let colour = if edge {
                    BORDER
                } else if space.has_window {
                    fill_for(space.kind)
                } else {
                    darken(fill_for(space.kind))
                };
                img.put_pixel(x, y, colour);
            }
        }
        centers.insert(space.id.as_str(), (x0 + CELL / 2, y0 + CELL / 2));
    }

    for relation in &graph.relations {
        let (Some(&from), Some(&to)) = (
            centers.get(relation.from.as_str()),
            centers.get(relation.to.as_str()),
        ) else {
            continue;
        };
        let dashed = relation.kind == RelationKind::Adjacent;
        draw_line(&mut img, from, to, dashed);
    }

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn darken(Rgb([r, g, b]): Rgb<u8>) -> Rgb<u8> {
    Rgb([r / 4 * 3, g / 4 * 3, b / 4 * 3])
}

// Bresenham; dashed lines skip every other run of four pixels.
fn draw_line(img: &mut RgbImage, from: (u32, u32), to: (u32, u32), dashed: bool) {
    let (mut x, mut y) = (from.0 as i64, from.1 as i64);
    let (x1, y1) = (to.0 as i64, to.1 as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut step = 0u32;

    loop {
        if !dashed || (step / 4) % 2 == 0 {
            if let (Ok(px), Ok(py)) = (u32::try_from(x), u32::try_from(y)) {
                if px < img.width() && py < img.height() {
                    img.put_pixel(px, py, LINK);
                }
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
        step += 1;
    }
}
