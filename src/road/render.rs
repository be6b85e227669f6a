//! Rasterise one page of the road.
//!
//! Every position gets a bordered box whether or not it is occupied. Player
//! and Banker draw as rings of their own colour; a confirmed recommendation
//! fills the ring. A tie run is a short diagonal stroke over the cell.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;

use super::glyph;
use super::grid::{Column, ROWS};
use crate::outcome::Side;

#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub cell_px: u32,
    pub header_px: u32,
    pub background: RGBColor,
    pub grid_line: RGBColor,
    pub player: RGBColor,
    pub banker: RGBColor,
    pub tie: RGBColor,
    pub text: RGBColor,
    pub title: String,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            cell_px: 22,
            header_px: 30,
            background: RGBColor(0xf4, 0xf6, 0xf9),
            grid_line: RGBColor(0xd3, 0xd3, 0xd3),
            player: RGBColor(0x34, 0x98, 0xdb),
            banker: RGBColor(0xe7, 0x4c, 0x3c),
            tie: RGBColor(0x2e, 0xcc, 0x71),
            text: RGBColor(0x00, 0x00, 0x00),
            title: "BIG ROAD".to_string(),
        }
    }
}

impl RenderStyle {
    pub fn with_cell_px(mut self, cell_px: u32) -> Self {
        self.cell_px = cell_px.max(8);
        self
    }

    pub fn side_color(&self, side: Side) -> RGBColor {
        match side {
            Side::Player => self.player,
            Side::Banker => self.banker,
        }
    }

    /// Image size for a page `cols` wide.
    pub fn dimensions(&self, cols: usize) -> (u32, u32) {
        (
            cols as u32 * self.cell_px,
            ROWS as u32 * self.cell_px + self.header_px,
        )
    }
}

/// Packed RGB pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RoadImage {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.rgb[idx], self.rgb[idx + 1], self.rgb[idx + 2]])
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let area = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
        for (i, px) in self.rgb.chunks_exact(3).enumerate() {
            let x = (i % self.width as usize) as i32;
            let y = (i / self.width as usize) as i32;
            area.draw_pixel((x, y), &RGBColor(px[0], px[1], px[2]))
                .map_err(|e| anyhow!("{e:?}"))?;
        }
        area.present()
            .map_err(|e| anyhow!("{e:?}"))
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

pub fn header_text(style: &RenderStyle, page_index: usize, total_pages: usize) -> String {
    format!("{} - PAGE {} / {}", style.title, page_index + 1, total_pages)
}

/// Header placement for an image `width` pixels wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFit {
    pub text: String,
    pub x: i32,
    pub scale: i32,
}

fn text_px(text: &str, scale: i32) -> i32 {
    let n = text.chars().count() as i32;
    (n * (glyph::GLYPH_W as i32 + 1) - 1).max(0) * scale
}

/// Largest header that fits: the full line, then without the title, then
/// the bare page count. The page count is never the part that gets cut.
pub fn fit_header(style: &RenderStyle, page_index: usize, total_pages: usize, width: u32) -> HeaderFit {
    let width = width as i32;
    let page = page_index + 1;
    let candidates = [
        header_text(style, page_index, total_pages),
        format!("PAGE {} / {}", page, total_pages),
        format!("{}/{}", page, total_pages),
    ];
    for text in &candidates {
        for scale in [2, 1] {
            let needed = text_px(text, scale);
            if needed + 4 <= width {
                let x = if needed + 20 <= width { 10 } else { 2 };
                return HeaderFit { text: text.clone(), x, scale };
            }
        }
    }
    HeaderFit { text: candidates[2].clone(), x: 0, scale: 1 }
}

/// Draw `page` (one entry per visible column) with its page header.
pub fn render(page: &[Column], page_index: usize, total_pages: usize, style: &RenderStyle) -> Result<RoadImage> {
    let (width, height) = style.dimensions(page.len().max(1));
    let mut rgb = vec![0u8; width as usize * height as usize * 3];
    {
        let area = BitMapBackend::with_buffer(&mut rgb, (width, height)).into_drawing_area();
        let header = fit_header(style, page_index, total_pages, width);
        draw_page(&area, page, &header, style)
            .map_err(|e| anyhow!("road render failed: {e:?}"))?;
        area.present().map_err(|e| anyhow!("road render failed: {e:?}"))?;
    }
    Ok(RoadImage { width, height, rgb })
}

type DrawResult<DB> = Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

fn draw_page<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    page: &[Column],
    header: &HeaderFit,
    style: &RenderStyle,
) -> DrawResult<DB> {
    area.fill(&style.background)?;
    let y = (style.header_px as i32 - glyph::GLYPH_H as i32 * header.scale) / 2;
    draw_text(area, header.x, y.max(0), &header.text, style.text, header.scale)?;

    let cell = style.cell_px as i32;
    let top = style.header_px as i32;
    for (c, column) in page.iter().enumerate() {
        for (r, slot) in column.iter().enumerate() {
            let x1 = c as i32 * cell;
            let y1 = r as i32 * cell + top;
            let x2 = x1 + cell;
            let y2 = y1 + cell;
            area.draw(&Rectangle::new([(x1, y1), (x2, y2)], style.grid_line.stroke_width(1)))?;

            let Some(cell_data) = slot else { continue };
            let color = style.side_color(cell_data.side);
            let center = ((x1 + x2) / 2, (y1 + y2) / 2);
            let radius = (cell / 2 - 3).max(2);
            if cell_data.correct {
                area.draw(&Circle::new(center, radius, color.filled()))?;
            } else {
                for ring in 0..radius.min(3) {
                    area.draw(&Circle::new(center, radius - ring, color.stroke_width(1)))?;
                }
            }
            if cell_data.has_tie() {
                // two 45 degree hairlines, 2px thick together
                for shift in 0..2 {
                    area.draw(&PathElement::new(
                        vec![(x1 + 5 + shift, y1 + 5), (x2 - 5, y2 - 5 - shift)],
                        style.tie.stroke_width(1),
                    ))?;
                }
            }
        }
    }
    Ok(())
}

fn draw_text<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    x: i32,
    y: i32,
    text: &str,
    color: RGBColor,
    scale: i32,
) -> DrawResult<DB> {
    let (width, _) = area.dim_in_pixel();
    let advance = (glyph::GLYPH_W as i32 + 1) * scale;
    for (i, ch) in text.chars().enumerate() {
        let gx = x + i as i32 * advance;
        if gx + glyph::GLYPH_W as i32 * scale > width as i32 {
            break;
        }
        for (px, py) in glyph::lit(ch) {
            let sx = gx + px as i32 * scale;
            let sy = y + py as i32 * scale;
            area.draw(&Rectangle::new(
                [(sx, sy), (sx + scale - 1, sy + scale - 1)],
                color.filled(),
            ))?;
        }
    }
    Ok(())
}
