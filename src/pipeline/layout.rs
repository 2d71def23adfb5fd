//! Grid pagination.
//!
//! Cards fill a fixed `rows × cols` grid row by row, left to right, and a
//! new page starts only when the grid is full. The grid is centered on the
//! page; horizontal and vertical margins are computed independently so they
//! need not match (US Letter with 3 × 3 poker cards gives 36pt and 18pt).
//!
//! Coordinates are PDF points with the origin at the bottom-left corner of
//! the page, which is what the sheet writer consumes directly.

use super::normalize::{CardSize, NormalizedImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// US Letter, portrait, in points.
pub const LETTER_WIDTH_PT: f32 = 612.0;
pub const LETTER_HEIGHT_PT: f32 = 792.0;

/// Page grid geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub rows: u32,
    pub cols: u32,
    pub card: CardSize,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 3,
            card: CardSize::default(),
            page_width_pt: LETTER_WIDTH_PT,
            page_height_pt: LETTER_HEIGHT_PT,
        }
    }
}

impl SheetLayout {
    pub fn slots_per_page(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    /// `(horizontal, vertical)` margin centering the grid.
    pub fn margins(&self) -> (f32, f32) {
        let (cw, ch) = self.card.points();
        (
            (self.page_width_pt - self.cols as f32 * cw) / 2.0,
            (self.page_height_pt - self.rows as f32 * ch) / 2.0,
        )
    }

    /// Bottom-left corner of slot `(row, col)`; row 0 is the top row.
    pub fn slot_origin(&self, row: u32, col: u32) -> (f32, f32) {
        let (cw, ch) = self.card.points();
        let (mx, my) = self.margins();
        (
            mx + col as f32 * cw,
            self.page_height_pt - my - (row + 1) as f32 * ch,
        )
    }

    /// Whether the grid fits on the page at all.
    pub fn fits(&self) -> bool {
        let (mx, my) = self.margins();
        self.rows > 0 && self.cols > 0 && mx >= 0.0 && my >= 0.0
    }
}

/// One card copy ready to be placed: a label plus its shared bitmap.
#[derive(Debug, Clone)]
pub struct RenderedCard {
    pub label: String,
    pub image: Arc<NormalizedImage>,
}

impl RenderedCard {
    pub fn new(label: impl Into<String>, image: Arc<NormalizedImage>) -> Self {
        Self {
            label: label.into(),
            image,
        }
    }
}

/// A card positioned on a page.
#[derive(Debug, Clone)]
pub struct Placement {
    pub label: String,
    pub image: Arc<NormalizedImage>,
    pub row: u32,
    pub col: u32,
    pub x_pt: f32,
    pub y_pt: f32,
}

/// One output page, numbered from 1.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: usize,
    pub placements: Vec<Placement>,
}

/// Number of pages `cards` cards occupy.
pub fn page_count(cards: usize, layout: &SheetLayout) -> usize {
    cards.div_ceil(layout.slots_per_page().max(1))
}

/// Lay `cards` out in order, row-major, one grid per page.
///
/// Empty input produces no pages; a partially filled last page leaves its
/// trailing slots empty.
pub fn paginate(cards: &[RenderedCard], layout: &SheetLayout) -> Vec<Page> {
    let per_page = layout.slots_per_page().max(1);
    let cols = layout.cols.max(1);

    cards
        .chunks(per_page)
        .enumerate()
        .map(|(page_idx, chunk)| {
            let placements = chunk
                .iter()
                .enumerate()
                .map(|(slot, card)| {
                    let row = slot as u32 / cols;
                    let col = slot as u32 % cols;
                    let (x_pt, y_pt) = layout.slot_origin(row, col);
                    Placement {
                        label: card.label.clone(),
                        image: Arc::clone(&card.image),
                        row,
                        col,
                        x_pt,
                        y_pt,
                    }
                })
                .collect();
            Page {
                number: page_idx + 1,
                placements,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::normalize;
    use image::{DynamicImage, RgbImage};

    fn cards(n: usize) -> Vec<RenderedCard> {
        let img = Arc::new(normalize(&DynamicImage::ImageRgb8(RgbImage::new(5, 7)), 5, 7));
        (0..n)
            .map(|i| RenderedCard::new(format!("card-{i}"), Arc::clone(&img)))
            .collect()
    }

    #[test]
    fn letter_margins() {
        let layout = SheetLayout::default();
        assert_eq!(layout.margins(), (36.0, 18.0));
        assert!(layout.fits());
    }

    #[test]
    fn slot_origins_are_bottom_left() {
        let layout = SheetLayout::default();
        assert_eq!(layout.slot_origin(0, 0), (36.0, 522.0));
        assert_eq!(layout.slot_origin(0, 2), (396.0, 522.0));
        assert_eq!(layout.slot_origin(2, 0), (36.0, 18.0));
    }

    #[test]
    fn ten_cards_make_two_pages() {
        let layout = SheetLayout::default();
        let pages = paginate(&cards(10), &layout);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].placements.len(), 9);
        assert_eq!(pages[1].placements.len(), 1);
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].placements[0].label, "card-9");
        assert_eq!((pages[1].placements[0].row, pages[1].placements[0].col), (0, 0));
        assert_eq!(page_count(10, &layout), 2);
    }

    #[test]
    fn six_cards_fill_two_rows() {
        let layout = SheetLayout::default();
        let pages = paginate(&cards(6), &layout);
        assert_eq!(pages.len(), 1);

        let slots: Vec<_> = pages[0].placements.iter().map(|p| (p.row, p.col)).collect();
        assert_eq!(slots, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
        let labels: Vec<_> = pages[0].placements.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["card-0", "card-1", "card-2", "card-3", "card-4", "card-5"]);
    }

    #[test]
    fn exactly_full_page_does_not_add_an_empty_one() {
        let layout = SheetLayout::default();
        assert_eq!(paginate(&cards(9), &layout).len(), 1);
        assert_eq!(page_count(9, &layout), 1);
    }

    #[test]
    fn no_cards_no_pages() {
        let layout = SheetLayout::default();
        assert!(paginate(&[], &layout).is_empty());
        assert_eq!(page_count(0, &layout), 0);
    }

    #[test]
    fn oversized_grid_does_not_fit() {
        let layout = SheetLayout {
            rows: 4,
            ..SheetLayout::default()
        };
        assert!(!layout.fits());
    }
}
