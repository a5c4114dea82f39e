// Copyright 2021 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Turns a screenshot of the puzzle board into a [`Grid`] by sampling a centered sub-patch
//! of each cell and classifying it by hue, saturation, and value.

use std::path::Path;

use image::{GenericImageView, Rgba};
use thiserror::Error;

use crate::grid::{Cell, Grid, GridError, HEIGHT, WIDTH};

/// Fraction of each cell's width and height that the sampled sub-patch covers, centered on
/// the cell. Keeps the sample away from cell borders and neighboring shapes.
const SHAPE_RATIO: f64 = 0.6;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to read image {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image has zero width or height")]
    EmptyImage,
    #[error(transparent)]
    InvalidGrid(#[from] GridError),
}

/// Classifies the board screenshot at `image_path` into a [`Grid`]. Each cell's color is
/// the mode (most frequent classification) across the pixels of a centered sub-patch
/// covering `SHAPE_RATIO` of that cell's width and height.
pub fn classify(image_path: &Path) -> Result<Grid, ClassifyError> {
    let img = image::open(image_path).map_err(|source| ClassifyError::Unreadable {
        path: image_path.display().to_string(),
        source,
    })?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ClassifyError::EmptyImage);
    }

    let cell_w = width as f64 / WIDTH as f64;
    let cell_h = height as f64 / HEIGHT as f64;

    let mut rows = vec![vec![Cell::Empty; WIDTH]; HEIGHT];
    for (row, cells) in rows.iter_mut().enumerate() {
        for (col, cell) in cells.iter_mut().enumerate() {
            *cell = classify_cell(&img, row, col, cell_w, cell_h, width, height);
        }
    }

    Ok(Grid::from_rows(&rows)?)
}

fn classify_cell(
    img: &image::DynamicImage,
    row: usize,
    col: usize,
    cell_w: f64,
    cell_h: f64,
    width: u32,
    height: u32,
) -> Cell {
    let y0 = (row as f64 * cell_h + cell_h * (1.0 - SHAPE_RATIO) / 2.0) as u32;
    let y1 = (y0 as f64 + cell_h * SHAPE_RATIO) as u32;
    let x0 = (col as f64 * cell_w + cell_w * (1.0 - SHAPE_RATIO) / 2.0) as u32;
    let x1 = (x0 as f64 + cell_w * SHAPE_RATIO) as u32;

    let mut counts = [0u32; 5];
    for y in y0..y1.min(height) {
        for x in x0..x1.min(width) {
            let pixel = img.get_pixel(x, y);
            let classified = classify_pixel(pixel);
            counts[cell_index(classified)] += 1;
        }
    }

    let (best_index, _) = counts
        .iter()
        .enumerate()
        .max_by_key(|&(_, &count)| count)
        .expect("counts is non-empty");
    cell_from_index(best_index)
}

fn cell_index(cell: Cell) -> usize {
    match cell {
        Cell::Empty => 0,
        Cell::Blue => 1,
        Cell::Green => 2,
        Cell::Orange => 3,
        Cell::Pink => 4,
        Cell::Mark => 0,
    }
}

fn cell_from_index(index: usize) -> Cell {
    match index {
        1 => Cell::Blue,
        2 => Cell::Green,
        3 => Cell::Orange,
        4 => Cell::Pink,
        _ => Cell::Empty,
    }
}

fn classify_pixel(pixel: Rgba<u8>) -> Cell {
    let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
    identify_cell_hsv(h, s, v)
}

/// Converts an 8-bit RGB triple to HSV, hue in degrees `[0, 360)`, saturation and value in
/// `[0, 1]`.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let rf = r as f64 / 255.0;
    let gf = g as f64 / 255.0;
    let bf = b as f64 / 255.0;

    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let v = max;
    let d = max - min;
    let s = if max == 0.0 { 0.0 } else { d / max };

    let mut h = if d == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / d).rem_euclid(6.0))
    } else if max == gf {
        60.0 * (((bf - rf) / d) + 2.0)
    } else {
        60.0 * (((rf - gf) / d) + 4.0)
    };

    if h < 0.0 {
        h += 360.0;
    }

    (h, s, v)
}

fn identify_cell_hsv(h: f64, s: f64, v: f64) -> Cell {
    if (290.0..350.0).contains(&h) && s > 0.3 && v > 0.5 {
        Cell::Pink
    } else if (15.0..45.0).contains(&h) && s > 0.3 && v > 0.5 {
        Cell::Orange
    } else if (70.0..170.0).contains(&h) && s > 0.3 && v > 0.3 {
        Cell::Green
    } else if (180.0..260.0).contains(&h) && s > 0.3 && v > 0.3 {
        Cell::Blue
    } else {
        Cell::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_blue_classifies_as_blue() {
        assert_eq!(classify_pixel(Rgba([0, 80, 220, 255])), Cell::Blue);
    }

    #[test]
    fn pure_green_classifies_as_green() {
        assert_eq!(classify_pixel(Rgba([40, 200, 60, 255])), Cell::Green);
    }

    #[test]
    fn pure_orange_classifies_as_orange() {
        assert_eq!(classify_pixel(Rgba([230, 140, 20, 255])), Cell::Orange);
    }

    #[test]
    fn pure_pink_classifies_as_pink() {
        assert_eq!(classify_pixel(Rgba([230, 30, 200, 255])), Cell::Pink);
    }

    #[test]
    fn gray_classifies_as_empty() {
        assert_eq!(classify_pixel(Rgba([120, 120, 120, 255])), Cell::Empty);
    }

    #[test]
    fn low_value_dark_blue_hue_classifies_as_empty() {
        // Hue is in the blue band but value is too low to pass the `v > 0.3` threshold.
        assert_eq!(classify_pixel(Rgba([0, 10, 25, 255])), Cell::Empty);
    }

    #[test]
    fn hsv_conversion_matches_known_values() {
        let (h, s, v) = rgb_to_hsv(255, 0, 0);
        assert!((h - 0.0).abs() < 1e-9);
        assert!((s - 1.0).abs() < 1e-9);
        assert!((v - 1.0).abs() < 1e-9);
    }
}
