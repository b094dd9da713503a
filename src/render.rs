use crate::report::pretty_len;
use crate::types::Stick;

const MAX_WIDTH: f64 = 80.0;
const HEIGHT: usize = 2;

/// Draws one stick as a strip of boxed cuts with the waste dotted out.
/// `kerf` is the gap left between neighbouring cuts.
pub fn render_stick(stick: &Stick, stock_length: f64, kerf: f64) -> String {
    if stock_length <= 0.0 {
        return String::new();
    }
    let scale = MAX_WIDTH / stock_length;
    let grid_w = (stock_length * scale).round() as usize;
    if grid_w == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; grid_w + 1]; HEIGHT + 1];

    // Stock border first
    draw_rect(&mut grid, 0, grid_w);

    let mut offset = 0.0;
    let mut end = 0;
    for (i, cut) in stick.cuts.iter().enumerate() {
        if i > 0 {
            offset += kerf;
        }
        let sx = (offset * scale).round() as usize;
        let sw = (cut.length * scale).round() as usize;
        offset += cut.length;
        if sw == 0 {
            continue;
        }
        draw_rect(&mut grid, sx, sw);
        end = sx + sw;

        let label: Vec<char> = pretty_len(cut.length).chars().collect();
        if sw > label.len() {
            let start = sx + sw / 2 - label.len() / 2;
            for (k, &ch) in label.iter().enumerate() {
                let x = start + k;
                if x > sx && x < sx + sw {
                    grid[1][x] = ch;
                }
            }
        }
    }

    for x in end + 1..grid_w {
        grid[1][x] = '.';
    }

    let mut result = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

fn draw_rect(grid: &mut [Vec<char>], x: usize, w: usize) {
    let cols = match grid.first() {
        Some(row) => row.len(),
        None => return,
    };

    // Horizontal edges
    for i in x..=x + w {
        if i < cols {
            for y in [0, HEIGHT] {
                if grid[y][i] != '+' {
                    grid[y][i] = '-';
                }
            }
        }
    }

    // Vertical edges and corners
    for cx in [x, x + w] {
        if cx < cols {
            grid[1][cx] = '|';
            grid[0][cx] = '+';
            grid[HEIGHT][cx] = '+';
        }
    }
}
