use std::sync::atomic::{AtomicUsize, Ordering};

/// Tiles never exceed this in either axis.
pub const TILE_SIZE: u32 = 32;

/// Half-open pixel rectangle; the unit of work handed to a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub start_x: u32,
    pub start_y: u32,
    pub end_x: u32,
    pub end_y: u32,
}

impl Tile {
    pub fn width(&self) -> u32 {
        self.end_x - self.start_x
    }

    pub fn height(&self) -> u32 {
        self.end_y - self.start_y
    }

    pub fn pixel_count(&self) -> u32 {
        self.width() * self.height()
    }
}

/// Row-major tiles covering the image exactly, without overlap. Border
/// tiles shrink to whatever remains.
pub fn generate_tiles(
    width: u32,
    height: u32,
) -> Vec<Tile> {
    let mut tiles = Vec::new();
    for start_y in (0..height).step_by(TILE_SIZE as usize) {
        for start_x in (0..width).step_by(TILE_SIZE as usize) {
            tiles.push(Tile {
                start_x,
                start_y,
                end_x: (start_x + TILE_SIZE).min(width),
                end_y: (start_y + TILE_SIZE).min(height),
            });
        }
    }
    tiles
}

/// Lock-free work queue: claims advance `next`, finished tiles bump
/// `completed`. These two counters are the only synchronization between
/// workers in the steady state.
pub struct TileQueue {
    tiles: Vec<Tile>,
    next: AtomicUsize,
    completed: AtomicUsize,
}

impl TileQueue {
    pub fn new(tiles: Vec<Tile>) -> Self {
        Self {
            tiles,
            next: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Claims the next tile, or `None` when the queue is drained.
    pub fn claim(&self) -> Option<(usize, Tile)> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.tiles.get(index).map(|tile| (index, *tile))
    }

    pub fn mark_completed(&self) {
        self.completed.fetch_add(1, Ordering::Release);
    }

    pub fn total(&self) -> usize {
        self.tiles.len()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> f32 {
        if self.tiles.is_empty() {
            return 1.0;
        }
        self.completed() as f32 / self.tiles.len() as f32
    }
}
