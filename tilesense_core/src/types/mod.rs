//! Contains types like pixel rectangles, tile grids, payload formats, and more.

mod blob;
pub use blob::*;

mod pixel_rect;
pub use pixel_rect::*;

mod tile_compression;
pub use tile_compression::*;

mod tile_format;
pub use tile_format::*;

mod tile_grid;
pub use tile_grid::*;
