pub mod ids;
pub mod pattern;
pub mod song;

pub use ids::SongId;
pub use pattern::{ChartMetadata, Pattern};
pub use song::Song;
