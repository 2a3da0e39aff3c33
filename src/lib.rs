pub mod bot_sort;
pub mod detection;
pub mod error;
pub mod frame;
pub mod lapjv;
pub mod rect;

pub use bot_sort::{BotSort, BotSortConfig, GmcMethod, Track, TrackState};
pub use detection::Detection;
pub use error::{Diagnostics, GmcError, TrackError};
pub use frame::{FeatureExtractor, Frame};
pub use rect::Rect;

#[cfg(test)]
mod test_lapjv;
