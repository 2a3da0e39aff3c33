mod bot_sort;
mod ecc;
pub mod gmc;
pub(crate) mod imgproc;
mod kalman_filter;
pub mod matching;
mod track;

pub use bot_sort::{BotSort, BotSortConfig};
pub use ecc::{EccConfig, EccGmc};
pub use gmc::{
    GlobalMotionCompensation, GmcBackend, GmcMethod, SparseFlowConfig,
    SparseFlowGmc,
};
pub use kalman_filter::KalmanFilter;
pub use track::{Track, TrackState};
