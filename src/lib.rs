pub mod combine;
pub mod config;
pub mod error;
pub mod metadata;
pub mod player;
pub mod snapshot;
pub mod video_player;

pub use combine::{combine_vertical, combine_vertical_strict, is_same_file, vertical_output_name};
pub use config::{ConfigLoader, FramerConfig};
pub use error::{FramerError, Result};
pub use metadata::{SnapshotManifest, SnapshotRecord};
pub use player::{Player, PlayerState};
pub use snapshot::{SnapshotFormat, SnapshotSize, Snapshots, Video};
pub use video_player::FfmpegPlayer;

/// 判断输入是 URL 还是本地文件：冒号出现在第一个字符之后即视为 URL
pub fn is_url(path: &str) -> bool {
    path.find(':').map_or(false, |index| index > 0)
}
