use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 截图与拼图过程中可能出现的错误
#[derive(Debug, Error)]
pub enum FramerError {
    /// 参数组合不合法（例如空的图片列表）
    #[error("参数错误: {0}")]
    Argument(String),

    /// 媒体无法打开，或者播放器进入了错误/结束状态
    #[error("无法打开媒体 {uri}: {reason}")]
    ResourceOpen { uri: String, reason: String },

    /// 播放器在超时时间内没有进入可用状态
    #[error("等待媒体就绪超时 ({timeout:?}): {uri}")]
    OpenTimeout { uri: String, timeout: Duration },

    /// 无法获取媒体时长，毫秒时间无法换算成位置
    #[error("无法获取媒体时长: {0}")]
    UnknownDuration(String),

    /// 多次尝试后截图文件仍未生成
    #[error("无法截图: {}", path.display())]
    Capture { path: PathBuf },

    /// 拼图时图片尺寸与第一张不一致
    #[error(
        "图片尺寸不一致: {} 为 {actual_width}x{actual_height}，期望 {expected_width}x{expected_height}",
        path.display()
    )]
    DimensionMismatch {
        path: PathBuf,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, FramerError>;
