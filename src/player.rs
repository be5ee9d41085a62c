use anyhow::Result;
use std::path::Path;

/// 播放器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    NothingSpecial,
    Opening,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl PlayerState {
    /// 媒体仍在加载中（尚未进入播放或暂停）
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            PlayerState::NothingSpecial | PlayerState::Opening | PlayerState::Buffering
        )
    }

    /// 可以定位和截图的状态
    pub fn is_ready(self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Paused)
    }
}

/// 播放引擎抽象：截图流程只依赖这些基本操作
///
/// 一个播放器实例的位置和状态是共享的可变状态，
/// 因此同一时刻只能被一个 `Video` 独占使用。
pub trait Player {
    /// 开始播放（打开媒体）
    fn play(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    /// 轮询当前状态，打开中的播放器可能借此推进到播放或错误状态
    fn state(&mut self) -> PlayerState;

    /// 最近一次打开失败的原因
    fn last_error(&self) -> Option<String> {
        None
    }

    /// 媒体总时长（毫秒），未知时返回 None
    fn duration_ms(&self) -> Option<i64>;

    /// 源视频宽度（像素）
    fn video_width(&self) -> u32;

    /// 设置播放位置，0.0 为开头，1.0 为结尾
    fn set_position(&mut self, position: f64);

    /// 把当前位置的画面写入 `path`
    ///
    /// `width`/`height` 为 0 时按源视频宽高比自动缩放该方向。
    /// 返回 Ok 不代表文件一定已经写出，调用方需要自行检查文件是否存在。
    fn take_snapshot(&mut self, path: &Path, width: u32, height: u32) -> Result<()>;
}

/// 计算截图尺寸：0 表示按宽高比自动缩放该方向
pub fn scale_to_fit(source_width: u32, source_height: u32, width: u32, height: u32) -> (u32, u32) {
    let ratio = |numerator: u32, a: u32, b: u32| -> u32 {
        if b == 0 {
            return numerator.max(1);
        }
        ((numerator as f64 * a as f64 / b as f64).round() as u32).max(1)
    };

    match (width, height) {
        (0, 0) => (source_width, source_height),
        (w, 0) => (w, ratio(w, source_height, source_width)),
        (0, h) => (ratio(h, source_width, source_height), h),
        (w, h) => (w, h),
    }
}
