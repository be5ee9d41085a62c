use std::fmt;
use std::fs;
use std::iter::{Enumerate, FusedIterator};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::FramerConfig;
use crate::error::{FramerError, Result};
use crate::player::Player;
use crate::video_player::FfmpegPlayer;

/// 截图文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SnapshotFormat {
    #[default]
    Png,
    Jpg,
}

impl SnapshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Png => "png",
            SnapshotFormat::Jpg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            SnapshotFormat::Png => image::ImageFormat::Png,
            SnapshotFormat::Jpg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// 用户指定的截图尺寸参数
///
/// 宽/高优先于缩放比例；只给出一个方向时，另一个方向按宽高比自动缩放。
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotSize {
    pub scale: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// 计算最终传给播放器的宽高，0 表示自动
pub fn resolve_dimensions(size: &SnapshotSize, source_width: u32) -> (u32, u32) {
    if size.width.is_some() || size.height.is_some() {
        (size.width.unwrap_or(0), size.height.unwrap_or(0))
    } else if let Some(scale) = size.scale {
        ((scale * source_width as f64) as u32, 0)
    } else {
        (0, 0)
    }
}

/// 截图文件名：`<prefix>_<两位序号>.<ext>`
pub fn snapshot_file_name(prefix: &str, index: usize, format: SnapshotFormat) -> String {
    format!("{}_{:0>2}.{}", prefix, index, format.extension())
}

/// 默认截图前缀：视频文件名去掉扩展名
pub fn default_prefix(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

/// 默认截图目录：视频所在目录，没有目录部分时为当前目录
pub fn default_snapshot_dir(file_name: &str) -> PathBuf {
    match Path::new(file_name).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// 删除目录中匹配 `<prefix>*.<ext>` 的旧截图，返回删除的文件数
pub fn purge_stale_snapshots(dir: &Path, prefix: &str, format: SnapshotFormat) -> Result<usize> {
    let suffix = format!(".{}", format.extension());
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };

        let matches = name.len() >= prefix.len() + suffix.len()
            && name.starts_with(prefix)
            && name.ends_with(&suffix);
        if matches && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            debug!("🗑️  [截图] 删除旧截图: {}", entry.path().display());
            removed += 1;
        }
    }

    Ok(removed)
}

/// 轮询播放器直到进入播放/暂停状态
///
/// 播放器报告错误或结束时立即返回 `ResourceOpen`，超过 `timeout` 返回 `OpenTimeout`。
pub fn wait_until_ready<P: Player + ?Sized>(
    player: &mut P,
    uri: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let state = player.state();
        if state.is_ready() {
            return Ok(());
        }
        if !state.is_loading() {
            return Err(FramerError::ResourceOpen {
                uri: uri.to_string(),
                reason: player
                    .last_error()
                    .unwrap_or_else(|| format!("播放器状态: {:?}", state)),
            });
        }
        if start.elapsed() >= timeout {
            return Err(FramerError::OpenTimeout {
                uri: uri.to_string(),
                timeout,
            });
        }
        thread::sleep(poll_interval);
    }
}

/// 已打开的视频，提供按位置或按时间截图
pub struct Video<P: Player = FfmpegPlayer> {
    file_name: String,
    snapshot_path: PathBuf,
    width: u32,
    height: u32,
    format: SnapshotFormat,
    capture_attempts: u32,
    open_timeout: Duration,
    poll_interval: Duration,
    player: P,
}

impl Video<FfmpegPlayer> {
    /// 用 FFmpeg 打开视频文件或 URL
    pub fn open(
        file_name: &str,
        snapshot_path: impl Into<PathBuf>,
        size: SnapshotSize,
        format: SnapshotFormat,
        config: &FramerConfig,
    ) -> Result<Self> {
        let player = FfmpegPlayer::new(file_name, config.open_timeout).map_err(|e| FramerError::ResourceOpen {
            uri: file_name.to_string(),
            reason: format!("{:#}", e),
        })?;
        Self::with_player(player, file_name, snapshot_path, size, format, config)
    }
}

impl<P: Player> Video<P> {
    /// 使用给定的播放器打开视频，阻塞直到媒体可用或超时
    pub fn with_player(
        player: P,
        file_name: impl Into<String>,
        snapshot_path: impl Into<PathBuf>,
        size: SnapshotSize,
        format: SnapshotFormat,
        config: &FramerConfig,
    ) -> Result<Self> {
        let mut video = Self {
            file_name: file_name.into(),
            snapshot_path: snapshot_path.into(),
            width: 0,
            height: 0,
            format,
            capture_attempts: config.capture_attempts.max(1),
            open_timeout: config.open_timeout,
            poll_interval: config.poll_interval,
            player,
        };
        video.ensure_ready()?;

        let (width, height) = resolve_dimensions(&size, video.player.video_width());
        video.width = width;
        video.height = height;
        info!(
            "🎬 [截图] 已打开视频: {} (截图尺寸 {}x{}, 0 表示自动)",
            video.file_name, width, height
        );

        Ok(video)
    }

    /// 播放器不在播放/暂停状态时重新开始播放，等待就绪后暂停
    fn ensure_ready(&mut self) -> Result<()> {
        if self.player.state().is_ready() {
            return Ok(());
        }
        self.player.play();
        wait_until_ready(&mut self.player, &self.file_name, self.open_timeout, self.poll_interval)?;
        self.player.pause();
        Ok(())
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    /// 按位置（0.0-1.0）截图
    ///
    /// 先删除同前缀同格式的旧截图，再返回一个惰性迭代器，
    /// 每次 `next` 截取一张并返回文件路径。某个位置截图失败后迭代器结束。
    pub fn take_snapshots<I>(&mut self, prefix: &str, positions: I) -> Result<Snapshots<'_, P, I::IntoIter>>
    where
        I: IntoIterator<Item = f64>,
    {
        self.ensure_ready()?;

        let prefix = prefix.replace(' ', "_");
        let removed = purge_stale_snapshots(&self.snapshot_path, &prefix, self.format)?;
        if removed > 0 {
            info!("🗑️  [截图] 已删除 {} 个旧截图 ({}*.{})", removed, prefix, self.format);
        }

        Ok(Snapshots {
            video: self,
            prefix,
            positions: positions.into_iter().enumerate(),
            finished: false,
        })
    }

    /// 把毫秒时间换算为位置
    pub fn convert_times_to_positions<I>(&self, times: I) -> Result<Vec<f64>>
    where
        I: IntoIterator<Item = f64>,
    {
        let duration = self
            .player
            .duration_ms()
            .filter(|d| *d > 0)
            .ok_or_else(|| FramerError::UnknownDuration(self.file_name.clone()))?;

        Ok(times.into_iter().map(|t| t / duration as f64).collect())
    }

    /// 按毫秒时间截图
    pub fn take_snapshots_times<I>(
        &mut self,
        prefix: &str,
        times: I,
    ) -> Result<Snapshots<'_, P, std::vec::IntoIter<f64>>>
    where
        I: IntoIterator<Item = f64>,
    {
        let positions = self.convert_times_to_positions(times)?;
        self.take_snapshots(prefix, positions)
    }

    /// 截取一个位置，文件没有出现时重试，直到用完尝试次数
    fn capture(&mut self, prefix: &str, index: usize, position: f64) -> Result<PathBuf> {
        let path = self
            .snapshot_path
            .join(snapshot_file_name(prefix, index, self.format));

        self.player.set_position(position);

        for attempt in 1..=self.capture_attempts {
            if let Err(e) = self.player.take_snapshot(&path, self.width, self.height) {
                warn!(
                    "⚠️  [截图] 第 {}/{} 次截图失败: {} - {:#}",
                    attempt, self.capture_attempts, path.display(), e
                );
            }
            if path.exists() {
                debug!("💾 [截图] 位置 {:.4} -> {}", position, path.display());
                return Ok(path);
            }
        }

        error!(
            "❌ [截图] {} 次尝试后仍未生成截图: {}",
            self.capture_attempts,
            path.display()
        );
        Err(FramerError::Capture { path })
    }
}

/// 截图迭代器，只能消费一次
pub struct Snapshots<'a, P: Player, I: Iterator<Item = f64>> {
    video: &'a mut Video<P>,
    prefix: String,
    positions: Enumerate<I>,
    finished: bool,
}

impl<P: Player, I: Iterator<Item = f64>> Iterator for Snapshots<'_, P, I> {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.positions.next() {
            Some((index, position)) => {
                let result = self.video.capture(&self.prefix, index, position);
                if result.is_err() {
                    self.finished = true;
                }
                Some(result)
            }
            None => {
                self.finished = true;
                self.video.player.stop();
                None
            }
        }
    }
}

impl<P: Player, I: Iterator<Item = f64>> FusedIterator for Snapshots<'_, P, I> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerState;

    /// 写出真实 PNG 的假播放器；`failures` 记录每个位置需要失败的次数
    struct FakePlayer {
        state: PlayerState,
        loading_polls: u32,
        duration_ms: Option<i64>,
        width: u32,
        position: f64,
        failures: Vec<(f64, u32)>,
        positions_seen: Vec<f64>,
        attempts: u32,
        stopped: bool,
    }

    impl FakePlayer {
        fn new() -> Self {
            Self {
                state: PlayerState::NothingSpecial,
                loading_polls: 0,
                duration_ms: Some(10_000),
                width: 640,
                position: 0.0,
                failures: Vec::new(),
                positions_seen: Vec::new(),
                attempts: 0,
                stopped: false,
            }
        }
    }

    impl Player for FakePlayer {
        fn play(&mut self) {
            self.state = PlayerState::Opening;
        }

        fn pause(&mut self) {
            self.state = PlayerState::Paused;
        }

        fn stop(&mut self) {
            self.stopped = true;
            self.state = PlayerState::Stopped;
        }

        fn state(&mut self) -> PlayerState {
            // 轮询两次后进入播放状态
            if self.state == PlayerState::Opening {
                self.loading_polls += 1;
                if self.loading_polls > 2 {
                    self.loading_polls = 0;
                    self.state = PlayerState::Playing;
                }
            }
            self.state
        }

        fn duration_ms(&self) -> Option<i64> {
            self.duration_ms
        }

        fn video_width(&self) -> u32 {
            self.width
        }

        fn set_position(&mut self, position: f64) {
            self.position = position;
            self.positions_seen.push(position);
        }

        fn take_snapshot(&mut self, path: &Path, _width: u32, _height: u32) -> anyhow::Result<()> {
            self.attempts += 1;
            if let Some((_, remaining)) = self
                .failures
                .iter_mut()
                .find(|(p, n)| *p == self.position && *n > 0)
            {
                *remaining -= 1;
                anyhow::bail!("模拟截图失败");
            }
            image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30])).save(path)?;
            Ok(())
        }
    }

    fn fast_config() -> FramerConfig {
        FramerConfig {
            open_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
            ..FramerConfig::default()
        }
    }

    fn open_fake(player: FakePlayer, dir: &Path) -> Video<FakePlayer> {
        Video::with_player(
            player,
            "video.mp4",
            dir,
            SnapshotSize::default(),
            SnapshotFormat::Png,
            &fast_config(),
        )
        .unwrap()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_resolve_dimensions() {
        let size = |scale, width, height| SnapshotSize { scale, width, height };
        assert_eq!(resolve_dimensions(&size(None, None, None), 640), (0, 0));
        assert_eq!(resolve_dimensions(&size(Some(0.5), None, None), 640), (320, 0));
        assert_eq!(resolve_dimensions(&size(Some(0.5), Some(100), None), 640), (100, 0));
        assert_eq!(resolve_dimensions(&size(None, None, Some(90)), 640), (0, 90));
        assert_eq!(resolve_dimensions(&size(Some(2.0), Some(10), Some(20)), 640), (10, 20));
    }

    #[test]
    fn test_defaults_from_file_name() {
        assert_eq!(default_prefix("videos/holiday trip.mp4"), "holiday trip");
        assert_eq!(default_prefix("clip"), "clip");
        assert_eq!(default_snapshot_dir("videos/clip.mp4"), PathBuf::from("videos"));
        assert_eq!(default_snapshot_dir("clip.mp4"), PathBuf::from("."));
    }

    #[test]
    fn test_snapshot_file_name() {
        assert_eq!(snapshot_file_name("frame", 0, SnapshotFormat::Png), "frame_00.png");
        assert_eq!(snapshot_file_name("frame", 7, SnapshotFormat::Jpg), "frame_07.jpg");
        assert_eq!(snapshot_file_name("frame", 123, SnapshotFormat::Png), "frame_123.png");
    }

    #[test]
    fn test_snapshots_in_request_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut video = open_fake(FakePlayer::new(), dir.path());

        let paths: Vec<PathBuf> = video
            .take_snapshots("frame", vec![0.0, 0.5, 1.0])
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("frame_00.png"),
                dir.path().join("frame_01.png"),
                dir.path().join("frame_02.png"),
            ]
        );
        assert_eq!(video.player().positions_seen, vec![0.0, 0.5, 1.0]);
        assert!(video.player().stopped);
    }

    #[test]
    fn test_rerun_purges_stale_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("frame_05.png"), b"stale").unwrap();
        fs::write(dir.path().join("frame_00.jpg"), b"other format").unwrap();
        fs::write(dir.path().join("other_00.png"), b"other prefix").unwrap();

        let mut video = open_fake(FakePlayer::new(), dir.path());
        for _ in 0..2 {
            let count = video
                .take_snapshots("frame", vec![0.1, 0.9])
                .unwrap()
                .collect::<Result<Vec<_>>>()
                .unwrap()
                .len();
            assert_eq!(count, 2);
            assert_eq!(
                file_names(dir.path()),
                vec!["frame_00.jpg", "frame_00.png", "frame_01.png", "other_00.png"]
            );
        }
    }

    #[test]
    fn test_capture_error_stops_remaining_positions() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = FakePlayer::new();
        player.failures = vec![(0.5, u32::MAX)];
        let mut video = open_fake(player, dir.path());

        let mut snapshots = video.take_snapshots("frame", vec![0.0, 0.5, 1.0]).unwrap();
        assert!(snapshots.next().unwrap().is_ok());
        match snapshots.next() {
            Some(Err(FramerError::Capture { path })) => {
                assert_eq!(path, dir.path().join("frame_01.png"));
            }
            other => panic!("期望截图错误，实际: {:?}", other),
        }
        assert!(snapshots.next().is_none());
        assert!(snapshots.next().is_none());
        drop(snapshots);

        // 第一个位置 1 次，第二个位置 4 次
        assert_eq!(video.player().attempts, 5);
        assert_eq!(video.player().positions_seen, vec![0.0, 0.5]);
        assert!(!dir.path().join("frame_02.png").exists());
    }

    #[test]
    fn test_flaky_capture_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = FakePlayer::new();
        player.failures = vec![(0.25, 3)];
        let mut video = open_fake(player, dir.path());

        let paths = video
            .take_snapshots("frame", vec![0.25])
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(paths, vec![dir.path().join("frame_00.png")]);
        assert_eq!(video.player().attempts, 4);
    }

    #[test]
    fn test_prefix_spaces_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut video = open_fake(FakePlayer::new(), dir.path());

        let paths = video
            .take_snapshots("my clip", vec![0.0])
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(paths, vec![dir.path().join("my_clip_00.png")]);
    }

    #[test]
    fn test_convert_times_to_positions() {
        let dir = tempfile::tempdir().unwrap();
        let video = open_fake(FakePlayer::new(), dir.path());

        let positions = video
            .convert_times_to_positions(vec![0.0, 2500.0, 10_000.0])
            .unwrap();
        assert_eq!(positions, vec![0.0, 0.25, 1.0]);
    }

    #[test]
    fn test_unknown_duration() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = FakePlayer::new();
        player.duration_ms = Some(0);
        let mut video = open_fake(player, dir.path());

        assert!(matches!(
            video.take_snapshots_times("frame", vec![1000.0]),
            Err(FramerError::UnknownDuration(_))
        ));
    }

    #[test]
    fn test_scale_uses_source_width() {
        let dir = tempfile::tempdir().unwrap();
        let size = SnapshotSize { scale: Some(0.25), ..SnapshotSize::default() };
        let video = Video::with_player(
            FakePlayer::new(),
            "video.mp4",
            dir.path(),
            size,
            SnapshotFormat::Jpg,
            &fast_config(),
        )
        .unwrap();
        assert_eq!((video.width(), video.height()), (160, 0));
    }

    struct StuckPlayer(PlayerState);

    impl Player for StuckPlayer {
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn stop(&mut self) {}
        fn state(&mut self) -> PlayerState {
            self.0
        }
        fn duration_ms(&self) -> Option<i64> {
            None
        }
        fn video_width(&self) -> u32 {
            0
        }
        fn set_position(&mut self, _position: f64) {}
        fn take_snapshot(&mut self, _path: &Path, _width: u32, _height: u32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_wait_is_bounded() {
        let result = wait_until_ready(
            &mut StuckPlayer(PlayerState::Buffering),
            "http://example.com/live",
            Duration::from_millis(20),
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(FramerError::OpenTimeout { .. })));
    }

    #[test]
    fn test_open_error_state() {
        let result = wait_until_ready(
            &mut StuckPlayer(PlayerState::Error),
            "missing.mp4",
            Duration::from_secs(5),
            Duration::from_millis(1),
        );
        match result {
            Err(FramerError::ResourceOpen { uri, .. }) => assert_eq!(uri, "missing.mp4"),
            other => panic!("期望打开错误，实际: {:?}", other),
        }
    }
}
