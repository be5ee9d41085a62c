use ffmpeg_next as ffmpeg;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::player::{scale_to_fit, Player, PlayerState};

/// 打开成功后的媒体信息
struct OpenedMedia {
    input: ffmpeg::format::context::Input,
    video_stream_index: usize,
    time_base: ffmpeg::Rational,
    /// 容器起始时间（秒），MPEG-TS 等格式通常不为 0
    start_time: f64,
    duration_ms: Option<i64>,
    width: u32,
}

/// 基于 FFmpeg 的播放器，负责打开媒体、定位并截取画面
///
/// `play` 在后台线程里打开媒体，`state` 轮询打开结果，
/// 因此调用方可以用超时等待，而不会卡死在无响应的网络地址上。
pub struct FfmpegPlayer {
    uri: String,
    open_timeout: Duration,
    media: Option<OpenedMedia>,
    pending: Option<Receiver<std::result::Result<OpenedMedia, String>>>,
    position: f64,
    state: PlayerState,
    last_error: Option<String>,
}

/// 把以 `time_base` 为单位的时间戳换算成秒
fn timestamp_seconds(ts: i64, time_base: ffmpeg::Rational) -> f64 {
    ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// 打开输入并读取视频流信息
///
/// 网络协议的读写超时设为等待时间的两倍：调用方先按自己的超时放弃，
/// 后台线程随后也会因为 FFmpeg 超时而退出。
fn open_media(uri: &str, open_timeout: Duration) -> Result<OpenedMedia> {
    let timeout_us = (open_timeout.as_micros() * 2).max(1).to_string();
    let mut options = ffmpeg::Dictionary::new();
    options.set("rw_timeout", &timeout_us);
    options.set("timeout", &timeout_us);

    let ictx = ffmpeg::format::input_with_dictionary(&uri, options)
        .context("无法打开视频文件")?;

    let video_stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .context("未找到视频流")?;

    let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
        .context("无法创建解码器上下文")?
        .decoder()
        .video()
        .context("无法创建视频解码器")?;

    let time_base = video_stream.time_base();

    let raw_start = unsafe { (*ictx.as_ptr()).start_time };
    let start_time = if raw_start == ffmpeg::ffi::AV_NOPTS_VALUE || raw_start < 0 {
        0.0
    } else {
        raw_start as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
    };

    // 优先使用容器时长，缺失时退回到视频流时长
    let container_duration = ictx.duration();
    let duration_ms = if container_duration > 0 {
        Some(container_duration / (ffmpeg::ffi::AV_TIME_BASE as i64 / 1000))
    } else if video_stream.duration() > 0 {
        Some((timestamp_seconds(video_stream.duration(), time_base) * 1000.0) as i64)
    } else {
        None
    };

    debug!(
        "🎞️  [播放器] 已打开 {}: {}x{}, 起始 {:.3}s, 时长 {:?}ms",
        uri,
        decoder.width(),
        decoder.height(),
        start_time,
        duration_ms
    );

    Ok(OpenedMedia {
        video_stream_index: video_stream.index(),
        time_base,
        start_time,
        duration_ms,
        width: decoder.width(),
        input: ictx,
    })
}

impl FfmpegPlayer {
    pub fn new(uri: impl Into<String>, open_timeout: Duration) -> Result<Self> {
        ffmpeg::init().context("初始化 FFmpeg 失败")?;

        // 只显示错误和致命错误
        unsafe {
            ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
        }

        Ok(Self {
            uri: uri.into(),
            open_timeout,
            media: None,
            pending: None,
            position: 0.0,
            state: PlayerState::NothingSpecial,
            last_error: None,
        })
    }

    /// 查看后台打开线程是否已经有结果
    fn poll_open(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };

        let outcome = match pending.try_recv() {
            Err(TryRecvError::Empty) => return,
            Ok(outcome) => outcome,
            Err(TryRecvError::Disconnected) => Err("打开线程意外退出".to_string()),
        };
        self.pending = None;

        match outcome {
            Ok(media) => {
                self.media = Some(media);
                self.last_error = None;
                self.state = PlayerState::Playing;
            }
            Err(e) => {
                warn!("⚠️  [播放器] 打开媒体失败: {} - {}", self.uri, e);
                self.last_error = Some(e);
                self.state = PlayerState::Error;
            }
        }
    }

    /// 定位到目标时间（相对媒体开头，秒）并解码出最接近的一帧
    ///
    /// 先向后跳到最近的关键帧，再顺序解码直到帧时间不早于目标时间。
    /// 目标超过最后一帧时返回最后解码出的帧。
    fn decode_frame_at(&mut self, target_time: f64) -> Result<ffmpeg::frame::Video> {
        let media = self.media.as_mut().context("媒体尚未打开")?;
        let stream_index = media.video_stream_index;
        let time_base = media.time_base;
        // 帧时间戳是绝对时间，需要加上容器起始时间
        let absolute_target = media.start_time + target_time;

        let parameters = media
            .input
            .stream(stream_index)
            .context("未找到视频流")?
            .parameters();
        let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .context("无法创建解码器上下文")?
            .decoder()
            .video()
            .context("无法创建视频解码器")?;

        let timestamp = (absolute_target * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
        unsafe {
            let ret = ffmpeg::sys::av_seek_frame(
                media.input.as_mut_ptr(),
                -1,
                timestamp,
                ffmpeg::sys::AVSEEK_FLAG_BACKWARD as i32,
            );
            if ret < 0 {
                anyhow::bail!("Seek 失败: {:.3}s", target_time);
            }
        }

        // 没有时间戳的帧直接视为命中
        let reached = |frame: &ffmpeg::frame::Video| {
            frame
                .timestamp()
                .map_or(true, |ts| timestamp_seconds(ts, time_base) >= absolute_target)
        };

        let mut latest: Option<ffmpeg::frame::Video> = None;
        let mut decoded = ffmpeg::frame::Video::empty();

        for (stream, packet) in media.input.packets() {
            if stream.index() != stream_index {
                continue;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            while decoder.receive_frame(&mut decoded).is_ok() {
                if reached(&decoded) {
                    return Ok(decoded);
                }
                latest = Some(std::mem::replace(&mut decoded, ffmpeg::frame::Video::empty()));
            }
        }

        // 读到结尾后冲出解码器里剩余的帧
        if decoder.send_eof().is_ok() {
            while decoder.receive_frame(&mut decoded).is_ok() {
                if reached(&decoded) {
                    return Ok(decoded);
                }
                latest = Some(std::mem::replace(&mut decoded, ffmpeg::frame::Video::empty()));
            }
        }

        latest.context("未解码到任何视频帧")
    }

    /// 将 FFmpeg 帧缩放并转换为 RGB 图像
    fn frame_to_image(frame: &ffmpeg::frame::Video, width: u32, height: u32) -> Result<image::RgbImage> {
        let (out_width, out_height) = scale_to_fit(frame.width(), frame.height(), width, height);

        let mut scaler = ffmpeg::software::scaling::Context::get(
            frame.format(),
            frame.width(),
            frame.height(),
            ffmpeg::format::Pixel::RGB24,
            out_width,
            out_height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("无法创建缩放器")?;

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        scaler.run(frame, &mut rgb_frame).context("缩放视频帧失败")?;

        // 只拷贝可见像素，跳过每行末尾的 stride 填充
        let stride = rgb_frame.stride(0);
        let row_bytes = out_width as usize * 3;
        let raw = rgb_frame.data(0);
        let data: Vec<u8> = (0..out_height as usize)
            .flat_map(|row| &raw[row * stride..row * stride + row_bytes])
            .copied()
            .collect();

        image::RgbImage::from_raw(out_width, out_height, data).context("帧数据长度与尺寸不符")
    }
}

impl Player for FfmpegPlayer {
    fn play(&mut self) {
        if self.media.is_some() {
            self.state = PlayerState::Playing;
            return;
        }
        if self.pending.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel();
        let uri = self.uri.clone();
        let open_timeout = self.open_timeout;
        thread::spawn(move || {
            // 调用方已经放弃等待时接收端会被丢弃，发送失败可以忽略
            let _ = tx.send(open_media(&uri, open_timeout).map_err(|e| format!("{:#}", e)));
        });

        self.pending = Some(rx);
        self.state = PlayerState::Opening;
    }

    fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.state = PlayerState::Paused;
        }
    }

    fn stop(&mut self) {
        self.media = None;
        self.pending = None;
        self.state = PlayerState::Stopped;
    }

    fn state(&mut self) -> PlayerState {
        self.poll_open();
        self.state
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn duration_ms(&self) -> Option<i64> {
        self.media.as_ref().and_then(|media| media.duration_ms)
    }

    fn video_width(&self) -> u32 {
        self.media.as_ref().map_or(0, |media| media.width)
    }

    fn set_position(&mut self, position: f64) {
        self.position = position.clamp(0.0, 1.0);
    }

    fn take_snapshot(&mut self, path: &Path, width: u32, height: u32) -> Result<()> {
        let duration_ms = self.duration_ms().context("媒体时长未知，无法定位")?;
        let target_time = self.position * duration_ms as f64 / 1000.0;

        let frame = self.decode_frame_at(target_time)?;
        let img = Self::frame_to_image(&frame, width, height)?;
        img.save(path)
            .with_context(|| format!("保存截图失败: {}", path.display()))?;

        debug!("💾 [播放器] 目标 {:.3}s -> {}", target_time, path.display());
        Ok(())
    }
}
