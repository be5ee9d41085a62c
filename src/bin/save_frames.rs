use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use tracing::{info, warn};
use video_framer::snapshot::{default_prefix, default_snapshot_dir};
use video_framer::{
    is_url, ConfigLoader, SnapshotFormat, SnapshotManifest, SnapshotRecord, SnapshotSize, Video,
};

/// 视频截图工具 - 在指定位置截取视频画面
#[derive(Parser, Debug)]
#[command(name = "save-frames")]
#[command(
    about = "视频截图工具：在指定位置或时间截取视频画面",
    long_about = "视频截图工具：在指定位置或时间截取视频画面。\n\
        可以指定缩放比例或宽/高，都不指定时使用视频原始尺寸。\n\
        同时指定缩放比例和宽/高时，以宽/高为准；只指定一个方向时，另一个方向按宽高比自动缩放。"
)]
struct Args {
    /// 视频文件路径，也可以是 URL（此时必须指定 --path）
    file: String,

    /// 截图位置，0 为开头、1 为结尾；指定 -m 时为毫秒时间
    #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
    positions: Vec<f64>,

    /// 截图保存目录，默认为视频所在目录（URL 必须指定）
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// 把位置解释为毫秒时间
    #[arg(short, long)]
    milliseconds: bool,

    /// 截图文件名前缀，默认为视频文件名（不含扩展名）
    #[arg(short, long)]
    name: Option<String>,

    /// 缩放比例，1 表示视频原始尺寸
    #[arg(short, long)]
    scale: Option<f64>,

    /// 截图宽度（像素）
    #[arg(short, long)]
    width: Option<u32>,

    /// 截图高度（像素）
    #[arg(short, long)]
    length: Option<u32>,

    /// 截图文件格式
    #[arg(short = 't', long = "type", value_enum, default_value_t = SnapshotFormat::Png)]
    format: SnapshotFormat,

    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：环境变量 > 配置文件 > 默认值
    #[arg(long)]
    config: Option<PathBuf>,

    /// 把本次截图清单写入 JSON 文件
    #[arg(long)]
    manifest: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let remote = is_url(&args.file);
    if remote && args.path.is_none() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "网络视频必须指定 --path")
            .exit();
    }

    let config = ConfigLoader::load_config(args.config.as_deref())
        .context("加载配置失败")?;

    // 日志写到 stderr，stdout 只输出截图路径
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_writer(std::io::stderr)
        .init();

    if remote {
        warn!("🌐 [截图] 输入是网络地址，能否截图取决于网络和服务器");
    }

    let snapshot_dir = args
        .path
        .clone()
        .unwrap_or_else(|| default_snapshot_dir(&args.file));
    let name = args
        .name
        .clone()
        .unwrap_or_else(|| default_prefix(&args.file));
    let size = SnapshotSize {
        scale: args.scale,
        width: args.width,
        height: args.length,
    };

    let mut video = Video::open(&args.file, &snapshot_dir, size, args.format, &config)
        .context("打开视频失败")?;

    let positions = if args.milliseconds {
        video
            .convert_times_to_positions(args.positions.iter().copied())
            .context("毫秒时间换算失败")?
    } else {
        args.positions.clone()
    };

    let mut records = Vec::with_capacity(positions.len());
    for (index, snapshot) in video
        .take_snapshots(&name, positions.iter().copied())
        .context("准备截图失败")?
        .enumerate()
    {
        let file = snapshot?;
        println!("Created {}", file.display());
        records.push(SnapshotRecord {
            index,
            position: positions[index],
            file: file.to_string_lossy().to_string(),
        });
    }

    println!("--------------------");
    for record in &records {
        println!("{}", record.file);
    }

    if let Some(manifest_path) = &args.manifest {
        let manifest = SnapshotManifest {
            input_video: args.file.clone(),
            snapshot_dir: snapshot_dir.to_string_lossy().to_string(),
            format: args.format.to_string(),
            width: video.width(),
            height: video.height(),
            created_at: chrono::Utc::now().to_rfc3339(),
            snapshots: records,
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .context("序列化截图清单失败")?;
        std::fs::write(manifest_path, manifest_json)
            .with_context(|| format!("写入截图清单失败: {}", manifest_path.display()))?;
        info!("📝 [截图] 截图清单: {}", manifest_path.display());
    }

    Ok(())
}
