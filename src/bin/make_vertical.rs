use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use video_framer::{
    combine_vertical, combine_vertical_strict, is_same_file, vertical_output_name, ConfigLoader,
    SnapshotFormat,
};

/// 竖向拼图工具 - 把多张同尺寸图片从上到下拼成一张
#[derive(Parser, Debug)]
#[command(name = "make-vertical")]
#[command(about = "竖向拼图工具：把多张图片从上到下拼成一张，图片尺寸需要一致", long_about = None)]
struct Args {
    /// 要拼接的图片路径
    #[arg(required = true, num_args = 1..)]
    images: Vec<PathBuf>,

    /// 输出文件名，默认为第一张图片名加 `_vertical`
    #[arg(short, long)]
    name: Option<PathBuf>,

    /// 拼接完成后删除原图
    #[arg(short, long)]
    delete: bool,

    /// 输出文件格式
    #[arg(short = 't', long = "type", value_enum, default_value_t = SnapshotFormat::Png)]
    format: SnapshotFormat,

    /// 检查所有图片尺寸与第一张一致，不一致时报错
    #[arg(long)]
    strict: bool,

    /// 配置文件路径（可选，支持 .ini 格式）
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::load_config(args.config.as_deref())
        .context("加载配置失败")?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_writer(std::io::stderr)
        .init();

    let result = if args.strict {
        combine_vertical_strict(args.images.as_slice())
    } else {
        combine_vertical(args.images.as_slice())
    }
    .context("拼接图片失败")?;

    let output = args
        .name
        .clone()
        .unwrap_or_else(|| vertical_output_name(&args.images[0], args.format));

    result
        .save_with_format(&output, args.format.image_format())
        .with_context(|| format!("保存拼接结果失败: {}", output.display()))?;
    info!("💾 [拼接] 已保存: {}", output.display());

    if args.delete {
        for image in &args.images {
            // 输出文件与某张原图同名时保留输出
            if is_same_file(image, &output) {
                warn!("⚠️  [拼接] 输出文件与原图同名，不删除: {}", image.display());
                continue;
            }
            std::fs::remove_file(image)
                .with_context(|| format!("删除原图失败: {}", image.display()))?;
            info!("🗑️  [拼接] 已删除原图: {}", image.display());
        }
    }

    println!("{}", output.display());

    Ok(())
}
