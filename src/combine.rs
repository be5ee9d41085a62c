use image::{DynamicImage, GenericImageView, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{FramerError, Result};
use crate::snapshot::SnapshotFormat;

/// 默认输出文件名：第一张图片去掉扩展名，加上 `_vertical.<ext>`
pub fn vertical_output_name(first_image: &Path, format: SnapshotFormat) -> PathBuf {
    let mut name = first_image.with_extension("").into_os_string();
    name.push("_vertical.");
    name.push(format.extension());
    PathBuf::from(name)
}

/// 两个路径是否指向同一个文件（`./a.png` 与 `a.png` 视为相同）
///
/// 任一路径无法解析时退回到按字面比较。
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// 竖向拼接图片，尺寸以第一张为准
///
/// 画布宽度为第一张图的宽度，高度为第一张图的高度乘以图片数，
/// 第 i 张图贴在 (0, i * 高度) 处。后续图片尺寸不一致时照常粘贴
/// （超出部分裁掉、不足部分留黑），只记录警告；
/// 需要严格检查时使用 [`combine_vertical_strict`]。
pub fn combine_vertical<P: AsRef<Path>>(images: &[P]) -> Result<DynamicImage> {
    combine(images, false)
}

/// 与 [`combine_vertical`] 相同，但任何一张图片尺寸与第一张不同都返回错误
pub fn combine_vertical_strict<P: AsRef<Path>>(images: &[P]) -> Result<DynamicImage> {
    combine(images, true)
}

fn combine<P: AsRef<Path>>(images: &[P], strict: bool) -> Result<DynamicImage> {
    let first = images
        .first()
        .ok_or_else(|| FramerError::Argument("至少需要一张图片".to_string()))?;

    let (width, height) = image::image_dimensions(first.as_ref())?;
    let canvas_height = height
        .checked_mul(images.len() as u32)
        .ok_or_else(|| FramerError::Argument(format!("拼接高度溢出: {} x {}", height, images.len())))?;

    info!(
        "🧩 [拼接] {} 张图片 -> {}x{}",
        images.len(),
        width,
        canvas_height
    );

    let mut canvas = RgbImage::new(width, canvas_height);

    for (index, path) in images.iter().enumerate() {
        let path = path.as_ref();
        let img = image::open(path)?;

        let (actual_width, actual_height) = img.dimensions();
        if (actual_width, actual_height) != (width, height) {
            if strict {
                return Err(FramerError::DimensionMismatch {
                    path: PathBuf::from(path),
                    expected_width: width,
                    expected_height: height,
                    actual_width,
                    actual_height,
                });
            }
            warn!(
                "⚠️  [拼接] 图片尺寸不一致: {} 为 {}x{}，期望 {}x{}",
                path.display(),
                actual_width,
                actual_height,
                width,
                height
            );
        }

        let offset = index as i64 * height as i64;
        image::imageops::replace(&mut canvas, &img.to_rgb8(), 0, offset);
        debug!("📌 [拼接] {} -> y={}", path.display(), offset);
    }

    Ok(DynamicImage::ImageRgb8(canvas))
}
