use serde::{Deserialize, Serialize};

/// 单张截图的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// 截图序号（从 0 开始）
    pub index: usize,
    /// 截图位置（0.0-1.0）
    pub position: f64,
    /// 截图文件路径
    pub file: String,
}

/// 一次截图运行的清单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// 输入视频路径或 URL
    pub input_video: String,
    /// 截图输出目录
    pub snapshot_dir: String,
    /// 图片格式（png / jpg）
    pub format: String,
    /// 请求的截图宽度，0 表示自动
    pub width: u32,
    /// 请求的截图高度，0 表示自动
    pub height: u32,
    /// 生成时间（RFC 3339）
    pub created_at: String,
    pub snapshots: Vec<SnapshotRecord>,
}
