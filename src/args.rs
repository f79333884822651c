// 该文件是 Kuijian （盔检） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use clap::Parser;

/// 可接受的上传视频扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "asf", "m4v"];

/// Kuijian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "FILE")]
  pub model: PathBuf,

  /// 输入视频文件路径
  /// 支持格式: *.mp4, *.mov, *.avi, *.asf, *.m4v
  #[arg(long, value_name = "VIDEO")]
  pub input: PathBuf,

  /// 输出文件路径
  /// 省略时默认写到输入文件旁边的 detected_<文件名>.mp4
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub nms_threshold: f32,
}

impl Args {
  /// 结果文件的落盘位置
  pub fn resolved_output(&self) -> PathBuf {
    match &self.output {
      Some(path) => path.clone(),
      None => {
        let stem = self
          .input
          .file_stem()
          .map(|s| s.to_string_lossy().into_owned())
          .unwrap_or_else(|| "video".to_string());
        let name = format!("detected_{stem}.mp4");
        match self.input.parent() {
          Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
          _ => PathBuf::from(name),
        }
      }
    }
  }
}

/// 检查路径扩展名是否在受支持的视频格式列表中
pub fn is_supported_video(path: &Path) -> bool {
  path
    .extension()
    .map(|ext| ext.to_string_lossy().to_lowercase())
    .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn supported_extension_check() {
    assert!(is_supported_video(Path::new("site/safety.mp4")));
    assert!(is_supported_video(Path::new("clip.MOV")));
    assert!(is_supported_video(Path::new("cam.m4v")));
    assert!(!is_supported_video(Path::new("cam.mkv")));
    assert!(!is_supported_video(Path::new("snapshot.png")));
    assert!(!is_supported_video(Path::new("noext")));
  }

  #[test]
  fn default_output_named_after_input() {
    let args = Args::parse_from([
      "kuijian",
      "--model",
      "helmet.onnx",
      "--input",
      "/data/site.mp4",
    ]);
    assert_eq!(args.resolved_output(), PathBuf::from("/data/detected_site.mp4"));
  }

  #[test]
  fn explicit_output_wins() {
    let args = Args::parse_from([
      "kuijian",
      "--model",
      "helmet.onnx",
      "--input",
      "site.mp4",
      "--output",
      "/tmp/result.mp4",
    ]);
    assert_eq!(args.resolved_output(), PathBuf::from("/tmp/result.mp4"));
  }
}
