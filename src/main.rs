// 该文件是 Kuijian （盔检） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use kuijian::args::{self, Args};
use kuijian::{detector, pipeline, storage};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("输入视频: {}", args.input.display());
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.nms_threshold);

  // 上传格式白名单检查
  if !args::is_supported_video(&args.input) {
    bail!(
      "不支持的视频格式: {}，支持的扩展名: {}",
      args.input.display(),
      args::SUPPORTED_EXTENSIONS.join(", ")
    );
  }

  // 加载模型。模型不可用时整个工作流终止，不处理任何视频
  let detector = detector::load_cached(&args.model, args.confidence, args.nms_threshold)
    .context("模型不可用，工作流终止")?;

  // 读入上传的视频字节
  let video_bytes = std::fs::read(&args.input)
    .with_context(|| format!("无法读取输入视频: {}", args.input.display()))?;

  // 处理
  info!("开始处理视频...");
  let Some(output_path) = pipeline::process(&video_bytes, detector.as_ref()) else {
    bail!("视频处理失败");
  };

  // 把结果从临时文件搬到目标位置，然后释放临时文件
  let destination = args.resolved_output();
  let copied = std::fs::copy(&output_path, &destination);
  storage::release(&output_path);
  copied.with_context(|| format!("无法写出结果文件: {}", destination.display()))?;

  info!("结果已保存: {}", destination.display());
  Ok(())
}
