// 该文件是 Kuijian （盔检） 项目的一部分。
// src/pipeline.rs - 逐帧处理流水线
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::detector::Detect;
use crate::error::{Error, Result};
use crate::input::VideoSource;
use crate::output::VideoOutput;
use crate::storage;

/// 处理一段上传的视频字节，返回带注释的结果文件路径。
///
/// 这是面向展示层的边界入口：字节先落盘为临时文件，流水线
/// 结束后（无论成败）暂存的输入一定被删除。任何错误都在这里
/// 转换为日志消息和 `None`，不会越过边界向上抛；调用方拿到
/// `None` 时应提示失败，拿到路径时在消费完字节后自行 `release`。
pub fn process<D: Detect>(video_bytes: &[u8], detector: &D) -> Option<PathBuf> {
  let input_path = match storage::stage(video_bytes) {
    Ok(path) => path,
    Err(err) => {
      error!("无法暂存上传的视频: {}", err);
      return None;
    }
  };

  let result = run(&input_path, detector);

  // 输入容器此时已读完，立即删除暂存文件
  storage::release(&input_path);

  match result {
    Ok(output_path) => Some(output_path),
    Err(err) => {
      error!("视频处理失败: {}", err);
      None
    }
  }
}

/// 运行流水线：打开输入 → 准备输出 → 逐帧处理 → 收尾。
///
/// 每个阶段出错时负责释放它已经申请的资源：
/// 打开阶段无需释放；准备输出阶段释放已分配的输出路径；
/// 逐帧阶段删除写到一半的输出文件并带回出错的帧序号。
pub fn run<D: Detect>(input_path: &Path, detector: &D) -> Result<PathBuf> {
  // 打开输入容器
  let mut source = VideoSource::open(input_path)?;
  info!(
    "输入已打开: {}x{} @ {:.2} fps",
    source.width(),
    source.height(),
    source.fps()
  );

  // 分配输出路径并以输入的几何与帧率打开写入器
  let output_path = storage::allocate()?;
  let mut writer = match VideoOutput::create(
    &output_path,
    source.width(),
    source.height(),
    source.frame_rate(),
  ) {
    Ok(writer) => writer,
    Err(err) => {
      storage::release(&output_path);
      return Err(err);
    }
  };

  // 逐帧处理：解码 → 推理 → 渲染 → 编码，保持输入顺序
  let mut frame_count = 0u64;
  let mut total_detections = 0usize;

  while let Some(next) = source.next() {
    let frame = match next {
      Ok(frame) => frame,
      Err(cause) => return Err(abort(&output_path, frame_count, cause)),
    };

    let detections = match detector.detect(&frame.image) {
      Ok(detections) => detections,
      Err(cause) => return Err(abort(&output_path, frame_count, cause)),
    };

    if let Err(cause) = writer.write_frame(&frame.image, &detections) {
      return Err(abort(&output_path, frame_count, cause));
    }

    total_detections += detections.len();
    frame_count += 1;

    if frame_count % 100 == 0 {
      info!("已处理 {} 帧", frame_count);
    }
  }

  // 一帧都解不出来的容器按打开失败处理
  if frame_count == 0 {
    storage::release(&output_path);
    return Err(Error::ContainerOpen {
      path: input_path.to_path_buf(),
      reason: "容器中没有可解码的帧".to_string(),
    });
  }

  // 收尾：冲刷编码器，写入文件尾
  if let Err(cause) = writer.finish() {
    return Err(abort(&output_path, frame_count, cause));
  }

  info!(
    "处理完成: 共 {} 帧, {} 个检测",
    frame_count, total_detections
  );

  Ok(output_path)
}

/// 中止逐帧阶段：删除写到一半的输出文件，带回出错的帧序号
fn abort(output_path: &Path, frame_index: u64, cause: anyhow::Error) -> Error {
  storage::release(output_path);
  Error::Processing { frame_index, cause }
}
