// 该文件是 Kuijian （盔检） 项目的一部分。
// src/detector/mod.rs - 检测器模块
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod yolo;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use anyhow::Result;
use image::RgbImage;
use tracing::info;

use crate::error::Error;

pub use yolo::YoloDetector;

/// 安全帽数据集类别名称
pub const HELMET_CLASSES: [&str; 3] = ["helmet", "head", "person"];

/// 检测结果
#[derive(Clone, Debug)]
pub struct Detection {
  /// 边界框左上角 x 坐标
  pub x: f32,
  /// 边界框左上角 y 坐标
  pub y: f32,
  /// 边界框宽度
  pub width: f32,
  /// 边界框高度
  pub height: f32,
  /// 置信度
  pub confidence: f32,
  /// 类别索引
  pub class_id: usize,
  /// 类别名称
  pub class_name: String,
}

/// 检测器接口
///
/// 流水线每帧同步调用一次 `detect`，不跨越该边界暴露任何流式语义。
pub trait Detect {
  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// 进程级检测器缓存：每个模型路径只构造一次句柄
static DETECTORS: LazyLock<Mutex<HashMap<PathBuf, Arc<YoloDetector>>>> =
  LazyLock::new(|| Mutex::new(HashMap::new()));

/// 加载（或复用）指定路径的检测器。
///
/// 同一模型路径在进程生命周期内只构造一个句柄，
/// 之后的调用直接返回同一个 `Arc` 的克隆，不会重新读权重。
pub fn load_cached(
  model_path: &Path,
  confidence_threshold: f32,
  nms_threshold: f32,
) -> Result<Arc<YoloDetector>, Error> {
  let mut cache = DETECTORS
    .lock()
    .unwrap_or_else(std::sync::PoisonError::into_inner);

  if let Some(detector) = cache.get(model_path) {
    return Ok(detector.clone());
  }

  info!("正在加载模型: {}", model_path.display());
  let detector = YoloDetector::new(model_path, confidence_threshold, nms_threshold).map_err(
    |source| Error::ModelLoad {
      path: model_path.to_path_buf(),
      source,
    },
  )?;
  info!("模型加载完成");

  let detector = Arc::new(detector);
  cache.insert(model_path.to_path_buf(), detector.clone());
  Ok(detector)
}
