// 该文件是 Kuijian （盔检） 项目的一部分。
// src/detector/yolo.rs - YOLO 安全帽检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, ensure};
use image::RgbImage;
use ndarray::{Array4, ArrayViewD};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::TensorRef;

use super::{Detect, Detection, HELMET_CLASSES};

/// 模型输入边长，ultralytics 导出的默认值
const MODEL_INPUT_SIZE: u32 = 640;

/// YOLO 安全帽检测器
///
/// 持有一个已加载的 ONNX Runtime 会话。构造之后配置不再变化，
/// 会话本身要求独占访问，所以包在 `Mutex` 里，句柄可以安全共享。
pub struct YoloDetector {
  /// ONNX Runtime 会话
  session: Mutex<Session>,
  /// 模型输入张量名
  input_name: String,
  /// 模型输出张量名
  output_name: String,
  /// 模型输入边长
  input_size: u32,
  /// 置信度阈值
  confidence_threshold: f32,
  /// NMS IOU 阈值
  nms_threshold: f32,
}

impl YoloDetector {
  /// 从序列化的模型文件创建检测器
  pub fn new(
    model_path: &Path,
    confidence_threshold: f32,
    nms_threshold: f32,
  ) -> ort::Result<Self> {
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_intra_threads(2)?
      .commit_from_file(model_path)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| ort::Error::new("模型没有输入张量"))?;
    let output_name = session
      .outputs
      .first()
      .map(|output| output.name.clone())
      .ok_or_else(|| ort::Error::new("模型没有输出张量"))?;

    Ok(Self {
      session: Mutex::new(session),
      input_name,
      output_name,
      input_size: MODEL_INPUT_SIZE,
      confidence_threshold,
      nms_threshold,
    })
  }

  /// 预处理图像：缩放到模型输入尺寸，归一化为 NCHW f32 张量
  fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(
      image,
      self.input_size,
      self.input_size,
      image::imageops::FilterType::Triangle,
    );

    let size = self.input_size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
      for channel in 0..3 {
        input[[0, channel, y as usize, x as usize]] = pixel.0[channel] as f32 / 255.0;
      }
    }

    input
  }

  /// 运行推理
  pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
    let original_width = image.width() as f32;
    let original_height = image.height() as f32;

    // 预处理
    let input = self.preprocess(image);

    // 运行推理
    let mut session = self
      .session
      .lock()
      .map_err(|_| anyhow::anyhow!("检测器会话不可用"))?;
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&input)?])
      .context("模型推理失败")?;

    // 后处理
    let output = outputs[self.output_name.as_str()]
      .try_extract_array::<f32>()
      .context("无法读取模型输出张量")?;
    let detections = self.postprocess(output, original_width, original_height)?;

    Ok(detections)
  }

  /// 后处理输出
  ///
  /// ultralytics 导出的输出布局: [batch, 4 + 类别数, 锚点数]，
  /// 前四行是 cx, cy, w, h（以模型输入尺寸为单位）。
  fn postprocess(
    &self,
    output: ArrayViewD<f32>,
    original_width: f32,
    original_height: f32,
  ) -> Result<Vec<Detection>> {
    let shape = output.shape();
    ensure!(
      shape.len() == 3 && shape[1] > 4,
      "模型输出形状不受支持: {:?}",
      shape
    );

    let num_classes = shape[1] - 4;
    let num_anchors = shape[2];

    // 缩放回原始图像尺寸
    let scale_x = original_width / self.input_size as f32;
    let scale_y = original_height / self.input_size as f32;

    let mut detections = Vec::new();

    for anchor in 0..num_anchors {
      // 找到最高类别分数
      let mut max_class_score = 0.0f32;
      let mut max_class_id = 0usize;

      for class_id in 0..num_classes {
        let score = output[[0, 4 + class_id, anchor]];
        if score > max_class_score {
          max_class_score = score;
          max_class_id = class_id;
        }
      }

      if max_class_score < self.confidence_threshold {
        continue;
      }

      // 解码边界框：中心点加宽高转为左上角坐标
      let cx = output[[0, 0, anchor]];
      let cy = output[[0, 1, anchor]];
      let w = output[[0, 2, anchor]];
      let h = output[[0, 3, anchor]];

      let x = cx - w / 2.0;
      let y = cy - h / 2.0;

      detections.push(Detection {
        x: x * scale_x,
        y: y * scale_y,
        width: w * scale_x,
        height: h * scale_y,
        confidence: max_class_score,
        class_id: max_class_id,
        class_name: HELMET_CLASSES
          .get(max_class_id)
          .unwrap_or(&"unknown")
          .to_string(),
      });
    }

    // 应用 NMS
    Ok(nms(detections, self.nms_threshold))
  }
}

impl Detect for YoloDetector {
  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
    YoloDetector::detect(self, image)
  }
}

/// 非极大值抑制
fn nms(mut detections: Vec<Detection>, nms_threshold: f32) -> Vec<Detection> {
  // 按置信度降序排序
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut result = Vec::new();

  while !detections.is_empty() {
    let best = detections.remove(0);

    detections.retain(|det| {
      if det.class_id != best.class_id {
        return true;
      }
      iou(&best, det) < nms_threshold
    });

    result.push(best);
  }

  result
}

/// 计算两个边界框的 IoU
fn iou(a: &Detection, b: &Detection) -> f32 {
  let x1 = a.x.max(b.x);
  let y1 = a.y.max(b.y);
  let x2 = (a.x + a.width).min(b.x + b.width);
  let y2 = (a.y + a.height).min(b.y + b.height);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = a.width * a.height;
  let area_b = b.width * b.height;
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn boxed(x: f32, y: f32, w: f32, h: f32, confidence: f32, class_id: usize) -> Detection {
    Detection {
      x,
      y,
      width: w,
      height: h,
      confidence,
      class_id,
      class_name: HELMET_CLASSES
        .get(class_id)
        .unwrap_or(&"unknown")
        .to_string(),
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = boxed(10.0, 10.0, 20.0, 20.0, 0.9, 0);
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = boxed(0.0, 0.0, 10.0, 10.0, 0.9, 0);
    let b = boxed(100.0, 100.0, 10.0, 10.0, 0.9, 0);
    assert_eq!(iou(&a, &b), 0.0);
  }

  #[test]
  fn nms_suppresses_overlapping_same_class() {
    let detections = vec![
      boxed(10.0, 10.0, 40.0, 40.0, 0.9, 0),
      boxed(12.0, 12.0, 40.0, 40.0, 0.7, 0),
      boxed(200.0, 200.0, 40.0, 40.0, 0.8, 0),
    ];

    let kept = nms(detections, 0.45);

    assert_eq!(kept.len(), 2);
    assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    assert!((kept[1].confidence - 0.8).abs() < 1e-6);
  }

  #[test]
  fn nms_keeps_overlapping_different_classes() {
    let detections = vec![
      boxed(10.0, 10.0, 40.0, 40.0, 0.9, 0),
      boxed(12.0, 12.0, 40.0, 40.0, 0.7, 1),
    ];

    let kept = nms(detections, 0.45);

    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn label_table_falls_back_to_unknown() {
    let det = boxed(0.0, 0.0, 1.0, 1.0, 0.5, 7);
    assert_eq!(det.class_name, "unknown");
  }
}
