// 该文件是 Kuijian （盔检） 项目的一部分。
// src/output/visualizer.rs - 检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detector::Detection;

/// 各类别的边界框颜色：helmet 绿、head 红、person 蓝
const CLASS_COLORS: [Rgb<u8>; 3] = [
  Rgb([0, 200, 80]),
  Rgb([230, 40, 40]),
  Rgb([40, 110, 230]),
];

/// 可视化工具
///
/// 在帧上绘制边界框和 `类别: 置信度` 标签，不改变帧的几何尺寸。
pub struct Visualizer {
  /// 字体
  font: FontArc,
  /// 字体大小
  font_scale: PxScale,
}

impl Default for Visualizer {
  fn default() -> Self {
    Self::new()
  }
}

impl Visualizer {
  /// 创建一个新的可视化工具
  pub fn new() -> Self {
    // 使用内置的默认字体数据
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载字体");

    Self {
      font,
      font_scale: PxScale::from(16.0),
    }
  }

  /// 在图像上绘制检测结果
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      let color = CLASS_COLORS[detection.class_id % CLASS_COLORS.len()];

      // 绘制边界框，裁剪到图像范围内
      let x = detection.x.max(0.0) as i32;
      let y = detection.y.max(0.0) as i32;
      let width = detection.width.min(image.width() as f32 - detection.x) as u32;
      let height = detection.height.min(image.height() as f32 - detection.y) as u32;

      if width > 0 && height > 0 {
        let rect = Rect::at(x, y).of_size(width, height);
        draw_hollow_rect_mut(image, rect, color);

        // 绘制第二个边框以增加可见度
        if x > 0 && y > 0 {
          let inner_rect =
            Rect::at(x + 1, y + 1).of_size(width.saturating_sub(2), height.saturating_sub(2));
          draw_hollow_rect_mut(image, inner_rect, color);
        }
      }

      // 绘制标签
      let label = format!("{}: {:.2}", detection.class_name, detection.confidence);
      let text_y = (y - 20).max(0);

      draw_text_mut(image, color, x, text_y, self.font_scale, &self.font, &label);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
    Detection {
      x,
      y,
      width: w,
      height: h,
      confidence: 0.87,
      class_id: 0,
      class_name: "helmet".to_string(),
    }
  }

  #[test]
  fn no_detections_leaves_image_untouched() {
    let visualizer = Visualizer::new();
    let mut image = RgbImage::from_pixel(64, 48, Rgb([17, 34, 51]));
    let original = image.clone();

    visualizer.draw_detections(&mut image, &[]);

    assert_eq!(image.as_raw(), original.as_raw());
  }

  #[test]
  fn drawing_preserves_geometry() {
    let visualizer = Visualizer::new();
    let mut image = RgbImage::new(64, 48);

    visualizer.draw_detections(&mut image, &[detection(8.0, 8.0, 24.0, 20.0)]);

    assert_eq!(image.width(), 64);
    assert_eq!(image.height(), 48);
  }

  #[test]
  fn drawing_changes_pixels_inside_box() {
    let visualizer = Visualizer::new();
    let mut image = RgbImage::new(64, 48);
    let original = image.clone();

    visualizer.draw_detections(&mut image, &[detection(8.0, 8.0, 24.0, 20.0)]);

    assert_ne!(image.as_raw(), original.as_raw());
  }

  #[test]
  fn out_of_range_box_is_clipped_without_panic() {
    let visualizer = Visualizer::new();
    let mut image = RgbImage::new(64, 48);

    visualizer.draw_detections(&mut image, &[detection(-10.0, -10.0, 500.0, 500.0)]);

    assert_eq!(image.width(), 64);
    assert_eq!(image.height(), 48);
  }
}
