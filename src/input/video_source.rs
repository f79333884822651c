// 该文件是 Kuijian （盔检） 项目的一部分。
// src/input/video_source.rs - 视频输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::Rational;
use ffmpeg_next::format::{Pixel, input};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use image::RgbImage;

use super::Frame;
use crate::error::Error;

/// 视频输入源
///
/// 顺序解码一个视频容器，逐帧产出 RGB 图像。
pub struct VideoSource {
  /// FFmpeg 输入上下文
  input_context: ffmpeg::format::context::Input,
  /// 视频流索引
  video_stream_index: usize,
  /// 视频解码器
  decoder: ffmpeg::decoder::Video,
  /// 缩放上下文（解码格式 -> RGB24）
  scaler: ScalingContext,
  /// 帧索引
  frame_index: u64,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
  /// 帧率（容器给出的精确有理数）
  frame_rate: Rational,
  /// 时间基准
  time_base: f64,
  /// 是否已向解码器送入 EOF
  eof_sent: bool,
  /// 是否结束
  finished: bool,
}

impl VideoSource {
  /// 打开视频容器进行顺序读取
  pub fn open(path: &Path) -> Result<Self, Error> {
    Self::open_inner(path).map_err(|cause| Error::ContainerOpen {
      path: path.to_path_buf(),
      reason: format!("{cause:#}"),
    })
  }

  fn open_inner(path: &Path) -> Result<Self> {
    ffmpeg::init().context("无法初始化 FFmpeg")?;

    let input_context =
      input(&path).with_context(|| format!("无法打开视频文件: {}", path.display()))?;

    let video_stream = input_context
      .streams()
      .best(Type::Video)
      .context("找不到视频流")?;

    let video_stream_index = video_stream.index();
    let context_decoder =
      ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
        .context("无法解析视频流参数")?;
    let decoder = context_decoder
      .decoder()
      .video()
      .context("无法创建视频解码器")?;

    let width = decoder.width();
    let height = decoder.height();

    // 优先使用容器的平均帧率，取不到时退回流的基础帧率
    let mut frame_rate = video_stream.avg_frame_rate();
    if frame_rate.numerator() <= 0 || frame_rate.denominator() <= 0 {
      frame_rate = video_stream.rate();
    }
    anyhow::ensure!(
      frame_rate.numerator() > 0 && frame_rate.denominator() > 0,
      "无法确定帧率"
    );

    let time_base = video_stream.time_base();
    let time_base = time_base.numerator() as f64 / time_base.denominator() as f64;

    let scaler = ScalingContext::get(
      decoder.format(),
      width,
      height,
      Pixel::RGB24,
      width,
      height,
      Flags::BILINEAR,
    )
    .context("无法创建像素格式转换器")?;

    Ok(Self {
      input_context,
      video_stream_index,
      decoder,
      scaler,
      frame_index: 0,
      width,
      height,
      frame_rate,
      time_base,
      eof_sent: false,
      finished: false,
    })
  }

  /// 获取帧宽度
  pub fn width(&self) -> u32 {
    self.width
  }

  /// 获取帧高度
  pub fn height(&self) -> u32 {
    self.height
  }

  /// 获取精确的有理数帧率，原样传给输出端
  pub fn frame_rate(&self) -> Rational {
    self.frame_rate
  }

  /// 获取帧率的浮点近似，仅用于展示
  pub fn fps(&self) -> f64 {
    self.frame_rate.numerator() as f64 / self.frame_rate.denominator() as f64
  }

  /// 解码下一帧
  fn decode_next_frame(&mut self) -> Result<Option<Video>> {
    loop {
      // 首先尝试从解码器获取已解码的帧
      let mut decoded = Video::empty();
      if self.decoder.receive_frame(&mut decoded).is_ok() {
        return Ok(Some(decoded));
      }

      // EOF 已送入且解码器排空，序列结束
      if self.eof_sent {
        return Ok(None);
      }

      // 送入下一个属于视频流的数据包
      let mut sent = false;
      {
        let mut packet_iter = self.input_context.packets();
        while let Some((stream, packet)) = packet_iter.next() {
          if stream.index() == self.video_stream_index {
            self.decoder.send_packet(&packet).context("解码器拒绝数据包")?;
            sent = true;
            break;
          }
        }
      }

      if !sent {
        // 数据包耗尽，送入 EOF 后继续排空解码器缓冲
        self.decoder.send_eof().context("无法向解码器送入 EOF")?;
        self.eof_sent = true;
      }
    }
  }
}

impl Iterator for VideoSource {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.decode_next_frame() {
      Ok(Some(decoded)) => {
        let mut rgb_frame = Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
          self.finished = true;
          return Some(Err(e.into()));
        }

        let data = rgb_frame.data(0);
        let stride = rgb_frame.stride(0);
        let width = self.width as usize;
        let height = self.height as usize;

        // 处理步长对齐的数据
        let mut image_data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
          let row_start = y * stride;
          let row_end = row_start + width * 3;
          image_data.extend_from_slice(&data[row_start..row_end]);
        }

        let image = match RgbImage::from_raw(self.width, self.height, image_data) {
          Some(img) => img,
          None => {
            self.finished = true;
            return Some(Err(anyhow::anyhow!("无法创建 RGB 图像")));
          }
        };

        let timestamp_ms = decoded
          .timestamp()
          .map_or(0, |ts| (ts as f64 * self.time_base * 1000.0) as u64);

        let frame = Frame {
          image,
          index: self.frame_index,
          timestamp_ms,
        };

        self.frame_index += 1;
        Some(Ok(frame))
      }
      Ok(None) => {
        self.finished = true;
        None
      }
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}
