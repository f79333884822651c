// 该文件是 Kuijian （盔检） 项目的一部分。
// src/error.rs - 错误类型定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use thiserror::Error;

/// 流水线错误类型
///
/// 模型加载失败会终止整个工作流；其余错误只终止当前请求，
/// 由 `pipeline::process` 边界统一转换为用户可见的消息。
#[derive(Error, Debug)]
pub enum Error {
  /// 模型文件缺失、损坏或格式不兼容
  #[error("无法加载模型 {path}: {source}")]
  ModelLoad {
    path: PathBuf,
    #[source]
    source: ort::Error,
  },

  /// 输入容器无法解析（文件损坏、编解码器不支持、没有可解码的帧）
  #[error("无法打开视频容器 {path}: {reason}")]
  ContainerOpen { path: PathBuf, reason: String },

  /// 宿主机不支持目标编码配置
  #[error("无法创建视频写入器: {reason}")]
  WriterOpen { reason: String },

  /// 解码、推理或渲染过程中的致命错误，携带出错的帧序号
  #[error("处理第 {frame_index} 帧时失败: {cause}")]
  Processing { frame_index: u64, cause: anyhow::Error },

  #[error("IO 错误: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
