// 该文件是 Kuijian （盔检） 项目的一部分。
// src/storage.rs - 临时文件管理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fs;
use std::io::{ErrorKind, Result, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder as TempFileBuilder;
use tracing::warn;

/// 临时文件名前缀
const TEMP_PREFIX: &str = "kuijian_";
/// 输出统一使用 MP4 容器，后缀随之固定
const TEMP_SUFFIX: &str = ".mp4";

/// 将上传的视频字节写入一个唯一命名的临时文件，返回其路径。
///
/// 解码层只接受文件路径，所以上传的字节流必须先落盘。
/// 返回的文件不会随句柄自动删除，调用方负责在用完后 `release`。
pub fn stage(bytes: &[u8]) -> Result<PathBuf> {
  let mut file = TempFileBuilder::new()
    .prefix(TEMP_PREFIX)
    .suffix(TEMP_SUFFIX)
    .tempfile()?;
  file.write_all(bytes)?;
  file.flush()?;
  let path = file.into_temp_path().keep()?;
  Ok(path)
}

/// 预留一个唯一命名的空临时文件作为输出路径。
///
/// 与 `stage` 一样由调用方负责 `release`。
pub fn allocate() -> Result<PathBuf> {
  let file = TempFileBuilder::new()
    .prefix(TEMP_PREFIX)
    .suffix(TEMP_SUFFIX)
    .tempfile()?;
  let path = file.into_temp_path().keep()?;
  Ok(path)
}

/// 删除临时文件。幂等：文件不存在时静默返回。
///
/// 删除失败不会向上传播，只记录警告。
pub fn release(path: &Path) {
  match fs::remove_file(path) {
    Ok(()) => {}
    Err(err) if err.kind() == ErrorKind::NotFound => {}
    Err(err) => warn!("无法删除临时文件 {}: {}", path.display(), err),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stage_writes_bytes_to_unique_path() {
    let a = stage(b"hello").unwrap();
    let b = stage(b"world").unwrap();

    assert_ne!(a, b);
    assert_eq!(fs::read(&a).unwrap(), b"hello");
    assert_eq!(fs::read(&b).unwrap(), b"world");

    release(&a);
    release(&b);
  }

  #[test]
  fn allocate_reserves_empty_file() {
    let path = allocate().unwrap();

    assert!(path.exists());
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    assert!(path.to_string_lossy().ends_with(TEMP_SUFFIX));

    release(&path);
  }

  #[test]
  fn release_is_idempotent() {
    let path = stage(b"bytes").unwrap();

    release(&path);
    assert!(!path.exists());

    // 第二次删除不应恐慌或报错
    release(&path);
  }
}
