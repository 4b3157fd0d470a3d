// 该文件是 Saoma （扫码） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{frame::Frame, output::Render, pipeline::FrameResult};

const BATCH_PREFIX: &str = "img_";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误 {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("图像写入错误 {0}: {1}")]
  ImageError(PathBuf, image::ImageError),
  #[error("无效的文件名: {0}")]
  InvalidName(String),
}

fn save_frame(frame: &Frame, path: &Path) -> Result<(), SaveImageFileError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent).map_err(|e| SaveImageFileError::IoError(parent.into(), e))?;
  }

  frame
    .to_rgb()
    .save(path)
    .map_err(|e| SaveImageFileError::ImageError(path.to_path_buf(), e))
}

/// 批处理输出：`<目录>/img_<原文件名>`
#[derive(Debug, Clone)]
pub struct SaveImageFileOutput {
  folder: PathBuf,
}

impl SaveImageFileOutput {
  pub fn new(folder: impl Into<PathBuf>) -> Self {
    Self {
      folder: folder.into(),
    }
  }

  pub fn folder(&self) -> &Path {
    &self.folder
  }

  pub fn target_path(&self, source: &Path) -> Result<PathBuf, SaveImageFileError> {
    let name = source
      .file_name()
      .ok_or_else(|| SaveImageFileError::InvalidName(source.display().to_string()))?;
    let mut target = std::ffi::OsString::from(BATCH_PREFIX);
    target.push(name);
    Ok(self.folder.join(target))
  }

  /// 以输入文件名保存标注后的帧，返回写入路径
  pub fn save(&self, source: &Path, result: &FrameResult) -> Result<PathBuf, SaveImageFileError> {
    let path = self.target_path(source)?;
    save_frame(&result.frame, &path)?;
    info!("已保存处理后的图像: {}", path.display());
    Ok(path)
  }
}

/// 视频快照：仅为解出内容的帧写 `video_frame_%04d.jpg`
#[derive(Debug, Clone)]
pub struct SnapshotOutput {
  folder: PathBuf,
  saved: u64,
}

impl SnapshotOutput {
  pub fn new(folder: impl Into<PathBuf>) -> Self {
    Self {
      folder: folder.into(),
      saved: 0,
    }
  }

  pub fn snapshot_path(&self, index: u64) -> PathBuf {
    self.folder.join(format!("video_frame_{:04}.jpg", index))
  }

  pub fn saved(&self) -> u64 {
    self.saved
  }
}

impl Render for SnapshotOutput {
  type Error = SaveImageFileError;

  fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error> {
    if !result.found_any {
      return Ok(());
    }
    let path = self.snapshot_path(result.index);
    save_frame(&result.frame, &path)?;
    self.saved += 1;
    info!("已保存快照: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn result(index: u64, found_any: bool) -> FrameResult {
    FrameResult {
      index,
      frame: Frame::from_rgb(RgbImage::new(8, 8)),
      found_any,
      regions: Vec::new(),
      overlays: Vec::new(),
    }
  }

  #[test]
  fn batch_output_is_named_after_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path().join("results"));
    let path = output
      .save(Path::new("/data/in/shelf 01.png"), &result(0, false))
      .unwrap();

    assert_eq!(path, dir.path().join("results").join("img_shelf 01.png"));
    assert!(path.is_file());
  }

  #[test]
  fn snapshots_only_frames_with_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut output = SnapshotOutput::new(dir.path());
    output.render_result(&result(7, false)).unwrap();
    output.render_result(&result(12, true)).unwrap();

    assert_eq!(output.saved(), 1);
    assert!(!dir.path().join("video_frame_0007.jpg").exists());
    assert!(dir.path().join("video_frame_0012.jpg").is_file());
  }

  #[test]
  fn unsupported_extension_is_a_write_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path());
    let err = output.save(Path::new("notes.txt"), &result(0, false)).unwrap_err();
    assert!(matches!(err, SaveImageFileError::ImageError(..)));
  }
}
