// 该文件是 Saoma （扫码） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::{fmt, path::PathBuf};

use thiserror::Error;
use url::Url;

use crate::frame::Frame;

mod image_folder;
pub use self::image_folder::{ImageFolder, ImageFolderError, read_image};

#[cfg(feature = "gstreamer_io")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_io")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

/// 按顺序产生帧的来源
///
/// 返回 `None` 表示来源已耗尽；`Some(Err(_))` 表示来源不可读，当前运行应当终止。
pub trait FrameSource {
  type Error: std::error::Error + Send + Sync + 'static;

  fn read_frame(&mut self) -> Option<Result<Frame, Self::Error>>;

  /// 来源报告的帧率，未知时为 `None`
  fn fps(&self) -> Option<u32> {
    None
  }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  type Error = S::Error;

  fn read_frame(&mut self) -> Option<Result<Frame, Self::Error>> {
    (**self).read_frame()
  }

  fn fps(&self) -> Option<u32> {
    (**self).fps()
  }
}

const DEVICE_PREFIX: &str = "/dev/video";

#[derive(Error, Debug)]
pub enum VideoSourceError {
  #[error("视频文件不存在: {0}")]
  NotFound(PathBuf),
}

/// 视频来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
  /// 系统默认摄像头
  DefaultCamera,
  /// V4L2 设备，如 `/dev/video0`
  Device(PathBuf),
  /// 网络流或其他 URI（`rtsp://`、`http://`、`file://`）
  Uri(Url),
  /// 本地视频文件
  File(PathBuf),
}

impl VideoSource {
  /// 解析命令行给出的来源字符串，空字符串表示默认摄像头
  pub fn parse(source: &str) -> Result<Self, VideoSourceError> {
    let source = source.trim();
    if source.is_empty() {
      return Ok(VideoSource::DefaultCamera);
    }
    if source.starts_with(DEVICE_PREFIX) {
      return Ok(VideoSource::Device(PathBuf::from(source)));
    }
    // 单字母的协议是 Windows 盘符
    if let Ok(url) = Url::parse(source)
      && url.scheme().len() > 1
    {
      return Ok(VideoSource::Uri(url));
    }

    let path = PathBuf::from(source);
    if !path.is_file() {
      return Err(VideoSourceError::NotFound(path));
    }
    Ok(VideoSource::File(path))
  }

  pub fn is_live(&self) -> bool {
    matches!(self, VideoSource::DefaultCamera | VideoSource::Device(_))
  }
}

impl fmt::Display for VideoSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VideoSource::DefaultCamera => write!(f, "默认摄像头"),
      VideoSource::Device(path) => write!(f, "设备 {}", path.display()),
      VideoSource::Uri(url) => write!(f, "{}", url),
      VideoSource::File(path) => write!(f, "文件 {}", path.display()),
    }
  }
}
