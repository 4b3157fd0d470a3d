// 该文件是 Saoma （扫码） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 从摄像头、V4L2 设备、视频文件或网络流读取帧，输出 [`Frame`]。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use saoma::input::{FrameSource, GStreamerInput, VideoSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut input = GStreamerInput::open(&VideoSource::parse("/dev/video0")?)?;
//! while let Some(frame) = input.read_frame() {
//!     let frame = frame?;
//!     println!("帧: {}x{}", frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! 来源为摄像头时 appsink 丢弃旧帧，文件与网络流则逐帧读取。

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  frame::{ChannelOrder, Frame, FrameError},
  input::{FrameSource, VideoSource},
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("管道中缺少元素: {0}")]
  ElementNotFound(&'static str),
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("视频流错误: {0}")]
  StreamError(String),
}

enum PipelineItem<'a> {
  Source(&'a VideoSource),
  Decode,
  TargetFormat(&'static str),
  Sink { drop: bool },
}

impl PipelineItem<'_> {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::Source(VideoSource::DefaultCamera) => "autovideosrc".to_string(),
      PipelineItem::Source(VideoSource::Device(_)) => "v4l2src name=source".to_string(),
      PipelineItem::Source(VideoSource::Uri(_)) => "uridecodebin name=source".to_string(),
      PipelineItem::Source(VideoSource::File(_)) => "filesrc name=source".to_string(),
      PipelineItem::Decode => "decodebin".to_string(),
      PipelineItem::TargetFormat(format) => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      PipelineItem::Sink { drop } => format!(
        "appsink name=sink sync=false max-buffers=2 drop={}",
        drop
      ),
    }
  }
}

/// 来源对应的管道描述；设备、文件与 URI 在建立后通过属性设置
fn pipeline_description(source: &VideoSource) -> String {
  let mut items = vec![PipelineItem::Source(source)];
  if matches!(source, VideoSource::File(_)) {
    items.push(PipelineItem::Decode);
  }
  items.push(PipelineItem::TargetFormat("RGB"));
  items.push(PipelineItem::Sink {
    drop: source.is_live(),
  });
  items
    .iter()
    .map(PipelineItem::to_pipeline)
    .collect::<Vec<_>>()
    .join(" ! ")
}

/// GStreamer 视频输入
///
/// 释放时停止管道。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  fps: Option<u32>,
}

impl GStreamerInput {
  pub fn open(source: &VideoSource) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let description = pipeline_description(source);
    info!("GStreamer 管道描述: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let property = match source {
      VideoSource::DefaultCamera => None,
      VideoSource::Device(path) => Some(("device", path.to_string_lossy().into_owned())),
      VideoSource::Uri(url) => Some(("uri", url.to_string())),
      VideoSource::File(path) => Some(("location", path.to_string_lossy().into_owned())),
    };
    if let Some((name, value)) = property {
      pipeline
        .by_name("source")
        .ok_or(GStreamerInputError::ElementNotFound("source"))?
        .set_property(name, value.as_str());
    }

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::ElementNotFound("appsink"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::ElementNotFound("appsink"))?;

    if let Err(e) = pipeline.set_state(gst::State::Playing) {
      error!("无法打开视频来源 {}: {}", source, e);
      let _ = pipeline.set_state(gst::State::Null);
      return Err(e.into());
    }
    info!("视频来源已打开: {}", source);

    Ok(Self {
      pipeline,
      appsink,
      fps: None,
    })
  }

  /// 拉取失败时区分流结束与管道错误
  fn pipeline_error(&self) -> Option<GStreamerInputError> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(GStreamerInputError::StreamError(format!(
        "{} ({:?})",
        err.error(),
        err.debug()
      ))),
      _ => None,
    }
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止 GStreamer 管道: {}", e);
    }
  }
}

impl FrameSource for GStreamerInput {
  type Error = GStreamerInputError;

  fn read_frame(&mut self) -> Option<Result<Frame, Self::Error>> {
    match self.appsink.pull_sample() {
      Ok(sample) => {
        let converted = convert_sample(&sample);
        if let Ok((_, fps)) = &converted
          && self.fps.is_none()
        {
          self.fps = *fps;
        }
        Some(converted.map(|(frame, _)| frame))
      }
      Err(_) => match self.pipeline_error() {
        Some(e) => {
          error!("读取视频帧失败: {}", e);
          Some(Err(e))
        }
        None => {
          info!("视频流结束");
          None
        }
      },
    }
  }

  fn fps(&self) -> Option<u32> {
    self.fps
  }
}

/// 去掉每行末尾的对齐填充，得到紧密排列的 HWC 字节
fn pack_rows(
  data: &[u8],
  stride: usize,
  width: usize,
  height: usize,
) -> Result<Vec<u8>, GStreamerInputError> {
  let row = width * 3;
  let expected = if height == 0 {
    0
  } else {
    stride * (height - 1) + row
  };
  if stride < row || data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut packed = Vec::with_capacity(row * height);
  for y in 0..height {
    let start = y * stride;
    packed.extend_from_slice(&data[start..start + row]);
  }
  Ok(packed)
}

fn convert_sample(sample: &gst::Sample) -> Result<(Frame, Option<u32>), GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;
  let info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let order = match info.format() {
    gst_video::VideoFormat::Rgb => ChannelOrder::Rgb,
    gst_video::VideoFormat::Bgr => ChannelOrder::Bgr,
    other => return Err(GStreamerInputError::UnsupportedFormat(other)),
  };

  let vframe = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)?;
  let stride = vframe.plane_stride()[0] as usize;
  let data = vframe.plane_data(0)?;
  let (width, height) = (info.width(), info.height());
  let packed = pack_rows(data, stride, width as usize, height as usize)?;

  let fps = info.fps();
  let fps = (fps.numer() > 0 && fps.denom() > 0)
    .then(|| (fps.numer() as f64 / fps.denom() as f64).round() as u32)
    .filter(|fps| *fps > 0);

  Ok((Frame::from_raw(width, height, packed, order)?, fps))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  #[test]
  fn camera_pipelines_drop_stale_frames() {
    assert_eq!(
      pipeline_description(&VideoSource::DefaultCamera),
      "autovideosrc ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false max-buffers=2 drop=true"
    );
    assert!(
      pipeline_description(&VideoSource::Device(PathBuf::from("/dev/video0")))
        .starts_with("v4l2src name=source ! videoconvert")
    );
  }

  #[test]
  fn file_pipelines_decode_every_frame() {
    let description = pipeline_description(&VideoSource::File(PathBuf::from("clip.mp4")));
    assert_eq!(
      description,
      "filesrc name=source ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false max-buffers=2 drop=false"
    );
  }

  #[test]
  fn rows_are_packed_without_padding() {
    // 2x2 像素，每行填充到 8 字节
    let data = [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12];
    let packed = pack_rows(&data, 8, 2, 2).unwrap();
    assert_eq!(packed, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
  }

  #[test]
  fn short_buffers_are_rejected() {
    let err = pack_rows(&[0; 10], 8, 2, 2).unwrap_err();
    assert!(matches!(
      err,
      GStreamerInputError::BufferSizeMismatch {
        expected: 14,
        actual: 10
      }
    ));
  }
}
