// 该文件是 Saoma （扫码） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的帧按读入顺序写入视频文件。编码器由四字符编码（FourCC）决定，
//! 封装格式由文件扩展名决定：
//!
//! | FourCC | 编码器 |
//! |---|---|
//! | `XVID` `DIVX` `DX50` `FMP4` `MP4V` | `avenc_mpeg4` |
//! | `MJPG` | `jpegenc` |
//! | `H264` `X264` `AVC1` | `x264enc` |
//! | `VP80` | `vp8enc` |
//!
//! 管道在收到第一帧（或 [`Render::begin`]）时才建立，释放时发送 EOS 并等待文件写完。

use std::{
  path::{Path, PathBuf},
  str::FromStr,
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  frame::ChannelOrder,
  output::{Render, StreamInfo},
  pipeline::FrameResult,
};

const DEFAULT_FPS: u32 = 20;
const EOS_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FourCcError {
  #[error("FourCC 必须是 4 个 ASCII 字符: {0:?}")]
  Malformed(String),
  #[error("不支持的 FourCC: {0}")]
  Unsupported(FourCc),
}

/// 四字符视频编码标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCc([u8; 4]);

impl FourCc {
  pub fn as_str(&self) -> &str {
    std::str::from_utf8(&self.0).unwrap_or("????")
  }

  /// 对应的 GStreamer 编码器元素，以及需要的解析器
  pub fn encoder(&self) -> Result<(&'static str, Option<&'static str>), FourCcError> {
    match &self.0 {
      b"XVID" | b"DIVX" | b"DX50" | b"FMP4" | b"MP4V" => Ok(("avenc_mpeg4", Some("mpeg4videoparse"))),
      b"MJPG" => Ok(("jpegenc", None)),
      b"H264" | b"X264" | b"AVC1" => Ok(("x264enc", Some("h264parse"))),
      b"VP80" => Ok(("vp8enc", None)),
      _ => Err(FourCcError::Unsupported(*self)),
    }
  }
}

impl Default for FourCc {
  fn default() -> Self {
    FourCc(*b"XVID")
  }
}

impl FromStr for FourCc {
  type Err = FourCcError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes: [u8; 4] = s
      .as_bytes()
      .try_into()
      .map_err(|_| FourCcError::Malformed(s.to_string()))?;
    if !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
      return Err(FourCcError::Malformed(s.to_string()));
    }
    Ok(FourCc(bytes.map(|b| b.to_ascii_uppercase())))
  }
}

impl std::fmt::Display for FourCc {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 按扩展名选择封装器，未知扩展名使用 AVI
fn muxer_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());
  match ext.as_deref() {
    Some("mp4") | Some("m4v") => "mp4mux",
    Some("mov") => "qtmux",
    Some("mkv") => "matroskamux",
    Some("webm") => "webmmux",
    Some("avi") => "avimux",
    _ => {
      warn!("未知的视频扩展名 {}，使用 AVI 封装", path.display());
      "avimux"
    }
  }
}

/// 编码管道描述，`filesink` 的路径在建立后通过属性设置
fn pipeline_description(fourcc: FourCc, path: &Path) -> Result<String, FourCcError> {
  let (encoder, parser) = fourcc.encoder()?;
  let parser = parser.map(|p| format!(" ! {}", p)).unwrap_or_default();
  Ok(format!(
    "appsrc name=src ! videoconvert ! {}{} ! {} ! filesink name=sink",
    encoder,
    parser,
    muxer_for(path)
  ))
}

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("FourCC 错误: {0}")]
  FourCcError(#[from] FourCcError),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("管道中缺少元素: {0}")]
  ElementNotFound(&'static str),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("帧尺寸变化: 期望 {expected:?}, 实际 {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("缓冲区写入失败: {0:?}")]
  PushError(gst::FlowError),
}

/// 以 appsrc 为起点的推流管道，视频文件与预览窗口共用
pub(crate) struct AppSrcPipeline {
  pub(crate) pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  info: gst_video::VideoInfo,
  fps: u32,
  pushed: u64,
}

impl AppSrcPipeline {
  pub(crate) fn launch(
    description: &str,
    stream: &StreamInfo,
    configure: impl FnOnce(&gst::Pipeline) -> Result<(), GStreamerVideoOutputError>,
  ) -> Result<Self, GStreamerVideoOutputError> {
    gst::init()?;

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::ElementNotFound("appsrc"))?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::ElementNotFound("appsrc"))?;

    let fps = if stream.fps == 0 { DEFAULT_FPS } else { stream.fps };
    let format = match stream.order {
      ChannelOrder::Rgb => gst_video::VideoFormat::Rgb,
      ChannelOrder::Bgr => gst_video::VideoFormat::Bgr,
    };
    let info = gst_video::VideoInfo::builder(format, stream.width, stream.height)
      .fps(gst::Fraction::new(fps as i32, 1))
      .build()?;

    appsrc.set_caps(Some(&info.to_caps()?));
    appsrc.set_format(gst::Format::Time);
    appsrc.set_property("block", true);

    configure(&pipeline)?;
    pipeline.set_state(gst::State::Playing)?;

    Ok(Self {
      pipeline,
      appsrc,
      info,
      fps,
      pushed: 0,
    })
  }

  pub(crate) fn appsrc(&self) -> &gst_app::AppSrc {
    &self.appsrc
  }

  pub(crate) fn pushed(&self) -> u64 {
    self.pushed
  }

  /// 按视频信息中的行跨度拷贝一帧并推入管道
  pub(crate) fn push(&mut self, image: &RgbImage) -> Result<(), GStreamerVideoOutputError> {
    let expected = (self.info.width(), self.info.height());
    let actual = image.dimensions();
    if expected != actual {
      return Err(GStreamerVideoOutputError::FrameSizeChanged { expected, actual });
    }

    let mut buffer = gst::Buffer::with_size(self.info.size())?;
    {
      let buffer = buffer
        .get_mut()
        .ok_or_else(|| GStreamerVideoOutputError::PipelineError("缓冲区不可写".to_string()))?;
      let frame_ns = 1_000_000_000 / self.fps as u64;
      buffer.set_pts(gst::ClockTime::from_nseconds(self.pushed * frame_ns));
      buffer.set_duration(gst::ClockTime::from_nseconds(frame_ns));

      let mut vframe = gst_video::VideoFrameRef::from_buffer_ref_writable(buffer, &self.info)?;
      let stride = vframe.plane_stride()[0] as usize;
      let row = actual.0 as usize * 3;
      let plane = vframe.plane_data_mut(0)?;
      if row > 0 {
        for (dst, src) in plane.chunks_mut(stride).zip(image.as_raw().chunks_exact(row)) {
          dst[..row].copy_from_slice(src);
        }
      }
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(GStreamerVideoOutputError::PushError)?;
    self.pushed += 1;
    Ok(())
  }

  /// 发送 EOS，等待管道处理完毕后停止
  pub(crate) fn finish(self) {
    let _ = self.appsrc.end_of_stream();
    if let Some(bus) = self.pipeline.bus() {
      let message = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
      match message.as_ref().map(|m| m.view()) {
        Some(gst::MessageView::Eos(..)) => {}
        Some(gst::MessageView::Error(err)) => warn!("结束管道时出错: {}", err.error()),
        _ => warn!("等待 EOS 超时"),
      }
    }
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止 GStreamer 管道: {}", e);
    }
  }
}

/// GStreamer 视频文件输出
pub struct GStreamerVideoOutput {
  path: PathBuf,
  fourcc: FourCc,
  fallback_fps: u32,
  writer: Option<AppSrcPipeline>,
}

impl GStreamerVideoOutput {
  pub fn new(path: impl Into<PathBuf>, fourcc: FourCc) -> Result<Self, GStreamerVideoOutputError> {
    // 编码器不存在时尽早报错
    fourcc.encoder()?;
    Ok(Self {
      path: path.into(),
      fourcc,
      fallback_fps: DEFAULT_FPS,
      writer: None,
    })
  }

  pub fn with_fallback_fps(mut self, fps: u32) -> Self {
    self.fallback_fps = fps;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn open(&mut self, stream: &StreamInfo) -> Result<(), GStreamerVideoOutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)
        .map_err(|e| GStreamerVideoOutputError::PipelineError(e.to_string()))?;
    }

    let description = pipeline_description(self.fourcc, &self.path)?;
    info!("创建视频输出管道: {}", description);

    let location = self.path.to_string_lossy().into_owned();
    let writer = AppSrcPipeline::launch(&description, stream, |pipeline| {
      let sink = pipeline
        .by_name("sink")
        .ok_or(GStreamerVideoOutputError::ElementNotFound("filesink"))?;
      sink.set_property("location", location.as_str());
      Ok(())
    })
    .inspect_err(|e| error!("无法打开视频输出 {}: {}", self.path.display(), e))?;

    info!(
      "视频输出已初始化: {}x{} @ {} fps ({}) -> {}",
      stream.width,
      stream.height,
      writer.fps,
      self.fourcc,
      self.path.display()
    );
    self.writer = Some(writer);
    Ok(())
  }

  /// 结束写入；重复调用无效果
  pub fn close(&mut self) {
    if let Some(writer) = self.writer.take() {
      let pushed = writer.pushed();
      writer.finish();
      info!("视频输出已关闭，共写入 {} 帧: {}", pushed, self.path.display());
    }
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    self.close();
  }
}

impl Render for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn begin(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
    if self.writer.is_none() {
      self.open(info)?;
    }
    Ok(())
  }

  fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error> {
    if self.writer.is_none() {
      let info = StreamInfo {
        width: result.frame.width(),
        height: result.frame.height(),
        fps: self.fallback_fps,
        order: result.frame.order(),
      };
      self.open(&info)?;
    }
    match self.writer.as_mut() {
      Some(writer) => writer.push(result.frame.image()),
      None => Err(GStreamerVideoOutputError::PipelineError("视频输出未打开".to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fourcc_parses_case_insensitively() {
    assert_eq!("xvid".parse::<FourCc>().unwrap(), FourCc::default());
    assert!(matches!(
      "XVIDX".parse::<FourCc>(),
      Err(FourCcError::Malformed(_))
    ));
    assert!(matches!("X V ".parse::<FourCc>(), Err(FourCcError::Malformed(_))));
  }

  #[test]
  fn fourcc_selects_encoder() {
    let enc = |s: &str| s.parse::<FourCc>().unwrap().encoder().map(|(e, _)| e);
    assert_eq!(enc("XVID"), Ok("avenc_mpeg4"));
    assert_eq!(enc("MJPG"), Ok("jpegenc"));
    assert_eq!(enc("avc1"), Ok("x264enc"));
    assert_eq!(enc("VP80"), Ok("vp8enc"));
    assert!(matches!(enc("WXYZ"), Err(FourCcError::Unsupported(_))));
  }

  #[test]
  fn container_follows_extension() {
    let description = pipeline_description(FourCc::default(), Path::new("out/output.avi")).unwrap();
    assert_eq!(
      description,
      "appsrc name=src ! videoconvert ! avenc_mpeg4 ! mpeg4videoparse ! avimux ! filesink name=sink"
    );
    assert_eq!(muxer_for(Path::new("clip.MKV")), "matroskamux");
    assert_eq!(muxer_for(Path::new("clip.mp4")), "mp4mux");
    assert_eq!(muxer_for(Path::new("clip")), "avimux");
  }

  #[test]
  fn unsupported_fourcc_is_rejected_before_opening() {
    let fourcc = "WXYZ".parse::<FourCc>().unwrap();
    assert!(GStreamerVideoOutput::new("output.avi", fourcc).is_err());
  }
}
