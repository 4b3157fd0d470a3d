// 该文件是 Saoma （扫码） 项目的一部分。
// src/output.rs - 输出定义
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

use std::convert::Infallible;

use thiserror::Error;

use crate::{frame::ChannelOrder, pipeline::FrameResult};

pub mod draw;

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput, SnapshotOutput};

#[cfg(feature = "gstreamer_io")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_io")]
pub use self::gstreamer_video_output::{
  FourCc, FourCcError, GStreamerVideoOutput, GStreamerVideoOutputError,
};

#[cfg(feature = "gstreamer_io")]
mod preview;
#[cfg(feature = "gstreamer_io")]
pub use self::preview::{PreviewError, PreviewWindow};

/// 视频流参数，在第一帧之前交给输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
  pub width: u32,
  pub height: u32,
  pub fps: u32,
  pub order: ChannelOrder,
}

/// 处理结果的去向：视频文件、快照、预览窗口等
pub trait Render {
  type Error: std::error::Error + Send + Sync + 'static;

  fn begin(&mut self, _info: &StreamInfo) -> Result<(), Self::Error> {
    Ok(())
  }

  fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_io")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[cfg(feature = "gstreamer_io")]
  #[error("预览窗口错误: {0}")]
  PreviewError(#[from] PreviewError),
  #[error("输出错误: {0}")]
  Sink(Box<dyn std::error::Error + Send + Sync>),
}

impl OutputError {
  pub fn sink<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    OutputError::Sink(Box::new(e))
  }
}

impl Render for () {
  type Error = Infallible;

  fn render_result(&mut self, _result: &FrameResult) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// 未启用的输出
impl<R: Render> Render for Option<R> {
  type Error = R::Error;

  fn begin(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.begin(info),
      None => Ok(()),
    }
  }

  fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.render_result(result),
      None => Ok(()),
    }
  }
}

impl<R: Render + ?Sized> Render for Box<R> {
  type Error = R::Error;

  fn begin(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
    (**self).begin(info)
  }

  fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error> {
    (**self).render_result(result)
  }
}

macro_rules! impl_render_tuple {
  ($($name:ident),+) => {
    /// 按顺序交给每个输出，遇到第一个错误即返回
    impl<$($name: Render),+> Render for ($($name,)+) {
      type Error = OutputError;

      #[allow(non_snake_case)]
      fn begin(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
        let ($($name,)+) = self;
        $($name.begin(info).map_err(OutputError::sink)?;)+
        Ok(())
      }

      #[allow(non_snake_case)]
      fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error> {
        let ($($name,)+) = self;
        $($name.render_result(result).map_err(OutputError::sink)?;)+
        Ok(())
      }
    }
  };
}

impl_render_tuple!(A, B);
impl_render_tuple!(A, B, C);

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Frame;
  use image::RgbImage;

  #[derive(Default)]
  struct Recorder {
    begun: Option<StreamInfo>,
    indices: Vec<u64>,
  }

  impl Render for Recorder {
    type Error = Infallible;

    fn begin(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
      self.begun = Some(*info);
      Ok(())
    }

    fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error> {
      self.indices.push(result.index);
      Ok(())
    }
  }

  #[derive(Debug, Error)]
  #[error("磁盘已满")]
  struct DiskFull;

  struct Failing;

  impl Render for Failing {
    type Error = DiskFull;

    fn render_result(&mut self, _result: &FrameResult) -> Result<(), Self::Error> {
      Err(DiskFull)
    }
  }

  fn result(index: u64) -> FrameResult {
    FrameResult {
      index,
      frame: Frame::from_rgb(RgbImage::new(2, 2)),
      found_any: false,
      regions: Vec::new(),
      overlays: Vec::new(),
    }
  }

  #[test]
  fn tuple_forwards_to_every_output() {
    let info = StreamInfo {
      width: 2,
      height: 2,
      fps: 20,
      order: ChannelOrder::Rgb,
    };
    let mut outputs = (Recorder::default(), Some(Recorder::default()));
    outputs.begin(&info).unwrap();
    outputs.render_result(&result(0)).unwrap();
    outputs.render_result(&result(1)).unwrap();

    assert_eq!(outputs.0.begun, Some(info));
    assert_eq!(outputs.0.indices, vec![0, 1]);
    assert_eq!(outputs.1.as_ref().map(|r| r.indices.len()), Some(2));
  }

  #[test]
  fn tuple_stops_at_first_error() {
    let mut outputs = (Failing, Recorder::default());
    let err = outputs.render_result(&result(0)).unwrap_err();
    assert!(matches!(err, OutputError::Sink(_)));
    assert!(outputs.1.indices.is_empty());
  }

  #[test]
  fn disabled_output_accepts_everything() {
    let mut output: Option<Failing> = None;
    assert!(output.render_result(&result(0)).is_ok());
  }
}
