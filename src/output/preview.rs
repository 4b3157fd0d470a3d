// 该文件是 Saoma （扫码） 项目的一部分。
// src/output/preview.rs - 实时预览窗口
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

use gstreamer::{self as gst, prelude::*};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  output::{
    Render, StreamInfo,
    gstreamer_video_output::{AppSrcPipeline, GStreamerVideoOutputError},
  },
  pipeline::FrameResult,
  task::CancelToken,
};

const PREVIEW_PIPELINE: &str =
  "appsrc name=src is-live=true ! videoconvert ! autovideosink sync=false";

#[derive(Error, Debug)]
pub enum PreviewError {
  #[error("无法打开预览窗口: {0}")]
  Open(#[from] GStreamerVideoOutputError),
}

/// 带标题的预览窗口，每帧刷新一次
///
/// 窗口被关闭（管道报告错误或结束）时触发取消，不作为错误返回。
pub struct PreviewWindow {
  title: String,
  cancel: CancelToken,
  display: Option<AppSrcPipeline>,
  closed: bool,
}

impl PreviewWindow {
  pub fn new(title: impl Into<String>, cancel: CancelToken) -> Self {
    Self {
      title: title.into(),
      cancel,
      display: None,
      closed: false,
    }
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  fn open(&mut self, stream: &StreamInfo) -> Result<(), PreviewError> {
    let display = AppSrcPipeline::launch(PREVIEW_PIPELINE, stream, |_| Ok(()))?;

    let mut tags = gst::TagList::new();
    if let Some(tags) = tags.get_mut() {
      tags.add::<gst::tags::Title>(&self.title.as_str(), gst::TagMergeMode::Replace);
    }
    let _ = display.appsrc().send_event(gst::event::Tag::new(tags));

    info!("预览窗口已打开: {}", self.title);
    self.display = Some(display);
    Ok(())
  }

  fn close(&mut self, reason: &str) {
    if let Some(display) = self.display.take() {
      let _ = display.pipeline.set_state(gst::State::Null);
    }
    if !self.closed {
      self.closed = true;
      warn!("{}，停止处理", reason);
      self.cancel.cancel();
    }
  }

  /// 非阻塞地检查窗口是否已被关闭
  fn poll_bus(&mut self) {
    let Some(bus) = self.display.as_ref().and_then(|d| d.pipeline.bus()) else {
      return;
    };
    if let Some(message) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
      if let gst::MessageView::Error(err) = message.view() {
        info!("预览管道报告: {}", err.error());
      }
      self.close("预览窗口已关闭");
    }
  }
}

impl Drop for PreviewWindow {
  fn drop(&mut self) {
    if let Some(display) = self.display.take() {
      display.finish();
    }
  }
}

impl Render for PreviewWindow {
  type Error = PreviewError;

  fn begin(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
    if self.display.is_none() && !self.closed {
      self.open(info)?;
    }
    Ok(())
  }

  fn render_result(&mut self, result: &FrameResult) -> Result<(), Self::Error> {
    if self.closed {
      return Ok(());
    }
    if self.display.is_none() {
      let info = StreamInfo {
        width: result.frame.width(),
        height: result.frame.height(),
        fps: 0,
        order: result.frame.order(),
      };
      self.open(&info)?;
    }

    let pushed = self
      .display
      .as_mut()
      .map(|d| d.push(result.frame.image()));
    if let Some(Err(e)) = pushed {
      warn!("预览帧推送失败: {}", e);
      self.close("预览窗口不可用");
      return Ok(());
    }

    self.poll_bus();
    Ok(())
  }
}
