// 该文件是 Saoma （扫码） 项目的一部分。
// src/scanner.rs - 扫码器：生成、视频、图像三类操作
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

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
  decoder::{CodeFamily, FrameDecoder},
  generator::{GenerateError, Generator},
  input::FrameSource,
  output::{Render, SaveImageFileOutput},
  pipeline::FramePipeline,
  task::{BatchSummary, BatchTask, CancelToken, FrameCounter, RunSummary, StreamTask, Task},
};

#[cfg(feature = "gstreamer_io")]
use crate::{
  input::{GStreamerInput, VideoSource},
  output::{FourCc, GStreamerVideoOutput, PreviewWindow, SnapshotOutput},
};

pub const DEFAULT_OUTPUT_VIDEO: &str = "output.avi";

/// 一次命令要执行的操作，按 生成 -> 视频 -> 图像 的顺序进行
#[derive(Debug, Clone, Default)]
pub struct Actions {
  pub generate: Option<String>,
  pub filename: Option<PathBuf>,
  /// 空字符串表示默认摄像头
  pub video: Option<String>,
  pub images: Option<PathBuf>,
}

impl Actions {
  pub fn is_empty(&self) -> bool {
    self.generate.is_none() && self.video.is_none() && self.images.is_none()
  }
}

#[cfg(feature = "gstreamer_io")]
#[derive(Debug, Clone)]
pub struct VideoOptions {
  /// 保存目录下的视频文件名
  pub output_video: PathBuf,
  pub fourcc: FourCc,
  pub display: bool,
  /// 为解出内容的帧另存快照
  pub snapshots: bool,
  pub frame_number: Option<u64>,
}

#[cfg(feature = "gstreamer_io")]
impl VideoOptions {
  pub fn for_family(family: CodeFamily) -> Self {
    Self {
      output_video: PathBuf::from(DEFAULT_OUTPUT_VIDEO),
      fourcc: FourCc::default(),
      display: true,
      snapshots: family == CodeFamily::Qr,
      frame_number: None,
    }
  }
}

pub struct Scanner<D> {
  pipeline: FramePipeline<D>,
  save_folder: PathBuf,
  counter: FrameCounter,
  interrupt: CancelToken,
}

impl<D: FrameDecoder> Scanner<D> {
  /// 创建扫码器，保存目录不存在时创建
  pub fn new(pipeline: FramePipeline<D>, save_folder: impl Into<PathBuf>) -> Result<Self> {
    let save_folder = save_folder.into();
    std::fs::create_dir_all(&save_folder)
      .with_context(|| format!("无法创建保存目录 {}", save_folder.display()))?;
    Ok(Self {
      pipeline,
      save_folder,
      counter: FrameCounter::default(),
      interrupt: CancelToken::new(),
    })
  }

  pub fn family(&self) -> CodeFamily {
    self.pipeline.family()
  }

  pub fn save_folder(&self) -> &Path {
    &self.save_folder
  }

  pub fn counter(&self) -> FrameCounter {
    self.counter
  }

  /// 整个进程的中断信号（Ctrl-C）
  pub fn interrupt(&self) -> &CancelToken {
    &self.interrupt
  }

  /// 文本为空时只记录日志并返回 `None`
  pub fn generate(&self, text: &str, filename: Option<&Path>) -> Result<Option<PathBuf>> {
    let generator = Generator::new(self.family(), &self.save_folder);
    match generator.generate(text, filename) {
      Ok(path) => Ok(Some(path)),
      Err(GenerateError::EmptyText) => {
        warn!("生成文本为空，跳过生成");
        Ok(None)
      }
      Err(e) => Err(e).context("生成失败"),
    }
  }

  /// 在任意来源与输出上运行视频流任务
  pub fn run_stream<I, O>(
    &mut self,
    input: I,
    output: O,
    cancel: CancelToken,
    frame_number: Option<u64>,
  ) -> Result<RunSummary>
  where
    I: FrameSource,
    O: Render,
  {
    StreamTask::default()
      .with_frame_number(frame_number)
      .with_cancel(cancel)
      .run_task(input, &mut self.pipeline, output, &mut self.counter)
  }

  #[cfg(feature = "gstreamer_io")]
  pub fn run_video(&mut self, source: &str, options: &VideoOptions) -> Result<RunSummary> {
    let source = VideoSource::parse(source).context("无效的视频来源")?;
    let cancel = self.interrupt.child();

    let input = GStreamerInput::open(&source).context("无法打开视频来源")?;
    let video = GStreamerVideoOutput::new(
      self.save_folder.join(&options.output_video),
      options.fourcc,
    )
    .context("无法创建视频输出")?;
    let preview = options
      .display
      .then(|| PreviewWindow::new(self.family().window_title(), cancel.clone()));
    let snapshots = options
      .snapshots
      .then(|| SnapshotOutput::new(&self.save_folder));

    info!("开始扫描视频，输入 q 并回车或按 Ctrl-C 退出");
    cancel.watch_quit_key();
    self.run_stream(
      input,
      (video, preview, snapshots),
      cancel,
      options.frame_number,
    )
  }

  pub fn process_images(&mut self, folder: &Path) -> Result<BatchSummary> {
    if self.interrupt.is_cancelled() {
      warn!("已中断，跳过图像处理");
      return Ok(BatchSummary::default());
    }
    BatchTask.run_task(
      folder,
      &mut self.pipeline,
      SaveImageFileOutput::new(&self.save_folder),
      &mut self.counter,
    )
  }

  /// 依次执行各项操作
  #[cfg(feature = "gstreamer_io")]
  pub fn run(&mut self, actions: &Actions, video: &VideoOptions) -> Result<()> {
    if actions.is_empty() {
      warn!("未指定任何操作，使用 --generate、--video 或 --images");
      return Ok(());
    }
    if let Some(text) = &actions.generate {
      self.generate(text, actions.filename.as_deref())?;
    }
    if let Some(source) = &actions.video {
      self.run_video(source, video)?;
    }
    if let Some(folder) = &actions.images {
      self.process_images(folder)?;
    }
    Ok(())
  }
}
