// 该文件是 Saoma （扫码） 项目的一部分。
// src/task.rs - 视频流与批处理任务
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

use std::{
  io::BufRead,
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::{
  decoder::FrameDecoder,
  input::{FrameSource, ImageFolder, ImageFolderError, read_image},
  output::{Render, SaveImageFileOutput, StreamInfo},
  pipeline::FramePipeline,
};

pub const DEFAULT_FPS: u32 = 20;
const FORCE_EXIT_SECS: u64 = 30;

/// 帧计数器，由调用方持有并在各次运行间传递
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter(u64);

impl FrameCounter {
  pub fn new(start: u64) -> Self {
    Self(start)
  }

  /// 返回当前值作为本帧编号，然后加一
  pub fn advance(&mut self) -> u64 {
    let index = self.0;
    self.0 = self.0.wrapping_add(1);
    index
  }

  pub fn value(&self) -> u64 {
    self.0
  }
}

/// 取消信号，在帧与帧之间检查
///
/// 子信号在自身或父信号被取消时都视为已取消，取消子信号不影响父信号。
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
  flag: Arc<AtomicBool>,
  parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn child(&self) -> Self {
    Self {
      flag: Arc::new(AtomicBool::new(false)),
      parent: Some(self.flag.clone()),
    }
  }

  pub fn cancel(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
      || self
        .parent
        .as_ref()
        .is_some_and(|p| p.load(Ordering::SeqCst))
  }

  /// Ctrl-C 触发取消，30 秒内未退出则强制结束进程
  pub fn install_ctrlc(&self) -> Result<(), ctrlc::Error> {
    let token = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      token.cancel();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(FORCE_EXIT_SECS));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }

  /// 终端输入 `q` 并回车时取消
  pub fn watch_quit_key(&self) {
    let token = self.clone();
    let spawned = thread::Builder::new()
      .name("quit-key".into())
      .spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
          match line {
            Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
              info!("收到退出指令");
              token.cancel();
              return;
            }
            Ok(_) => {}
            Err(_) => return,
          }
        }
      });
    if let Err(e) = spawned {
      warn!("无法监听退出按键: {}", e);
    }
  }
}

/// 一次视频流运行的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
  pub frames: u64,
  pub frames_with_payload: u64,
  pub cancelled: bool,
}

/// 一次批处理运行的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
  pub images: usize,
  pub saved: usize,
  pub skipped: usize,
  pub images_with_payload: usize,
}

pub trait Task<I, D, O>: Sized {
  type Output;
  type Error;

  fn run_task(
    self,
    input: I,
    pipeline: &mut FramePipeline<D>,
    output: O,
    counter: &mut FrameCounter,
  ) -> Result<Self::Output, Self::Error>;
}

/// 逐帧读取视频流，直到来源耗尽、达到帧数上限或被取消
///
/// 来源与输出在返回时释放，无论正常结束还是出错。
#[derive(Debug, Clone)]
pub struct StreamTask {
  frame_number: Option<u64>,
  fallback_fps: u32,
  cancel: CancelToken,
}

impl Default for StreamTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      fallback_fps: DEFAULT_FPS,
      cancel: CancelToken::default(),
    }
  }
}

impl StreamTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number.filter(|n| *n > 0);
    self
  }

  pub fn with_fallback_fps(mut self, fps: u32) -> Self {
    self.fallback_fps = fps;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }
}

impl<I, D, O> Task<I, D, O> for StreamTask
where
  I: FrameSource,
  D: FrameDecoder,
  O: Render,
{
  type Output = RunSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &mut FramePipeline<D>,
    mut output: O,
    counter: &mut FrameCounter,
  ) -> Result<RunSummary, Self::Error> {
    info!("开始任务...");
    let mut summary = RunSummary::default();
    let mut started = false;
    let mut now = Instant::now();

    loop {
      if self.cancel.is_cancelled() {
        warn!("收到取消信号，退出任务循环");
        summary.cancelled = true;
        break;
      }

      let Some(frame) = input.read_frame() else {
        info!("视频来源已耗尽");
        break;
      };
      let frame = frame.context("读取视频帧失败")?;

      if !started {
        let fps = input.fps().unwrap_or(self.fallback_fps);
        let info = StreamInfo {
          width: frame.width(),
          height: frame.height(),
          fps,
          order: frame.order(),
        };
        info!("视频参数: {}x{} @ {} fps", info.width, info.height, info.fps);
        output.begin(&info).context("无法打开输出")?;
        started = true;
      }

      let index = counter.advance();
      let result = pipeline.process(frame, index);
      let elapsed_a = now.elapsed();
      output.render_result(&result).context("写入输出失败")?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      debug!("第 {} 帧耗时: {:.2?} / {:.2?}", index, elapsed_a, elapsed_b);

      summary.frames += 1;
      if result.found_any {
        summary.frames_with_payload += 1;
      }

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
    }

    info!(
      "任务完成: 共处理 {} 帧，其中 {} 帧解出内容{}",
      summary.frames,
      summary.frames_with_payload,
      if summary.cancelled { "（已取消）" } else { "" }
    );
    Ok(summary)
  }
}

/// 逐张处理目录中的图像
///
/// 目录不存在或为空时只记录日志；单张图像无法读取时跳过；写入失败终止本次运行。
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchTask;

impl<D: FrameDecoder> Task<&Path, D, SaveImageFileOutput> for BatchTask {
  type Output = BatchSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    folder: &Path,
    pipeline: &mut FramePipeline<D>,
    output: SaveImageFileOutput,
    counter: &mut FrameCounter,
  ) -> Result<BatchSummary, Self::Error> {
    let mut summary = BatchSummary::default();

    let images = match ImageFolder::open(folder) {
      Ok(images) => images,
      Err(ImageFolderError::NotFound(path)) => {
        warn!("图像目录不存在，跳过: {}", path.display());
        return Ok(summary);
      }
      Err(e) => return Err(e).context("无法读取图像目录"),
    };
    if images.is_empty() {
      info!("目录 {} 中没有图像", folder.display());
      return Ok(summary);
    }

    summary.images = images.len();
    info!("开始处理 {} 张图像: {}", images.len(), folder.display());

    for path in images {
      let frame = match read_image(&path) {
        Ok(frame) => frame,
        Err(e) => {
          warn!("跳过无法读取的图像: {}", e);
          summary.skipped += 1;
          continue;
        }
      };

      let index = counter.advance();
      let result = pipeline.process(frame, index);
      if result.found_any {
        summary.images_with_payload += 1;
      }
      output
        .save(&path, &result)
        .with_context(|| format!("无法保存 {} 的处理结果", path.display()))?;
      summary.saved += 1;
    }

    info!(
      "批处理完成: {} 张图像，保存 {} 张，跳过 {} 张，{} 张解出内容",
      summary.images, summary.saved, summary.skipped, summary.images_with_payload
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counter_hands_out_consecutive_indices() {
    let mut counter = FrameCounter::new(5);
    assert_eq!(counter.advance(), 5);
    assert_eq!(counter.advance(), 6);
    assert_eq!(counter.value(), 7);
  }

  #[test]
  fn cancel_is_shared_between_clones() {
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!token.is_cancelled());
    clone.cancel();
    assert!(token.is_cancelled());
  }

  #[test]
  fn child_follows_parent_but_not_the_reverse() {
    let parent = CancelToken::new();
    let child = parent.child();
    child.cancel();
    assert!(!parent.is_cancelled());

    let other = parent.child();
    parent.cancel();
    assert!(other.is_cancelled());
  }

  #[test]
  fn zero_frame_limit_means_unlimited() {
    let task = StreamTask::default().with_frame_number(Some(0));
    assert_eq!(task.frame_number, None);
  }
}
