// 该文件是 Saoma （扫码） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Args;

use crate::scanner::{Actions, DEFAULT_OUTPUT_VIDEO};

/// 两种扫码器共用的参数
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
  /// 把文本编码为图像并保存
  #[arg(long, value_name = "TEXT")]
  pub generate: Option<String>,

  /// 生成图像的文件名（默认由文本得出）
  #[arg(long, value_name = "FILE", requires = "generate")]
  pub filename: Option<PathBuf>,

  /// 扫描视频：视频文件、/dev/videoN、rtsp:// 等；不带值时使用默认摄像头
  #[arg(long, value_name = "SOURCE", num_args = 0..=1, default_missing_value = "")]
  pub video: Option<String>,

  /// 扫描目录中的所有图像
  #[arg(long, value_name = "DIR")]
  pub images: Option<PathBuf>,

  /// 保存目录下的视频文件名
  #[arg(long, value_name = "NAME", default_value = DEFAULT_OUTPUT_VIDEO)]
  pub output_video: PathBuf,

  /// 输出视频的四字符编码
  #[arg(long, value_name = "CODE", default_value = "XVID")]
  pub fourcc: String,

  /// 不显示预览窗口
  #[arg(long)]
  pub no_display: bool,

  /// 覆盖层字体文件（默认查找系统字体）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 处理指定帧数后停止视频扫描
  #[arg(long, value_name = "COUNT")]
  pub frame_number: Option<u64>,
}

impl CommonArgs {
  pub fn actions(&self) -> Actions {
    Actions {
      generate: self.generate.clone(),
      filename: self.filename.clone(),
      video: self.video.clone(),
      images: self.images.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(flatten)]
    common: CommonArgs,
  }

  #[test]
  fn bare_video_flag_means_default_camera() {
    let cli = Cli::try_parse_from(["scanner", "--video"]).unwrap();
    assert_eq!(cli.common.video.as_deref(), Some(""));
    assert_eq!(cli.common.output_video, PathBuf::from("output.avi"));
    assert_eq!(cli.common.fourcc, "XVID");
  }

  #[test]
  fn actions_follow_flags() {
    let cli = Cli::try_parse_from([
      "scanner",
      "--generate",
      "HELLO123",
      "--video",
      "clip.mp4",
      "--images",
      "shots",
    ])
    .unwrap();
    let actions = cli.common.actions();
    assert_eq!(actions.generate.as_deref(), Some("HELLO123"));
    assert_eq!(actions.video.as_deref(), Some("clip.mp4"));
    assert_eq!(actions.images, Some(PathBuf::from("shots")));
  }

  #[test]
  fn filename_requires_generate() {
    assert!(Cli::try_parse_from(["scanner", "--filename", "a.png"]).is_err());
  }
}
