//! H.264 のフレーム列から fragmented MP4 を生成するためのモジュール
//!
//! - [`AvcRemuxer`]: フレーム列を [`Track`] に変換し、ボックスツリーを出力する
//! - [`AvcMp4Muxer`]: ヘッダーのキャッシュを考慮して、最終的な MP4 のバイト列を生成する
mod facade;
mod options;
mod remux;
mod track;

pub use facade::AvcMp4Muxer;
pub use options::{DEFAULT_TIMESCALE, RemuxOptions};
pub use remux::{AvcRemuxer, implicit_offset};
pub use track::{CachedHeader, Sample, Track, TrackKind, VideoFrame, VideoSequence};
