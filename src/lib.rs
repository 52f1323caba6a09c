//! H.264 (AVC) のエレメンタリーストリームを fragmented MP4 に変換するためのライブラリ
//!
//! 入力は 4 バイトの長さプレフィックスが付与された NAL ユニットの列（SPS / PPS と各フレーム）で、
//! 出力は `ftyp` / `moov` / `moof` / `mdat` からなる、単一フラグメントの MP4 ファイルとなる。
//!
//! ボックスは [`boxes::BoxTree`] によって、サイズの計測と出力の二段階で書き出される。
//! 通常は [`mux::AvcMp4Muxer`] を使えばよい。
#![warn(missing_docs)]

mod basic_types;
mod bit_reader;
pub mod boxes;
mod boxes_fmp4;
mod boxes_moov_tree;
mod boxes_sample_entry;
mod byte_writer;
mod codec;
pub mod h264;
pub mod mux;

pub use basic_types::{
    BOX_HEADER_SIZE, BoxType, Brand, FULL_BOX_HEADER_SIZE, FixedPointNumber, FullBoxFlags,
    FullBoxHeader, Mp4FileTime, SampleDependency,
};
pub use bit_reader::BitReader;
pub use byte_writer::{ByteOrder, ByteSink, ByteWriter, SizeCounter};
pub use codec::{Encode, Error, ErrorKind, Result};
