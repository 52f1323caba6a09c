use std::{backtrace::Backtrace, panic::Location};

use crate::{BoxType, ByteSink};

/// このライブラリ用の Result 型
pub type Result<T> = core::result::Result<T, Error>;

/// エラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 入力データ（フレーム列やパラメータセット、キャッシュ済みヘッダー）が不正である
    InvalidInput,

    /// ビット列の内容が無効または途中で切れている
    InvalidData,

    /// サポートされていない形式である
    Unsupported,

    /// その他の予期しないエラー
    Other,
}

/// エラー型
pub struct Error {
    /// 発生したエラーの種類
    pub kind: ErrorKind,

    /// エラーが発生した理由
    pub reason: String,

    /// エラーが作成されたソースコードの場所
    pub location: &'static Location<'static>,

    /// エラーが発生した MP4 ボックスの種類
    pub box_type: Option<BoxType>,

    /// エラー発生箇所を示すバックトレース
    ///
    /// バックトレースは `RUST_BACKTRACE` 環境変数が設定されていない場合には取得されない
    pub backtrace: Backtrace,
}

impl Error {
    /// [`Error`] インスタンスを生成する
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self::with_reason(kind, String::new())
    }

    /// エラー理由つきで [`Error`] インスタンスを生成する
    #[track_caller]
    pub fn with_reason<T: Into<String>>(kind: ErrorKind, reason: T) -> Self {
        Self {
            kind,
            reason: reason.into(),
            location: Location::caller(),
            box_type: None,
            backtrace: Backtrace::capture(),
        }
    }

    #[track_caller]
    pub(crate) fn unsupported<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::Unsupported, reason)
    }

    #[track_caller]
    pub(crate) fn invalid_input<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::InvalidInput, reason)
    }

    #[track_caller]
    pub(crate) fn invalid_data<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::InvalidData, reason)
    }

    #[track_caller]
    pub(crate) fn other<T: Into<String>>(reason: T) -> Self {
        Self::with_reason(ErrorKind::Other, reason)
    }

    /// エラーが発生したボックスの種別を設定する
    ///
    /// 既に設定済みの場合には、より内側のボックスの情報を優先して上書きしない
    pub(crate) fn with_box_type(mut self, box_type: BoxType) -> Self {
        if self.box_type.is_none() {
            self.box_type = Some(box_type);
        }
        self
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self}")
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(ty) = self.box_type {
            write!(f, "[{ty}] ")?;
        }

        write!(f, "{:?}: {}", self.kind, self.reason)?;
        write!(f, " (at {}:{})", self.location.file(), self.location.line())?;
        if self.backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            write!(f, "\n\nBacktrace:\n{}", self.backtrace)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

/// [`ByteSink`] に書き出すことができる型を表現するためのトレイト
///
/// 書き出し先が [`SizeCounter`](crate::SizeCounter) の場合にはサイズの計測のみが行われる
pub trait Encode {
    /// `self` をバイト列に変換して `sink` に書きこむ
    fn encode<S: ByteSink>(&self, sink: &mut S);
}

/// 値を `u32` に変換する（MP4 のサイズ・時間フィールド用）
///
/// 範囲外の場合には [`ErrorKind::Unsupported`] を返す
#[track_caller]
pub(crate) fn to_u32<T>(value: T, what: &str) -> Result<u32>
where
    T: TryInto<u32> + Copy + core::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| Error::unsupported(format!("{what} exceeds u32 range: {value}")))
}
