use crate::{ByteSink, Encode};

/// ボックスヘッダー（32 ビットのサイズフィールドと 4 文字の種別）のバイト数
pub const BOX_HEADER_SIZE: u32 = 8;

/// フルボックスヘッダー（バージョンとフラグ）のバイト数
pub const FULL_BOX_HEADER_SIZE: u32 = 4;

/// ボックスの種別
///
/// このライブラリが出力するのは四文字で表現される通常のボックスのみなので、UUID 形式には対応していない
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxType([u8; 4]);

impl BoxType {
    /// 四文字の種別からインスタンスを作成する
    pub const fn new(ty: [u8; 4]) -> Self {
        Self(ty)
    }

    /// 種別を表すバイト列を返す
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl core::fmt::Debug for BoxType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Ok(ty) = core::str::from_utf8(&self.0) {
            f.debug_tuple("BoxType").field(&ty).finish()
        } else {
            f.debug_tuple("BoxType").field(&self.0).finish()
        }
    }
}

impl core::fmt::Display for BoxType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Ok(ty) = core::str::from_utf8(&self.0) {
            return write!(f, "{ty}");
        }
        write!(f, "{:?}", self.0)
    }
}

impl Encode for BoxType {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.write_bytes(&self.0);
    }
}

/// `ftyp` ボックスに含まれるブランド
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Brand([u8; 4]);

impl Brand {
    /// [ISO/IEC 14496-12] `isom` ブランド
    pub const ISOM: Self = Self::new(*b"isom");

    /// [ISO/IEC 14496-12] `iso2` ブランド
    pub const ISO2: Self = Self::new(*b"iso2");

    /// [ISO/IEC 14496-15] `avc1` ブランド
    pub const AVC1: Self = Self::new(*b"avc1");

    /// [ISO/IEC 14496-14] `mp41` ブランド
    pub const MP41: Self = Self::new(*b"mp41");

    /// 四文字のバイト列を受け取って [`Brand`] インスタンスを作成する
    pub const fn new(brand: [u8; 4]) -> Self {
        Self(brand)
    }

    /// ブランドを表すバイト列を返す
    pub const fn get(self) -> [u8; 4] {
        self.0
    }
}

impl core::fmt::Debug for Brand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Ok(s) = core::str::from_utf8(&self.0) {
            f.debug_tuple("Brand").field(&s).finish()
        } else {
            f.debug_tuple("Brand").field(&self.0).finish()
        }
    }
}

impl Encode for Brand {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.write_bytes(&self.0);
    }
}

/// フルボックスに共通のヘッダー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullBoxHeader {
    /// バージョン
    pub version: u8,

    /// フラグ
    pub flags: FullBoxFlags,
}

impl FullBoxHeader {
    /// バージョン 0 でフラグが空のヘッダー
    pub const V0: Self = Self::new(0, FullBoxFlags::empty());

    /// バージョンとフラグを指定してヘッダーを作成する
    pub const fn new(version: u8, flags: FullBoxFlags) -> Self {
        Self { version, flags }
    }
}

impl Encode for FullBoxHeader {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.write_u8(self.version);
        self.flags.encode(sink);
    }
}

/// フルボックスのヘッダー部分に含まれる 24 ビットのビットフラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullBoxFlags(u32);

impl FullBoxFlags {
    /// 空のビットフラグを作成する
    pub const fn empty() -> Self {
        Self(0)
    }

    /// [`u32`] を受け取って、対応するビットフラグを作成する
    ///
    /// 上位 8 ビットは無視される
    pub const fn new(flags: u32) -> Self {
        Self(flags & 0x00FF_FFFF)
    }

    /// このビットフラグに対応する [`u32`] 値を返す
    pub const fn get(self) -> u32 {
        self.0
    }

    /// 指定されたビット位置のフラグがセットされているかどうかを判定する
    pub const fn is_set(self, i: usize) -> bool {
        (self.0 & (1 << i)) != 0
    }
}

impl Encode for FullBoxFlags {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.write_bytes(&self.0.to_be_bytes()[1..]);
    }
}

/// 固定小数点数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixedPointNumber<I, F = I> {
    /// 整数部
    pub integer: I,

    /// 小数部
    pub fraction: F,
}

impl<I, F> FixedPointNumber<I, F> {
    /// 整数部と小数部を受け取って固定小数点数を返す
    pub const fn new(integer: I, fraction: F) -> Self {
        Self { integer, fraction }
    }
}

impl Encode for FixedPointNumber<u16> {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.write_u16(self.integer);
        sink.write_u16(self.fraction);
    }
}

impl Encode for FixedPointNumber<u8> {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.write_u8(self.integer);
        sink.write_u8(self.fraction);
    }
}

/// MP4 ファイル内で使われる時刻形式（1904/1/1 からの経過秒数）
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mp4FileTime(u32);

impl Mp4FileTime {
    /// 1904/1/1 からの経過秒数を引数にとって [`Mp4FileTime`] インスタンスを作成する
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// 1904/1/1 からの経過秒数を返す
    pub const fn as_secs(self) -> u32 {
        self.0
    }
}

impl Encode for Mp4FileTime {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.write_u32(self.0);
    }
}

/// サンプルの依存関係を表すフラグ群
///
/// `trun` ボックスの sample_flags と `sdtp` ボックスのエントリーの両方の元になる
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleDependency {
    /// is_leading（2 ビット）
    pub is_leading: u8,

    /// sample_depends_on（2 ビット、1: 他のサンプルに依存する、2: 依存しない）
    pub depends_on: u8,

    /// sample_is_depended_on（2 ビット）
    pub is_depended_on: u8,

    /// sample_has_redundancy（2 ビット）
    pub has_redundancy: u8,

    /// sample_padding_value（3 ビット）
    pub padding_value: u8,

    /// sample_is_non_sync_sample
    pub is_non_sync: bool,

    /// sample_degradation_priority
    pub degradation_priority: u16,

    /// キーフレームかどうか
    pub is_keyframe: bool,
}

impl SampleDependency {
    /// キーフレームかどうかから依存関係を決定する
    pub const fn from_keyframe(keyframe: bool) -> Self {
        Self {
            is_leading: 0,
            depends_on: if keyframe { 2 } else { 1 },
            is_depended_on: 0,
            has_redundancy: 0,
            padding_value: 0,
            is_non_sync: !keyframe,
            degradation_priority: 0,
            is_keyframe: keyframe,
        }
    }

    /// `trun` ボックスの sample_flags としての値を返す
    pub const fn to_sample_flags(self) -> u32 {
        ((self.is_leading as u32 & 0b11) << 26)
            | ((self.depends_on as u32 & 0b11) << 24)
            | ((self.is_depended_on as u32 & 0b11) << 22)
            | ((self.has_redundancy as u32 & 0b11) << 20)
            | ((self.padding_value as u32 & 0b111) << 17)
            | ((self.is_non_sync as u32) << 16)
            | self.degradation_priority as u32
    }

    /// `sdtp` ボックスのエントリーとしての値を返す
    pub const fn to_sdtp_entry(self) -> u8 {
        ((self.is_leading & 0b11) << 6)
            | ((self.depends_on & 0b11) << 4)
            | ((self.is_depended_on & 0b11) << 2)
            | (self.has_redundancy & 0b11)
    }
}
