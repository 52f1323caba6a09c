//! 可変長のバイト列書き込みバッファ
use bytes::Bytes;

/// [`ByteWriter`] が多バイト値を書き込む際のバイトオーダー
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// ビッグエンディアン（MP4 のボックスはこちら）
    #[default]
    BigEndian,

    /// リトルエンディアン
    LittleEndian,
}

/// ボックスのペイロードを書き出す先を抽象化するトレイト
///
/// 実際にバイト列を蓄積する [`ByteWriter`] と、書き込まれるバイト数だけを数える [`SizeCounter`] が実装している。
/// 同じ書き込み処理を両方に対して実行することで、サイズ計測と出力の結果が必ず一致するようになっている。
pub trait ByteSink {
    /// 1 バイトを書き込む
    fn write_u8(&mut self, v: u8);

    /// 2 バイトの整数を書き込む
    fn write_u16(&mut self, v: u16);

    /// 4 バイトの整数を書き込む
    fn write_u32(&mut self, v: u32);

    /// バイト列をそのまま書き込む
    fn write_bytes(&mut self, src: &[u8]);

    /// 4 バイトの符号付き整数を書き込む
    fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    /// 指定バイト数の 0 を書き込む
    fn write_zeros(&mut self, n: usize) {
        for _ in 0..n {
            self.write_u8(0);
        }
    }
}

/// 書き込まれたバイト数だけを数える [`ByteSink`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SizeCounter {
    size: u64,
}

impl SizeCounter {
    /// 空のカウンターを作成する
    pub const fn new() -> Self {
        Self { size: 0 }
    }

    /// これまでに書き込まれたバイト数を返す
    pub const fn size(&self) -> u64 {
        self.size
    }
}

impl ByteSink for SizeCounter {
    fn write_u8(&mut self, _v: u8) {
        self.size += 1;
    }

    fn write_u16(&mut self, _v: u16) {
        self.size += 2;
    }

    fn write_u32(&mut self, _v: u32) {
        self.size += 4;
    }

    fn write_bytes(&mut self, src: &[u8]) {
        self.size += src.len() as u64;
    }

    fn write_zeros(&mut self, n: usize) {
        self.size += n as u64;
    }
}

/// バイト列を蓄積して、最後に所有権ごと呼び出し元へ渡すためのバッファ
///
/// 容量が足りなくなった場合には、十分な大きさになるまで容量を 1.5 倍ずつ増やし、
/// 書き込み済みの部分だけを新しいバッファへコピーする。
///
/// メモリ確保の失敗は回復可能なエラーとしては扱わない（グローバルアロケーターの挙動に従う）。
#[derive(Debug, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
    capacity: usize,
    order: ByteOrder,
}

impl ByteWriter {
    /// [`ByteWriter::release()`] 後や、容量指定なしで作成された場合の初期容量
    pub const DEFAULT_CAPACITY: usize = 32;

    /// デフォルトの容量でインスタンスを作成する
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// 指定の容量でインスタンスを作成する
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            order: ByteOrder::BigEndian,
        }
    }

    /// 以降の多バイト値の書き込みに使うバイトオーダーを設定する
    ///
    /// 書き込み済みのバイト列には影響しない
    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// 現在のバイトオーダーを返す
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// 書き込み済みのバイト数を返す
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// まだ何も書き込まれていないかどうか
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 現在の容量を返す
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 書き込み済みのバイト列を返す
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// バッファの所有権を呼び出し元に渡す
    ///
    /// このインスタンス自体は小さな空のバッファで初期化し直されるので、そのまま再利用できる。
    pub fn release(&mut self) -> Bytes {
        let buf = core::mem::replace(&mut self.buf, Vec::with_capacity(Self::DEFAULT_CAPACITY));
        self.capacity = Self::DEFAULT_CAPACITY;
        Bytes::from(buf)
    }

    fn ensure_capacity(&mut self, additional: usize) {
        let required = self.buf.len() + additional;
        if required <= self.capacity {
            return;
        }

        let mut capacity = self.capacity;
        while capacity < required {
            capacity = (capacity + capacity / 2).max(capacity + 1);
        }

        let mut buf = Vec::with_capacity(capacity);
        buf.extend_from_slice(&self.buf);
        self.buf = buf;
        self.capacity = capacity;
    }

    fn put(&mut self, bytes: &[u8]) {
        self.ensure_capacity(bytes.len());
        self.buf.extend_from_slice(bytes);
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSink for ByteWriter {
    fn write_u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    fn write_u16(&mut self, v: u16) {
        match self.order {
            ByteOrder::BigEndian => self.put(&v.to_be_bytes()),
            ByteOrder::LittleEndian => self.put(&v.to_le_bytes()),
        }
    }

    fn write_u32(&mut self, v: u32) {
        match self.order {
            ByteOrder::BigEndian => self.put(&v.to_be_bytes()),
            ByteOrder::LittleEndian => self.put(&v.to_le_bytes()),
        }
    }

    fn write_bytes(&mut self, src: &[u8]) {
        self.put(src);
    }

    fn write_zeros(&mut self, n: usize) {
        self.ensure_capacity(n);
        self.buf.resize(self.buf.len() + n, 0);
    }
}
