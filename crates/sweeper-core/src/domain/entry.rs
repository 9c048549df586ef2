//! Stream entries as seen by the sweeper.
//!
//! フィールド名・値はどちらもバイト列のまま持つ（Redis の値はバイナリセーフ）。
//! UTF-8 として読むのは index key を作るときだけ。

use std::collections::BTreeMap;

use super::EntryId;

/// Field mapping of a stream entry (field name -> value), kept as raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<Vec<u8>, Vec<u8>>);

impl Fields {
    /// 空の Fields を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// フィールドを追加（既存の値は置き換え、古い値を返す）
    pub fn insert(
        &mut self,
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Option<Vec<u8>> {
        self.0.insert(name.into(), value.into())
    }

    /// フィールド値（バイト列）
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&[u8]> {
        self.0.get(name.as_ref()).map(Vec::as_slice)
    }

    /// 値が UTF-8 のときだけ `&str` で返す
    pub fn get_str(&self, name: impl AsRef<[u8]>) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// `other` のフィールドで上書きマージ（HSET と同じ）
    pub fn merge(&mut self, other: &Fields) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Fields
where
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// An entry read from the stream.
///
/// The store owns the entry; this is the sweeper's read-only copy of it for
/// the duration of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    id: EntryId,
    fields: Fields,
}

impl StreamEntry {
    /// 新しい StreamEntry を作成
    pub fn new(id: EntryId, fields: Fields) -> Self {
        Self { id, fields }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// UTF-8 として読めるフィールド値
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get_str(name)
    }
}
