//! Codec Module
//!
//! Pluggable value serialization for stores that persist bytes.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::Backend;
use crate::error::{Result, ShoveError};

type Encoder<V> = Box<dyn Fn(&V) -> Result<Vec<u8>> + Send + Sync>;
type Decoder<V> = Box<dyn Fn(&[u8]) -> Result<V> + Send + Sync>;

// == Codec ==
/// Encoder/decoder pair with optional lz4 compression on top.
pub struct Codec<V> {
    encoder: Encoder<V>,
    decoder: Decoder<V>,
    compress: bool,
}

impl<V> Codec<V> {
    /// Builds a codec from custom hooks.
    pub fn new<E, D>(encoder: E, decoder: D) -> Self
    where
        E: Fn(&V) -> Result<Vec<u8>> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<V> + Send + Sync + 'static,
    {
        Self {
            encoder: Box::new(encoder),
            decoder: Box::new(decoder),
            compress: false,
        }
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn encode(&self, value: &V) -> Result<Vec<u8>> {
        let bytes = (self.encoder)(value)?;
        if self.compress {
            Ok(lz4_flex::compress_prepend_size(&bytes))
        } else {
            Ok(bytes)
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<V> {
        if self.compress {
            let raw = lz4_flex::decompress_size_prepended(bytes)
                .map_err(|e| ShoveError::Codec(e.to_string()))?;
            (self.decoder)(&raw)
        } else {
            (self.decoder)(bytes)
        }
    }
}

impl<V> Codec<V>
where
    V: Serialize + DeserializeOwned + 'static,
{
    /// JSON codec, the default for serde types.
    pub fn json() -> Self {
        Self::new(
            |value: &V| serde_json::to_vec(value).map_err(|e| ShoveError::Codec(e.to_string())),
            |bytes: &[u8]| {
                serde_json::from_slice(bytes).map_err(|e| ShoveError::Codec(e.to_string()))
            },
        )
    }
}

impl<V> fmt::Debug for Codec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("compress", &self.compress)
            .finish_non_exhaustive()
    }
}

// == Encoded Store ==
/// Presents a byte store as a store of `V` values.
#[derive(Debug)]
pub struct EncodedStore<B, V> {
    inner: B,
    codec: Codec<V>,
    _value: PhantomData<fn() -> V>,
}

impl<B, V> EncodedStore<B, V>
where
    B: Backend<Vec<u8>>,
{
    pub fn new(inner: B, codec: Codec<V>) -> Self {
        Self {
            inner,
            codec,
            _value: PhantomData,
        }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B, V> Backend<V> for EncodedStore<B, V>
where
    B: Backend<Vec<u8>>,
{
    fn get(&mut self, key: &str) -> Result<V> {
        let bytes = self.inner.get(key)?;
        self.codec.decode(&bytes)
    }

    fn set(&mut self, key: String, value: V) -> Result<()> {
        let bytes = self.codec.encode(&value)?;
        self.inner.set(key, bytes)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn contains(&mut self, key: &str) -> Result<bool> {
        self.inner.contains(key)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        self.inner.keys()
    }

    fn count(&mut self) -> Result<usize> {
        self.inner.count()
    }

    fn update(&mut self, entries: &HashMap<String, V>) -> Result<()> {
        let encoded = entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.codec.encode(value)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        self.inner.update(&encoded)
    }

    fn clear(&mut self) -> Result<()> {
        self.inner.clear()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i64,
        y: i64,
    }

    #[test]
    fn test_json_codec_stores_bytes() {
        let mut store: EncodedStore<MemoryStore<Vec<u8>>, Point> =
            EncodedStore::new(MemoryStore::new(), Codec::json());
        store.set("p".to_string(), Point { x: 1, y: 2 }).unwrap();

        assert_eq!(store.get("p").unwrap(), Point { x: 1, y: 2 });

        let mut raw = store.into_inner();
        assert_eq!(raw.get("p").unwrap(), br#"{"x":1,"y":2}"#.to_vec());
    }

    #[test]
    fn test_compressed_codec_shrinks_repetitive_values() {
        let codec: Codec<String> = Codec::json().compressed(true);
        let value = "a".repeat(4096);

        let bytes = codec.encode(&value).unwrap();
        assert!(bytes.len() < value.len());
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_custom_codec_hooks() {
        let codec = Codec::new(
            |v: &u32| Ok(v.to_le_bytes().to_vec()),
            |b: &[u8]| {
                let arr: [u8; 4] = b
                    .try_into()
                    .map_err(|_| ShoveError::Codec("expected 4 bytes".to_string()))?;
                Ok(u32::from_le_bytes(arr))
            },
        );
        let mut store: EncodedStore<MemoryStore<Vec<u8>>, u32> =
            EncodedStore::new(MemoryStore::new(), codec);
        store.set("n".to_string(), 42).unwrap();
        assert_eq!(store.get("n").unwrap(), 42);
    }

    #[test]
    fn test_decode_garbage_is_codec_error() {
        let codec: Codec<Point> = Codec::json();
        assert!(matches!(codec.decode(b"not json"), Err(ShoveError::Codec(_))));

        let compressed: Codec<Point> = Codec::json().compressed(true);
        assert!(matches!(compressed.decode(b"\x01"), Err(ShoveError::Codec(_))));
    }

    #[test]
    fn test_encoded_update_and_keys() {
        let mut store: EncodedStore<MemoryStore<Vec<u8>>, u8> =
            EncodedStore::new(MemoryStore::new(), Codec::json());
        let batch = HashMap::from([("a".to_string(), 1u8), ("b".to_string(), 2u8)]);
        store.update(&batch).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get("b").unwrap(), 2);
    }
}
