use anyhow::Result;
use prost::Message;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// A heap snapshot as written by the dumping agent.
///
/// Objects are identified by their start address; edges and roots refer to
/// objects by address, with 0 standing for a null slot.
#[derive(Clone, PartialEq, Message)]
pub struct HeapDump {
    #[prost(message, repeated, tag = "1")]
    pub objects: Vec<HeapObject>,
    #[prost(message, repeated, tag = "2")]
    pub roots: Vec<RootEdge>,
    #[prost(message, repeated, tag = "3")]
    pub klasses: Vec<Klass>,
}

#[derive(Clone, PartialEq, Message)]
pub struct HeapObject {
    #[prost(uint64, tag = "1")]
    pub start: u64,
    #[prost(uint64, tag = "2")]
    pub klass: u64,
    /// Shallow size in bytes
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(uint64, optional, tag = "4")]
    pub objarray_length: Option<u64>,
    #[prost(message, repeated, tag = "5")]
    pub edges: Vec<NormalEdge>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NormalEdge {
    #[prost(uint64, tag = "1")]
    pub slot: u64,
    #[prost(uint64, tag = "2")]
    pub objref: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RootEdge {
    #[prost(uint64, tag = "1")]
    pub slot: u64,
    #[prost(uint64, tag = "2")]
    pub objref: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Klass {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub name: String,
}

fn is_zstd(p: &Path) -> bool {
    p.extension().is_some_and(|ext| ext == "zst")
}

impl HeapDump {
    pub fn from_binpb_zst(p: impl AsRef<Path>) -> Result<HeapDump> {
        let file = File::open(p)?;
        let mut reader = zstd::Decoder::new(file)?;
        let mut buf = vec![];
        reader.read_to_end(&mut buf)?;
        Ok(HeapDump::decode(buf.as_slice())?)
    }

    /// Loads a dump, decompressing it first if the file name ends in `.zst`.
    pub fn from_path(p: impl AsRef<Path>) -> Result<HeapDump> {
        let p = p.as_ref();
        if is_zstd(p) {
            return Self::from_binpb_zst(p);
        }
        let mut buf = vec![];
        File::open(p)?.read_to_end(&mut buf)?;
        Ok(HeapDump::decode(buf.as_slice())?)
    }

    pub fn write_to_path(&self, p: impl AsRef<Path>) -> Result<()> {
        let p = p.as_ref();
        let buf = self.encode_to_vec();
        let mut file = File::create(p)?;
        if is_zstd(p) {
            let mut writer = zstd::Encoder::new(file, 0)?;
            writer.write_all(&buf)?;
            writer.finish()?;
        } else {
            file.write_all(&buf)?;
        }
        Ok(())
    }

    /// Sum of all shallow sizes, saturating on corrupt sizes
    pub fn total_object_size(&self) -> u64 {
        self.objects
            .iter()
            .fold(0u64, |total, o| total.saturating_add(o.size))
    }
}
