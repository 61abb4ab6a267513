use super::{Constant, TensorType};
use core::fmt;
use std::collections::HashMap;

/// How weight blobs are written in the emitted module.
#[derive(burn::config::Config, Debug, Copy, PartialEq, Eq)]
pub enum ResourceMode {
    /// Append a `dialect_resources` section holding every blob.
    Embed,
    /// Reference `dense_resource<__elided__>` and omit the blobs.
    Elide,
}

/// Key used by `dense_resource` attributes when blobs are elided.
pub const ELIDED_KEY: &str = "__elided__";

/// Leading 4 bytes of every blob: the alignment as a little-endian `u32`.
const BLOB_ALIGNMENT: &str = "0x04000000";

/// Number of floats hex-encoded per write.
const CHUNK_SIZE: usize = 4096;

/// Named weight blobs referenced by `dense_resource` attributes.
#[derive(Debug, Default)]
pub struct ResourceTable {
    entries: Vec<(String, Vec<f32>)>,
    counters: HashMap<String, usize>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob and return its unique key.
    pub fn insert(&mut self, constant: &Constant) -> String {
        let base = resource_key(&constant.ty);
        let key = match self.counters.get_mut(&base) {
            Some(count) => {
                *count += 1;
                format!("{base}_{count}")
            }
            None => {
                self.counters.insert(base.clone(), 0);
                base
            }
        };

        self.entries.push((key.clone(), constant.data.clone()));
        key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

/// Base key for a tensor, e.g. `torch_tensor_64_3_11_11_torch.float32`.
pub fn resource_key(ty: &TensorType) -> String {
    let mut key = String::from("torch_tensor");
    for dim in ty.shape.iter() {
        key.push('_');
        key.push_str(&dim.to_string());
    }
    key.push('_');
    key.push_str(ty.elem.torch_dtype());
    key
}

impl fmt::Display for ResourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return Ok(());
        }

        f.write_str("{-#\n  dialect_resources: {\n    builtin: {\n")?;
        for (index, (key, data)) in self.entries.iter().enumerate() {
            write!(f, "      {key}: \"{BLOB_ALIGNMENT}")?;
            write_hex(f, data)?;
            f.write_str("\"")?;

            if index + 1 < self.entries.len() {
                f.write_str(",")?;
            }
            f.write_str("\n")?;
        }
        f.write_str("    }\n  }\n#-}\n")
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, data: &[f32]) -> fmt::Result {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

    let mut buffer = String::with_capacity(CHUNK_SIZE * 8);
    for chunk in data.chunks(CHUNK_SIZE) {
        buffer.clear();
        for value in chunk {
            for byte in value.to_le_bytes() {
                buffer.push(DIGITS[(byte >> 4) as usize] as char);
                buffer.push(DIGITS[(byte & 0x0F) as usize] as char);
            }
        }
        f.write_str(&buffer)?;
    }

    Ok(())
}
