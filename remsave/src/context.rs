use crate::archive::{ArchiveRead, RawName};
use crate::error::Error;
use crate::property::ObjectRef;
use crate::{FName, Result};

/// The name and object tables of the archive currently being decoded.
///
/// Every archive owns its own tables: the outer save is one archive and each
/// nested persistence blob is another. A scope is built once the tables have
/// been read and is passed immutably through every recursive call, so a
/// nested blob constructs and discards its own scope without ever consulting
/// the outer one.
pub(crate) struct ArchiveScope<'a> {
    names: &'a [String],
    object_paths: &'a [String],
}

impl<'a> ArchiveScope<'a> {
    pub fn new(names: &'a [String], object_paths: &'a [String]) -> Self {
        Self {
            names,
            object_paths,
        }
    }

    fn resolve(&self, name: RawName, offset: u64) -> Result<&'a str> {
        self.names
            .get(name.index as usize)
            .map(String::as_str)
            .ok_or(Error::NameIndexOutOfRange {
                index: name.index,
                len: self.names.len(),
                offset,
            })
    }

    /// Read an interned name and resolve it against this archive's table.
    pub fn read_fname<R: ArchiveRead>(&self, r: &mut R) -> Result<FName> {
        let offset = r.offset();
        let raw = r.read_raw_name()?;
        let value = self.resolve(raw, offset)?.to_owned();
        Ok(FName {
            index: raw.index,
            number: raw.number,
            value,
        })
    }

    pub fn read_name<R: ArchiveRead>(&self, r: &mut R) -> Result<String> {
        Ok(self.read_fname(r)?.value)
    }

    /// Resolve an object-table index to a reference carrying the target's
    /// class path. `-1` is the engine's null reference.
    pub fn object_ref(&self, index: i32, offset: u64) -> Result<Option<ObjectRef>> {
        if index == -1 {
            return Ok(None);
        }
        let path = usize::try_from(index)
            .ok()
            .and_then(|i| self.object_paths.get(i))
            .ok_or(Error::ObjectIndexOutOfRange {
                index,
                len: self.object_paths.len(),
                offset,
            })?;
        Ok(Some(ObjectRef {
            class_name: path.clone(),
        }))
    }
}
