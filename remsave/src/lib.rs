/*!
A library for reading the compressed save files written by Remnant II
(profile saves and world saves).

A save is a CRC-tagged sequence of zlib chunks wrapping a serialized
archive: an interned name table, a forward-declared object index, and a
stream of tagged properties per object. World saves additionally embed
persistence blobs (whole nested archives) inside struct properties.

The decoder is strictly read-only. It produces an immutable [`SaveArchive`]
tree which serializes to JSON via serde; writing or mutating saves is out
of scope.

# Example

```no_run
use remsave::Value;

let save = remsave::decode("profile.sav")?;
for object in &save.data.objects {
    for property in &object.properties {
        if let Value::Int(value) = property.value {
            println!("{} = {value}", property.name);
        }
    }
}
# Ok::<(), remsave::DecodeError>(())
```
*/

mod archive;
mod container;
mod context;
mod error;
mod persistence;
mod property;


pub use error::{DecodeError, Error};
pub use persistence::{
    Actor, DynamicActor, PersistenceBlob, PersistenceContainer, Quaternion, Transform, Vector,
};
pub use property::{
    ArrayValue, Byte, Double, EnumValue, FGuid, Float, MapEntry, MapValue, ObjectRef, Property,
    PropertyType, StructType, StructValue, TaggedStruct, Text, TextData, Value,
};

use std::io::{Cursor, Seek, SeekFrom};
use std::path::Path;

use byteorder::{ReadBytesExt, LE};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::archive::ArchiveRead;
use crate::context::ArchiveScope;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Decode a save file from disk.
pub fn decode(path: impl AsRef<Path>) -> Result<SaveArchive, DecodeError> {
    let bytes = std::fs::read(path).map_err(|error| DecodeError {
        offset: 0,
        error: error.into(),
    })?;
    decode_bytes(&bytes)
}

/// Decode a save file already loaded into memory.
pub fn decode_bytes(bytes: &[u8]) -> Result<SaveArchive, DecodeError> {
    let buffer = decompress(bytes)?;
    let mut cursor = Cursor::new(buffer.as_slice());
    match read_save_archive(&mut cursor) {
        Ok(save) => Ok(save),
        Err(error) => Err(DecodeError {
            offset: cursor.position(),
            error,
        }),
    }
}

/// Decompress the chunked container into the contiguous archive buffer the
/// offset tables refer to. Exposed for debug tooling that wants the
/// stitched bytes; [`decode_bytes`] calls this internally.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    match container::decompress(&mut cursor) {
        Ok(buffer) => Ok(buffer),
        Err(error) => Err(DecodeError {
            offset: cursor.position(),
            error,
        }),
    }
}

/// Fixed leading header of the on-disk container. The first three fields
/// sit in front of the compressed chunks; the build number is the first
/// u32 of the decompressed stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveHeader {
    pub crc: u32,
    pub bytes_written: u32,
    pub save_game_file_version: u32,
    pub build_number: u32,
}

impl SaveHeader {
    #[instrument(name = "SaveHeader_read", skip_all)]
    fn read<R: ArchiveRead>(r: &mut R) -> Result<Self> {
        Ok(Self {
            crc: r.read_u32::<LE>()?,
            bytes_written: r.read_u32::<LE>()?,
            save_game_file_version: r.read_u32::<LE>()?,
            build_number: r.read_u32::<LE>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackageVersion {
    pub ue4: u32,
    pub ue5: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopLevelAssetPath {
    pub path: String,
    pub name: String,
}

/// An interned name resolved against its archive's name table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FName {
    pub index: u16,
    pub number: i32,
    pub value: String,
}

/// The whole decoded save: container header plus the outer archive.
#[derive(Debug, PartialEq, Serialize)]
pub struct SaveArchive {
    pub header: SaveHeader,
    pub data: SaveData,
}

/// One self-contained archive: its tables plus the decoded object stream.
///
/// The outer save carries the package version and the save-game class path;
/// nested archives inside persistence blobs carry neither.
#[derive(Debug, PartialEq, Serialize)]
pub struct SaveData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<PackageVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_game_class_path: Option<TopLevelAssetPath>,
    pub name_table_offset: u64,
    pub version: u32,
    pub objects_offset: u64,
    pub names_table: Vec<String>,
    pub objects: Vec<UObject>,
}

/// A reflective engine object: class path, tagged properties, and for
/// actors a list of component sub-records.
#[derive(Debug, PartialEq, Serialize)]
pub struct UObject {
    pub object_id: u32,
    pub was_loaded: bool,
    pub object_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_data: Option<LoadedData>,
    pub properties: Vec<Property>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct LoadedData {
    pub name: FName,
    pub outer_id: u32,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Component {
    pub key: String,
    pub value: ComponentValue,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum ComponentValue {
    Variables(Variables),
    Properties(Vec<Property>),
}

/// The compact variable slots used by the save system's bookkeeping
/// components instead of full tagged properties.
#[derive(Debug, PartialEq, Serialize)]
pub struct Variables {
    pub name: String,
    pub items: Vec<Variable>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: VariableValue,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum VariableValue {
    None,
    Bool(bool),
    Int(i32),
    Float(Float),
    Name(String),
}

/// Component keys whose bodies are variable slots rather than property
/// lists. The misspelling ships in real saves.
const VARIABLE_COMPONENT_KEYS: [&str; 6] = [
    "GlobalVariables",
    "Variables",
    "Variable",
    "PersistenceKeys",
    "PersistenceKeys1",
    "PersistanceKeys1",
];

#[instrument(skip_all)]
fn read_save_archive<R: ArchiveRead>(r: &mut R) -> Result<SaveArchive> {
    let header = SaveHeader::read(r)?;
    let data = read_save_data(r, true, true)?;
    Ok(SaveArchive { header, data })
}

/// Read one archive. The name table and object index live elsewhere in the
/// buffer and are resolved through offset jumps before any property data
/// is touched; the cursor then returns to the object stream.
#[instrument(skip_all)]
pub(crate) fn read_save_data<R: ArchiveRead>(
    r: &mut R,
    has_package_version: bool,
    has_top_level_asset_path: bool,
) -> Result<SaveData> {
    let package_version = if has_package_version {
        Some(PackageVersion {
            ue4: r.read_u32::<LE>()?,
            ue5: r.read_u32::<LE>()?,
        })
    } else {
        None
    };
    let save_game_class_path = if has_top_level_asset_path {
        Some(TopLevelAssetPath {
            path: r.read_fstring()?,
            name: r.read_fstring()?,
        })
    } else {
        None
    };

    let name_table_offset = r.read_u64::<LE>()?;
    let version = r.read_u32::<LE>()?;
    let objects_offset = r.read_u64::<LE>()?;
    let object_data_start = r.stream_position()?;

    // The interning pool comes first: nothing in the object stream can be
    // parsed until every name reference resolves.
    r.seek(SeekFrom::Start(name_table_offset))?;
    let name_count = r.read_i32::<LE>()?;
    let mut names_table = Vec::new();
    for _ in 0..name_count {
        names_table.push(r.read_fstring()?);
    }

    // Then the forward-declared object index, so that object references in
    // property payloads can resolve before their targets' bodies are read.
    r.seek(SeekFrom::Start(objects_offset))?;
    let object_count = r.read_i32::<LE>()?;
    let mut objects = Vec::new();
    let descriptor_scope = ArchiveScope::new(&names_table, &[]);
    for i in 0..object_count {
        objects.push(read_object_descriptor(
            r,
            &descriptor_scope,
            save_game_class_path.as_ref(),
            i as u32,
        )?);
    }
    let object_paths: Vec<String> = objects.iter().map(|o| o.object_path.clone()).collect();

    r.seek(SeekFrom::Start(object_data_start))?;
    let scope = ArchiveScope::new(&names_table, &object_paths);
    for _ in 0..object_count {
        read_object_data(r, &scope, &mut objects)?;
    }

    Ok(SaveData {
        package_version,
        save_game_class_path,
        name_table_offset,
        version,
        objects_offset,
        names_table,
        objects,
    })
}

#[instrument(skip_all)]
fn read_object_descriptor<R: ArchiveRead>(
    r: &mut R,
    scope: &ArchiveScope,
    class_path: Option<&TopLevelAssetPath>,
    object_id: u32,
) -> Result<UObject> {
    let was_loaded = r.read_u8()? != 0;

    // The root object of the outer save inherits its path from the
    // save-game class path instead of repeating it.
    let object_path = if was_loaded && object_id == 0 {
        match class_path {
            Some(class_path) => class_path.path.clone(),
            None => r.read_fstring()?,
        }
    } else {
        r.read_fstring()?
    };

    let loaded_data = if was_loaded {
        None
    } else {
        Some(LoadedData {
            name: scope.read_fname(r)?,
            outer_id: r.read_u32::<LE>()?,
        })
    };

    Ok(UObject {
        object_id,
        was_loaded,
        object_path,
        loaded_data,
        properties: Vec::new(),
        components: None,
    })
}

/// Second pass: one length-framed body per object, in stream order. A body
/// that parses short of its declared length is diagnosed and skipped over,
/// never failed; newer game builds append data older readers don't know.
#[instrument(skip_all)]
fn read_object_data<R: ArchiveRead>(
    r: &mut R,
    scope: &ArchiveScope,
    objects: &mut [UObject],
) -> Result<()> {
    let object_id = r.read_u32::<LE>()?;
    let object_length = u64::from(r.read_u32::<LE>()?);
    let start = r.stream_position()?;

    let in_range = (object_id as usize) < objects.len();
    if in_range && object_length > 0 {
        let mut properties = Vec::new();
        let outcome = (|| -> Result<()> {
            while let Some(property) = property::read_property(r, scope)? {
                properties.push(property);
            }
            Ok(())
        })();
        match outcome {
            Ok(()) => {}
            Err(Error::UnexpectedEof) => {
                warn!(
                    object = %objects[object_id as usize].object_path,
                    "object body ended before its terminator"
                );
            }
            Err(e) => return Err(e),
        }

        let pos = r.stream_position()?;
        let end = start + object_length;
        if pos != end {
            warn!(
                object = %objects[object_id as usize].object_path,
                consumed = pos.saturating_sub(start),
                declared = object_length,
                "object body length mismatch, skipping ahead"
            );
            r.seek(SeekFrom::Start(end))?;
        }
        objects[object_id as usize].properties = properties;
    } else {
        if !in_range {
            warn!(
                object_id,
                count = objects.len(),
                "object id out of range, skipping body"
            );
        }
        r.seek(SeekFrom::Current(object_length as i64))?;
    }

    let is_actor = r.read_u8()? != 0;
    if is_actor {
        let components = read_components(r, scope)?;
        if let Some(object) = objects.get_mut(object_id as usize) {
            object.components = Some(components);
        }
    }

    Ok(())
}

#[instrument(skip_all)]
fn read_components<R: ArchiveRead>(r: &mut R, scope: &ArchiveScope) -> Result<Vec<Component>> {
    let component_count = r.read_u32::<LE>()?;
    let mut components = Vec::new();
    for _ in 0..component_count {
        let key = r.read_fstring()?;
        let component_length = u64::from(r.read_u32::<LE>()?);
        let start = r.stream_position()?;

        let value = match read_component_value(r, scope, &key) {
            Ok(value) => value,
            Err(Error::UnexpectedEof) => {
                warn!(component = %key, "component body ended before its terminator");
                ComponentValue::Properties(Vec::new())
            }
            Err(e) => return Err(e),
        };

        let pos = r.stream_position()?;
        let end = start + component_length;
        if pos != end {
            warn!(
                component = %key,
                consumed = pos.saturating_sub(start),
                declared = component_length,
                "component body length mismatch, skipping ahead"
            );
            r.seek(SeekFrom::Start(end))?;
        }

        components.push(Component { key, value });
    }
    Ok(components)
}

fn read_component_value<R: ArchiveRead>(
    r: &mut R,
    scope: &ArchiveScope,
    key: &str,
) -> Result<ComponentValue> {
    if VARIABLE_COMPONENT_KEYS.contains(&key) {
        Ok(ComponentValue::Variables(read_variables(r, scope)?))
    } else {
        Ok(ComponentValue::Properties(
            property::read_properties_until_none(r, scope)?,
        ))
    }
}

#[instrument(skip_all)]
fn read_variables<R: ArchiveRead>(r: &mut R, scope: &ArchiveScope) -> Result<Variables> {
    let name = scope.read_name(r)?;
    r.reserved(8)?;
    let count = r.read_u32::<LE>()?;

    let mut items = Vec::new();
    for _ in 0..count {
        let var_name = scope.read_name(r)?;
        let kind = r.read_u8()?;
        let raw = r.read_u32::<LE>()?;
        let value = match kind {
            0 => VariableValue::None,
            1 => VariableValue::Bool(raw != 0),
            2 => VariableValue::Int(raw as i32),
            3 => VariableValue::Float(f32::from_bits(raw).into()),
            4 => VariableValue::Name(scope.read_name(r)?),
            other => return Err(Error::Other(format!("unknown variable slot type {other}"))),
        };
        items.push(Variable {
            name: var_name,
            value,
        });
    }

    Ok(Variables { name, items })
}
