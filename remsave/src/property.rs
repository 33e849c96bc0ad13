//! The tagged-property codec: the recursive, dispatch-driven reader for
//! every property variant that appears in object bodies.
//!
//! Two byte layouts exist for the same variant. In tagged mode (the
//! top-level property list) most scalar payloads are preceded by a single
//! reserved byte; in raw mode (array elements, map entries) that byte is
//! absent. `BoolProperty` is the inversion: its pad byte trails the value
//! in tagged mode. Struct values in raw position collapse to a bare
//! 16-byte GUID reference.

use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, LE};
use serde::{Serialize, Serializer};
use tracing::instrument;

use crate::archive::ArchiveRead;
use crate::context::ArchiveScope;
use crate::error::Error;
use crate::persistence::{self, Vector};
use crate::Result;

/// `f32` wrapper so non-finite values serialize as `"NaN"`/`"Infinity"`
/// strings instead of poisoning the JSON output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float(pub f32);
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Double(pub f64);

impl std::fmt::Display for Float {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl std::fmt::Display for Double {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl From<f32> for Float {
    fn from(value: f32) -> Self {
        Self(value)
    }
}
impl From<f64> for Double {
    fn from(value: f64) -> Self {
        Self(value)
    }
}
impl Serialize for Float {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.0;
        let sign = if value.is_sign_negative() { "-" } else { "" };
        if value.is_nan() {
            serializer.serialize_str(&format!("{sign}NaN"))
        } else if value.is_infinite() {
            serializer.serialize_str(&format!("{sign}Infinity"))
        } else {
            serializer.serialize_f32(value)
        }
    }
}
impl Serialize for Double {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.0;
        let sign = if value.is_sign_negative() { "-" } else { "" };
        if value.is_nan() {
            serializer.serialize_str(&format!("{sign}NaN"))
        } else if value.is_infinite() {
            serializer.serialize_str(&format!("{sign}Infinity"))
        } else {
            serializer.serialize_f64(value)
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FGuid {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl FGuid {
    pub fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    pub fn is_nil(&self) -> bool {
        self.a == 0 && self.b == 0 && self.c == 0 && self.d == 0
    }

    #[instrument(name = "FGuid_read", skip_all)]
    pub(crate) fn read<R: ArchiveRead>(r: &mut R) -> Result<FGuid> {
        Ok(Self {
            a: r.read_u32::<LE>()?,
            b: r.read_u32::<LE>()?,
            c: r.read_u32::<LE>()?,
            d: r.read_u32::<LE>()?,
        })
    }
}

impl std::fmt::Display for FGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.b.to_le_bytes();
        let c = self.c.to_le_bytes();

        write!(
            f,
            "{:08x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:08x}",
            self.a, b[3], b[2], b[1], b[0], c[3], c[2], c[1], c[0], self.d,
        )
    }
}

impl Serialize for FGuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyType {
    IntProperty,
    Int16Property,
    Int64Property,
    UInt16Property,
    UInt32Property,
    UInt64Property,
    FloatProperty,
    DoubleProperty,
    BoolProperty,
    ByteProperty,
    EnumProperty,
    StrProperty,
    NameProperty,
    SoftObjectProperty,
    SoftClassPath,
    TextProperty,
    ObjectProperty,
    ArrayProperty,
    MapProperty,
    StructProperty,
}

impl PropertyType {
    pub fn get_name(&self) -> &str {
        match self {
            PropertyType::IntProperty => "IntProperty",
            PropertyType::Int16Property => "Int16Property",
            PropertyType::Int64Property => "Int64Property",
            PropertyType::UInt16Property => "UInt16Property",
            PropertyType::UInt32Property => "UInt32Property",
            PropertyType::UInt64Property => "UInt64Property",
            PropertyType::FloatProperty => "FloatProperty",
            PropertyType::DoubleProperty => "DoubleProperty",
            PropertyType::BoolProperty => "BoolProperty",
            PropertyType::ByteProperty => "ByteProperty",
            PropertyType::EnumProperty => "EnumProperty",
            PropertyType::StrProperty => "StrProperty",
            PropertyType::NameProperty => "NameProperty",
            PropertyType::SoftObjectProperty => "SoftObjectProperty",
            PropertyType::SoftClassPath => "SoftClassPath",
            PropertyType::TextProperty => "TextProperty",
            PropertyType::ObjectProperty => "ObjectProperty",
            PropertyType::ArrayProperty => "ArrayProperty",
            PropertyType::MapProperty => "MapProperty",
            PropertyType::StructProperty => "StructProperty",
        }
    }

    /// A type name outside the recognized set is a hard failure: silently
    /// skipping it would desynchronize the cursor for everything after it.
    pub(crate) fn parse(name: &str, offset: u64) -> Result<Self> {
        Ok(match name {
            "IntProperty" => PropertyType::IntProperty,
            "Int16Property" => PropertyType::Int16Property,
            "Int64Property" => PropertyType::Int64Property,
            "UInt16Property" => PropertyType::UInt16Property,
            "UInt32Property" => PropertyType::UInt32Property,
            "UInt64Property" => PropertyType::UInt64Property,
            "FloatProperty" => PropertyType::FloatProperty,
            "DoubleProperty" => PropertyType::DoubleProperty,
            "BoolProperty" => PropertyType::BoolProperty,
            "ByteProperty" => PropertyType::ByteProperty,
            "EnumProperty" => PropertyType::EnumProperty,
            "StrProperty" => PropertyType::StrProperty,
            "NameProperty" => PropertyType::NameProperty,
            "SoftObjectProperty" => PropertyType::SoftObjectProperty,
            "SoftClassPath" => PropertyType::SoftClassPath,
            "TextProperty" => PropertyType::TextProperty,
            "ObjectProperty" => PropertyType::ObjectProperty,
            "ArrayProperty" => PropertyType::ArrayProperty,
            "MapProperty" => PropertyType::MapProperty,
            "StructProperty" => PropertyType::StructProperty,
            _ => {
                return Err(Error::UnknownPropertyType {
                    name: name.to_owned(),
                    offset,
                })
            }
        })
    }
}

/// Struct payload dispatch key. Names with a native wire layout get their
/// own variant; anything else falls through to a nested tagged property
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructType {
    Guid,
    Vector,
    DateTime,
    Timespan,
    SoftClassPath,
    SoftObjectPath,
    PersistenceBlob,
    Struct(String),
}

impl From<&str> for StructType {
    fn from(t: &str) -> Self {
        match t {
            "Guid" => StructType::Guid,
            "Vector" => StructType::Vector,
            "DateTime" => StructType::DateTime,
            "Timespan" => StructType::Timespan,
            "SoftClassPath" => StructType::SoftClassPath,
            "SoftObjectPath" => StructType::SoftObjectPath,
            "PersistenceBlob" => StructType::PersistenceBlob,
            _ => StructType::Struct(t.to_owned()),
        }
    }
}

/// Just a plain byte, or an enum in which case the variant will be a String
#[derive(Debug, PartialEq, Serialize)]
pub enum Byte {
    Byte(u8),
    Label(String),
}

#[derive(Debug, PartialEq, Serialize)]
pub struct EnumValue {
    pub enum_type: String,
    pub value: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ObjectRef {
    pub class_name: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Text {
    pub flags: u32,
    pub history_type: u8,
    pub data: TextData,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum TextData {
    Localized {
        namespace: String,
        key: String,
        source_string: String,
    },
    CultureInvariant {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    /// History types with no observed layout; surfaced as a sentinel, never
    /// guessed at.
    Unsupported,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum ArrayValue {
    Items {
        element_type: PropertyType,
        items: Vec<Value>,
    },
    /// Arrays of structs share one struct header; elements carry no
    /// per-element tag.
    Structs {
        element_type: String,
        guid: FGuid,
        items: Vec<StructValue>,
    },
}

#[derive(Debug, PartialEq, Serialize)]
pub struct MapValue {
    pub key_type: PropertyType,
    pub value_type: PropertyType,
    pub entries: Vec<MapEntry>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

/// A named struct payload together with its tag GUID.
#[derive(Debug, PartialEq, Serialize)]
pub struct TaggedStruct {
    pub name: String,
    pub guid: FGuid,
    pub value: StructValue,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum StructValue {
    Guid(FGuid),
    Vector(Vector),
    DateTime(i64),
    Timespan(i64),
    SoftPath(String),
    PersistenceBlob(Box<persistence::PersistenceBlob>),
    /// User defined struct which is simply a list of properties
    Properties(Vec<Property>),
}

#[derive(Debug, PartialEq, Serialize)]
pub enum Value {
    Int(i32),
    Int16(i16),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(Float),
    Double(Double),
    Bool(bool),
    Str(String),
    Name(String),
    SoftPath(String),
    Enum(EnumValue),
    Byte(Byte),
    Text(Text),
    Object(Option<ObjectRef>),
    Array(ArrayValue),
    Map(MapValue),
    Struct(Box<TaggedStruct>),
    /// A struct in raw position is stored as a bare GUID reference.
    StructReference { guid: FGuid },
    /// Payloads captured without decoding.
    Raw(Vec<u8>),
}

/// A tagged property: interned name and type, declared payload size, engine
/// array index, and the decoded value.
#[derive(Debug, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub size: u32,
    pub index: u32,
    pub value: Value,
}

#[instrument(skip_all)]
pub(crate) fn read_properties_until_none<R: ArchiveRead>(
    r: &mut R,
    scope: &ArchiveScope,
) -> Result<Vec<Property>> {
    let mut properties = Vec::new();
    while let Some(property) = read_property(r, scope)? {
        properties.push(property);
    }
    Ok(properties)
}

#[instrument(skip_all)]
pub(crate) fn read_property<R: ArchiveRead>(
    r: &mut R,
    scope: &ArchiveScope,
) -> Result<Option<Property>> {
    let name = scope.read_name(r)?;
    if name == "None" {
        return Ok(None);
    }

    let type_offset = r.offset();
    let type_name = scope.read_name(r)?;
    let property_type = PropertyType::parse(&type_name, type_offset)?;
    let size = r.read_u32::<LE>()?;
    let index = r.read_u32::<LE>()?;

    // World saves carry one oversized fog-of-war bitmap whose payload does
    // not follow the tagged encoding; capture it without decoding.
    let value = if name == "FowVisitedCoordinates" {
        let mut bytes = vec![0; size as usize + 19];
        r.read_exact(&mut bytes)?;
        Value::Raw(bytes)
    } else {
        read_value(r, scope, property_type, size, false)?
    };

    Ok(Some(Property {
        name,
        property_type,
        size,
        index,
        value,
    }))
}

/// The tag dispatch. `raw` selects the element layout used inside arrays
/// and maps (no reserved header byte, struct values as GUID references).
#[instrument(skip_all, fields(property_type = property_type.get_name(), raw))]
pub(crate) fn read_value<R: ArchiveRead>(
    r: &mut R,
    scope: &ArchiveScope,
    property_type: PropertyType,
    size: u32,
    raw: bool,
) -> Result<Value> {
    Ok(match property_type {
        PropertyType::IntProperty => {
            header_pad(r, raw)?;
            Value::Int(r.read_i32::<LE>()?)
        }
        PropertyType::Int16Property => {
            header_pad(r, raw)?;
            Value::Int16(r.read_i16::<LE>()?)
        }
        PropertyType::Int64Property => {
            header_pad(r, raw)?;
            Value::Int64(r.read_i64::<LE>()?)
        }
        PropertyType::UInt16Property => {
            header_pad(r, raw)?;
            Value::UInt16(r.read_u16::<LE>()?)
        }
        PropertyType::UInt32Property => {
            header_pad(r, raw)?;
            Value::UInt32(r.read_u32::<LE>()?)
        }
        PropertyType::UInt64Property => {
            header_pad(r, raw)?;
            Value::UInt64(r.read_u64::<LE>()?)
        }
        PropertyType::FloatProperty => {
            header_pad(r, raw)?;
            Value::Float(r.read_f32::<LE>()?.into())
        }
        PropertyType::DoubleProperty => {
            header_pad(r, raw)?;
            Value::Double(r.read_f64::<LE>()?.into())
        }
        PropertyType::BoolProperty => {
            // The pad byte trails the value here instead of leading it.
            let value = r.read_u8()? != 0;
            if !raw {
                r.reserved(1)?;
            }
            Value::Bool(value)
        }
        PropertyType::StrProperty => {
            header_pad(r, raw)?;
            Value::Str(r.read_fstring()?)
        }
        PropertyType::NameProperty => {
            header_pad(r, raw)?;
            Value::Name(scope.read_name(r)?)
        }
        PropertyType::SoftObjectProperty | PropertyType::SoftClassPath => {
            header_pad(r, raw)?;
            Value::SoftPath(r.read_fstring()?)
        }
        PropertyType::EnumProperty => {
            let enum_type = scope.read_name(r)?;
            r.reserved(1)?;
            let value = scope.read_name(r)?;
            Value::Enum(EnumValue { enum_type, value })
        }
        PropertyType::ByteProperty => read_byte_value(r, scope, raw)?,
        PropertyType::TextProperty => {
            header_pad(r, raw)?;
            Value::Text(read_text(r)?)
        }
        PropertyType::ObjectProperty => {
            header_pad(r, raw)?;
            let offset = r.offset();
            let object_index = r.read_i32::<LE>()?;
            Value::Object(scope.object_ref(object_index, offset)?)
        }
        PropertyType::ArrayProperty => read_array_value(r, scope, size)?,
        PropertyType::MapProperty => {
            if raw {
                return Err(Error::Other(
                    "map entries in raw position are not supported".into(),
                ));
            }
            read_map_value(r, scope)?
        }
        PropertyType::StructProperty => {
            if raw {
                Value::StructReference {
                    guid: FGuid::read(r)?,
                }
            } else {
                Value::Struct(Box::new(read_tagged_struct(r, scope)?))
            }
        }
    })
}

fn header_pad<R: ArchiveRead>(r: &mut R, raw: bool) -> Result<()> {
    if !raw {
        r.reserved(1)?;
    }
    Ok(())
}

fn read_byte_value<R: ArchiveRead>(r: &mut R, scope: &ArchiveScope, raw: bool) -> Result<Value> {
    if raw {
        return Ok(Value::Byte(Byte::Byte(r.read_u8()?)));
    }
    let enum_name = scope.read_name(r)?;
    r.reserved(1)?;
    Ok(if enum_name == "None" {
        Value::Byte(Byte::Byte(r.read_u8()?))
    } else {
        Value::Byte(Byte::Label(scope.read_name(r)?))
    })
}

#[instrument(name = "Text_read", skip_all)]
fn read_text<R: ArchiveRead>(r: &mut R) -> Result<Text> {
    let flags = r.read_u32::<LE>()?;
    let history_type = r.read_u8()?;
    let data = match history_type {
        0 => TextData::Localized {
            namespace: r.read_fstring()?,
            key: r.read_fstring()?,
            source_string: r.read_fstring()?,
        },
        255 => TextData::CultureInvariant {
            data: (r.read_u32::<LE>()? != 0)
                .then(|| r.read_fstring())
                .transpose()?,
        },
        _ => TextData::Unsupported,
    };
    Ok(Text {
        flags,
        history_type,
        data,
    })
}

#[instrument(skip_all)]
fn read_array_value<R: ArchiveRead>(r: &mut R, scope: &ArchiveScope, size: u32) -> Result<Value> {
    let type_offset = r.offset();
    let element_type_name = scope.read_name(r)?;
    let element_type = PropertyType::parse(&element_type_name, type_offset)?;
    r.reserved(1)?;
    let count = r.read_u32::<LE>()?;

    if element_type == PropertyType::StructProperty {
        // The stream repeats the enclosing property tag before struct
        // elements, then one struct header covers all of them.
        scope.read_name(r)?; // variable name again
        scope.read_name(r)?; // "StructProperty" again
        r.read_u32::<LE>()?; // array byte size
        r.read_u32::<LE>()?; // index
        let struct_name = scope.read_name(r)?;
        let guid = FGuid::read(r)?;
        r.reserved(1)?;

        let struct_type = StructType::from(struct_name.as_str());
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(read_struct_value(r, scope, &struct_type)?);
        }
        return Ok(Value::Array(ArrayValue::Structs {
            element_type: struct_name,
            guid,
            items,
        }));
    }

    let mut items = Vec::new();
    for _ in 0..count {
        items.push(read_value(r, scope, element_type, size, true)?);
    }
    Ok(Value::Array(ArrayValue::Items {
        element_type,
        items,
    }))
}

#[instrument(skip_all)]
fn read_map_value<R: ArchiveRead>(r: &mut R, scope: &ArchiveScope) -> Result<Value> {
    let key_offset = r.offset();
    let key_type = PropertyType::parse(&scope.read_name(r)?, key_offset)?;
    let value_offset = r.offset();
    let value_type = PropertyType::parse(&scope.read_name(r)?, value_offset)?;
    r.reserved(5)?;
    let count = r.read_i32::<LE>()?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let key = read_value(r, scope, key_type, 0, true)?;
        let value = read_value(r, scope, value_type, 0, true)?;
        entries.push(MapEntry { key, value });
    }
    Ok(Value::Map(MapValue {
        key_type,
        value_type,
        entries,
    }))
}

fn read_tagged_struct<R: ArchiveRead>(r: &mut R, scope: &ArchiveScope) -> Result<TaggedStruct> {
    let name = scope.read_name(r)?;
    let guid = FGuid::read(r)?;
    r.reserved(1)?;
    let struct_type = StructType::from(name.as_str());
    let value = read_struct_value(r, scope, &struct_type)?;
    Ok(TaggedStruct { name, guid, value })
}

#[instrument(skip_all)]
pub(crate) fn read_struct_value<R: ArchiveRead>(
    r: &mut R,
    scope: &ArchiveScope,
    struct_type: &StructType,
) -> Result<StructValue> {
    Ok(match struct_type {
        StructType::Guid => StructValue::Guid(FGuid::read(r)?),
        StructType::Vector => StructValue::Vector(Vector::read(r)?),
        StructType::DateTime => StructValue::DateTime(r.read_i64::<LE>()?),
        StructType::Timespan => StructValue::Timespan(r.read_i64::<LE>()?),
        StructType::SoftClassPath | StructType::SoftObjectPath => {
            StructValue::SoftPath(r.read_fstring()?)
        }
        StructType::PersistenceBlob => {
            StructValue::PersistenceBlob(Box::new(read_persistence_blob(r)?))
        }
        StructType::Struct(_) => StructValue::Properties(read_properties_until_none(r, scope)?),
    })
}

/// Slice out the blob and re-enter the decoder on a fresh cursor. The blob
/// owns its own name and object tables; nothing of the enclosing scope
/// leaks in.
#[instrument(skip_all)]
fn read_persistence_blob<R: ArchiveRead>(r: &mut R) -> Result<persistence::PersistenceBlob> {
    let blob_size = r.read_u32::<LE>()?;
    let mut bytes = vec![0; blob_size as usize];
    r.read_exact(&mut bytes)?;
    let mut blob = Cursor::new(bytes.as_slice());
    persistence::read_blob(&mut blob)
}
