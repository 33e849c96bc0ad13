//! Nested archives embedded inside `PersistenceBlob` struct properties.
//!
//! Profile saves embed a plain archive. World saves embed a container that
//! adds an index of world actors, a destroyed-actor list, and a
//! dynamic-actor addendum keyed by the actors' unique ids. Either way the
//! blob is decoded on its own cursor with its own tables.

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{ReadBytesExt, LE};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::archive::ArchiveRead;
use crate::property::Double;
use crate::{read_save_data, Result, SaveData, TopLevelAssetPath};

/// First u32 of a world-save blob carrying the actor container rather than
/// a plain nested archive.
const CONTAINER_MAGIC: u32 = 4;

#[derive(Debug, PartialEq, Serialize)]
pub enum PersistenceBlob {
    Archive(SaveData),
    Container(PersistenceContainer),
}

#[derive(Debug, PartialEq, Serialize)]
pub struct PersistenceContainer {
    pub version: u32,
    pub destroyed: Vec<u64>,
    pub actors: IndexMap<u64, Actor>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Actor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    pub archive: SaveData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_data: Option<DynamicActor>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct DynamicActor {
    pub unique_id: u64,
    pub transform: Transform,
    pub class_path: TopLevelAssetPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vector {
    pub x: Double,
    pub y: Double,
    pub z: Double,
}

impl Vector {
    #[instrument(name = "Vector_read", skip_all)]
    pub(crate) fn read<R: ArchiveRead>(r: &mut R) -> Result<Self> {
        Ok(Self {
            x: r.read_f64::<LE>()?.into(),
            y: r.read_f64::<LE>()?.into(),
            z: r.read_f64::<LE>()?.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quaternion {
    pub x: Double,
    pub y: Double,
    pub z: Double,
    pub w: Double,
}

impl Quaternion {
    fn read<R: ArchiveRead>(r: &mut R) -> Result<Self> {
        Ok(Self {
            x: r.read_f64::<LE>()?.into(),
            y: r.read_f64::<LE>()?.into(),
            z: r.read_f64::<LE>()?.into(),
            w: r.read_f64::<LE>()?.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub rotation: Quaternion,
    pub position: Vector,
    pub scale: Vector,
}

impl Transform {
    #[instrument(name = "Transform_read", skip_all)]
    fn read<R: ArchiveRead>(r: &mut R) -> Result<Self> {
        Ok(Self {
            rotation: Quaternion::read(r)?,
            position: Vector::read(r)?,
            scale: Vector::read(r)?,
        })
    }
}

struct ActorInfo {
    unique_id: u64,
    offset: u32,
    size: u32,
}

#[instrument(skip_all)]
pub(crate) fn read_blob(r: &mut Cursor<&[u8]>) -> Result<PersistenceBlob> {
    let magic = r.read_u32::<LE>()?;
    if magic == CONTAINER_MAGIC {
        Ok(PersistenceBlob::Container(read_container(r, magic)?))
    } else {
        r.seek(SeekFrom::Start(0))?;
        Ok(PersistenceBlob::Archive(read_save_data(r, false, false)?))
    }
}

#[instrument(skip_all)]
fn read_container(r: &mut Cursor<&[u8]>, version: u32) -> Result<PersistenceContainer> {
    let index_offset = u64::from(r.read_u32::<LE>()?);
    let dynamic_offset = u64::from(r.read_u32::<LE>()?);

    r.seek(SeekFrom::Start(index_offset))?;
    let info_count = r.read_u32::<LE>()?;
    let mut infos = Vec::new();
    for _ in 0..info_count {
        infos.push(ActorInfo {
            unique_id: r.read_u64::<LE>()?,
            offset: r.read_u32::<LE>()?,
            size: r.read_u32::<LE>()?,
        });
    }

    let destroyed_count = r.read_u32::<LE>()?;
    let mut destroyed = Vec::new();
    for _ in 0..destroyed_count {
        destroyed.push(r.read_u64::<LE>()?);
    }

    let mut actors = IndexMap::new();
    for info in &infos {
        r.seek(SeekFrom::Start(info.offset.into()))?;
        let mut bytes = vec![0; info.size as usize];
        r.read_exact(&mut bytes)?;
        let mut actor = Cursor::new(bytes.as_slice());
        actors.insert(info.unique_id, read_actor(&mut actor)?);
    }

    r.seek(SeekFrom::Start(dynamic_offset))?;
    let dynamic_count = r.read_u32::<LE>()?;
    for _ in 0..dynamic_count {
        let dynamic = read_dynamic_actor(r)?;
        match actors.get_mut(&dynamic.unique_id) {
            Some(actor) => actor.dynamic_data = Some(dynamic),
            None => warn!(
                unique_id = dynamic.unique_id,
                "dynamic actor does not match any stored actor"
            ),
        }
    }

    Ok(PersistenceContainer {
        version,
        destroyed,
        actors,
    })
}

#[instrument(skip_all)]
fn read_actor(r: &mut Cursor<&[u8]>) -> Result<Actor> {
    let has_transform = r.read_u32::<LE>()? != 0;
    let transform = has_transform.then(|| Transform::read(r)).transpose()?;
    let archive = read_save_data(r, false, false)?;
    Ok(Actor {
        transform,
        archive,
        dynamic_data: None,
    })
}

fn read_dynamic_actor<R: ArchiveRead>(r: &mut R) -> Result<DynamicActor> {
    Ok(DynamicActor {
        unique_id: r.read_u64::<LE>()?,
        transform: Transform::read(r)?,
        class_path: TopLevelAssetPath {
            path: r.read_fstring()?,
            name: r.read_fstring()?,
        },
    })
}
