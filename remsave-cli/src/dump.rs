//! Debug dump sidecar: writes the stitched archive buffer and per-object
//! JSON when the corresponding environment flags are set. Only consumes the
//! decoded tree and the public decompress entry point; the core decoder
//! knows nothing about it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use remsave::SaveArchive;

use crate::config;

pub fn write_debug_dumps(
    input: &Path,
    out_dir: &Path,
    bytes: &[u8],
    save: &SaveArchive,
) -> Result<()> {
    if !*config::DEBUG_SAVE_BINARY && !*config::DEBUG_SAVE_JSON {
        return Ok(());
    }

    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("save");

    if *config::DEBUG_SAVE_BINARY {
        let buffer = remsave::decompress(bytes).context("failed to decompress for binary dump")?;
        let dir = out_dir.join("bin");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        fs::write(dir.join(format!("{stem}.bin")), &buffer)?;
    }

    if *config::DEBUG_SAVE_JSON {
        let dir = out_dir.join("json").join(stem);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for object in &save.data.objects {
            let name = object
                .object_path
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .unwrap_or("object");
            let path = dir.join(format!("{}_{name}.json", object.object_id));
            fs::write(path, serde_json::to_vec_pretty(object)?)?;
        }
    }

    Ok(())
}
