//! Device identity bootstrap.
//!
//! The identity file holds a single UUID line. A missing or empty file means
//! this device has never run the daemon; a fresh identity is generated and
//! persisted so the id stays stable across restarts.

use std::fs;
use std::io;
use std::path::Path;

use uuid::Uuid;

use crate::types::DeviceIdentity;

use super::StartError;

/// Load the persisted identity from `path`, or generate and persist a new
/// one. Returns the identity and whether it was freshly generated.
pub(crate) fn load_or_generate(
    path: &Path,
    platform: &str,
    execution_type: &str,
) -> Result<(DeviceIdentity, bool), StartError> {
    let identity_error = |source: io::Error| StartError::Identity {
        path: path.display().to_string(),
        source,
    };

    let existing = match fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(identity_error(e)),
    };

    let (device_id, generated) = match existing {
        Some(device_id) => (device_id, false),
        None => {
            let device_id = Uuid::new_v4().to_string();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(identity_error)?;
            }
            fs::write(path, &device_id).map_err(identity_error)?;
            (device_id, true)
        }
    };

    Ok((
        DeviceIdentity {
            device_id,
            platform: platform.to_string(),
            execution_type: execution_type.to_string(),
        },
        generated,
    ))
}
