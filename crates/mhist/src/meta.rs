use std::{
    collections::HashMap,
    path::{
        Path,
        PathBuf,
    },
};

use serde::{
    Deserialize,
    Serialize,
};
use tokio::fs;

use crate::{
    errors::{
        Error,
        Result,
    },
    measurement::MeasurementType,
};

const META_FILE_NAME: &str = "meta.json";

/// One catalog entry, both as persisted and as served to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementTypeInfo {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub measurement_type: MeasurementType,
}

#[derive(Serialize, Deserialize)]
struct PersistedMeta {
    next_id: u32,
    entries: Vec<MeasurementTypeInfo>,
}

/// The catalog mapping measurement names to dense numeric ids and their
/// fixed type, persisted as a JSON document in the data directory. Ids are
/// never reused; a name's type cannot change once assigned.
///
/// Owned by the disk-store listener, which serializes all access.
pub struct DiskMeta {
    path: PathBuf,
    next_id: u32,
    by_name: HashMap<String, MeasurementTypeInfo>,
    names_by_id: HashMap<u32, String>,
}

impl DiskMeta {
    pub async fn load(data_path: &Path) -> Result<Self> {
        let path = data_path.join(META_FILE_NAME);
        let persisted = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<PersistedMeta>(&bytes)
                .map_err(|e| Error::MalformedInput(format!("unreadable meta catalog: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedMeta {
                next_id: 1,
                entries: Vec::new(),
            },
            Err(e) => return Err(e.into()),
        };

        let mut meta = Self {
            path,
            next_id: persisted.next_id,
            by_name: HashMap::new(),
            names_by_id: HashMap::new(),
        };
        for entry in persisted.entries {
            meta.names_by_id.insert(entry.id, entry.name.clone());
            meta.by_name.insert(entry.name.clone(), entry);
        }
        Ok(meta)
    }

    /// The id for `name`, assigning and persisting the next dense id on
    /// first sight. Fails with `TypeMismatch` when the name is already
    /// registered with a different type.
    pub async fn get_or_create_id(
        &mut self,
        name: &str,
        measurement_type: MeasurementType,
    ) -> Result<u32> {
        if let Some(info) = self.by_name.get(name) {
            if info.measurement_type != measurement_type {
                return Err(Error::TypeMismatch {
                    name: name.to_owned(),
                    existing: info.measurement_type,
                    requested: measurement_type,
                });
            }
            return Ok(info.id);
        }

        let id = self.next_id;
        self.next_id += 1;
        let info = MeasurementTypeInfo {
            id,
            name: name.to_owned(),
            measurement_type,
        };
        self.names_by_id.insert(id, info.name.clone());
        self.by_name.insert(info.name.clone(), info);
        self.persist().await?;
        tracing::info!("Registered measurement {name} as id {id} ({measurement_type})");
        Ok(id)
    }

    pub fn name_for_id(&self, id: u32) -> Option<&str> {
        self.names_by_id.get(&id).map(String::as_str)
    }

    pub fn type_for_id(&self, id: u32) -> Option<MeasurementType> {
        let name = self.names_by_id.get(&id)?;
        Some(self.by_name[name].measurement_type)
    }

    pub fn all_stored_infos(&self) -> Vec<MeasurementTypeInfo> {
        let mut infos: Vec<MeasurementTypeInfo> = self.by_name.values().cloned().collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    async fn persist(&self) -> Result<()> {
        let persisted = PersistedMeta {
            next_id: self.next_id,
            entries: self.all_stored_infos(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        fs::write(&self.path, bytes).await?;
        Ok(())
    }
}
