// A terrain is described by a small config file:
//
//   ; Terrain for the valley map.
//   SET name "valley"
//   SET cx 256
//   SET cz 256
//   SET vertex_distance 2.0
//   SET min_y -20.0
//   SET max_y 80.0
//   SET heightmap "valley_height.raw"
//   SET form_desc "valley_forms.txt"
//   SET form_map "valley_forms.png"
//   SET cache "valley.cache"
//
// `cx` and `cz` are counted in quads; the heightmap holds one more vertex on each axis.

use std::path::{Path, PathBuf};

use glam::UVec2;

use super::parser::{ConfigLine, ConfigLines, FromConfigToken};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config file ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing required key \"{0}\"")]
    MissingKey(&'static str),

    #[error("Invalid value for \"{key}\" on line {line}: {message}")]
    InvalidValue {
        key: String,
        line: usize,
        message: String,
    },
}

/// Construction parameters of a terrain.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainDesc {
    /// Resource name used in logs and errors.
    pub name: String,
    /// Number of quads on X and Z.
    pub cells: UVec2,
    /// World distance between neighboring vertices on X and Z.
    pub vertex_distance: f32,
    /// World height of heightmap value 0.
    pub min_y: f32,
    /// World height of heightmap value 256 (never reached, 255 is the highest).
    pub max_y: f32,
    pub heightmap_path: PathBuf,
    pub form_desc_path: PathBuf,
    pub form_map_path: PathBuf,
    pub cache_path: PathBuf,
}

impl TerrainDesc {
    /// Read a terrain config file. Relative paths inside it are resolved against the directory
    /// the file is in.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Loading terrain config: {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut desc = Self::try_from(ConfigLines::parse(&text))?;
        if let Some(base) = path.parent() {
            desc.resolve_paths(base);
        }
        if desc.name.is_empty() {
            desc.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        Ok(desc)
    }

    /// Make all relative file paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.heightmap_path,
            &mut self.form_desc_path,
            &mut self.form_map_path,
            &mut self.cache_path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Value of a `SET key value` line. A value of the wrong type is an error, not a missing key.
fn set_value<T: FromConfigToken>(line: &ConfigLine) -> Result<Option<T>, ConfigError> {
    match line.params.get(1) {
        None => Ok(None),
        Some(token) => T::from_token(token)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: line.string(0),
                line: line.line,
                message: format!("unexpected value {token:?}"),
            }),
    }
}

impl TryFrom<ConfigLines> for TerrainDesc {
    type Error = ConfigError;

    fn try_from(value: ConfigLines) -> Result<Self, Self::Error> {
        let mut name = None;
        let mut cx = None;
        let mut cz = None;
        let mut vertex_distance = None;
        let mut min_y = None;
        let mut max_y = None;
        let mut heightmap_path = None;
        let mut form_desc_path = None;
        let mut form_map_path = None;
        let mut cache_path = None;

        for line in value.iter() {
            match line.key.as_str() {
                "SET" => match line.string(0).as_str() {
                    "name" => name = set_value::<String>(line)?,
                    "cx" => cx = set_value::<u32>(line)?,
                    "cz" => cz = set_value::<u32>(line)?,
                    "vertex_distance" => vertex_distance = set_value::<f32>(line)?,
                    "min_y" => min_y = set_value::<f32>(line)?,
                    "max_y" => max_y = set_value::<f32>(line)?,
                    "heightmap" => heightmap_path = set_value::<String>(line)?,
                    "form_desc" => form_desc_path = set_value::<String>(line)?,
                    "form_map" => form_map_path = set_value::<String>(line)?,
                    "cache" => cache_path = set_value::<String>(line)?,

                    _ => tracing::warn!("Unknown terrain SET key: {}", line.string(0)),
                },

                _ => tracing::warn!("Unknown terrain key: {}", line.key),
            }
        }

        let cells = UVec2::new(
            cx.ok_or(ConfigError::MissingKey("cx"))?,
            cz.ok_or(ConfigError::MissingKey("cz"))?,
        );
        if cells.x == 0 || cells.y == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cx/cz".to_string(),
                line: 0,
                message: "the terrain needs at least one quad on each axis".to_string(),
            });
        }

        let vertex_distance = vertex_distance.ok_or(ConfigError::MissingKey("vertex_distance"))?;
        if !(vertex_distance > 0.0) {
            let line = value
                .iter()
                .find(|l| l.key == "SET" && l.string(0) == "vertex_distance")
                .map(|l| l.line)
                .unwrap_or_default();
            return Err(ConfigError::InvalidValue {
                key: "vertex_distance".to_string(),
                line,
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            name: name.unwrap_or_default(),
            cells,
            vertex_distance,
            min_y: min_y.ok_or(ConfigError::MissingKey("min_y"))?,
            max_y: max_y.ok_or(ConfigError::MissingKey("max_y"))?,
            heightmap_path: heightmap_path
                .ok_or(ConfigError::MissingKey("heightmap"))?
                .into(),
            form_desc_path: form_desc_path
                .ok_or(ConfigError::MissingKey("form_desc"))?
                .into(),
            form_map_path: form_map_path
                .ok_or(ConfigError::MissingKey("form_map"))?
                .into(),
            cache_path: cache_path.ok_or(ConfigError::MissingKey("cache"))?.into(),
        })
    }
}
