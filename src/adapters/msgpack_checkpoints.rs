//! MessagePack implementation of the checkpoint store.
//!
//! This adapter implements the CheckpointStore port using rmp_serde for
//! compact binary serialization, one file per ordinal.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{
    Result,
    error::Error,
    ports::{CheckpointRecord, CheckpointStore, TrainingState},
};

const PREFIX: &str = "ckpt_";
const EXTENSION: &str = "msgpack";

/// File-backed checkpoint store.
///
/// Records live at `{dir}/ckpt_{ordinal:08}.msgpack`. Each record is written
/// to a temporary file first and renamed into place, so a crash mid-write
/// never leaves a truncated record under a valid name.
///
/// # Examples
///
/// ```no_run
/// use metamon::adapters::MsgPackCheckpointStore;
/// use metamon::ports::CheckpointStore;
///
/// let store = MsgPackCheckpointStore::new("ckpts/my_run/ckpts");
/// if let Some(ordinal) = store.latest()? {
///     let state = store.load(ordinal)?;
///     println!("resuming after epoch {}", state.epoch);
/// }
/// # Ok::<(), metamon::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MsgPackCheckpointStore {
    dir: PathBuf,
}

impl MsgPackCheckpointStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `ordinal`
    pub fn path_for(&self, ordinal: u64) -> PathBuf {
        self.dir.join(format!("{PREFIX}{ordinal:08}.{EXTENSION}"))
    }

    fn parse_ordinal(path: &Path) -> Option<u64> {
        if path.extension()? != EXTENSION {
            return None;
        }
        path.file_stem()?
            .to_str()?
            .strip_prefix(PREFIX)?
            .parse()
            .ok()
    }

    fn write_record(&self, record: &CheckpointRecord, target: &Path) -> Result<()> {
        let tmp = target.with_extension("tmp");
        let write_error = |message: String| Error::CheckpointWrite {
            ordinal: record.ordinal,
            message,
        };

        let file = File::create(&tmp).map_err(|e| write_error(format!("create {tmp:?}: {e}")))?;
        let mut writer = BufWriter::new(file);
        rmp_serde::encode::write(&mut writer, record)
            .map_err(|e| write_error(format!("serialize to MessagePack: {e}")))?;
        writer
            .flush()
            .and_then(|()| writer.get_ref().sync_all())
            .map_err(|e| write_error(format!("flush {tmp:?}: {e}")))?;
        drop(writer);

        fs::rename(&tmp, target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            write_error(format!("rename into {target:?}: {e}"))
        })
    }
}

impl CheckpointStore for MsgPackCheckpointStore {
    fn save(&self, ordinal: u64, state: &TrainingState) -> Result<()> {
        let target = self.path_for(ordinal);
        if target.exists() {
            return Err(Error::CheckpointExists { ordinal });
        }
        fs::create_dir_all(&self.dir).map_err(|e| Error::CheckpointWrite {
            ordinal,
            message: format!("create {:?}: {e}", self.dir),
        })?;

        let record = CheckpointRecord {
            ordinal,
            state: state.clone(),
        };
        self.write_record(&record, &target)?;
        tracing::debug!(ordinal, path = ?target, "checkpoint written");
        Ok(())
    }

    fn load(&self, ordinal: u64) -> Result<TrainingState> {
        let path = self.path_for(ordinal);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CheckpointNotFound { ordinal });
            }
            Err(source) => {
                return Err(Error::Io {
                    operation: format!("open checkpoint {path:?}"),
                    source,
                });
            }
        };

        let record: CheckpointRecord =
            rmp_serde::decode::from_read(std::io::BufReader::new(file)).map_err(|e| {
                Error::SerializationContext {
                    operation: format!("deserialize checkpoint {path:?} from MessagePack"),
                    message: e.to_string(),
                }
            })?;
        if record.ordinal != ordinal {
            return Err(Error::SerializationContext {
                operation: format!("load checkpoint {path:?}"),
                message: format!("file holds ordinal {}", record.ordinal),
            });
        }
        Ok(record.state)
    }

    fn latest(&self) -> Result<Option<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(Error::Io {
                    operation: format!("list checkpoints in {:?}", self.dir),
                    source,
                });
            }
        };
        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Self::parse_ordinal(&entry.path()))
            .max())
    }
}
