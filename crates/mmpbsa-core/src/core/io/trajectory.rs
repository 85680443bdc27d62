//! Frame counting for AMBER ASCII trajectories.
//!
//! Only as much of the formats is read as is needed to resolve "all snapshots":
//! the atom count from the topology's `POINTERS` section and the number of
//! complete coordinate frames in the trajectory.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const FIELD_WIDTH: usize = 8;
const POINTERS_FLAG: &str = "%FLAG POINTERS";

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Topology '{path}' has no %FLAG POINTERS section", path = path.display())]
    MissingPointers { path: PathBuf },
    #[error("Topology '{path}' has an invalid atom count '{value}'", path = path.display())]
    InvalidAtomCount { path: PathBuf, value: String },
    #[error("Trajectory '{path}' line {line}: invalid coordinate '{value}'", path = path.display())]
    InvalidCoordinate {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("Trajectory '{path}' line {line}: coordinates overrun a frame of {expected} values", path = path.display())]
    MisalignedFrame {
        path: PathBuf,
        line: usize,
        expected: usize,
    },
}

/// Number of complete frames in `trajectory`, using the atom count declared in `prmtop`.
pub fn count_snapshots(prmtop: &Path, trajectory: &Path) -> Result<usize, TrajectoryError> {
    let natom = read_atom_count(open(prmtop)?, prmtop)?;
    let frames = count_frames(open(trajectory)?, natom, trajectory)?;
    debug!(natom, frames, trajectory = %trajectory.display(), "Resolved snapshot count.");
    Ok(frames)
}

fn open(path: &Path) -> Result<BufReader<File>, TrajectoryError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TrajectoryError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads NATOM, the first integer of the `POINTERS` section.
pub fn read_atom_count(reader: impl BufRead, path: &Path) -> Result<usize, TrajectoryError> {
    let mut in_pointers = false;
    for line in reader.lines() {
        let line = line.map_err(|source| TrajectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.starts_with(POINTERS_FLAG) {
            in_pointers = true;
            continue;
        }
        if !in_pointers || line.starts_with('%') {
            continue;
        }

        let field = line.get(..FIELD_WIDTH).unwrap_or(&line).trim();
        return match field.parse::<usize>() {
            Ok(natom) if natom > 0 => Ok(natom),
            _ => Err(TrajectoryError::InvalidAtomCount {
                path: path.to_path_buf(),
                value: field.to_string(),
            }),
        };
    }
    Err(TrajectoryError::MissingPointers {
        path: path.to_path_buf(),
    })
}

/// Counts complete frames of `natom` atoms. A periodic-box line (three values)
/// after each frame is detected from the first frame and skipped; an incomplete
/// trailing frame is ignored.
pub fn count_frames(
    reader: impl BufRead,
    natom: usize,
    path: &Path,
) -> Result<usize, TrajectoryError> {
    let per_frame = natom * 3;
    let mut frames = 0;
    let mut in_frame = 0;
    let mut has_box: Option<bool> = None;

    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line_num = idx + 1;
        let line = line.map_err(|source| TrajectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let values = count_fields(&line, line_num, path)?;
        if values == 0 {
            continue;
        }

        if in_frame == 0 && frames > 0 && has_box != Some(false) {
            if values == 3 && per_frame != 3 {
                has_box = Some(true);
                continue;
            }
            has_box.get_or_insert(false);
        }

        in_frame += values;
        if in_frame > per_frame {
            return Err(TrajectoryError::MisalignedFrame {
                path: path.to_path_buf(),
                line: line_num,
                expected: per_frame,
            });
        }
        if in_frame == per_frame {
            frames += 1;
            in_frame = 0;
        }
    }

    if in_frame != 0 {
        warn!(
            trajectory = %path.display(),
            "Ignoring incomplete trailing frame ({} of {} values).", in_frame, per_frame
        );
    }
    Ok(frames)
}

fn count_fields(line: &str, line_num: usize, path: &Path) -> Result<usize, TrajectoryError> {
    let line = line.trim_end();
    let mut count = 0;
    let mut start = 0;
    while start < line.len() {
        let end = (start + FIELD_WIDTH).min(line.len());
        let field = line.get(start..end).ok_or_else(|| TrajectoryError::InvalidCoordinate {
            path: path.to_path_buf(),
            line: line_num,
            value: line.to_string(),
        })?;
        let trimmed = field.trim();
        if !trimmed.is_empty() {
            trimmed
                .parse::<f64>()
                .map_err(|_| TrajectoryError::InvalidCoordinate {
                    path: path.to_path_buf(),
                    line: line_num,
                    value: trimmed.to_string(),
                })?;
            count += 1;
        }
        start = end;
    }
    Ok(count)
}
