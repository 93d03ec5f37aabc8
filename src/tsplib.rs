use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use ndarray::Array2;
use tracing::debug;

use crate::{matrix::DistanceMatrix, Error, Result};

/// Named problem instance
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub distances: DistanceMatrix,
}

pub fn read(path: &Path) -> Result<Instance> {
    let instance = parse(BufReader::new(File::open(path)?))?;
    debug!(
        "Read {} with {} cities from {}",
        instance.name,
        instance.distances.dim(),
        path.display()
    );
    Ok(instance)
}

/// Expand directories into the `.atsp` files they contain, sorted by path.
///
/// Other paths are passed through unchanged.
pub fn instance_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut expanded = vec![];
    for path in paths {
        if path.is_dir() {
            let mut files = vec![];
            for entry in fs::read_dir(path)? {
                let file = entry?.path();
                if file.extension().map_or(false, |extension| extension == "atsp") {
                    files.push(file);
                }
            }
            files.sort();
            debug!("Found {} instances in {}", files.len(), path.display());
            expanded.extend(files);
        } else {
            expanded.push(path.clone());
        }
    }
    Ok(expanded)
}

/// Parse a TSPLIB instance whose weights are given as a full matrix.
///
/// `NAME`, `DIMENSION` and `EDGE_WEIGHT_FORMAT` are the only interpreted header fields.
/// Every number between `EDGE_WEIGHT_SECTION` and `EOF` is a weight, listed row by row.
///
/// <http://comopt.ifi.uni-heidelberg.de/software/TSPLIB95/tsp95.pdf>
pub fn parse<R: BufRead>(reader: R) -> Result<Instance> {
    let mut name = String::new();
    let mut dimension = None;
    let mut weights = vec![];
    let mut in_weight_section = false;
    let mut line_number = 0;

    for line in reader.lines() {
        let line = line?;
        line_number += 1;
        let line = line.trim();
        if line == "EOF" {
            break;
        }
        if in_weight_section {
            for token in line.split_whitespace() {
                let weight = token.parse::<f64>().map_err(|err| Error::Parse {
                    line: line_number,
                    message: format!("invalid weight {token:?}: {err}"),
                })?;
                weights.push(weight);
            }
            continue;
        }
        if line.starts_with("EDGE_WEIGHT_SECTION") {
            in_weight_section = true;
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "NAME" => name = value.to_owned(),
            "DIMENSION" => {
                dimension = Some(value.parse::<usize>().map_err(|err| Error::Parse {
                    line: line_number,
                    message: format!("invalid dimension {value:?}: {err}"),
                })?)
            }
            "EDGE_WEIGHT_FORMAT" if value != "FULL_MATRIX" => {
                return Err(Error::Parse {
                    line: line_number,
                    message: format!("only FULL_MATRIX weights are supported, got {value}"),
                })
            }
            _ => {}
        }
    }

    let dimension = dimension.ok_or_else(|| Error::Parse {
        line: line_number,
        message: "missing DIMENSION".to_owned(),
    })?;
    let expected = dimension.checked_mul(dimension).ok_or_else(|| Error::Parse {
        line: line_number,
        message: format!("dimension {dimension} is too large"),
    })?;
    if weights.len() != expected {
        return Err(Error::Parse {
            line: line_number,
            message: format!(
                "expected {expected} weights for dimension {dimension}, found {}",
                weights.len()
            ),
        });
    }
    let weights =
        Array2::from_shape_vec((dimension, dimension), weights).map_err(|err| Error::Matrix {
            message: err.to_string(),
        })?;
    Ok(Instance {
        name,
        distances: DistanceMatrix::new(weights)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{instance_paths, parse};
    use std::{env, fs, path::PathBuf};
    use crate::Error;
    use pretty_assertions::assert_eq;

    const TINY: &str = "NAME: tiny4
TYPE: ATSP
COMMENT: hand made
DIMENSION: 4
EDGE_WEIGHT_TYPE: EXPLICIT
EDGE_WEIGHT_FORMAT: FULL_MATRIX
EDGE_WEIGHT_SECTION
 9999    3    5   48
    3 9999    3   22
 5    3 9999   22
   48   48   74 9999
EOF
";

    #[test]
    fn test_parse_full_matrix() {
        let instance = parse(TINY.as_bytes()).unwrap();
        assert_eq!(instance.name, "tiny4");
        assert_eq!(instance.distances.dim(), 4);
        assert_eq!(instance.distances.get(0, 3), 48.);
        assert_eq!(instance.distances.get(3, 2), 74.);
        assert_eq!(instance.distances.tour_length(&[0, 1, 2, 3]), 3. + 3. + 22. + 48.);
    }

    #[test]
    fn test_weight_count_must_match_dimension() {
        let input = TINY.replace("DIMENSION: 4", "DIMENSION: 5");
        assert!(matches!(
            parse(input.as_bytes()),
            Err(Error::Parse { line: 12, .. })
        ));
    }

    #[test]
    fn test_huge_dimension() {
        let input = TINY.replace("DIMENSION: 4", &format!("DIMENSION: {}", usize::MAX));
        assert!(matches!(
            parse(input.as_bytes()),
            Err(Error::Parse { line: 12, .. })
        ));
    }

    #[test]
    fn test_missing_dimension() {
        let input = TINY.replace("DIMENSION: 4\n", "");
        assert!(matches!(parse(input.as_bytes()), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_invalid_weight() {
        let input = TINY.replace("   48   48", "   48   x8");
        assert!(matches!(
            parse(input.as_bytes()),
            Err(Error::Parse { line: 11, .. })
        ));
    }

    #[test]
    fn test_only_full_matrices() {
        let input = TINY.replace("FULL_MATRIX", "UPPER_ROW");
        assert!(matches!(
            parse(input.as_bytes()),
            Err(Error::Parse { line: 6, .. })
        ));
    }

    #[test]
    fn test_directories_expand_to_instances() {
        let dir = env::temp_dir().join(format!("atsp-aco-instances-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for file in ["b.atsp", "a.atsp", "notes.txt"] {
            fs::write(dir.join(file), TINY).unwrap();
        }
        let single = PathBuf::from("single.atsp");
        let paths = instance_paths(&[dir.clone(), single.clone()]).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        assert_eq!(paths, [dir.join("a.atsp"), dir.join("b.atsp"), single]);
    }
}
