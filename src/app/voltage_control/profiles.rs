use crate::utils::error::{EvalError, Result};
use std::path::Path;

pub const LOAD_ACTIVE_FILE: &str = "load_active.csv";
pub const LOAD_REACTIVE_FILE: &str = "load_reactive.csv";
pub const PV_ACTIVE_FILE: &str = "pv_active.csv";

/// Time series driving the feeder, one row per interval.
#[derive(Debug, Clone)]
pub struct Profiles {
    pub load_active: Vec<Vec<f64>>,
    pub load_reactive: Vec<Vec<f64>>,
    pub pv_active: Vec<Vec<f64>>,
}

impl Profiles {
    /// Loads the three CSV files from a scenario directory. Load files need
    /// one column per non-slack bus, the PV file one column per PV unit.
    pub fn load<P: AsRef<Path>>(dir: P, load_buses: usize, pv_units: usize) -> Result<Self> {
        let dir = dir.as_ref();
        let load_active = read_matrix(&dir.join(LOAD_ACTIVE_FILE), load_buses)?;
        let load_reactive = read_matrix(&dir.join(LOAD_REACTIVE_FILE), load_buses)?;
        let pv_active = read_matrix(&dir.join(PV_ACTIVE_FILE), pv_units)?;

        if load_active.len() != load_reactive.len() || load_active.len() != pv_active.len() {
            return Err(EvalError::environment(format!(
                "profile lengths differ: load_active {}, load_reactive {}, pv_active {}",
                load_active.len(),
                load_reactive.len(),
                pv_active.len()
            )));
        }
        if load_active.is_empty() {
            return Err(EvalError::environment(format!(
                "no profile rows in {}",
                dir.display()
            )));
        }

        tracing::debug!(
            "Loaded {} intervals from {}",
            load_active.len(),
            dir.display()
        );

        Ok(Self {
            load_active,
            load_reactive,
            pv_active,
        })
    }

    pub fn len(&self) -> usize {
        self.load_active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.load_active.is_empty()
    }
}

fn read_matrix(path: &Path, columns: usize) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != columns {
            return Err(EvalError::environment(format!(
                "{} row {} has {} columns, expected {}",
                path.display(),
                line + 1,
                record.len(),
                columns
            )));
        }
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|e| {
                    EvalError::environment(format!(
                        "{} row {}: '{}' is not a number ({})",
                        path.display(),
                        line + 1,
                        field,
                        e
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_profiles() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), LOAD_ACTIVE_FILE, "b1,b2\n0.1,0.2\n0.3,0.4\n");
        write(dir.path(), LOAD_REACTIVE_FILE, "b1,b2\n0.01,0.02\n0.03,0.04\n");
        write(dir.path(), PV_ACTIVE_FILE, "pv1\n0.5\n0.6\n");

        let profiles = Profiles::load(dir.path(), 2, 1).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles.load_active[1], vec![0.3, 0.4]);
        assert_eq!(profiles.pv_active[0], vec![0.5]);
    }

    #[test]
    fn test_column_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), LOAD_ACTIVE_FILE, "b1\n0.1\n");
        write(dir.path(), LOAD_REACTIVE_FILE, "b1\n0.1\n");
        write(dir.path(), PV_ACTIVE_FILE, "pv1\n0.5\n");

        assert!(Profiles::load(dir.path(), 2, 1).is_err());
    }

    #[test]
    fn test_non_numeric_field() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), LOAD_ACTIVE_FILE, "b1\nabc\n");
        write(dir.path(), LOAD_REACTIVE_FILE, "b1\n0.1\n");
        write(dir.path(), PV_ACTIVE_FILE, "pv1\n0.5\n");

        assert!(matches!(
            Profiles::load(dir.path(), 1, 1),
            Err(EvalError::EnvironmentError { .. })
        ));
    }
}
