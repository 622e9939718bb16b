//! Contiguous partitions of the particle array across workers or ranks.

use std::ops::Range;

use kernel::{Result, SimError};

/// Index range `[offset, offset + size)` owned by one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// First particle index
    pub offset: usize,
    /// Number of particles
    pub size: usize,
}

impl Partition {
    /// The partition as an index range.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// Immutable partition layout for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    total: usize,
    parts: Vec<Partition>,
}

impl PartitionTable {
    /// `ceil(total / units)` particles per unit, clipped to `total`. Trailing
    /// units may be empty. This is the shared-memory worker split.
    pub fn ceil_split(total: usize, units: usize) -> Result<Self> {
        if units == 0 {
            return Err(SimError::Config("need at least one execution unit".to_string()));
        }
        let per_unit = total.div_ceil(units);
        let offsets: Vec<usize> = (0..=units).map(|u| (u * per_unit).min(total)).collect();
        Self::from_offsets(total, &offsets)
    }

    /// `floor(total / units)` particles per unit; the last unit absorbs the
    /// remainder. This is the distributed rank split.
    pub fn floor_split(total: usize, units: usize) -> Result<Self> {
        if units == 0 {
            return Err(SimError::Config("need at least one execution unit".to_string()));
        }
        let per_unit = total / units;
        let offsets: Vec<usize> = (0..=units)
            .map(|u| if u == units { total } else { u * per_unit })
            .collect();
        Self::from_offsets(total, &offsets)
    }

    /// Build from `units + 1` boundary offsets. Decreasing offsets (a
    /// negative partition size) or a last offset other than `total` are
    /// rejected.
    pub fn from_offsets(total: usize, offsets: &[usize]) -> Result<Self> {
        if offsets.len() < 2 || offsets[0] != 0 || offsets[offsets.len() - 1] != total {
            return Err(SimError::Domain(format!(
                "partition offsets {offsets:?} do not cover 0..{total}"
            )));
        }
        let parts = offsets
            .windows(2)
            .map(|w| {
                w[1].checked_sub(w[0])
                    .map(|size| Partition { offset: w[0], size })
                    .ok_or_else(|| {
                        SimError::Domain(format!("negative partition size at offset {}", w[0]))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { total, parts })
    }

    /// Total number of particles covered.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of execution units.
    pub fn units(&self) -> usize {
        self.parts.len()
    }

    /// Partition of unit `unit`.
    pub fn get(&self, unit: usize) -> Result<Partition> {
        self.parts.get(unit).copied().ok_or_else(|| {
            SimError::Sync(format!(
                "unit {unit} has no partition ({} units)",
                self.parts.len()
            ))
        })
    }

    /// All partitions in unit order.
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.parts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(table: &PartitionTable) -> Vec<usize> {
        table.iter().map(|p| p.size).collect()
    }

    #[test]
    fn ceil_split_matches_worker_ranges() {
        let table = PartitionTable::ceil_split(10, 4).unwrap();
        assert_eq!(sizes(&table), vec![3, 3, 3, 1]);
        assert_eq!(table.get(3).unwrap().range(), 9..10);

        let table = PartitionTable::ceil_split(3, 8).unwrap();
        assert_eq!(sizes(&table), vec![1, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn floor_split_last_absorbs_remainder() {
        let table = PartitionTable::floor_split(10, 4).unwrap();
        assert_eq!(sizes(&table), vec![2, 2, 2, 4]);
        assert_eq!(table.get(3).unwrap().offset, 6);

        let table = PartitionTable::floor_split(3, 5).unwrap();
        assert_eq!(sizes(&table), vec![0, 0, 0, 0, 3]);
    }

    #[test]
    fn partitions_cover_everything_once() {
        for (n, units) in [(1000, 3), (7, 7), (1, 1), (5, 9)] {
            for table in [
                PartitionTable::ceil_split(n, units).unwrap(),
                PartitionTable::floor_split(n, units).unwrap(),
            ] {
                assert_eq!(table.units(), units);
                let covered: Vec<usize> = table.iter().flat_map(|p| p.range()).collect();
                assert_eq!(covered, (0..n).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn zero_units_is_config_error() {
        assert!(matches!(PartitionTable::ceil_split(10, 0), Err(SimError::Config(_))));
        assert!(matches!(PartitionTable::floor_split(10, 0), Err(SimError::Config(_))));
    }

    #[test]
    fn malformed_offsets_are_domain_errors() {
        assert!(matches!(
            PartitionTable::from_offsets(10, &[0, 6, 4, 10]),
            Err(SimError::Domain(_))
        ));
        assert!(matches!(
            PartitionTable::from_offsets(10, &[0, 5, 9]),
            Err(SimError::Domain(_))
        ));
    }

    #[test]
    fn missing_unit_is_sync_error() {
        let table = PartitionTable::floor_split(10, 2).unwrap();
        assert!(matches!(table.get(2), Err(SimError::Sync(_))));
    }
}
