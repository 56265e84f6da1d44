//! The migration runner.
//!
//! Units run strictly in version order, each in its own transaction that
//! also writes the ledger. The whole run holds an advisory lock so two
//! runners against one database never interleave.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::ast::{MaterializedView, QualifiedName, SchemaOp};
use crate::driver::Driver;
use crate::error::{Error, OrderingReason, Result};
use crate::migrate::{
    execute_with_ledger, ledger_table_def, Direction, Ledger, LedgerChange, LedgerEntry,
    MigrationUnit, Version,
};
use crate::views;

pub const DEFAULT_LEDGER_TABLE: &str = "_strata_migrations";

/// `pg_advisory_lock` key used when none is configured ("strata" in ASCII).
pub const DEFAULT_LOCK_KEY: i64 = 0x7374_7261_7461;

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub ledger_table: QualifiedName,
    pub lock_key: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ledger_table: QualifiedName::new(DEFAULT_LEDGER_TABLE),
            lock_key: DEFAULT_LOCK_KEY,
        }
    }
}

/// Result of [`Runner::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyReport {
    /// Batch number given to this run, `None` if nothing was pending.
    pub batch: Option<i32>,
    pub applied: Vec<Version>,
}

/// Result of [`Runner::rollback`] and [`Runner::rollback_batch`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RollbackReport {
    /// Newest first.
    pub rolled_back: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Applied { batch: i32, applied_at: DateTime<Utc> },
    /// In the ledger, but no unit carries this version.
    Orphaned { batch: i32, applied_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub version: Version,
    pub name: String,
    pub state: UnitState,
}

/// SQL a pending unit would run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    pub version: Version,
    pub name: String,
    pub statements: Vec<String>,
}

/// Applies and rolls back an ordered set of migration units.
#[derive(Debug, Clone)]
pub struct Runner {
    units: Vec<MigrationUnit>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(units: Vec<MigrationUnit>) -> Result<Self> {
        Self::with_config(units, RunnerConfig::default())
    }

    /// Sort and validate units. Nothing touches a database here.
    pub fn with_config(mut units: Vec<MigrationUnit>, config: RunnerConfig) -> Result<Self> {
        config.ledger_table.validate()?;
        units.sort_by_key(MigrationUnit::version);
        for pair in units.windows(2) {
            if pair[0].version() == pair[1].version() {
                return Err(Error::DuplicateVersion(pair[0].version()));
            }
        }
        for unit in &units {
            unit.validate()?;
        }
        Ok(Self { units, config })
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn unit(&self, version: Version) -> Option<&MigrationUnit> {
        self.units.iter().find(|u| u.version() == version)
    }

    pub fn latest_version(&self) -> Option<Version> {
        self.units.last().map(MigrationUnit::version)
    }

    /// Units `apply` would run, in order, after checking the ledger is a
    /// prefix of the known sequence.
    pub fn pending(&self, ledger: &Ledger, target: Option<Version>) -> Result<Vec<&MigrationUnit>> {
        self.check_known(ledger)?;
        let latest = ledger.latest_version();

        if let Some(latest) = latest {
            if let Some(gap) = self
                .units
                .iter()
                .find(|u| u.version() < latest && !ledger.contains(u.version()))
            {
                return Err(Error::OrderingViolation {
                    version: gap.version(),
                    reason: OrderingReason::Gap { latest },
                });
            }
        }

        if let Some(target) = target {
            if self.unit(target).is_none() {
                return Err(Error::UnknownTarget(target));
            }
            if let Some(latest) = latest {
                if target < latest {
                    return Err(Error::OrderingViolation {
                        version: target,
                        reason: OrderingReason::TargetBehind { latest },
                    });
                }
            }
        }

        Ok(self
            .units
            .iter()
            .filter(|u| !ledger.contains(u.version()))
            .filter(|u| target.is_none_or(|t| u.version() <= t))
            .collect())
    }

    fn check_known(&self, ledger: &Ledger) -> Result<()> {
        let known: BTreeSet<Version> = self.units.iter().map(MigrationUnit::version).collect();
        match ledger.entries().iter().find(|e| !known.contains(&e.version)) {
            Some(entry) => Err(Error::OrderingViolation {
                version: entry.version,
                reason: OrderingReason::UnknownApplied,
            }),
            None => Ok(()),
        }
    }

    /// Dry run: SQL of every pending unit up to `target`.
    pub fn plan(&self, ledger: &Ledger, target: Option<Version>) -> Result<Vec<PlannedUnit>> {
        Ok(self
            .pending(ledger, target)?
            .into_iter()
            .map(|unit| PlannedUnit {
                version: unit.version(),
                name: unit.name().to_string(),
                statements: unit.up().to_sql(),
            })
            .collect())
    }

    /// [`Runner::plan`] against the ledger of a live database.
    pub async fn plan_against<D: Driver>(&self, driver: &mut D, target: Option<Version>) -> Result<Vec<PlannedUnit>> {
        let ledger = self.read_ledger(driver).await?;
        self.plan(&ledger, target)
    }

    pub async fn status<D: Driver>(&self, driver: &mut D) -> Result<Vec<UnitStatus>> {
        let ledger = self.read_ledger(driver).await?;
        let mut statuses: Vec<UnitStatus> = self
            .units
            .iter()
            .map(|unit| UnitStatus {
                version: unit.version(),
                name: unit.name().to_string(),
                state: match ledger.get(unit.version()) {
                    Some(entry) => UnitState::Applied {
                        batch: entry.batch,
                        applied_at: entry.applied_at,
                    },
                    None => UnitState::Pending,
                },
            })
            .collect();
        for entry in ledger.entries() {
            if self.unit(entry.version).is_none() {
                statuses.push(UnitStatus {
                    version: entry.version,
                    name: entry.name.clone(),
                    state: UnitState::Orphaned {
                        batch: entry.batch,
                        applied_at: entry.applied_at,
                    },
                });
            }
        }
        statuses.sort_by_key(|s| s.version);
        Ok(statuses)
    }

    /// Apply pending units up to `target` (default: the newest unit).
    pub async fn apply<D: Driver>(&self, driver: &mut D, target: Option<Version>) -> Result<ApplyReport> {
        driver.acquire_lock(self.config.lock_key).await?;
        let result = self.apply_locked(driver, target).await;
        self.release(driver, result).await
    }

    /// Roll back the `steps` most recently applied units.
    pub async fn rollback<D: Driver>(&self, driver: &mut D, steps: usize) -> Result<RollbackReport> {
        driver.acquire_lock(self.config.lock_key).await?;
        let result = self.rollback_locked(driver, Some(steps)).await;
        self.release(driver, result).await
    }

    /// Roll back every unit of the latest batch.
    pub async fn rollback_batch<D: Driver>(&self, driver: &mut D) -> Result<RollbackReport> {
        driver.acquire_lock(self.config.lock_key).await?;
        let result = self.rollback_locked(driver, None).await;
        self.release(driver, result).await
    }

    /// Rebuild a view under the migration lock. Refused while any unit is
    /// pending, since view definitions track the newest schema.
    pub async fn rebuild_view<D: Driver>(&self, driver: &mut D, view: &MaterializedView) -> Result<()> {
        driver.acquire_lock(self.config.lock_key).await?;
        let result = self.rebuild_locked(driver, view).await;
        self.release(driver, result).await
    }

    async fn release<D: Driver, T>(&self, driver: &mut D, result: Result<T>) -> Result<T> {
        let released = driver.release_lock(self.config.lock_key).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(lock)) => {
                error!(error = %lock, "failed to release migration lock");
                Err(e)
            }
        }
    }

    async fn read_ledger<D: Driver>(&self, driver: &mut D) -> Result<Ledger> {
        Ok(Ledger::new(driver.ledger_entries(&self.config.ledger_table).await?))
    }

    async fn bootstrap<D: Driver>(&self, driver: &mut D) -> Result<()> {
        let table = &self.config.ledger_table;
        if let Some(schema) = &table.schema {
            driver.execute(&SchemaOp::create_schema(schema.clone())).await?;
        }
        driver.execute(&SchemaOp::create_table(ledger_table_def(table))).await?;
        Ok(())
    }

    async fn apply_locked<D: Driver>(&self, driver: &mut D, target: Option<Version>) -> Result<ApplyReport> {
        self.bootstrap(driver).await?;
        let ledger = self.read_ledger(driver).await?;
        let pending = self.pending(&ledger, target)?;
        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(ApplyReport::default());
        }

        let batch = ledger.next_batch();
        let mut applied = Vec::with_capacity(pending.len());
        for unit in pending {
            info!(version = %unit.version(), name = unit.name(), batch, "applying migration");
            let entry = LedgerEntry {
                version: unit.version(),
                name: unit.name().to_string(),
                batch,
                applied_at: Utc::now(),
            };
            let change = LedgerChange::Append(&self.config.ledger_table, entry);
            execute_with_ledger(driver, unit.up(), Some(change))
                .await
                .map_err(|failure| {
                    error!(version = %unit.version(), step = failure.step, error = %failure.source, "migration failed");
                    Error::TransformationFailure {
                        version: unit.version(),
                        direction: Direction::Up,
                        step: failure.step,
                        source: failure.source,
                    }
                })?;
            applied.push(unit.version());
        }
        info!(batch, count = applied.len(), "migrations applied");
        Ok(ApplyReport {
            batch: Some(batch),
            applied,
        })
    }

    async fn rebuild_locked<D: Driver>(&self, driver: &mut D, view: &MaterializedView) -> Result<()> {
        let ledger = self.read_ledger(driver).await?;
        if let Some(unit) = self.pending(&ledger, None)?.first() {
            warn!(view = %view.name, pending = %unit.version(), "refusing view rebuild on an unmigrated schema");
            return Err(Error::OrderingViolation {
                version: unit.version(),
                reason: OrderingReason::NotApplied,
            });
        }
        views::rebuild(driver, view).await
    }

    /// `steps: None` selects the latest batch.
    async fn rollback_locked<D: Driver>(&self, driver: &mut D, steps: Option<usize>) -> Result<RollbackReport> {
        let ledger = self.read_ledger(driver).await?;
        self.check_known(&ledger)?;

        let newest_first = ledger.entries().iter().rev();
        let selected: Vec<&LedgerEntry> = match steps {
            Some(steps) => {
                if steps > ledger.len() {
                    warn!(requested = steps, applied = ledger.len(), "rollback clamped to applied units");
                }
                newest_first.take(steps).collect()
            }
            None => match ledger.latest_batch() {
                Some(batch) => newest_first.take_while(|e| e.batch == batch).collect(),
                None => Vec::new(),
            },
        };
        if selected.is_empty() {
            info!("nothing to roll back");
            return Ok(RollbackReport::default());
        }

        let mut rolled_back = Vec::with_capacity(selected.len());
        for entry in selected {
            let unit = self.unit(entry.version).ok_or(Error::OrderingViolation {
                version: entry.version,
                reason: OrderingReason::UnknownApplied,
            })?;
            info!(version = %unit.version(), name = unit.name(), "rolling back migration");
            let change = LedgerChange::Remove(&self.config.ledger_table, unit.version());
            execute_with_ledger(driver, unit.down(), Some(change))
                .await
                .map_err(|failure| {
                    error!(version = %unit.version(), step = failure.step, error = %failure.source, "rollback failed");
                    Error::TransformationFailure {
                        version: unit.version(),
                        direction: Direction::Down,
                        step: failure.step,
                        source: failure.source,
                    }
                })?;
            rolled_back.push(unit.version());
        }
        Ok(RollbackReport { rolled_back })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Transformation;

    fn unit(id: &str) -> MigrationUnit {
        let schema = format!("s{}", &id[4..8]);
        MigrationUnit::new(
            id,
            Transformation::new().op(SchemaOp::create_schema(schema.clone())),
            Transformation::new().op(SchemaOp::drop_schema(schema)),
        )
        .unwrap()
    }

    fn applied(versions: &[&str]) -> Ledger {
        Ledger::new(
            versions
                .iter()
                .map(|v| LedgerEntry {
                    version: Version::parse(v).unwrap(),
                    name: String::new(),
                    batch: 1,
                    applied_at: Utc::now(),
                })
                .collect(),
        )
    }

    fn runner() -> Runner {
        Runner::new(vec![
            unit("20230102000000_b"),
            unit("20230101000000_a"),
            unit("20230103000000_c"),
        ])
        .unwrap()
    }

    #[test]
    fn test_sorted() {
        let runner = runner();
        let names: Vec<&str> = runner.units().iter().map(|u| u.name()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_version() {
        let err = Runner::new(vec![unit("20230101000000_a"), unit("20230101000000_b")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateVersion(_)));
    }

    #[test]
    fn test_pending_respects_target() {
        let runner = runner();
        let target = Version::parse("20230102000000").unwrap();
        let pending = runner.pending(&applied(&["20230101000000"]), Some(target)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name(), "b");
    }

    #[test]
    fn test_gap_detected() {
        let err = runner()
            .pending(&applied(&["20230101000000", "20230103000000"]), None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OrderingViolation { reason: OrderingReason::Gap { .. }, .. }
        ));
    }

    #[test]
    fn test_unknown_applied() {
        let err = runner().pending(&applied(&["20220101000000"]), None).unwrap_err();
        assert!(matches!(
            err,
            Error::OrderingViolation { reason: OrderingReason::UnknownApplied, .. }
        ));
    }

    #[test]
    fn test_target_checks() {
        let runner = runner();
        let unknown = Version::parse("20230104000000").unwrap();
        assert!(matches!(
            runner.pending(&Ledger::default(), Some(unknown)),
            Err(Error::UnknownTarget(_))
        ));

        let behind = Version::parse("20230101000000").unwrap();
        let err = runner
            .pending(&applied(&["20230101000000", "20230102000000"]), Some(behind))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OrderingViolation { reason: OrderingReason::TargetBehind { .. }, .. }
        ));
    }

    #[test]
    fn test_plan_lists_sql() {
        let plan = runner().plan(&applied(&["20230101000000"]), None).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].statements, vec!["CREATE SCHEMA IF NOT EXISTS \"s0102\"".to_string()]);
    }
}
