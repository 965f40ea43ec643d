//! Save rules of the session ORM.
//!
//! Saving an entity the session already loaded or saved is an update,
//! skipped when nothing changed. Any other entity with a key is merged:
//! an existing row is updated, a missing one inserted, with a fresh key
//! where the database or client generates keys.

use super::graph::key_of;
use super::relational::RelationalSession;
use crate::entity::Row;
use crate::error::CoreResult;
use crate::mapping::{KeyGeneration, TableMeta};

pub(super) fn save(session: &mut RelationalSession, meta: &TableMeta, row: Row) -> CoreResult<Row> {
    let key = key_of(meta)?;
    let value = row.get(&key.column).clone();
    if key.is_unsaved(&value) {
        let row = session.insert(meta, row, true)?;
        return remember(session, meta, row);
    }

    let row = match session.snapshots.matches(meta, &value, &row)? {
        Some(true) => return Ok(row),
        Some(false) => {
            if session.update(meta, &row)? == 0 {
                return Err(RelationalSession::conflict(meta));
            }
            row
        }
        None if session.exists(meta, &value)? => {
            session.update(meta, &row)?;
            row
        }
        None => {
            let fresh = key.generation != KeyGeneration::Assigned;
            tracing::debug!(table = %meta.name, fresh, "merging detached entity as new row");
            session.insert(meta, row, fresh)?
        }
    };
    remember(session, meta, row)
}

fn remember(session: &mut RelationalSession, meta: &TableMeta, row: Row) -> CoreResult<Row> {
    let key = key_of(meta)?;
    session.snapshots.remember(meta, row.get(&key.column), &row)?;
    Ok(row)
}
