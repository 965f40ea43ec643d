//! Save rules of the model ORM.
//!
//! The change tracker decides between insert and update from the key: an
//! unset generated key inserts, a set one updates and must match a row.
//! Assigned keys are looked up first.

use super::graph::key_of;
use super::relational::RelationalSession;
use crate::entity::Row;
use crate::error::CoreResult;
use crate::mapping::{KeyGeneration, TableMeta};

pub(super) fn save(session: &mut RelationalSession, meta: &TableMeta, row: Row) -> CoreResult<Row> {
    let key = key_of(meta)?;
    let value = row.get(&key.column).clone();

    let row = if key.is_unsaved(&value) {
        session.insert(meta, row, true)?
    } else if session.snapshots.matches(meta, &value, &row)? == Some(true) {
        return Ok(row);
    } else if key.generation == KeyGeneration::Assigned {
        if session.exists(meta, &value)? {
            session.update(meta, &row)?;
            row
        } else {
            session.insert(meta, row, false)?
        }
    } else {
        if session.update(meta, &row)? == 0 {
            return Err(RelationalSession::conflict(meta));
        }
        row
    };

    session.snapshots.remember(meta, row.get(&key.column), &row)?;
    Ok(row)
}
