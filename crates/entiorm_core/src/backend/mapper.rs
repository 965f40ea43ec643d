//! Save rules of the SQL mapper: update by key, insert when nothing
//! matched. No tracking, no relationships.

use super::graph::key_of;
use super::relational::RelationalSession;
use crate::entity::Row;
use crate::error::CoreResult;
use crate::mapping::TableMeta;

pub(super) fn save(session: &mut RelationalSession, meta: &TableMeta, row: Row) -> CoreResult<Row> {
    let key = key_of(meta)?;
    if key.is_unsaved(row.get(&key.column)) {
        return session.insert(meta, row, true);
    }
    if session.update(meta, &row)? > 0 {
        return Ok(row);
    }
    session.insert(meta, row, false)
}
