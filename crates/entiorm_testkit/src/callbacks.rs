//! Callbacks that record or alter what they see.

use std::sync::Arc;

use entiorm_core::{CoreError, CoreResult, DatabaseContext, DeleteCallback, SaveCallback};
use parking_lot::Mutex;

use crate::fixtures::TestTable;

/// Shared event log.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Appends `before:<label>` / `after:<label>` for every save and delete.
pub struct Recorder {
    label: &'static str,
    log: EventLog,
}

impl Recorder {
    /// A recorder writing to `log`.
    pub fn new(label: &'static str, log: &EventLog) -> Self {
        Self {
            label,
            log: Arc::clone(log),
        }
    }

    fn push(&self, event: &str) {
        self.log.lock().push(format!("{event}:{}", self.label));
    }
}

impl SaveCallback<TestTable> for Recorder {
    fn before_save(&self, _context: &mut DatabaseContext, _entity: &mut TestTable) -> CoreResult<()> {
        self.push("before_save");
        Ok(())
    }

    fn after_save(&self, _context: &mut DatabaseContext, _entity: &TestTable) -> CoreResult<()> {
        self.push("after_save");
        Ok(())
    }
}

impl DeleteCallback<TestTable> for Recorder {
    fn before_delete(&self, _context: &mut DatabaseContext, _entity: &TestTable) -> CoreResult<()> {
        self.push("before_delete");
        Ok(())
    }

    fn after_delete(&self, _context: &mut DatabaseContext, _entity: &TestTable) -> CoreResult<()> {
        self.push("after_delete");
        Ok(())
    }
}

/// Sets `extra["stamped"] = true` before every save.
pub struct Stamp;

impl SaveCallback<TestTable> for Stamp {
    fn before_save(&self, _context: &mut DatabaseContext, entity: &mut TestTable) -> CoreResult<()> {
        entity
            .extra
            .insert("stamped".to_string(), serde_json::Value::Bool(true));
        Ok(())
    }
}

/// Refuses to save rows named `"forbidden"`.
pub struct Veto;

impl SaveCallback<TestTable> for Veto {
    fn before_save(&self, _context: &mut DatabaseContext, entity: &mut TestTable) -> CoreResult<()> {
        if entity.name == "forbidden" {
            return Err(CoreError::invalid_operation("forbidden name"));
        }
        Ok(())
    }
}
