use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use qchat_types::{StoreError, WatermarkStore};

/// Process-local watermarks for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryWatermarks {
    marks: Mutex<HashMap<String, i64>>,
}

impl MemoryWatermarks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarks {
    async fn last_seen(&self, conversation_id: &str) -> Result<Option<i64>, StoreError> {
        let marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(marks.get(conversation_id).copied())
    }

    async fn set_last_seen(&self, conversation_id: &str, at: i64) -> Result<(), StoreError> {
        let mut marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        let mark = marks.entry(conversation_id.to_string()).or_insert(at);
        *mark = (*mark).max(at);
        Ok(())
    }
}
