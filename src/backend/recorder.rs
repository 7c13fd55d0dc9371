//! History of the requests that reached a case's backend

use std::sync::{Arc, Mutex, MutexGuard};

use crate::common::{Error, Result};

use super::BackendRequest;

/// Shared request history; recording only happens while installed
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    history: Arc<Mutex<Option<Vec<BackendRequest>>>>,
}

impl Recorder {
    /// Start recording, discarding any earlier history
    pub fn install(&self) -> Result<()> {
        *self.lock()? = Some(Vec::new());
        Ok(())
    }

    /// Stop recording
    pub fn restore(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }

    pub fn record(&self, request: &BackendRequest) -> Result<()> {
        if let Some(history) = self.lock()?.as_mut() {
            history.push(request.clone());
        }
        Ok(())
    }

    /// Requests recorded since `install`
    pub fn recorded(&self) -> Result<Vec<BackendRequest>> {
        Ok(self.lock()?.clone().unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Vec<BackendRequest>>>> {
        self.history
            .lock()
            .map_err(|_| Error::Internal("request recorder lock poisoned".to_string()))
    }
}
