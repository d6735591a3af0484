//! Per-identity client state held by the registry.

use serde_json::Value;

use super::handle::Handle;

/// The registry's record for one identity: its bound handle (if any) and the
/// opaque data produced at authentication time.
pub struct ClientRecord {
    handle: Option<Handle>,
    data: Value,
}

impl ClientRecord {
    pub fn new(handle: Handle, data: Value) -> Self {
        Self {
            handle: Some(handle),
            data,
        }
    }

    /// Id of the currently bound handle.
    pub fn handle_id(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.id())
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle.clone()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Bind a new handle and data, returning the handle it replaced.
    pub fn bind(&mut self, handle: Handle, data: Value) -> Option<Handle> {
        self.data = data;
        self.handle.replace(handle)
    }

    pub fn into_data(self) -> Value {
        self.data
    }
}
