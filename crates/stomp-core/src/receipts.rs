use crate::error::SessionError;
use std::collections::HashMap;

pub type ReceiptId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: ReceiptId,
    pub description: String,
    pub is_logout: bool,
}

/// Pending acknowledgements keyed by the id sent in the `receipt` header.
#[derive(Debug, Default)]
pub struct ReceiptTable {
    next_id: ReceiptId,
    pending: HashMap<ReceiptId, String>,
    logout: Option<ReceiptId>,
}

impl ReceiptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, description: impl Into<String>) -> ReceiptId {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.insert(id, description.into());
        id
    }

    /// At most one logout receipt may be outstanding.
    pub fn allocate_logout(
        &mut self,
        description: impl Into<String>,
    ) -> Result<ReceiptId, SessionError> {
        if self.logout.is_some() {
            return Err(SessionError::LogoutInProgress);
        }
        let id = self.allocate(description);
        self.logout = Some(id);
        Ok(id)
    }

    pub fn resolve(&mut self, id: ReceiptId) -> Option<Resolved> {
        let description = self.pending.remove(&id)?;
        let is_logout = self.logout == Some(id);
        if is_logout {
            self.logout = None;
        }
        Some(Resolved {
            id,
            description,
            is_logout,
        })
    }

    pub fn pending_logout(&self) -> Option<ReceiptId> {
        self.logout
    }

    pub fn is_pending(&self, id: ReceiptId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_consumes_entry_once() {
        let mut table = ReceiptTable::new();
        let id = table.allocate("Joined channel a_b");
        assert_eq!(id, 1);

        let resolved = table.resolve(id).expect("pending");
        assert_eq!(resolved.description, "Joined channel a_b");
        assert!(!resolved.is_logout);
        assert!(table.resolve(id).is_none());
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn unknown_id_resolves_to_nothing() {
        let mut table = ReceiptTable::new();
        table.allocate("Joined channel a_b");
        assert!(table.resolve(42).is_none());
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn only_one_logout_receipt_outstanding() {
        let mut table = ReceiptTable::new();
        let first = table.allocate_logout("Logged out").expect("first logout");
        assert!(matches!(
            table.allocate_logout("Logged out"),
            Err(SessionError::LogoutInProgress)
        ));
        assert_eq!(table.pending_logout(), Some(first));

        let resolved = table.resolve(first).expect("pending");
        assert!(resolved.is_logout);
        assert_eq!(table.pending_logout(), None);
    }

    #[test]
    fn ids_strictly_increase() {
        let mut table = ReceiptTable::new();
        let a = table.allocate("a");
        let b = table.allocate_logout("b").unwrap();
        table.resolve(a);
        let c = table.allocate("c");
        assert!(a < b && b < c);
    }
}
