//! Recipient resolution capability used by the validator.

use std::collections::HashMap;

use bulut_alias::{AliasDirectory, AliasError};
use bulut_types::{Address, Handle};

/// Outcome of resolving one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Address),
    NotFound,
    /// The backing directory could not answer.
    Unavailable(String),
}

/// Maps alias handles to addresses at validation time.
pub trait RecipientResolver: Send + Sync {
    fn resolve(&self, handle: &Handle) -> Resolution;
}

impl RecipientResolver for AliasDirectory {
    fn resolve(&self, handle: &Handle) -> Resolution {
        match AliasDirectory::resolve(self, handle.as_str()) {
            Ok(address) => Resolution::Found(address),
            Err(AliasError::NotFound(_)) | Err(AliasError::InvalidHandle(_)) => Resolution::NotFound,
            Err(e) => Resolution::Unavailable(e.to_string()),
        }
    }
}

impl RecipientResolver for HashMap<Handle, Address> {
    fn resolve(&self, handle: &Handle) -> Resolution {
        match self.get(handle) {
            Some(address) => Resolution::Found(*address),
            None => Resolution::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulut_alias::MemoryAliasStore;
    use std::sync::Arc;

    #[test]
    fn test_directory_not_found() {
        let dir = AliasDirectory::new(Arc::new(MemoryAliasStore::new()));
        let handle: Handle = "@ghost".parse().expect("handle");
        assert_eq!(RecipientResolver::resolve(&dir, &handle), Resolution::NotFound);
    }

    #[test]
    fn test_map_resolver() {
        let handle: Handle = "@alice".parse().expect("handle");
        let map = HashMap::from([(handle.clone(), Address([7; 20]))]);
        assert_eq!(map.resolve(&handle), Resolution::Found(Address([7; 20])));
    }
}
