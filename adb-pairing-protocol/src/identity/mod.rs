//! Device Identity
//!
//! The identity keypair is what the pairing service authorizes. It is
//! created lazily on first use, then kept for good: generating a new one
//! silently revokes every earlier authorization, so that only ever happens
//! through [`PairingKeyStore::reset`].
//!
//! ## Usage
//!
//! ```no_run
//! use adb_pairing_protocol::identity::{FileKeyValueStore, PairingKeyStore};
//! use std::sync::Arc;
//!
//! # fn main() -> adb_pairing_protocol::Result<()> {
//! let store = Arc::new(FileKeyValueStore::new("/var/lib/adb-pairing"));
//! let keys = PairingKeyStore::new(store, "agent@device");
//! let identity = keys.get()?;
//! println!("identity fingerprint: {}", identity.fingerprint());
//! # Ok(())
//! # }
//! ```

pub mod credential;
pub mod store;

pub use credential::PairingCredential;
pub use store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

use crate::{PairingError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Storage key of the identity record
///
/// Renaming it orphans the stored identity and with it every authorization.
pub const IDENTITY_STORE_KEY: &str = "adb_pairing_identity";

/// Owner of this device's persistent pairing identity
pub struct PairingKeyStore {
    store: Arc<dyn KeyValueStore>,
    device_name: String,
    cached: Mutex<Option<Arc<PairingCredential>>>,
}

impl PairingKeyStore {
    /// `device_name` is only used when a new identity gets generated
    pub fn new(store: Arc<dyn KeyValueStore>, device_name: impl Into<String>) -> Self {
        Self {
            store,
            device_name: device_name.into(),
            cached: Mutex::new(None),
        }
    }

    /// Return the persisted identity, creating it on first call
    ///
    /// A record that exists but cannot be decoded is reported as
    /// [`PairingError::Key`]; it is never replaced implicitly.
    pub fn get(&self) -> Result<Arc<PairingCredential>> {
        let mut cached = self.cached.lock();
        if let Some(credential) = cached.as_ref() {
            return Ok(credential.clone());
        }

        let credential = match self.load()? {
            Some(existing) => existing,
            None => self.create()?,
        };

        let credential = Arc::new(credential);
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Discard the identity and generate a new one
    ///
    /// Every public key previously authorized by a pairing service stops
    /// matching after this call.
    pub fn reset(&self) -> Result<Arc<PairingCredential>> {
        let mut cached = self.cached.lock();

        let credential = PairingCredential::generate(self.device_name.clone())?;
        self.store
            .put(IDENTITY_STORE_KEY, &credential.to_record()?)
            .map_err(|e| PairingError::Key(format!("writing identity: {}", e)))?;

        warn!(
            "Pairing identity reset, new fingerprint {}; earlier authorizations are void",
            credential.fingerprint()
        );

        let credential = Arc::new(credential);
        *cached = Some(credential.clone());
        Ok(credential)
    }

    fn load(&self) -> Result<Option<PairingCredential>> {
        let bytes = self
            .store
            .get(IDENTITY_STORE_KEY)
            .map_err(|e| PairingError::Key(format!("reading identity: {}", e)))?;

        bytes
            .map(|bytes| PairingCredential::from_record(&bytes))
            .transpose()
    }

    fn create(&self) -> Result<PairingCredential> {
        let credential = PairingCredential::generate(self.device_name.clone())?;
        let committed = self
            .store
            .put_if_absent(IDENTITY_STORE_KEY, &credential.to_record()?)
            .map_err(|e| PairingError::Key(format!("writing identity: {}", e)))?;

        if committed {
            info!(
                "Generated pairing identity with fingerprint {}",
                credential.fingerprint()
            );
            return Ok(credential);
        }

        // Another process committed first; theirs is the identity
        self.load()?.ok_or_else(|| {
            PairingError::Key("identity vanished after concurrent creation".to_string())
        })
    }
}
