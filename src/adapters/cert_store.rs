//! CA trust store.
//!
//! The broker's CA chain is provisioned into the `certs` NVS namespace at
//! the factory.  It is read once at boot and installed into the global
//! mbedTLS CA store before each TLS handshake cycle.
//!
//! | Key       | Content                          |
//! |-----------|----------------------------------|
//! | `ca_cert` | PEM-encoded CA certificate chain |

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort, TrustStore};
use crate::error::TrustError;

pub const CERT_NAMESPACE: &str = "certs";
pub const CA_CERT_KEY: &str = "ca_cert";

/// Maximum CA chain size (PEM format, includes headers).
pub const MAX_CERT_SIZE: usize = 4096;

/// PEM material plus the NUL terminator mbedTLS expects.
type CertBuffer = heapless::Vec<u8, { MAX_CERT_SIZE + 1 }>;

/// [`TrustStore`] backed by a CA chain loaded from storage.
pub struct CaTrustStore {
    ca_cert: CertBuffer,
    installs: u32,
}

impl CaTrustStore {
    /// Read the CA chain from storage.
    ///
    /// A missing or oversized blob leaves the store empty; the error then
    /// surfaces from [`TrustStore::provision`] as a failed handshake attempt.
    pub fn load(storage: &dyn StoragePort) -> Self {
        let mut store = Self::empty();
        let mut buf = [0u8; MAX_CERT_SIZE];
        match storage.read(CERT_NAMESPACE, CA_CERT_KEY, &mut buf) {
            Ok(len) => match store.set_pem(&buf[..len]) {
                Ok(()) => info!("CaTrustStore: loaded CA chain ({}B)", len),
                Err(e) => warn!("CaTrustStore: {}", e),
            },
            Err(StorageError::NotFound) => warn!("CaTrustStore: no CA chain provisioned"),
            Err(e) => warn!("CaTrustStore: CA chain read failed: {}", e),
        }
        store
    }

    pub fn empty() -> Self {
        Self {
            ca_cert: CertBuffer::new(),
            installs: 0,
        }
    }

    /// Replace the CA chain.  Trailing NULs in `pem` are ignored.
    pub fn set_pem(&mut self, pem: &[u8]) -> Result<(), TrustError> {
        let end = pem.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let pem = &pem[..end];
        if pem.len() > MAX_CERT_SIZE {
            return Err(TrustError::TooLarge);
        }
        self.ca_cert.clear();
        let _ = self.ca_cert.extend_from_slice(pem);
        let _ = self.ca_cert.push(0);
        Ok(())
    }

    pub fn has_material(&self) -> bool {
        self.ca_cert.len() > 1
    }

    /// Successful installs since boot.
    pub fn installs(&self) -> u32 {
        self.installs
    }

    #[cfg(target_os = "espidf")]
    fn install(&self) -> Result<(), TrustError> {
        let len = u32::try_from(self.ca_cert.len()).map_err(|_| TrustError::TooLarge)?;
        // SAFETY: the buffer is NUL-terminated PEM; mbedTLS copies it into
        // the global store before returning.
        let ret = unsafe {
            esp_idf_svc::sys::esp_tls_set_global_ca_store(self.ca_cert.as_ptr(), len)
        };
        if ret != esp_idf_svc::sys::ESP_OK {
            return Err(TrustError::Install(ret));
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn install(&self) -> Result<(), TrustError> {
        info!("CaTrustStore(sim): install {}B (no-op)", self.ca_cert.len());
        Ok(())
    }
}

impl TrustStore for CaTrustStore {
    fn provision(&mut self) -> Result<(), TrustError> {
        if !self.has_material() {
            return Err(TrustError::MaterialMissing);
        }
        self.install()?;
        self.installs = self.installs.wrapping_add(1);
        info!("CaTrustStore: CA chain installed ({}B)", self.ca_cert.len() - 1);
        Ok(())
    }
}
