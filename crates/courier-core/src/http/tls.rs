//! TLS configuration for pooled HTTP clients
//!
//! Every client the pool builds gets its TLS settings from one [`TlsConfig`].
//! The negotiated protocol never drops below TLS 1.2 and hostname
//! verification cannot be switched off; the only knobs are an optional
//! upper version bound and additional trust anchors.

use std::path::{Path, PathBuf};

use reqwest::{Certificate, ClientBuilder};
use serde::{Deserialize, Serialize};

/// Lowest protocol version the dispatcher will ever negotiate
pub const MINIMUM_TLS_VERSION: TlsVersion = TlsVersion::TLS1_2;

/// TLS configuration shared by every client in a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Minimum TLS version to accept
    pub min_tls_version: TlsVersion,
    /// Maximum TLS version to use
    pub max_tls_version: Option<TlsVersion>,
    /// Trust the bundled webpki root certificates
    pub built_in_roots: bool,
    /// Custom CA certificate paths
    pub custom_ca_certs: Vec<PathBuf>,
    /// Custom CA certificate content (PEM format)
    pub custom_ca_cert_pem: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_tls_version: MINIMUM_TLS_VERSION,
            max_tls_version: None, // Use latest available
            built_in_roots: true,
            custom_ca_certs: Vec::new(),
            custom_ca_cert_pem: Vec::new(),
        }
    }
}

/// TLS protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TlsVersion {
    /// TLS 1.0 (rejected by [`TlsConfig::validate`])
    #[serde(alias = "1.0")]
    TLS1_0,
    /// TLS 1.1 (rejected by [`TlsConfig::validate`])
    #[serde(alias = "1.1")]
    TLS1_1,
    /// TLS 1.2 (minimum accepted)
    #[serde(alias = "1.2")]
    TLS1_2,
    /// TLS 1.3 (preferred)
    #[serde(alias = "1.3")]
    TLS1_3,
}

impl TlsVersion {
    /// Convert to the reqwest TLS version
    pub fn to_reqwest_version(self) -> reqwest::tls::Version {
        match self {
            TlsVersion::TLS1_0 => reqwest::tls::Version::TLS_1_0,
            TlsVersion::TLS1_1 => reqwest::tls::Version::TLS_1_1,
            TlsVersion::TLS1_2 => reqwest::tls::Version::TLS_1_2,
            TlsVersion::TLS1_3 => reqwest::tls::Version::TLS_1_3,
        }
    }
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVersion::TLS1_0 => write!(f, "TLSv1.0"),
            TlsVersion::TLS1_1 => write!(f, "TLSv1.1"),
            TlsVersion::TLS1_2 => write!(f, "TLSv1.2"),
            TlsVersion::TLS1_3 => write!(f, "TLSv1.3"),
        }
    }
}

impl TlsConfig {
    /// Create the default secure configuration
    pub fn secure() -> Self {
        Self::default()
    }

    /// Add a custom CA certificate from file path
    pub fn with_ca_cert_file(mut self, path: PathBuf) -> Self {
        self.custom_ca_certs.push(path);
        self
    }

    /// Add a custom CA certificate from PEM content
    pub fn with_ca_cert_pem(mut self, pem_content: String) -> Self {
        self.custom_ca_cert_pem.push(pem_content);
        self
    }

    /// Set minimum TLS version
    pub fn with_min_tls_version(mut self, version: TlsVersion) -> Self {
        self.min_tls_version = version;
        self
    }

    /// Set maximum TLS version
    pub fn with_max_tls_version(mut self, version: TlsVersion) -> Self {
        self.max_tls_version = Some(version);
        self
    }

    /// Trust only the configured custom CAs
    pub fn without_built_in_roots(mut self) -> Self {
        self.built_in_roots = false;
        self
    }

    /// Validate the TLS configuration
    pub fn validate(&self) -> Result<(), TlsConfigError> {
        if self.min_tls_version < MINIMUM_TLS_VERSION {
            return Err(TlsConfigError::VersionBelowMinimum(self.min_tls_version));
        }

        // Check that if max version is set, it's >= min version
        if let Some(max_version) = self.max_tls_version {
            if max_version < self.min_tls_version {
                return Err(TlsConfigError::InvalidVersionRange(
                    self.min_tls_version,
                    max_version,
                ));
            }
        }

        if !self.built_in_roots && !self.has_custom_ca_certs() {
            return Err(TlsConfigError::NoTrustAnchors);
        }

        // Validate CA certificate files exist
        for ca_path in &self.custom_ca_certs {
            if !ca_path.exists() {
                return Err(TlsConfigError::CaCertFileNotFound(ca_path.clone()));
            }
        }

        for pem in &self.custom_ca_cert_pem {
            if !validate_pem_format(pem) {
                return Err(TlsConfigError::InvalidPem("inline certificate".to_string()));
            }
        }

        Ok(())
    }

    /// Apply these settings to a client builder
    ///
    /// Fails instead of falling back to a weaker setup when the settings
    /// cannot be honoured.
    pub fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, TlsConfigError> {
        self.validate()?;

        let mut builder = builder
            .use_rustls_tls()
            .min_tls_version(self.min_tls_version.to_reqwest_version())
            .tls_built_in_root_certs(self.built_in_roots);

        if let Some(max_version) = self.max_tls_version {
            builder = builder.max_tls_version(max_version.to_reqwest_version());
        }

        for ca_path in &self.custom_ca_certs {
            let pem = load_cert_from_file(ca_path).map_err(|source| TlsConfigError::CaCertRead {
                path: ca_path.clone(),
                source,
            })?;
            let certificate = parse_certificate(&pem, &ca_path.display().to_string())?;
            builder = builder.add_root_certificate(certificate);
        }

        for pem in &self.custom_ca_cert_pem {
            builder = builder.add_root_certificate(parse_certificate(pem, "inline certificate")?);
        }

        Ok(builder)
    }

    /// Check if this configuration has custom CA certificates
    pub fn has_custom_ca_certs(&self) -> bool {
        !self.custom_ca_certs.is_empty() || !self.custom_ca_cert_pem.is_empty()
    }
}

/// TLS configuration errors
#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("TLS version {0} is below the required minimum of TLSv1.2")]
    VersionBelowMinimum(TlsVersion),

    #[error("Invalid TLS version range: min {0} > max {1}")]
    InvalidVersionRange(TlsVersion, TlsVersion),

    #[error("No trust anchors: built-in roots disabled and no custom CA certificates given")]
    NoTrustAnchors,

    #[error("CA certificate file not found: {0:?}")]
    CaCertFileNotFound(PathBuf),

    #[error("Failed to read CA certificate {path:?}: {source}")]
    CaCertRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid PEM content in {0}")]
    InvalidPem(String),

    #[error("Rejected certificate in {origin}: {source}")]
    Certificate {
        origin: String,
        #[source]
        source: reqwest::Error,
    },
}

fn parse_certificate(pem: &str, origin: &str) -> Result<Certificate, TlsConfigError> {
    if !validate_pem_format(pem) {
        return Err(TlsConfigError::InvalidPem(origin.to_string()));
    }

    Certificate::from_pem(pem.as_bytes()).map_err(|source| TlsConfigError::Certificate {
        origin: origin.to_string(),
        source,
    })
}

/// Helper function to load certificate from file
pub fn load_cert_from_file(path: &Path) -> Result<String, std::io::Error> {
    std::fs::read_to_string(path)
}

/// Helper function to validate PEM format
pub fn validate_pem_format(pem_content: &str) -> bool {
    pem_content.contains("-----BEGIN") && pem_content.contains("-----END")
}
