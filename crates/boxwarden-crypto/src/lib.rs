//! `boxwarden` key material
//!
//! - **Certificates**: self-signed ECDSA P-256 certificate/key pair used by
//!   the TUIC and Hysteria2 inbounds, generated once with `rcgen`
//! - **Reality**: parsing of the tunnel binary's `generate reality-keypair`
//!   output and of the persisted key file

pub mod certs;
pub mod reality;

pub use certs::{CertError, SelfSignedBundle, ensure_self_signed_pair, generate_self_signed};
pub use reality::{KeyMaterialError, RealityKeyMaterial, SHORT_ID};
